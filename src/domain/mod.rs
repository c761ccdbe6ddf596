//! Domain types and the ports the application layer talks to.

pub mod account;
pub mod catalog;
pub mod clock;
pub mod ports;
pub mod reservation;
