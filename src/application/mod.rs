//! Application services built on the domain ports.
//!
//! `BookingOrchestrator` runs the book and cancel sagas across the reservation
//! store and the funds ledger. `PaymentService` fronts the ledger for card and
//! balance operations. The sweeper and the compensation retrier are periodic
//! background tasks that share the helper in [`periodic`].

pub mod booking;
pub mod compensation;
pub mod payments;
pub mod periodic;
pub mod sweeper;
