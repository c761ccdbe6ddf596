//! CSV batch surface: one command per input row, one or more outcome rows per command.

pub mod batch;
pub mod command_reader;
pub mod outcome_writer;
