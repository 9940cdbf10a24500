//! In-process simulated controller
//!
//! Implements the connection manager seam for tests and the CLI.

mod connection;
mod controller;
mod dispatch;

pub use connection::SimLink;
pub use controller::{SimOptions, SimulatedController};
pub use dispatch::SimError;
