//! Register-level protocol for the MiniScale unit.

pub mod calibration;
pub mod driver;
pub mod registers;

pub use driver::{FilterConfig, FilterUpdate, MiniScale, ScaleError};
