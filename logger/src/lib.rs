//! Daily CSV weight logger for the M5Stack Unit MiniScale (U177).
//!
//! The `scale` module speaks the unit's I2C register protocol, `sink`
//! manages the rotating per-day CSV files and `sampler` ties the two
//! together in a single control loop with button-triggered tare.

pub mod config;
pub mod sampler;
pub mod scale;
pub mod sink;
