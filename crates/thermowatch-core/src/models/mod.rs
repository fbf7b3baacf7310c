//! Data models for Thermowatch

mod alert;
mod sample;

pub use alert::*;
pub use sample::*;
