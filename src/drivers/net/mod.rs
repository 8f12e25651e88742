//! Network device drivers and abstractions

pub mod ethernet;
pub mod netdev;
pub mod platform;

pub use netdev::*;
