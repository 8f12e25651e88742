//! Interrupt controller drivers

pub mod gic_v2;
