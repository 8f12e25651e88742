//! Ethernet MAC drivers, grouped by IP vendor

pub mod synopsys;
