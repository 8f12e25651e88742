//! DWC Ethernet QoS driver for NXP S32G/S32V automotive SoCs
//!
//! Board support for the Synopsys DesignWare Ethernet QoS (GMAC) controller:
//! descriptor ring management, interrupt-driven RX/TX pipelines and the PHY
//! link negotiation state machine. Register access, interrupt delivery,
//! packet buffers and the network stack are supplied by the host OS through
//! the traits in [`drivers::net::platform`] and [`drivers::net::netdev`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod console;

pub mod drivers;
pub mod dt;
pub mod net;

pub use drivers::net::ethernet::synopsys::dwceqos::{Config, Dwceqos};
pub use drivers::net::netdev::{NetworkError, NetworkStack};
