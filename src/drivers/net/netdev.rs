//! Network Stack Interface
//!
//! This module defines the boundary between the Ethernet driver and the host
//! network stack. The driver never owns the stack: every core operation takes
//! a `&dyn NetworkStack` so the same driver instance can be exercised against
//! the OS glue or a test double.
//!
//! ## Direction of calls
//!
//! - **Outbound**: the driver pulls packets with [`NetworkStack::dequeue`]
//!   from its send entry point or when resuming after descriptor exhaustion.
//! - **Inbound**: completed receive buffers are handed up through
//!   [`NetworkStack::input`]. Ownership moves with the call.
//! - **Link**: transitions are reported through
//!   [`NetworkStack::link_state_change`].
//!
//! ## Thread Safety
//!
//! The send path and the interrupt worker may call into the stack
//! concurrently on multi-core parts, so all methods take `&self`.
//! Implementations synchronize internally.

use crate::net::packet::{Packet, PacketBuf};
use core::fmt;

/// Errors that can occur during network device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// Hardware is not present or not responding
    HardwareNotPresent,

    /// Device is not initialized
    NotInitialized,

    /// Buffer pool exhausted (back off and retry later)
    NoBuffers,

    /// Transmit ring is full (try again later)
    TxBufferFull,

    /// Frame is too large for device
    FrameTooLarge,

    /// Hardware error during operation
    HardwareError,

    /// Timeout waiting for operation to complete
    Timeout,

    /// Interrupt could not be attached
    InterruptUnavailable,

    /// Invalid configuration or parameter
    InvalidConfiguration(ConfigError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::HardwareNotPresent => write!(f, "Hardware not present"),
            NetworkError::NotInitialized => write!(f, "Device not initialized"),
            NetworkError::NoBuffers => write!(f, "No buffers available"),
            NetworkError::TxBufferFull => write!(f, "Transmit buffer full"),
            NetworkError::FrameTooLarge => write!(f, "Frame too large"),
            NetworkError::HardwareError => write!(f, "Hardware error"),
            NetworkError::Timeout => write!(f, "Operation timeout"),
            NetworkError::InterruptUnavailable => write!(f, "Interrupt unavailable"),
            NetworkError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl From<ConfigError> for NetworkError {
    fn from(e: ConfigError) -> Self {
        NetworkError::InvalidConfiguration(e)
    }
}

/// Setup-time configuration rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Option keyword not recognised
    UnknownOption,

    /// Option value is not a valid number
    BadNumber,

    /// Option requires a value but none was given
    MissingValue,

    /// Ring size is not a power of two within the supported range
    RingSize(usize),

    /// MTU outside the supported range
    Mtu(usize),

    /// Receive buffer size is not a multiple of the bus width, or too small
    BufferWidth { size: usize, width_bytes: usize },

    /// Bus width is not 32, 64 or 128 bits
    BusWidth(u32),

    /// PHY address above 31
    PhyAddress(u32),

    /// MAC address string malformed, multicast, or all-zero
    MacAddress,

    /// Speed/duplex combination not supported
    Media,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownOption => write!(f, "unknown option"),
            ConfigError::BadNumber => write!(f, "bad numeric value"),
            ConfigError::MissingValue => write!(f, "missing option value"),
            ConfigError::RingSize(n) => {
                write!(f, "ring size {} must be a power of two in 8..=1024", n)
            }
            ConfigError::Mtu(n) => write!(f, "mtu {} out of range", n),
            ConfigError::BufferWidth { size, width_bytes } => write!(
                f,
                "receive buffer size {} is not a multiple of the {}-byte bus width",
                size, width_bytes
            ),
            ConfigError::BusWidth(w) => write!(f, "bus width {} not supported", w),
            ConfigError::PhyAddress(a) => write!(f, "phy address {} out of range", a),
            ConfigError::MacAddress => write!(f, "invalid MAC address"),
            ConfigError::Media => write!(f, "unsupported speed/duplex"),
        }
    }
}

/// Link transition reported to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
}

/// Interface flags the driver reads from the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfFlags {
    /// Interface administratively up and running
    pub running: bool,

    /// Accept all frames regardless of destination address
    pub promiscuous: bool,

    /// Layer-3 MTU (excludes the Ethernet header)
    pub mtu: usize,
}

/// Network stack collaborator
///
/// Implemented by the OS glue (or a test double). See the module docs for
/// the call directions.
pub trait NetworkStack {
    /// Take the next queued outbound packet, if any
    fn dequeue(&self) -> Option<Packet>;

    /// Drop everything waiting in the send queue
    ///
    /// Returns the number of packets discarded.
    fn purge_send_queue(&self) -> usize;

    /// Hand a received frame to the stack (ownership moves)
    fn input(&self, frame: PacketBuf);

    /// Report a link transition
    fn link_state_change(&self, status: LinkStatus);

    /// Current interface flags
    fn if_flags(&self) -> IfFlags;
}
