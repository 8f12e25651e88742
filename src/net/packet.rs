//! Packet buffers exchanged with the network stack
//!
//! The driver moves two kinds of objects across its boundary:
//!
//! - [`PacketBuf`]: one contiguous, DMA-addressable buffer. A receive slot
//!   always owns exactly one, and a transmit slot owns one while the hardware
//!   may still read it.
//! - [`Packet`]: an outbound frame as a chain of `PacketBuf` fragments plus
//!   its declared length and checksum-offload request.
//!
//! ```text
//! Packet { len: 1514, checksum: Full }
//!   ├─ PacketBuf [Eth Hdr][IP Hdr][TCP Hdr]    (54 bytes)
//!   ├─ PacketBuf []                            (0 bytes, skipped by TX)
//!   └─ PacketBuf [Payload ..................]  (1460 bytes)
//! ```
//!
//! Ownership is single-holder: a buffer belongs to exactly one descriptor
//! slot, or to the stack after hand-off, never both.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Checksum insertion requested for an outbound packet
///
/// Values match the descriptor CIC encoding of the MAC's transmit
/// checksum offload engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumOffload {
    /// No insertion; frame is sent as-is
    #[default]
    None,

    /// Insert the IPv4 header checksum only
    Ipv4Header,

    /// Insert the IPv4 header checksum and the TCP/UDP/ICMP payload checksum
    /// (pseudo-header computed by hardware)
    Full,
}

impl ChecksumOffload {
    /// Two-bit CIC value for the first transmit descriptor of a packet
    pub const fn cic(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Ipv4Header => 1,
            Self::Full => 3,
        }
    }
}

/// A single DMA-capable packet buffer
///
/// `len` is the number of valid bytes, `capacity` the size of the backing
/// storage the hardware may write into.
pub struct PacketBuf {
    data: Box<[u8]>,
    len: usize,
    checksum: ChecksumOffload,
}

impl PacketBuf {
    /// Allocate a zeroed buffer with `capacity` bytes of storage and no valid data
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            checksum: ChecksumOffload::None,
        }
    }

    /// Allocate a buffer holding a copy of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec().into_boxed_slice(),
            len: bytes.len(),
            checksum: ChecksumOffload::None,
        }
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing storage
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Set the number of valid bytes, clamped to the capacity
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    /// Valid bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Whole backing storage, including bytes past `len`
    pub fn storage(&self) -> &[u8] {
        &self.data
    }

    /// Whole backing storage, for filling before `set_len`
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Start of the backing storage (the address handed to DMA)
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn checksum(&self) -> ChecksumOffload {
        self.checksum
    }

    pub fn set_checksum(&mut self, checksum: ChecksumOffload) {
        self.checksum = checksum;
    }
}

impl fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuf")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// An outbound frame made of one or more fragments
///
/// `len` is the declared frame length. Transmit marks the last descriptor
/// either when the chain ends or when `len` bytes have been queued,
/// whichever comes first; trailing fragments beyond `len` are released
/// without being sent.
pub struct Packet {
    len: usize,
    frags: VecDeque<PacketBuf>,
}

impl Packet {
    /// Build a packet whose declared length is the sum of its fragments
    pub fn new(frags: Vec<PacketBuf>) -> Self {
        let len = frags.iter().map(PacketBuf::len).sum();
        Self {
            len,
            frags: frags.into(),
        }
    }

    /// Build a packet with an explicit declared length
    pub fn with_len(len: usize, frags: Vec<PacketBuf>) -> Self {
        Self {
            len,
            frags: frags.into(),
        }
    }

    /// Single-fragment packet
    pub fn single(buf: PacketBuf) -> Self {
        Self::new(vec![buf])
    }

    /// Declared frame length
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Checksum request carried by the packet-header (first) fragment
    pub fn checksum(&self) -> ChecksumOffload {
        self.frags
            .front()
            .map(PacketBuf::checksum)
            .unwrap_or_default()
    }

    /// Remaining fragments
    pub fn fragment_count(&self) -> usize {
        self.frags.len()
    }

    pub(crate) fn front(&self) -> Option<&PacketBuf> {
        self.frags.front()
    }

    pub(crate) fn fragments(&self) -> impl Iterator<Item = &PacketBuf> {
        self.frags.iter()
    }

    pub(crate) fn pop_fragment(&mut self) -> Option<PacketBuf> {
        self.frags.pop_front()
    }

    /// Release every remaining fragment
    pub(crate) fn into_fragments(self) -> VecDeque<PacketBuf> {
        self.frags
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.len)
            .field("fragments", &self.frags.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_buf_from_slice() {
        let buf = PacketBuf::from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_set_len_clamps_to_capacity() {
        let mut buf = PacketBuf::with_capacity(64);
        buf.set_len(100);
        assert_eq!(buf.len(), 64);
        buf.set_len(10);
        assert_eq!(buf.data().len(), 10);
    }

    #[test]
    fn test_packet_declared_length() {
        let pkt = Packet::new(vec![
            PacketBuf::from_slice(&[0u8; 14]),
            PacketBuf::with_capacity(32),
            PacketBuf::from_slice(&[0u8; 50]),
        ]);
        assert_eq!(pkt.len(), 64);
        assert_eq!(pkt.fragment_count(), 3);
    }

    #[test]
    fn test_packet_checksum_from_header_fragment() {
        let mut hdr = PacketBuf::from_slice(&[0u8; 54]);
        hdr.set_checksum(ChecksumOffload::Full);
        let pkt = Packet::new(vec![hdr, PacketBuf::from_slice(&[0u8; 10])]);
        assert_eq!(pkt.checksum(), ChecksumOffload::Full);
        assert_eq!(pkt.checksum().cic(), 3);
    }
}
