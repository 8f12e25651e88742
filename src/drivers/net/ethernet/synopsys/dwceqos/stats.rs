//! Interface statistics
//!
//! Software counters are updated from the worker and send paths without
//! locking; [`Stats::snapshot`] copies them out for administrative queries.
//! The MMC block keeps independent hardware counters, read with
//! [`read_mmc`].

use super::regs::*;
use crate::drivers::net::platform::RegisterIo;
use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub rx_packets: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub rx_errors: AtomicU64,
    pub rx_oversize: AtomicU64,
    pub rx_alloc_failures: AtomicU64,
    pub tx_packets: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub tx_fragments: AtomicU64,
    pub tx_purged: AtomicU64,
    pub bus_errors: AtomicU64,
    pub interrupts: AtomicU64,
    pub link_transitions: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_oversize: u64,
    pub rx_alloc_failures: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_fragments: u64,
    pub tx_purged: u64,
    pub bus_errors: u64,
    pub interrupts: u64,
    pub link_transitions: u64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            rx_packets: get(&self.rx_packets),
            rx_bytes: get(&self.rx_bytes),
            rx_errors: get(&self.rx_errors),
            rx_oversize: get(&self.rx_oversize),
            rx_alloc_failures: get(&self.rx_alloc_failures),
            tx_packets: get(&self.tx_packets),
            tx_bytes: get(&self.tx_bytes),
            tx_fragments: get(&self.tx_fragments),
            tx_purged: get(&self.tx_purged),
            bus_errors: get(&self.bus_errors),
            interrupts: get(&self.interrupts),
            link_transitions: get(&self.link_transitions),
        }
    }
}

/// Hardware MMC counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmcCounters {
    pub tx_octets: u32,
    pub tx_packets: u32,
    pub tx_underflow: u32,
    pub rx_packets: u32,
    pub rx_octets: u32,
    pub rx_crc_errors: u32,
    pub rx_align_errors: u32,
    pub rx_oversize: u32,
    pub rx_fifo_overflow: u32,
}

/// Reset the MMC counters and leave them free-running
pub fn reset_mmc<R: RegisterIo + ?Sized>(regs: &R) {
    regs.write32(MMC_CONTROL, MMC_CONTROL_CNTRST);
}

pub fn read_mmc<R: RegisterIo + ?Sized>(regs: &R) -> MmcCounters {
    MmcCounters {
        tx_octets: regs.read32(MMC_TX_OCTET_COUNT_GOOD_BAD),
        tx_packets: regs.read32(MMC_TX_PACKET_COUNT_GOOD_BAD),
        tx_underflow: regs.read32(MMC_TX_UNDERFLOW_ERROR),
        rx_packets: regs.read32(MMC_RX_PACKETS_COUNT_GOOD_BAD),
        rx_octets: regs.read32(MMC_RX_OCTET_COUNT_GOOD_BAD),
        rx_crc_errors: regs.read32(MMC_RX_CRC_ERROR_PACKETS),
        rx_align_errors: regs.read32(MMC_RX_ALIGNMENT_ERROR_PACKETS),
        rx_oversize: regs.read32(MMC_RX_OVERSIZE_PACKETS_GOOD),
        rx_fifo_overflow: regs.read32(MMC_RX_FIFO_OVERFLOW_PACKETS),
    }
}
