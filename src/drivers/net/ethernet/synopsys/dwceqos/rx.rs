//! Receive pipeline
//!
//! Every slot of the receive ring holds a buffer. A drain walks completed
//! descriptors from `head` in ring order and, for each one, either recycles
//! the buffer in place (bad frame) or swaps in a fresh buffer and hands the
//! filled one to the stack.
//!
//! When the pool cannot supply a replacement, the drain stops at that slot
//! and leaves it driver-owned with its frame intact. `head` does not move,
//! so the next drain retries the same slot first and no frame is lost.

use super::config::{ETH_HLEN, VLAN_HLEN};
use super::desc::{DES3_FD, DES3_LD, RDES3_CTXT, RDES3_ES, RDES3_PL_MASK};
use super::regs::*;
use super::ring::DescRing;
use super::stats::{self, Stats};
use crate::drivers::net::netdev::{NetworkError, NetworkStack};
use crate::drivers::net::platform::{AllocFlags, BufferAllocator, RegisterIo};
use smoltcp::wire::EthernetFrame;

/// 802.1Q tag protocol identifier
const ETHERTYPE_VLAN: u16 = 0x8100;

pub struct RxRing {
    ring: DescRing,
    head: usize,
    buf_size: usize,
    stalled: bool,
}

impl RxRing {
    pub fn new<A: BufferAllocator + ?Sized>(size: usize, buf_size: usize, alloc: &A) -> Self {
        Self {
            ring: DescRing::new(size, alloc),
            head: 0,
            buf_size,
            stalled: false,
        }
    }

    pub fn head(&self) -> usize {
        self.head
    }

    /// Last drain stopped on buffer exhaustion
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn ring(&self) -> &DescRing {
        &self.ring
    }

    /// Arm every slot with a fresh buffer
    ///
    /// # Errors
    ///
    /// `NoBuffers` if the pool runs dry; slots armed so far stay armed and
    /// are returned by [`RxRing::release`].
    pub fn fill<A: BufferAllocator + ?Sized>(&mut self, alloc: &A) -> Result<(), NetworkError> {
        for slot in 0..self.ring.len() {
            self.ring.arm_fresh(slot, self.buf_size, alloc)?;
        }
        self.head = 0;
        self.stalled = false;
        Ok(())
    }

    /// Program descriptor list base, ring length and tail pointer
    pub fn program<R: RegisterIo + ?Sized>(&self, regs: &R) {
        let base = self.ring.base_address();
        regs.write32(DMA_CH0_RXDESC_LIST_HADDR, (base >> 32) as u32);
        regs.write32(DMA_CH0_RXDESC_LIST_ADDR, base as u32);
        regs.write32(DMA_CH0_RXDESC_RING_LEN, (self.ring.len() - 1) as u32);
        self.poke(regs);
    }

    /// Point the tail at the last armed descriptor
    fn poke<R: RegisterIo + ?Sized>(&self, regs: &R) {
        let last = self.ring.wrap(self.head + self.ring.len() - 1);
        regs.write32(DMA_CH0_RXDESC_TAIL_PTR, self.ring.slot_address(last) as u32);
    }

    /// Drain completed frames into the stack
    ///
    /// Processes at most one ring's worth of descriptors, then pokes the
    /// tail pointer whether or not anything was re-armed. Returns the number
    /// of frames delivered.
    pub fn drain<P: RegisterIo + BufferAllocator + ?Sized>(
        &mut self,
        hw: &P,
        stack: &dyn NetworkStack,
        stats: &Stats,
        mtu: usize,
    ) -> usize {
        let mut delivered = 0;

        for _ in 0..self.ring.len() {
            let slot = self.head;
            let desc = self.ring.desc(slot);
            if desc.is_dma_owned() {
                break;
            }

            let status = desc.status();
            let len = (status & RDES3_PL_MASK) as usize;

            let complete = status & (DES3_FD | DES3_LD) == (DES3_FD | DES3_LD);
            if status & (RDES3_ES | RDES3_CTXT) != 0 || !complete {
                stats::bump(&stats.rx_errors);
                self.recycle(slot, hw);
                continue;
            }

            if !self.frame_fits(slot, len, mtu) {
                stats::bump(&stats.rx_errors);
                stats::bump(&stats.rx_oversize);
                self.recycle(slot, hw);
                continue;
            }

            let Some(fresh) = hw.alloc_buffer(self.buf_size, AllocFlags::NoWait) else {
                stats::bump(&stats.rx_alloc_failures);
                if !self.stalled {
                    kprintln!("[DWCEQOS] RX: out of buffers at slot {}, deferring", slot);
                }
                self.stalled = true;
                break;
            };

            let Some(mut frame) = self.ring.reclaim(slot) else {
                // Driver-owned slot without a buffer: arm it and move on
                let addr = hw.physical_address(&fresh);
                self.ring.arm_receive(slot, fresh, addr);
                self.head = self.ring.next(slot);
                continue;
            };

            let addr = hw.physical_address(&fresh);
            self.ring.arm_receive(slot, fresh, addr);
            self.head = self.ring.next(slot);
            self.stalled = false;

            frame.set_len(len);
            stats::bump(&stats.rx_packets);
            stats::add(&stats.rx_bytes, len as u64);
            stack.input(frame);
            delivered += 1;
        }

        self.poke(hw);
        delivered
    }

    /// Hand the slot's own buffer back to the DMA engine and move on
    fn recycle<A: BufferAllocator + ?Sized>(&mut self, slot: usize, alloc: &A) {
        let rearmed = self.ring.rearm_receive(slot, alloc);
        debug_assert!(rearmed, "receive slot {} without a buffer", slot);
        self.head = self.ring.next(slot);
    }

    /// Length check against the MTU, allowing one VLAN tag
    fn frame_fits(&self, slot: usize, len: usize, mtu: usize) -> bool {
        let limit = mtu + ETH_HLEN;
        if len <= limit {
            return true;
        }
        if len > limit + VLAN_HLEN {
            return false;
        }
        self.ring
            .buffer(slot)
            .filter(|buf| len <= buf.capacity())
            .is_some_and(|buf| is_vlan_tagged(&buf.storage()[..len]))
    }

    /// Re-arm every slot from index 0 for a restarted DMA engine
    ///
    /// Frames completed but not yet drained are discarded. Slots that lost
    /// their buffer get a fresh one.
    ///
    /// # Errors
    ///
    /// `NoBuffers` if a missing buffer cannot be replaced.
    pub fn rewind<A: BufferAllocator + ?Sized>(&mut self, alloc: &A) -> Result<(), NetworkError> {
        for slot in 0..self.ring.len() {
            self.ring.reset(slot);
            if !self.ring.rearm_receive(slot, alloc) {
                self.ring.arm_fresh(slot, self.buf_size, alloc)?;
            }
        }
        self.head = 0;
        self.stalled = false;
        Ok(())
    }

    /// Return every buffer to the pool (DMA stopped)
    pub fn release<A: BufferAllocator + ?Sized>(&mut self, alloc: &A) -> usize {
        self.head = 0;
        self.stalled = false;
        self.ring.release_all(alloc)
    }
}

fn is_vlan_tagged(frame: &[u8]) -> bool {
    EthernetFrame::new_checked(frame)
        .map(|eth| u16::from(eth.ethertype()) == ETHERTYPE_VLAN)
        .unwrap_or(false)
}
