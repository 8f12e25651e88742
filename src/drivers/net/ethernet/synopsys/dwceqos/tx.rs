//! Transmit pipeline and reap
//!
//! ```text
//!            reap start = head - outstanding            head
//!                 │                                       │
//!   ┌─────┬─────┬─▼───┬─────┬─────┬─────┬─────┬─────┬─────▼┬─────┐
//!   │free │free │done │done │ DMA │ DMA │ DMA │ DMA │ free │free │
//!   └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┴──────┴─────┘
//!                 ╰──────────── outstanding ──────╯
//! ```
//!
//! `avail` counts free slots. Outstanding slots are the `N - avail` slots
//! before `head`; a prefix of them may already be completed by the DMA
//! engine and waiting to be reaped.
//!
//! A packet is queued fragment by fragment, one descriptor per chunk of at
//! most [`MAX_DESC_BUF_LEN`] bytes. If the ring fills mid-packet the rest of
//! the packet stays in the in-flight cursor and the next start resumes it.
//! All mutation happens under the caller's send lock.

use super::desc::{
    DES3_FD, DES3_LD, MAX_DESC_BUF_LEN, TDES2_B1L_MASK, TDES2_IOC, TDES3_CIC_SHIFT, TDES3_FL_MASK,
};
use super::regs::*;
use super::ring::DescRing;
use super::stats::{self, Stats};
use crate::drivers::net::netdev::NetworkStack;
use crate::drivers::net::platform::{BufferAllocator, RegisterIo};
use crate::net::packet::{Packet, PacketBuf};

/// Partially queued outbound packet
struct TxCursor {
    packet: Packet,
    /// Bytes of the packet already committed to descriptors
    queued: usize,
    /// Bytes of the front fragment already committed
    frag_offset: usize,
}

impl TxCursor {
    fn new(packet: Packet) -> Self {
        Self {
            packet,
            queued: 0,
            frag_offset: 0,
        }
    }

    fn first(&self) -> bool {
        self.queued == 0
    }
}

pub struct TxRing {
    ring: DescRing,
    head: usize,
    avail: usize,
    cursor: Option<TxCursor>,
    active: bool,
    stalled: bool,
    committed: u64,
}

impl TxRing {
    pub fn new<A: BufferAllocator + ?Sized>(size: usize, alloc: &A) -> Self {
        Self {
            ring: DescRing::new(size, alloc),
            head: 0,
            avail: size,
            cursor: None,
            active: false,
            stalled: false,
            committed: 0,
        }
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn avail(&self) -> usize {
        self.avail
    }

    pub fn ring(&self) -> &DescRing {
        &self.ring
    }

    /// A start is in progress
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Last start ran out of descriptors; a TBU interrupt must resume it
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    /// Packets fully committed to the ring (LD written)
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Program descriptor list base, ring length and tail pointer
    pub fn program<R: RegisterIo + ?Sized>(&self, regs: &R) {
        let base = self.ring.base_address();
        regs.write32(DMA_CH0_TXDESC_LIST_HADDR, (base >> 32) as u32);
        regs.write32(DMA_CH0_TXDESC_LIST_ADDR, base as u32);
        regs.write32(DMA_CH0_TXDESC_RING_LEN, (self.ring.len() - 1) as u32);
        self.poke(regs);
    }

    fn poke<R: RegisterIo + ?Sized>(&self, regs: &R) {
        regs.write32(DMA_CH0_TXDESC_TAIL_PTR, self.ring.slot_address(self.head) as u32);
    }

    /// Reclaim completed descriptors in ring order
    ///
    /// Starts at the oldest outstanding slot and stops at the first one the
    /// DMA engine still owns. Returns the number of slots freed.
    pub fn reap<A: BufferAllocator + ?Sized>(&mut self, alloc: &A) -> usize {
        let outstanding = self.ring.len() - self.avail;
        let mut slot = self.ring.wrap(self.head + self.avail);
        let mut reaped = 0;

        for _ in 0..outstanding {
            if self.ring.desc(slot).is_dma_owned() {
                break;
            }
            if let Some(buf) = self.ring.reclaim(slot) {
                alloc.free_buffer(buf);
            }
            self.ring.desc(slot).clear();
            self.avail += 1;
            reaped += 1;
            slot = self.ring.next(slot);
        }

        reaped
    }

    /// Queue packets from the stack until it runs dry or the ring is full
    ///
    /// With the interface down (not running, or no link) the stack's send
    /// queue is purged instead. A packet already partly on the ring is never
    /// dropped; it resumes on the next call that finds free slots.
    pub fn start<P: RegisterIo + BufferAllocator + ?Sized>(
        &mut self,
        hw: &P,
        stack: &dyn NetworkStack,
        stats: &Stats,
        link_up: bool,
    ) {
        if !stack.if_flags().running || !link_up {
            let purged = stack.purge_send_queue();
            stats::add(&stats.tx_purged, purged as u64);
            return;
        }

        self.active = true;
        self.reap(hw);

        loop {
            if self.cursor.is_none() {
                if self.avail == 0 {
                    break;
                }
                match stack.dequeue() {
                    // Nothing to send: never hand the engine a zero-length frame
                    Some(packet) if packet.is_empty() => {
                        for frag in packet.into_fragments() {
                            hw.free_buffer(frag);
                        }
                        continue;
                    }
                    Some(packet) => self.cursor = Some(TxCursor::new(packet)),
                    None => break,
                }
            }
            if !self.queue_cursor(hw, stats) {
                break;
            }
        }

        self.active = false;
        self.stalled = self.cursor.is_some() || self.avail == 0;
    }

    /// Commit as much of the in-flight packet as free slots allow
    ///
    /// Returns `true` once the packet is fully committed.
    fn queue_cursor<P: RegisterIo + BufferAllocator + ?Sized>(
        &mut self,
        hw: &P,
        stats: &Stats,
    ) -> bool {
        let Some(mut cur) = self.cursor.take() else {
            return true;
        };

        loop {
            let Some(front) = cur.packet.front() else {
                // Chain ended before the declared length; last chunk already
                // carried LD.
                return true;
            };

            if front.is_empty() {
                if let Some(empty) = cur.packet.pop_fragment() {
                    hw.free_buffer(empty);
                }
                continue;
            }

            if self.avail == 0 {
                self.cursor = Some(cur);
                return false;
            }

            let frag_len = front.len();
            let chunk = (frag_len - cur.frag_offset)
                .min(MAX_DESC_BUF_LEN)
                .min(cur.packet.len() - cur.queued);
            let frag_done = cur.frag_offset + chunk == frag_len;
            let chain_ends =
                frag_done && cur.packet.fragments().skip(1).all(PacketBuf::is_empty);
            let last = chain_ends || cur.queued + chunk >= cur.packet.len();

            let addr = hw.physical_address(front) + cur.frag_offset as u64;
            let mut des2 = chunk as u32 & TDES2_B1L_MASK;
            let mut des3 = 0;
            if cur.first() {
                des3 |= DES3_FD
                    | (cur.packet.len() as u32 & TDES3_FL_MASK)
                    | (cur.packet.checksum().cic() << TDES3_CIC_SHIFT);
            }
            if last {
                des3 |= DES3_LD;
                des2 |= TDES2_IOC;
            }

            let slot = self.head;
            // The buffer rides with the descriptor of its final chunk so it
            // is released only after every chunk has been sent.
            let buf = if frag_done || last {
                cur.packet.pop_fragment()
            } else {
                None
            };
            self.ring.attach(slot, buf);
            self.ring.desc(slot).publish(addr, des2, des3);

            cur.queued += chunk;
            cur.frag_offset = if frag_done { 0 } else { cur.frag_offset + chunk };
            self.head = self.ring.next(slot);
            self.avail -= 1;
            stats::bump(&stats.tx_fragments);
            self.poke(hw);

            if last {
                self.committed += 1;
                stats::bump(&stats.tx_packets);
                stats::add(&stats.tx_bytes, cur.queued as u64);
                for extra in cur.packet.into_fragments() {
                    hw.free_buffer(extra);
                }
                return true;
            }
        }
    }

    /// Free every buffer, drop the in-flight packet and reset the ring
    /// (TX DMA stopped)
    pub fn release<A: BufferAllocator + ?Sized>(&mut self, alloc: &A) -> usize {
        if let Some(cur) = self.cursor.take() {
            for frag in cur.packet.into_fragments() {
                alloc.free_buffer(frag);
            }
        }
        let released = self.ring.release_all(alloc);
        self.head = 0;
        self.avail = self.ring.len();
        self.stalled = false;
        released
    }
}
