//! Descriptor ring manager
//!
//! Owns one contiguous descriptor array plus the driver-side shadow of
//! which [`PacketBuf`] sits in each slot. The hardware only ever sees bus
//! addresses; the shadow array is what lets the driver give the right buffer
//! back to the stack or the pool once a slot completes.
//!
//! Ring length is a power of two so index arithmetic is a mask.

use super::desc::{DESC_SIZE, Descriptor, RDES3_BUF1V, RDES3_IOC};
use crate::drivers::net::netdev::NetworkError;
use crate::drivers::net::platform::{AllocFlags, BufferAllocator};
use crate::net::packet::PacketBuf;
use alloc::boxed::Box;
use alloc::vec::Vec;

pub struct DescRing {
    descs: Box<[Descriptor]>,
    bufs: Vec<Option<PacketBuf>>,
    base: u64,
}

impl DescRing {
    /// Allocate a ring of `len` driver-owned, zeroed descriptors
    ///
    /// `len` must be a power of two (checked by `Config::validate`).
    pub fn new<A: BufferAllocator + ?Sized>(len: usize, alloc: &A) -> Self {
        debug_assert!(len.is_power_of_two());
        let descs: Box<[Descriptor]> = (0..len).map(|_| Descriptor::new()).collect();
        let base = alloc.dma_address(descs.as_ptr() as *const u8);
        let mut bufs = Vec::with_capacity(len);
        bufs.resize_with(len, || None);
        Self { descs, bufs, base }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descs.len()
    }

    /// Bus address of slot 0 (descriptor list base register value)
    pub fn base_address(&self) -> u64 {
        self.base
    }

    /// Bus address of `slot`, as written to the tail-pointer register
    #[inline]
    pub fn slot_address(&self, slot: usize) -> u64 {
        self.base + (slot * DESC_SIZE) as u64
    }

    #[inline]
    pub fn desc(&self, slot: usize) -> &Descriptor {
        &self.descs[slot]
    }

    #[inline]
    pub fn next(&self, slot: usize) -> usize {
        (slot + 1) & (self.len() - 1)
    }

    #[inline]
    pub fn wrap(&self, slot: usize) -> usize {
        slot & (self.len() - 1)
    }

    pub fn has_buffer(&self, slot: usize) -> bool {
        self.bufs[slot].is_some()
    }

    /// Buffer attached to a driver-owned slot
    pub fn buffer(&self, slot: usize) -> Option<&PacketBuf> {
        if self.descs[slot].is_dma_owned() {
            return None;
        }
        self.bufs[slot].as_ref()
    }

    /// Hand `buf` to the DMA engine as the receive buffer of `slot`
    ///
    /// Records the buffer in the shadow array, then publishes the descriptor
    /// with OWN set.
    pub fn arm_receive(&mut self, slot: usize, buf: PacketBuf, bus_addr: u64) {
        self.bufs[slot] = Some(buf);
        self.descs[slot].publish(bus_addr, 0, RDES3_BUF1V | RDES3_IOC);
    }

    /// Re-publish the buffer already sitting in `slot`
    ///
    /// Used to recycle a buffer in place after a dropped frame. The address
    /// comes from the shadow buffer: write-back overwrites DES0/DES1.
    /// Returns `false` if the slot has no buffer.
    pub fn rearm_receive<A: BufferAllocator + ?Sized>(&mut self, slot: usize, alloc: &A) -> bool {
        let Some(buf) = self.bufs[slot].as_ref() else {
            return false;
        };
        let addr = alloc.physical_address(buf);
        self.descs[slot].publish(addr, 0, RDES3_BUF1V | RDES3_IOC);
        true
    }

    /// Allocate a fresh buffer and arm `slot` with it
    ///
    /// # Errors
    ///
    /// `NoBuffers` if the pool is exhausted; the slot is left untouched.
    pub fn arm_fresh<A: BufferAllocator + ?Sized>(
        &mut self,
        slot: usize,
        buf_size: usize,
        alloc: &A,
    ) -> Result<(), NetworkError> {
        let buf = alloc
            .alloc_buffer(buf_size, AllocFlags::NoWait)
            .ok_or(NetworkError::NoBuffers)?;
        let addr = alloc.physical_address(&buf);
        self.arm_receive(slot, buf, addr);
        Ok(())
    }

    /// Record a transmit buffer against `slot` (the descriptor is published
    /// separately once all fields are known)
    pub fn attach(&mut self, slot: usize, buf: Option<PacketBuf>) {
        self.bufs[slot] = buf;
    }

    /// Take the buffer out of a completed slot
    ///
    /// Returns `None` while the DMA engine still owns the descriptor, or if
    /// no buffer was attached.
    pub fn reclaim(&mut self, slot: usize) -> Option<PacketBuf> {
        if self.descs[slot].is_dma_owned() {
            return None;
        }
        self.bufs[slot].take()
    }

    /// Zero a descriptor whatever its owner (DMA engine stopped)
    pub fn reset(&self, slot: usize) {
        self.descs[slot].reset();
    }

    /// Return every attached buffer to the pool and zero all descriptors
    ///
    /// Only valid once the DMA engine for this ring is stopped: descriptors
    /// the engine still nominally owns are reclaimed too.
    pub fn release_all<A: BufferAllocator + ?Sized>(&mut self, alloc: &A) -> usize {
        let mut released = 0;
        for (desc, buf) in self.descs.iter().zip(self.bufs.iter_mut()) {
            if let Some(buf) = buf.take() {
                alloc.free_buffer(buf);
                released += 1;
            }
            desc.reset();
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::super::desc::{DES3_OWN, Owner};
    use super::super::testing::FakePlatform;
    use super::*;

    #[test]
    fn test_slot_addresses() {
        let hw = FakePlatform::new();
        let ring = DescRing::new(8, &hw);
        assert_eq!(ring.slot_address(0), ring.base_address());
        assert_eq!(ring.slot_address(3), ring.base_address() + 48);
        assert_eq!(ring.next(7), 0);
        assert_eq!(ring.wrap(9), 1);
    }

    #[test]
    fn test_arm_fresh_and_reclaim() {
        let hw = FakePlatform::new();
        let mut ring = DescRing::new(8, &hw);

        ring.arm_fresh(2, 2048, &hw).unwrap();
        assert_eq!(ring.desc(2).owner(), Owner::Dma);
        assert!(ring.desc(2).status() & RDES3_BUF1V != 0);
        assert!(ring.has_buffer(2));

        // Still DMA-owned: nothing to reclaim
        assert!(ring.reclaim(2).is_none());

        ring.desc(2).write_back(0, 64);
        let buf = ring.reclaim(2).expect("completed slot yields its buffer");
        assert_eq!(buf.capacity(), 2048);
        assert!(!ring.has_buffer(2));
        hw.free_buffer(buf);
    }

    #[test]
    fn test_arm_fresh_reports_exhaustion() {
        let hw = FakePlatform::new();
        hw.set_buffer_limit(0);
        let mut ring = DescRing::new(8, &hw);

        assert_eq!(ring.arm_fresh(0, 2048, &hw), Err(NetworkError::NoBuffers));
        assert_eq!(ring.desc(0).status() & DES3_OWN, 0);
        assert!(!ring.has_buffer(0));
    }

    #[test]
    fn test_release_all_returns_buffers() {
        let hw = FakePlatform::new();
        let mut ring = DescRing::new(8, &hw);
        for slot in 0..8 {
            ring.arm_fresh(slot, 256, &hw).unwrap();
        }
        assert_eq!(hw.buffers_outstanding(), 8);

        assert_eq!(ring.release_all(&hw), 8);
        assert_eq!(hw.buffers_outstanding(), 0);
        assert_eq!(ring.desc(5).owner(), Owner::Driver);
    }
}
