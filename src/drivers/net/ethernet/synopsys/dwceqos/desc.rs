//! DMA descriptor layout and the ownership handshake
//!
//! Each ring slot is a 16-byte descriptor shared with the DMA engine:
//!
//! | Word | Read format (driver → DMA)        | Write-back (DMA → driver)     |
//! |------|-----------------------------------|-------------------------------|
//! | DES0 | buffer address [31:0]             | (TX) timestamp / (RX) VLAN    |
//! | DES1 | buffer address [63:32]            | status                        |
//! | DES2 | buffer length, IOC                | status                        |
//! | DES3 | control, OWN (bit 31)             | status, packet length, OWN    |
//!
//! DES3 bit 31 decides who may touch the descriptor. While it is set the
//! driver must not write any word. Handing a descriptor to the DMA engine is
//! always: write DES0-DES2 and DES3 control bits, release fence, then a
//! release store of DES3 with OWN set, then a full fence so the subsequent
//! tail-pointer write cannot overtake it.

use core::sync::atomic::{AtomicU32, Ordering, fence};

// ============================================================================
// Descriptor Fields
// ============================================================================

/// DES3: descriptor owned by the DMA engine
pub const DES3_OWN: u32 = 1 << 31;
/// DES3: first descriptor of a packet
pub const DES3_FD: u32 = 1 << 29;
/// DES3: last descriptor of a packet
pub const DES3_LD: u32 = 1 << 28;

/// TDES2: buffer 1 length
pub const TDES2_B1L_MASK: u32 = 0x3FFF;
/// TDES2: interrupt on completion
pub const TDES2_IOC: u32 = 1 << 31;
/// TDES3: frame length (first descriptor)
pub const TDES3_FL_MASK: u32 = 0x7FFF;
/// TDES3: checksum insertion control
pub const TDES3_CIC_SHIFT: u32 = 16;

/// RDES3 (read): interrupt on completion
pub const RDES3_IOC: u32 = 1 << 30;
/// RDES3 (read): buffer 1 address valid
pub const RDES3_BUF1V: u32 = 1 << 24;
/// RDES3 (write-back): context descriptor
pub const RDES3_CTXT: u32 = 1 << 30;
/// RDES3 (write-back): error summary
pub const RDES3_ES: u32 = 1 << 15;
/// RDES3 (write-back): packet length
pub const RDES3_PL_MASK: u32 = 0x7FFF;

/// Largest byte count one transmit descriptor can address
pub const MAX_DESC_BUF_LEN: usize = TDES2_B1L_MASK as usize;

/// Size of one descriptor in bytes (ring stride)
pub const DESC_SIZE: usize = 16;

/// Who may currently mutate a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Driver,
    Dma,
}

/// One hardware descriptor
///
/// Every word is an atomic cell: the DMA engine reads and writes this memory
/// concurrently with the CPU.
#[repr(C, align(16))]
pub struct Descriptor {
    des0: AtomicU32,
    des1: AtomicU32,
    des2: AtomicU32,
    des3: AtomicU32,
}

impl Descriptor {
    pub const fn new() -> Self {
        Self {
            des0: AtomicU32::new(0),
            des1: AtomicU32::new(0),
            des2: AtomicU32::new(0),
            des3: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn owner(&self) -> Owner {
        if self.des3.load(Ordering::Acquire) & DES3_OWN != 0 {
            Owner::Dma
        } else {
            Owner::Driver
        }
    }

    #[inline]
    pub fn is_dma_owned(&self) -> bool {
        self.owner() == Owner::Dma
    }

    /// DES3 as last written by either side
    #[inline]
    pub fn status(&self) -> u32 {
        self.des3.load(Ordering::Acquire)
    }

    #[inline]
    pub fn des2(&self) -> u32 {
        self.des2.load(Ordering::Relaxed)
    }

    /// Buffer address as programmed (read format only)
    pub fn buffer_address(&self) -> u64 {
        ((self.des1.load(Ordering::Relaxed) as u64) << 32) | self.des0.load(Ordering::Relaxed) as u64
    }

    /// Fill the descriptor and hand it to the DMA engine
    ///
    /// `des3` carries the control bits; OWN is added here, after a release
    /// fence, so the engine never observes a half-written descriptor.
    pub fn publish(&self, addr: u64, des2: u32, des3: u32) {
        debug_assert!(
            !self.is_dma_owned(),
            "descriptor written while owned by DMA"
        );
        self.des0.store(addr as u32, Ordering::Relaxed);
        self.des1.store((addr >> 32) as u32, Ordering::Relaxed);
        self.des2.store(des2, Ordering::Relaxed);
        self.des3.store(des3 & !DES3_OWN, Ordering::Relaxed);
        fence(Ordering::Release);
        self.des3.store(des3 | DES3_OWN, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    /// Zero every word (driver-owned descriptors only)
    pub fn clear(&self) {
        debug_assert!(
            !self.is_dma_owned(),
            "descriptor cleared while owned by DMA"
        );
        self.des0.store(0, Ordering::Relaxed);
        self.des1.store(0, Ordering::Relaxed);
        self.des2.store(0, Ordering::Relaxed);
        self.des3.store(0, Ordering::Release);
    }

    /// Zero every word regardless of owner
    ///
    /// Only sound once the DMA engine for the ring has been stopped.
    pub fn reset(&self) {
        self.des3.store(0, Ordering::Release);
        self.des0.store(0, Ordering::Relaxed);
        self.des1.store(0, Ordering::Relaxed);
        self.des2.store(0, Ordering::Relaxed);
    }

    /// DMA engine write-back: store status words and drop OWN
    ///
    /// Used by the simulated DMA engine in tests.
    #[cfg(test)]
    pub(crate) fn write_back(&self, des2: u32, des3: u32) {
        self.des2.store(des2, Ordering::Relaxed);
        self.des3.store(des3 & !DES3_OWN, Ordering::Release);
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}
