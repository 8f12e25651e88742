//! Platform collaborators consumed by network drivers
//!
//! The driver core never touches hardware or OS services directly. It goes
//! through four narrow capabilities:
//!
//! | Trait                | Provides                                        |
//! |----------------------|-------------------------------------------------|
//! | [`RegisterIo`]       | 32-bit MMIO register read/write                 |
//! | [`InterruptControl`] | attach/detach and mask/unmask of a vector       |
//! | [`BufferAllocator`]  | packet buffer pool and bus address translation  |
//! | [`Delay`]            | busy-wait delays for bounded polling            |
//!
//! [`Platform`] bundles them. [`Board`] composes the real implementations
//! ([`Mmio`], [`GicV2`]) with an OS-supplied allocator and timer; the test
//! suite substitutes a simulated controller.

use crate::drivers::irqchip::gic_v2::GicV2;
use crate::drivers::net::netdev::NetworkError;
use crate::net::packet::PacketBuf;
use volatile::Volatile;

/// Memory-mapped 32-bit register access
///
/// Accesses are uncached and must be observed in program order relative to
/// explicit fences.
pub trait RegisterIo {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

/// Opaque handle returned by [`InterruptControl::attach`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptId(pub u32);

/// Interrupt controller operations for one device vector
pub trait InterruptControl {
    /// Route `vector` to this device; the source starts masked
    fn attach(&self, vector: u32) -> Result<InterruptId, NetworkError>;

    fn detach(&self, id: InterruptId);

    /// Stop the source from signalling
    fn mask(&self, vector: u32);

    /// Allow the source to signal again
    fn unmask(&self, vector: u32, id: InterruptId);
}

/// Allocation context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocFlags {
    /// Interrupt/worker context: fail instead of blocking
    NoWait,

    /// Thread context: may block until memory is available
    Wait,
}

/// Packet buffer pool
///
/// Shared with the rest of the OS. Buffers handed out are exclusively owned
/// by the caller until returned with [`BufferAllocator::free_buffer`] or
/// passed to the stack.
pub trait BufferAllocator {
    /// Allocate a buffer with at least `size` bytes of storage
    fn alloc_buffer(&self, size: usize, flags: AllocFlags) -> Option<PacketBuf>;

    fn free_buffer(&self, buf: PacketBuf);

    /// Bus address the DMA engine must use for CPU address `virt`
    fn dma_address(&self, virt: *const u8) -> u64;

    /// Bus address of a buffer's storage
    fn physical_address(&self, buf: &PacketBuf) -> u64 {
        self.dma_address(buf.as_ptr())
    }
}

/// Busy-wait delay source
pub trait Delay {
    fn delay_us(&self, us: u32);
}

/// Everything a driver instance needs from its environment
pub trait Platform: RegisterIo + InterruptControl + BufferAllocator + Delay {}

impl<T: RegisterIo + InterruptControl + BufferAllocator + Delay> Platform for T {}

// A shared platform (one board driving several controllers) is lent to each
// driver instance by reference.

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

impl<T: InterruptControl + ?Sized> InterruptControl for &T {
    fn attach(&self, vector: u32) -> Result<InterruptId, NetworkError> {
        (**self).attach(vector)
    }

    fn detach(&self, id: InterruptId) {
        (**self).detach(id)
    }

    fn mask(&self, vector: u32) {
        (**self).mask(vector)
    }

    fn unmask(&self, vector: u32, id: InterruptId) {
        (**self).unmask(vector, id)
    }
}

impl<T: BufferAllocator + ?Sized> BufferAllocator for &T {
    fn alloc_buffer(&self, size: usize, flags: AllocFlags) -> Option<PacketBuf> {
        (**self).alloc_buffer(size, flags)
    }

    fn free_buffer(&self, buf: PacketBuf) {
        (**self).free_buffer(buf)
    }

    fn dma_address(&self, virt: *const u8) -> u64 {
        (**self).dma_address(virt)
    }
}

impl<T: Delay + ?Sized> Delay for &T {
    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }
}

// ============================================================================
// Memory-mapped register window
// ============================================================================

/// Register window of a memory-mapped peripheral
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Create a register window at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the mapped, device-memory virtual address of the
    /// peripheral, valid for the lifetime of the returned value, and no other
    /// code may create conflicting mappings of the same registers.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: The window was created over valid device memory (see
        // `Mmio::new`) and offsets come from the driver's register map.
        let reg = unsafe { &*((self.base + offset) as *const Volatile<u32>) };
        reg.read()
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        // Data Memory Barrier: descriptor stores in normal memory must be
        // observed before the doorbell write to device memory.
        #[cfg(target_arch = "aarch64")]
        // SAFETY: `dmb sy` only orders memory accesses, it has no other effect.
        unsafe {
            core::arch::asm!("dmb sy", options(nostack));
        }
        // SAFETY: See `read32`.
        let reg = unsafe { &mut *((self.base + offset) as *mut Volatile<u32>) };
        reg.write(value);
    }
}

// ============================================================================
// Board composition
// ============================================================================

/// Real platform: MMIO registers, GIC-400 interrupt distributor, plus the
/// OS-supplied buffer pool and timer
pub struct Board<A, D> {
    regs: Mmio,
    gic: GicV2,
    alloc: A,
    delay: D,
}

impl<A: BufferAllocator, D: Delay> Board<A, D> {
    pub fn new(regs: Mmio, gic: GicV2, alloc: A, delay: D) -> Self {
        Self {
            regs,
            gic,
            alloc,
            delay,
        }
    }
}

impl<A, D> RegisterIo for Board<A, D> {
    fn read32(&self, offset: usize) -> u32 {
        self.regs.read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.regs.write32(offset, value)
    }
}

impl<A, D> InterruptControl for Board<A, D> {
    fn attach(&self, vector: u32) -> Result<InterruptId, NetworkError> {
        self.gic.attach(vector)
    }

    fn detach(&self, id: InterruptId) {
        self.gic.detach(id)
    }

    fn mask(&self, vector: u32) {
        self.gic.mask(vector)
    }

    fn unmask(&self, vector: u32, id: InterruptId) {
        self.gic.unmask(vector, id)
    }
}

impl<A: BufferAllocator, D> BufferAllocator for Board<A, D> {
    fn alloc_buffer(&self, size: usize, flags: AllocFlags) -> Option<PacketBuf> {
        self.alloc.alloc_buffer(size, flags)
    }

    fn free_buffer(&self, buf: PacketBuf) {
        self.alloc.free_buffer(buf)
    }

    fn dma_address(&self, virt: *const u8) -> u64 {
        self.alloc.dma_address(virt)
    }
}

impl<A, D: Delay> Delay for Board<A, D> {
    fn delay_us(&self, us: u32) {
        self.delay.delay_us(us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::ethernet::synopsys::dwceqos::testing::FakePlatform;
    use alloc::vec;

    #[test]
    fn test_mmio_reads_and_writes_window() {
        let mut window = vec![0u32; 0x2000 / 4];
        // SAFETY: The window outlives `regs` and covers the offsets used.
        let regs = unsafe { Mmio::new(window.as_mut_ptr() as usize) };

        regs.write32(0x1160, 0xDEAD_BEEF);
        assert_eq!(regs.read32(0x1160), 0xDEAD_BEEF);
        assert_eq!(regs.read32(0x1164), 0);
        assert_eq!(regs.base(), window.as_ptr() as usize);
    }

    #[test]
    fn test_board_delegates() {
        let hw = FakePlatform::new();
        let mut window = vec![0u32; 0x100 / 4];
        let mut gicd = vec![0u32; 0x1000 / 4];
        let mut gicc = vec![0u32; 0x100 / 4];
        gicd[1] = 1; // TYPER: 64 interrupt lines

        // SAFETY: All three windows outlive `board`.
        let (regs, mut gic) = unsafe {
            (
                Mmio::new(window.as_mut_ptr() as usize),
                GicV2::new(gicd.as_mut_ptr() as usize, gicc.as_mut_ptr() as usize),
            )
        };
        gic.init();
        let board = Board::new(regs, gic, &hw, &hw);

        board.write32(0x10, 7);
        assert_eq!(board.read32(0x10), 7);

        assert_eq!(board.attach(40), Ok(InterruptId(40)));
        assert_eq!(board.attach(3), Err(NetworkError::InterruptUnavailable));

        board.delay_us(25);
        assert_eq!(hw.delayed_us(), 25);

        let buf = board.alloc_buffer(128, AllocFlags::NoWait);
        assert_eq!(hw.buffers_outstanding(), 1);
        board.free_buffer(buf.unwrap());
        assert_eq!(hw.buffers_outstanding(), 0);
    }
}
