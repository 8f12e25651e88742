//! GIC-400 (Generic Interrupt Controller v2) driver for S32V234.
//!
//! Provides the interrupt routing the Ethernet driver needs:
//! - Distributor (GICD) configuration for routing shared peripheral interrupts
//! - CPU Interface (GICC) enable and priority mask
//! - Per-interrupt enable/disable, used as the mask/unmask primitive of
//!   [`InterruptControl`]
//!
//! S32G parts ship a GICv3 distributor; on those boards the OS provides its
//! own [`InterruptControl`] implementation.
//!
//! Reference: [ARM GIC-400 Architecture Specification](https://developer.arm.com/documentation/ihi0069/latest/)

use crate::drivers::net::netdev::NetworkError;
use crate::drivers::net::platform::{InterruptControl, InterruptId};
use core::ptr::{read_volatile, write_volatile};

/// GIC Distributor register offsets.
///
/// Reference: GIC-400 Architecture Specification, Section 3 (Distributor registers)
mod gicd_offsets {
    pub const CTLR: usize = 0x000; // Distributor Control Register
    pub const TYPER: usize = 0x004; // Interrupt Controller Type Register
    pub const ISENABLER: usize = 0x100; // Interrupt Set-Enable Registers (0x100-0x17C)
    pub const ICENABLER: usize = 0x180; // Interrupt Clear-Enable Registers (0x180-0x1FC)
    pub const ICPENDR: usize = 0x280; // Interrupt Clear-Pending Registers (0x280-0x2FC)
    pub const IPRIORITYR: usize = 0x400; // Interrupt Priority Registers (0x400-0x7F8)
    pub const ITARGETSR: usize = 0x800; // Interrupt Processor Targets Registers (0x800-0xBF8)
    pub const ICFGR: usize = 0xC00; // Interrupt Configuration Registers (0xC00-0xCFC)
}

/// GIC CPU Interface register offsets.
mod gicc_offsets {
    pub const CTLR: usize = 0x000; // CPU Interface Control Register
    pub const PMR: usize = 0x004; // Interrupt Priority Mask Register
    pub const BPR: usize = 0x008; // Binary Point Register
}

const ENABLE_GRP0: u32 = 1 << 0;
const ENABLE_GRP1: u32 = 1 << 1;

/// Level-sensitive trigger (GICD_ICFGR)
const LEVEL_SENSITIVE: u32 = 0b00;

/// Priority given to network interrupts (lower is more urgent)
const NET_PRIORITY: u8 = 0xA0;

/// First shared peripheral interrupt ID
const FIRST_SPI: u32 = 32;

/// GIC-400 driver instance
pub struct GicV2 {
    gicd_base: usize,
    gicc_base: usize,
    num_interrupts: u32,
}

impl GicV2 {
    /// Create a GIC driver over the given distributor and CPU interface windows.
    ///
    /// # Safety
    ///
    /// Both addresses must be mapped device memory for the GIC-400 and remain
    /// valid for the lifetime of the driver.
    pub const unsafe fn new(gicd_base: usize, gicc_base: usize) -> Self {
        GicV2 {
            gicd_base,
            gicc_base,
            num_interrupts: 0,
        }
    }

    /// Initialize the GIC distributor and CPU interface.
    ///
    /// Leaves every SPI disabled; drivers enable their own through
    /// [`InterruptControl`].
    pub fn init(&mut self) {
        self.gicd_write(gicd_offsets::CTLR, 0);

        let typer = self.gicd_read(gicd_offsets::TYPER);
        let it_lines_number = typer & 0x1F; // Bits [4:0]
        self.num_interrupts = 32 * (it_lines_number + 1);

        let mut int_id = FIRST_SPI;
        while int_id < self.num_interrupts {
            self.gicd_write(gicd_offsets::ICENABLER + ((int_id / 32) * 4) as usize, !0);
            self.gicd_write(gicd_offsets::ICPENDR + ((int_id / 32) * 4) as usize, !0);
            int_id += 32;
        }

        self.gicd_write(gicd_offsets::CTLR, ENABLE_GRP0 | ENABLE_GRP1);
        self.gicc_write(gicc_offsets::PMR, 0xFF);
        self.gicc_write(gicc_offsets::BPR, 0);
        self.gicc_write(gicc_offsets::CTLR, ENABLE_GRP0 | ENABLE_GRP1);
    }

    /// Enable a specific interrupt by ID.
    pub fn enable_interrupt(&self, int_id: u32) {
        let reg_offset = gicd_offsets::ISENABLER + ((int_id / 32) * 4) as usize;
        self.gicd_write(reg_offset, 1 << (int_id % 32));
    }

    /// Disable a specific interrupt by ID.
    pub fn disable_interrupt(&self, int_id: u32) {
        let reg_offset = gicd_offsets::ICENABLER + ((int_id / 32) * 4) as usize;
        self.gicd_write(reg_offset, 1 << (int_id % 32));
    }

    fn set_priority(&self, int_id: u32, priority: u8) {
        let reg_offset = gicd_offsets::IPRIORITYR + int_id as usize;

        // SAFETY: GICD_IPRIORITYR is a byte-accessible array
        unsafe {
            let addr = (self.gicd_base + reg_offset) as *mut u8;
            write_volatile(addr, priority);
        }
    }

    fn set_target(&self, int_id: u32, cpu_mask: u8) {
        let reg_offset = gicd_offsets::ITARGETSR + int_id as usize;

        // SAFETY: GICD_ITARGETSR is a byte-accessible array
        unsafe {
            let addr = (self.gicd_base + reg_offset) as *mut u8;
            write_volatile(addr, cpu_mask);
        }
    }

    fn set_config(&self, int_id: u32, config: u32) {
        let reg_offset = gicd_offsets::ICFGR + ((int_id / 16) * 4) as usize;
        let bit_shift = (int_id % 16) * 2;

        let mut val = self.gicd_read(reg_offset);
        val &= !(0b11 << bit_shift);
        val |= config << bit_shift;
        self.gicd_write(reg_offset, val);
    }

    fn gicd_read(&self, offset: usize) -> u32 {
        // SAFETY: gicd_base is a valid distributor window (see `new`) and
        // offset is a register offset within it.
        unsafe { read_volatile((self.gicd_base + offset) as *const u32) }
    }

    fn gicd_write(&self, offset: usize, value: u32) {
        // SAFETY: See gicd_read.
        unsafe { write_volatile((self.gicd_base + offset) as *mut u32, value) }
    }

    fn gicc_write(&self, offset: usize, value: u32) {
        // SAFETY: gicc_base is a valid CPU interface window (see `new`).
        unsafe { write_volatile((self.gicc_base + offset) as *mut u32, value) }
    }
}

impl InterruptControl for GicV2 {
    fn attach(&self, vector: u32) -> Result<InterruptId, NetworkError> {
        if vector < FIRST_SPI || vector >= self.num_interrupts {
            return Err(NetworkError::InterruptUnavailable);
        }
        self.disable_interrupt(vector);
        self.set_priority(vector, NET_PRIORITY);
        self.set_target(vector, 0x01);
        self.set_config(vector, LEVEL_SENSITIVE);
        Ok(InterruptId(vector))
    }

    fn detach(&self, id: InterruptId) {
        self.disable_interrupt(id.0);
    }

    fn mask(&self, vector: u32) {
        self.disable_interrupt(vector);
    }

    fn unmask(&self, vector: u32, _id: InterruptId) {
        self.enable_interrupt(vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    /// Distributor and CPU interface backed by plain memory
    struct Windows {
        gicd: Vec<u32>,
        gicc: Vec<u32>,
    }

    impl Windows {
        fn new(it_lines: u32) -> Self {
            let mut gicd = vec![0u32; 0x1000 / 4];
            gicd[gicd_offsets::TYPER / 4] = it_lines;
            Self {
                gicd,
                gicc: vec![0u32; 0x100 / 4],
            }
        }

        fn gic(&mut self) -> GicV2 {
            // SAFETY: Both windows outlive the driver in every test and
            // cover all registers it touches.
            let mut gic = unsafe {
                GicV2::new(
                    self.gicd.as_mut_ptr() as usize,
                    self.gicc.as_mut_ptr() as usize,
                )
            };
            gic.init();
            gic
        }

        fn gicd(&self, offset: usize) -> u32 {
            // SAFETY: Offset lies within the window; the driver writes
            // through raw pointers so read the same way.
            unsafe { read_volatile(self.gicd.as_ptr().add(offset / 4)) }
        }

        fn gicd_byte(&self, offset: usize) -> u8 {
            // SAFETY: See `gicd`.
            unsafe { read_volatile((self.gicd.as_ptr() as *const u8).add(offset)) }
        }
    }

    #[test]
    fn test_init_enables_distributor() {
        let mut win = Windows::new(1);
        let gic = win.gic();
        assert_eq!(gic.num_interrupts, 64);
        assert_eq!(win.gicd(gicd_offsets::CTLR), ENABLE_GRP0 | ENABLE_GRP1);
        assert_eq!(win.gicd(gicd_offsets::ICENABLER + 4), !0);
        assert_eq!(win.gicc[gicc_offsets::PMR / 4], 0xFF);
    }

    #[test]
    fn test_attach_rejects_non_spi() {
        let mut win = Windows::new(1);
        let gic = win.gic();
        assert_eq!(gic.attach(5), Err(NetworkError::InterruptUnavailable));
        assert_eq!(gic.attach(64), Err(NetworkError::InterruptUnavailable));
    }

    #[test]
    fn test_attach_routes_spi() {
        let mut win = Windows::new(1);
        let gic = win.gic();
        assert_eq!(gic.attach(45), Ok(InterruptId(45)));

        assert_eq!(win.gicd_byte(gicd_offsets::IPRIORITYR + 45), NET_PRIORITY);
        assert_eq!(win.gicd_byte(gicd_offsets::ITARGETSR + 45), 0x01);
        // IRQ 45: ICFGR word 2, field 13
        assert_eq!((win.gicd(gicd_offsets::ICFGR + 8) >> 26) & 0b11, LEVEL_SENSITIVE);
    }

    #[test]
    fn test_mask_unmask_word_and_bit() {
        let mut win = Windows::new(2);
        let gic = win.gic();
        let id = gic.attach(70).unwrap();

        gic.unmask(70, id);
        assert_eq!(win.gicd(gicd_offsets::ISENABLER + 8), 1 << 6);

        gic.mask(70);
        assert_eq!(win.gicd(gicd_offsets::ICENABLER + 8), 1 << 6);

        gic.unmask(33, InterruptId(33));
        assert_eq!(win.gicd(gicd_offsets::ISENABLER + 4), 1 << 1);
    }
}
