//! Simulated controller and network stack for unit tests
//!
//! [`FakePlatform`] implements every platform trait over an in-memory model:
//!
//! - a register file with the controller's side effects (W1C channel status,
//!   self-clearing software reset and MDIO busy bits, TPS raised when TX DMA
//!   is stopped)
//! - a PHY register file reachable over MDIO
//! - a bounded buffer pool
//! - an interrupt controller that records mask/unmask calls
//! - a DMA engine that walks the descriptor lists programmed into the
//!   channel registers and completes descriptors in ring order
//!
//! Bus addresses equal CPU addresses, so the DMA model dereferences
//! descriptor and buffer addresses directly.

use super::desc::{DES3_FD, DES3_LD, DES3_OWN, Descriptor, RDES3_PL_MASK};
use super::mdio::{
    BMCR_ANRESTART, BMCR_RESET, BMSR_ANEGCOMPLETE, BMSR_LSTATUS, MII_BMCR, MII_BMSR, MII_LPA,
};
use super::regs::*;
use crate::drivers::net::netdev::{IfFlags, LinkStatus, NetworkError, NetworkStack};
use crate::drivers::net::platform::{
    AllocFlags, BufferAllocator, Delay, InterruptControl, InterruptId, RegisterIo,
};
use crate::net::packet::{Packet, PacketBuf};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use spin::Mutex;

/// Default MAC_VERSION: SNPSVER 5.1
pub const FAKE_MAC_VERSION: u32 = 0x0000_3051;

/// One transmit descriptor as consumed by the simulated DMA engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub slot: usize,
    pub des2: u32,
    pub des3: u32,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct Regs {
    file: BTreeMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    mdio_stuck: bool,
    reset_stuck: bool,
    tx_stop_hangs: bool,
}

#[derive(Default)]
struct Dma {
    rx_cursor: usize,
    tx_cursor: usize,
    tx_log: Vec<TxRecord>,
}

#[derive(Default)]
struct Pool {
    credits: Option<usize>,
    allocated: usize,
    freed: usize,
    failures: usize,
}

#[derive(Default)]
struct Irq {
    attach_fails: bool,
    attached: Option<u32>,
    detached: usize,
    masked: bool,
    mask_calls: usize,
    unmask_calls: usize,
}

pub struct FakePlatform {
    regs: Mutex<Regs>,
    phy: Mutex<[u16; 32]>,
    phy_writes: Mutex<Vec<(u32, u16)>>,
    dma: Mutex<Dma>,
    pool: Mutex<Pool>,
    irq: Mutex<Irq>,
    delayed_us: Mutex<u64>,
    late_rx: Mutex<Option<(usize, Vec<u8>)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let hw = Self {
            regs: Mutex::new(Regs::default()),
            phy: Mutex::new([0; 32]),
            phy_writes: Mutex::new(Vec::new()),
            dma: Mutex::new(Dma::default()),
            pool: Mutex::new(Pool::default()),
            irq: Mutex::new(Irq::default()),
            delayed_us: Mutex::new(0),
            late_rx: Mutex::new(None),
        };
        hw.set_reg(MAC_VERSION, FAKE_MAC_VERSION);
        hw
    }

    // ------------------------------------------------------------------
    // Register file
    // ------------------------------------------------------------------

    pub fn reg(&self, offset: usize) -> u32 {
        self.regs.lock().file.get(&offset).copied().unwrap_or(0)
    }

    /// Set a register without triggering side effects
    pub fn set_reg(&self, offset: usize, value: u32) {
        self.regs.lock().file.insert(offset, value);
    }

    /// Number of driver writes to `offset`
    pub fn write_count(&self, offset: usize) -> usize {
        self.regs
            .lock()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .count()
    }

    /// Raise channel status bits as the hardware would
    pub fn raise_status(&self, bits: u32) {
        let mut regs = self.regs.lock();
        *regs.file.entry(DMA_CH0_STATUS).or_insert(0) |= bits;
    }

    /// Receive `frame` just before the `nth` (1-based) driver read of
    /// DMA_CH0_STATUS from now on
    pub fn rx_on_status_read(&self, nth: usize, frame: &[u8]) {
        *self.late_rx.lock() = Some((nth, frame.to_vec()));
    }

    pub fn set_mdio_stuck(&self, stuck: bool) {
        self.regs.lock().mdio_stuck = stuck;
    }

    pub fn set_reset_stuck(&self, stuck: bool) {
        self.regs.lock().reset_stuck = stuck;
    }

    pub fn set_tx_stop_hangs(&self, hangs: bool) {
        self.regs.lock().tx_stop_hangs = hangs;
    }

    // ------------------------------------------------------------------
    // PHY
    // ------------------------------------------------------------------

    pub fn phy_reg(&self, reg: u32) -> u16 {
        self.phy.lock()[reg as usize & 0x1F]
    }

    pub fn set_phy_reg(&self, reg: u32, value: u16) {
        self.phy.lock()[reg as usize & 0x1F] = value;
    }

    /// PHY reports link with autonegotiation complete against a partner
    /// advertising `lpa`
    pub fn phy_link_up(&self, lpa: u16) {
        self.set_phy_reg(MII_BMSR, BMSR_LSTATUS | BMSR_ANEGCOMPLETE);
        self.set_phy_reg(MII_LPA, lpa);
    }

    pub fn phy_link_down(&self) {
        self.set_phy_reg(MII_BMSR, 0);
    }

    /// Every MDIO write the driver issued, as (register, value)
    pub fn phy_writes(&self) -> Vec<(u32, u16)> {
        self.phy_writes.lock().clone()
    }

    pub fn clear_phy_writes(&self) {
        self.phy_writes.lock().clear();
    }

    fn mdio_transaction(&self, addr: u32, data: u32) -> u32 {
        let reg = (addr >> MDIO_ADDR_RDA_SHIFT) & 0x1F;
        let goc = addr & (0b11 << MDIO_ADDR_GOC_SHIFT);
        if goc == MDIO_ADDR_GOC_READ {
            self.phy_reg(reg) as u32
        } else {
            let value = (data & MDIO_DATA_MASK) as u16;
            self.phy_writes.lock().push((reg, value));
            let stored = if reg == MII_BMCR {
                value & !(BMCR_RESET | BMCR_ANRESTART)
            } else {
                value
            };
            self.set_phy_reg(reg, stored);
            data
        }
    }

    // ------------------------------------------------------------------
    // Buffer pool
    // ------------------------------------------------------------------

    /// Allow only `n` more allocations
    pub fn set_buffer_limit(&self, n: usize) {
        self.pool.lock().credits = Some(n);
    }

    pub fn clear_buffer_limit(&self) {
        self.pool.lock().credits = None;
    }

    /// Pool buffers allocated and not yet freed
    pub fn buffers_outstanding(&self) -> isize {
        let pool = self.pool.lock();
        pool.allocated as isize - pool.freed as isize
    }

    pub fn buffers_freed(&self) -> usize {
        self.pool.lock().freed
    }

    pub fn alloc_failures(&self) -> usize {
        self.pool.lock().failures
    }

    // ------------------------------------------------------------------
    // Interrupt controller
    // ------------------------------------------------------------------

    pub fn set_attach_fails(&self, fails: bool) {
        self.irq.lock().attach_fails = fails;
    }

    pub fn irq_attached(&self) -> Option<u32> {
        self.irq.lock().attached
    }

    pub fn irq_detached(&self) -> usize {
        self.irq.lock().detached
    }

    pub fn irq_masked(&self) -> bool {
        self.irq.lock().masked
    }

    pub fn unmask_calls(&self) -> usize {
        self.irq.lock().unmask_calls
    }

    pub fn mask_calls(&self) -> usize {
        self.irq.lock().mask_calls
    }

    pub fn delayed_us(&self) -> u64 {
        *self.delayed_us.lock()
    }

    // ------------------------------------------------------------------
    // DMA engine
    // ------------------------------------------------------------------

    fn list_base(&self, haddr: usize, addr: usize) -> u64 {
        ((self.reg(haddr) as u64) << 32) | self.reg(addr) as u64
    }

    fn ring_len(&self, len_reg: usize) -> usize {
        self.reg(len_reg) as usize + 1
    }

    fn descriptor(&self, base: u64, slot: usize) -> &Descriptor {
        let addr = base as usize + slot * core::mem::size_of::<Descriptor>();
        // SAFETY: The driver programmed `base` with the address of a live
        // descriptor array of `ring_len` entries, and bus addresses equal CPU
        // addresses in this model.
        unsafe { &*(addr as *const Descriptor) }
    }

    /// Receive `frame` into the next armed RX descriptor
    ///
    /// Returns `false` (and raises RBU) if the descriptor at the DMA cursor
    /// is not owned by the engine.
    pub fn rx_deliver(&self, frame: &[u8]) -> bool {
        self.rx_complete_with(frame, DES3_FD | DES3_LD)
    }

    /// Complete the next RX descriptor with explicit DES3 status flags
    pub fn rx_complete_with(&self, frame: &[u8], flags: u32) -> bool {
        let base = self.list_base(DMA_CH0_RXDESC_LIST_HADDR, DMA_CH0_RXDESC_LIST_ADDR);
        let len = self.ring_len(DMA_CH0_RXDESC_RING_LEN);
        let mut dma = self.dma.lock();
        let desc = self.descriptor(base, dma.rx_cursor);
        if !desc.is_dma_owned() {
            drop(dma);
            self.raise_status(DMA_CH_RBU);
            return false;
        }

        let buf = desc.buffer_address() as usize as *mut u8;
        // SAFETY: An armed descriptor points at the storage of a live
        // PacketBuf with room for a full frame; the driver does not touch it
        // while OWN is set.
        unsafe { core::ptr::copy_nonoverlapping(frame.as_ptr(), buf, frame.len()) };

        desc.write_back(0, flags | (frame.len() as u32 & RDES3_PL_MASK));
        dma.rx_cursor = (dma.rx_cursor + 1) % len;
        drop(dma);
        self.raise_status(DMA_CH_RI);
        true
    }

    /// Transmit up to `max` descriptors in ring order
    ///
    /// Stops at the first descriptor the driver has not handed over.
    /// Returns the number completed.
    pub fn tx_complete(&self, max: usize) -> usize {
        let base = self.list_base(DMA_CH0_TXDESC_LIST_HADDR, DMA_CH0_TXDESC_LIST_ADDR);
        let len = self.ring_len(DMA_CH0_TXDESC_RING_LEN);
        let mut dma = self.dma.lock();
        let mut done = 0;
        while done < max {
            let slot = dma.tx_cursor;
            let desc = self.descriptor(base, slot);
            let des3 = desc.status();
            if des3 & DES3_OWN == 0 {
                break;
            }
            let des2 = desc.des2();
            let n = (des2 & super::desc::TDES2_B1L_MASK) as usize;
            let ptr = desc.buffer_address() as usize as *const u8;
            // SAFETY: The driver keeps the transmit buffer attached to the
            // slot until the descriptor is reaped.
            let bytes = unsafe { core::slice::from_raw_parts(ptr, n) }.to_vec();
            dma.tx_log.push(TxRecord {
                slot,
                des2,
                des3: des3 & !DES3_OWN,
                bytes,
            });
            desc.write_back(des2, des3);
            dma.tx_cursor = (slot + 1) % len;
            done += 1;
        }
        drop(dma);
        if done > 0 {
            self.raise_status(DMA_CH_TI);
        }
        done
    }

    /// Descriptors consumed by the simulated engine so far
    pub fn tx_log(&self) -> Vec<TxRecord> {
        self.dma.lock().tx_log.clone()
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterIo for FakePlatform {
    fn read32(&self, offset: usize) -> u32 {
        if offset == DMA_CH0_STATUS {
            let due = {
                let mut late = self.late_rx.lock();
                match late.as_mut() {
                    Some((1, _)) => late.take().map(|(_, frame)| frame),
                    Some((n, _)) => {
                        *n -= 1;
                        None
                    }
                    None => None,
                }
            };
            if let Some(frame) = due {
                self.rx_deliver(&frame);
            }
        }
        self.reg(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut regs = self.regs.lock();
        regs.writes.push((offset, value));
        match offset {
            DMA_CH0_STATUS => {
                *regs.file.entry(offset).or_insert(0) &= !value;
            }
            DMA_MODE => {
                let stored = if regs.reset_stuck {
                    value
                } else {
                    value & !DMA_MODE_SWR
                };
                regs.file.insert(offset, stored);
            }
            MAC_MDIO_ADDRESS => {
                let stuck = regs.mdio_stuck;
                let data = regs.file.get(&MAC_MDIO_DATA).copied().unwrap_or(0);
                if value & MDIO_ADDR_GB != 0 && !stuck {
                    drop(regs);
                    let result = self.mdio_transaction(value, data);
                    let mut regs = self.regs.lock();
                    regs.file.insert(MAC_MDIO_DATA, result);
                    regs.file.insert(offset, value & !MDIO_ADDR_GB);
                } else {
                    regs.file.insert(offset, value);
                }
            }
            // Programming a list base restarts the engine at slot 0
            DMA_CH0_RXDESC_LIST_ADDR => {
                regs.file.insert(offset, value);
                self.dma.lock().rx_cursor = 0;
            }
            DMA_CH0_TXDESC_LIST_ADDR => {
                regs.file.insert(offset, value);
                self.dma.lock().tx_cursor = 0;
            }
            DMA_CH0_TX_CONTROL => {
                let was_running = regs.file.get(&offset).copied().unwrap_or(0) & DMA_CH_TX_ST != 0;
                regs.file.insert(offset, value);
                if was_running && value & DMA_CH_TX_ST == 0 && !regs.tx_stop_hangs {
                    *regs.file.entry(DMA_CH0_STATUS).or_insert(0) |= DMA_CH_TPS;
                }
            }
            _ => {
                regs.file.insert(offset, value);
            }
        }
    }
}

impl InterruptControl for FakePlatform {
    fn attach(&self, vector: u32) -> Result<InterruptId, NetworkError> {
        let mut irq = self.irq.lock();
        if irq.attach_fails {
            return Err(NetworkError::InterruptUnavailable);
        }
        irq.attached = Some(vector);
        irq.masked = true;
        Ok(InterruptId(vector))
    }

    fn detach(&self, _id: InterruptId) {
        let mut irq = self.irq.lock();
        irq.attached = None;
        irq.detached += 1;
    }

    fn mask(&self, _vector: u32) {
        let mut irq = self.irq.lock();
        irq.masked = true;
        irq.mask_calls += 1;
    }

    fn unmask(&self, _vector: u32, _id: InterruptId) {
        let mut irq = self.irq.lock();
        irq.masked = false;
        irq.unmask_calls += 1;
    }
}

impl BufferAllocator for FakePlatform {
    fn alloc_buffer(&self, size: usize, _flags: AllocFlags) -> Option<PacketBuf> {
        let mut guard = self.pool.lock();
        let pool = &mut *guard;
        match pool.credits {
            Some(0) => {
                pool.failures += 1;
                return None;
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        pool.allocated += 1;
        Some(PacketBuf::with_capacity(size))
    }

    fn free_buffer(&self, buf: PacketBuf) {
        self.pool.lock().freed += 1;
        drop(buf);
    }

    fn dma_address(&self, virt: *const u8) -> u64 {
        virt as usize as u64
    }
}

impl Delay for FakePlatform {
    fn delay_us(&self, us: u32) {
        *self.delayed_us.lock() += us as u64;
    }
}

// ============================================================================
// Network stack double
// ============================================================================

pub struct FakeStack {
    send_queue: Mutex<VecDeque<Packet>>,
    received: Mutex<Vec<PacketBuf>>,
    links: Mutex<Vec<LinkStatus>>,
    flags: Mutex<IfFlags>,
    purged: Mutex<usize>,
}

impl FakeStack {
    /// A running, non-promiscuous interface with a 1500-byte MTU
    pub fn new() -> Self {
        Self {
            send_queue: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
            flags: Mutex::new(IfFlags {
                running: true,
                promiscuous: false,
                mtu: 1500,
            }),
            purged: Mutex::new(0),
        }
    }

    pub fn queue(&self, packet: Packet) {
        self.send_queue.lock().push_back(packet);
    }

    pub fn pending(&self) -> usize {
        self.send_queue.lock().len()
    }

    pub fn purged(&self) -> usize {
        *self.purged.lock()
    }

    /// Payload of every frame handed up, in delivery order
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .iter()
            .map(|b| b.data().to_vec())
            .collect()
    }

    pub fn link_events(&self) -> Vec<LinkStatus> {
        self.links.lock().clone()
    }

    pub fn set_running(&self, running: bool) {
        self.flags.lock().running = running;
    }

    pub fn set_promiscuous(&self, promiscuous: bool) {
        self.flags.lock().promiscuous = promiscuous;
    }

    pub fn set_mtu(&self, mtu: usize) {
        self.flags.lock().mtu = mtu;
    }
}

impl Default for FakeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStack for FakeStack {
    fn dequeue(&self) -> Option<Packet> {
        self.send_queue.lock().pop_front()
    }

    fn purge_send_queue(&self) -> usize {
        let mut queue = self.send_queue.lock();
        let n = queue.len();
        queue.clear();
        *self.purged.lock() += n;
        n
    }

    fn input(&self, frame: PacketBuf) {
        self.received.lock().push(frame);
    }

    fn link_state_change(&self, status: LinkStatus) {
        self.links.lock().push(status);
    }

    fn if_flags(&self) -> IfFlags {
        *self.flags.lock()
    }
}

/// Deterministic pseudo-random sequence for fuzz-style tests
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Next value in `0..bound`
    pub fn next_below(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }
}
