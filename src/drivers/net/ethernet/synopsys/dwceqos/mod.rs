//! Synopsys DesignWare Ethernet QoS (GMAC 5.x) driver
//!
//! Driver for the DWC EQOS MAC+DMA block found on NXP S32G2/S32G3 and S32V234.
//! One [`Dwceqos`] value owns one controller: its receive and transmit
//! descriptor rings, the PHY link monitor and the interface statistics.
//!
//! # Architecture
//!
//! ```text
//!   Hardware IRQ ─▶ interrupt() ─ mask, queue ─▶ process_interrupt()
//!                                                   │
//!                         ┌─────────────────────────┼──────────────────┐
//!                         ▼                         ▼                  ▼
//!                    RxRing::drain          TxRing::start/reap      bus error
//!                         │                         ▲                  (count)
//!                         ▼                         │
//!               NetworkStack::input      start_transmit() ◀─ NetworkStack
//!
//!   Timer (3 s) ─▶ tick() ─▶ LinkMonitor::poll ─▶ NetworkStack::link_state_change
//! ```
//!
//! # Locking
//!
//! - `tx`: the send lock. Held by [`Dwceqos::start_transmit`] and by the
//!   worker when it resumes a stalled transmit.
//! - `rx`: only taken from the worker and the periodic tick.
//! - `link`: taken by the tick and administrative requests, never while
//!   holding `tx`. The transmit admission check reads a carrier flag
//!   instead of the lock.
//!
//! # References
//!
//! - Synopsys DesignWare Cores Ethernet QoS Databook 5.10a
//! - NXP S32G2 Reference Manual, GMAC chapter
//! - Linux: drivers/net/ethernet/stmicro/stmmac/

pub mod config;
pub mod desc;
pub mod intr;
pub mod link;
pub mod mdio;
pub mod regs;
pub mod ring;
pub mod rx;
pub mod stats;
pub mod tx;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use intr::{IrqReturn, IrqState};
pub use link::{Duplex, FlowControl, LinkEvent, LinkState, MediaRequest, PauseAdvert, Speed};
pub use stats::{MmcCounters, StatsSnapshot};

use crate::drivers::net::netdev::{LinkStatus, NetworkError, NetworkStack};
use crate::drivers::net::platform::{BufferAllocator, InterruptControl, InterruptId, Platform};
use config::{ETH_FCS_LEN, ETH_HLEN, VLAN_HLEN};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use intr::IrqTracker;
use link::LinkMonitor;
use regs::*;
use rx::RxRing;
use smoltcp::phy::{Checksum, DeviceCapabilities, Medium};
use spin::Mutex;
use stats::Stats;
use tx::TxRing;

/// Administrative request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRequest {
    /// Force a speed/duplex or return to autonegotiation
    SetMedia(MediaRequest),
    GetStats,
    GetConfig,
    GetLink,
    GetMmc,
}

/// Reply to an [`AdminRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminResponse {
    Done,
    Stats(StatsSnapshot),
    Config(Config),
    Link(LinkState),
    Mmc(MmcCounters),
}

/// One DWC EQOS controller
pub struct Dwceqos<P: Platform> {
    hw: P,
    config: Config,
    version: u32,
    irq_id: InterruptId,
    irq_state: IrqTracker,
    running: AtomicBool,
    carrier: AtomicBool,
    promiscuous: AtomicBool,
    tx: Mutex<TxRing>,
    rx: Mutex<RxRing>,
    link: Mutex<LinkMonitor>,
    stats: Stats,
}

impl<P: Platform> Dwceqos<P> {
    /// Bring up a controller: reset it, build both rings, fill the receive
    /// ring and attach the interrupt
    ///
    /// The interface stays stopped until [`Dwceqos::start`].
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` - `config` failed validation
    /// - `HardwareNotPresent` - no EQOS core answers at the register window
    /// - `NoBuffers` - the receive ring could not be filled
    /// - `InterruptUnavailable` - the vector could not be attached
    ///
    /// Everything acquired before the failing step is released.
    pub fn attach(hw: P, config: Config) -> Result<Self, NetworkError> {
        config.validate()?;

        let version = hw.read32(MAC_VERSION);
        let snpsver = version & MAC_VERSION_SNPSVER_MASK;
        if snpsver < MAC_VERSION_MIN {
            kprintln!(
                "[DWCEQOS] No supported core at {:#x} (MAC_VERSION {:#010x})",
                config.base,
                version
            );
            return Err(NetworkError::HardwareNotPresent);
        }
        kprintln!(
            "[DWCEQOS] Found core version {}.{}{} at {:#x}",
            snpsver >> 4,
            snpsver & 0xF,
            (version >> 8) & 0xFF,
            config.base
        );

        if !reset_dma(&hw) {
            kprintln!("[DWCEQOS] DMA software reset did not complete, continuing");
        }

        let mut rx = RxRing::new(config.rx_ring_size, config.rx_buf_size, &hw);
        let tx = TxRing::new(config.tx_ring_size, &hw);

        let mut rx_guard = RxGuard::new(&hw, &mut rx);
        rx_guard.fill(&hw)?;
        let irq_guard = IrqGuard::attach(&hw, config.irq)?;

        init_dma(&hw, &config);
        init_mtl(&hw);
        init_mac(&hw, &config);
        stats::reset_mmc(&hw);
        rx_guard.program(&hw);
        tx.program(&hw);

        let irq_id = irq_guard.commit();
        rx_guard.commit();

        kprintln!(
            "[DWCEQOS] Attached {} irq {} rings rx={} tx={} mtu={}",
            config.mac,
            config.irq,
            config.rx_ring_size,
            config.tx_ring_size,
            config.mtu
        );

        Ok(Self {
            link: Mutex::new(LinkMonitor::new(config.phy, config.media, config.pause)),
            promiscuous: AtomicBool::new(config.promiscuous),
            hw,
            config,
            version,
            irq_id,
            irq_state: IrqTracker::new(),
            running: AtomicBool::new(false),
            carrier: AtomicBool::new(false),
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            stats: Stats::default(),
        })
    }

    pub fn platform(&self) -> &P {
        &self.hw
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Raw MAC_VERSION read at attach
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bring the interface up
    ///
    /// Re-arms the receive ring from slot 0, starts autonegotiation, then
    /// enables the MAC, both DMA directions and the channel interrupts.
    ///
    /// # Errors
    ///
    /// `NoBuffers` if a receive slot that lost its buffer cannot be
    /// re-armed. The interface stays down.
    pub fn start(&self) -> Result<(), NetworkError> {
        if self.is_running() {
            return Ok(());
        }

        {
            let mut rx = self.rx.lock();
            rx.rewind(&self.hw)?;
            rx.program(&self.hw);
        }
        self.tx.lock().program(&self.hw);

        {
            let mut link = self.link.lock();
            link.start(&self.hw);
            self.carrier.store(link.is_up(), Ordering::Release);
        }

        let mut mac = self.hw.read32(MAC_CONFIGURATION);
        mac |= MAC_CONFIG_TE | MAC_CONFIG_RE | MAC_CONFIG_ACS | MAC_CONFIG_CST | MAC_CONFIG_IPC;
        if self.config.mtu > config::DEFAULT_MTU {
            mac |= MAC_CONFIG_JE;
        } else {
            mac &= !MAC_CONFIG_JE;
        }
        self.hw.write32(MAC_CONFIGURATION, mac);

        let tx_ctrl = self.hw.read32(DMA_CH0_TX_CONTROL);
        self.hw.write32(DMA_CH0_TX_CONTROL, tx_ctrl | DMA_CH_TX_ST);
        let rx_ctrl = self.hw.read32(DMA_CH0_RX_CONTROL);
        self.hw.write32(DMA_CH0_RX_CONTROL, rx_ctrl | DMA_CH_RX_SR);

        self.hw.write32(DMA_CH0_STATUS, DMA_CH_STATUS_ALL);
        self.hw.write32(DMA_CH0_INTERRUPT_ENABLE, DMA_CH_INTR_DEFAULT);
        self.update_filter(self.promiscuous.load(Ordering::Acquire));

        self.running.store(true, Ordering::Release);
        self.enable_interrupt();
        kprintln!("[DWCEQOS] Interface up, media {}", self.config.media);
        Ok(())
    }

    /// Bring the interface down
    ///
    /// Waits for the transmit DMA to go idle for a budget scaled to the
    /// ring size, then disables the MAC and receive DMA and frees every
    /// transmit buffer. A drain that overruns the budget is logged and
    /// shutdown carries on.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.hw.mask(self.config.irq);
        self.hw.write32(DMA_CH0_INTERRUPT_ENABLE, 0);

        let mut tx = self.tx.lock();

        let tx_ctrl = self.hw.read32(DMA_CH0_TX_CONTROL);
        self.hw.write32(DMA_CH0_TX_CONTROL, tx_ctrl & !DMA_CH_TX_ST);
        let budget = tx.ring().len() as u32 * DRAIN_POLLS_PER_DESC;
        if !self.wait_status(DMA_CH_TPS, budget, DRAIN_POLL_DELAY_US) {
            kprintln!(
                "[DWCEQOS] TX DMA did not stop after {} polls, continuing",
                budget
            );
        }
        self.hw.write32(DMA_CH0_STATUS, DMA_CH_TPS);

        let mac = self.hw.read32(MAC_CONFIGURATION);
        self.hw
            .write32(MAC_CONFIGURATION, mac & !(MAC_CONFIG_TE | MAC_CONFIG_RE));
        let rx_ctrl = self.hw.read32(DMA_CH0_RX_CONTROL);
        self.hw.write32(DMA_CH0_RX_CONTROL, rx_ctrl & !DMA_CH_RX_SR);

        let freed = tx.release(&self.hw);
        drop(tx);

        self.carrier.store(false, Ordering::Release);
        self.irq_state.set(IrqState::Idle);
        kprintln!("[DWCEQOS] Interface down, {} transmit buffers freed", freed);
    }

    /// Send entry point: queue as much of the stack's send queue as the
    /// transmit ring holds
    pub fn start_transmit(&self, stack: &dyn NetworkStack) {
        let link_up = self.link_up();
        self.tx.lock().start(&self.hw, stack, &self.stats, link_up);
    }

    /// Transmit is waiting on free descriptors
    pub fn tx_stalled(&self) -> bool {
        self.tx.lock().is_stalled()
    }

    /// Receive drain, bounded to one ring's worth of frames
    pub(crate) fn receive(&self, stack: &dyn NetworkStack) -> usize {
        let mtu = stack.if_flags().mtu.min(self.config.mtu);
        self.rx.lock().drain(&self.hw, stack, &self.stats, mtu)
    }

    pub(crate) fn link_up(&self) -> bool {
        self.carrier.load(Ordering::Acquire)
    }

    /// Periodic timer callback, every [`link::LINK_POLL_INTERVAL_MS`]
    ///
    /// Polls the PHY and reports transitions, follows the stack's
    /// promiscuous flag, and retries a receive drain that stalled on buffer
    /// exhaustion.
    pub fn tick(&self, stack: &dyn NetworkStack) {
        if !self.is_running() {
            return;
        }

        let event = {
            let mut link = self.link.lock();
            let event = link.poll(&self.hw);
            self.carrier.store(link.is_up(), Ordering::Release);
            event
        };
        if let Some(event) = event {
            self.report(stack, event);
        }

        let promiscuous = stack.if_flags().promiscuous;
        if promiscuous != self.promiscuous.load(Ordering::Acquire) {
            self.update_filter(promiscuous);
        }

        if self.rx.lock().is_stalled() {
            self.receive(stack);
        }
    }

    fn report(&self, stack: &dyn NetworkStack, event: LinkEvent) {
        stats::bump(&self.stats.link_transitions);
        let status = match event {
            LinkEvent::Up { .. } => LinkStatus::Up,
            LinkEvent::Down => LinkStatus::Down,
        };
        stack.link_state_change(status);
    }

    /// Apply the promiscuous receive filter
    pub fn update_filter(&self, promiscuous: bool) {
        self.promiscuous.store(promiscuous, Ordering::Release);
        let filter = self.hw.read32(MAC_PACKET_FILTER);
        let filter = if promiscuous {
            filter | MAC_PACKET_FILTER_PR
        } else {
            filter & !MAC_PACKET_FILTER_PR
        };
        self.hw.write32(MAC_PACKET_FILTER, filter);
    }

    /// Serve an administrative request
    pub fn control(&self, stack: &dyn NetworkStack, request: AdminRequest) -> AdminResponse {
        match request {
            AdminRequest::SetMedia(media) => {
                let event = {
                    let mut link = self.link.lock();
                    let event = link.set_media(&self.hw, media);
                    self.carrier.store(link.is_up(), Ordering::Release);
                    event
                };
                if let Some(event) = event {
                    self.report(stack, event);
                }
                AdminResponse::Done
            }
            AdminRequest::GetStats => AdminResponse::Stats(self.stats()),
            AdminRequest::GetConfig => {
                let mut config = self.config;
                config.media = self.link.lock().media();
                config.promiscuous = self.promiscuous.load(Ordering::Acquire);
                AdminResponse::Config(config)
            }
            AdminRequest::GetLink => AdminResponse::Link(self.link_state()),
            AdminRequest::GetMmc => AdminResponse::Mmc(self.read_mmc()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Hardware MMC counters
    pub fn read_mmc(&self) -> MmcCounters {
        stats::read_mmc(&self.hw)
    }

    pub fn link_state(&self) -> LinkState {
        self.link.lock().state()
    }

    /// Capabilities for a smoltcp interface bound to this device
    ///
    /// Checksums are inserted by the MAC on transmit, so smoltcp only
    /// verifies them on receive.
    pub fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.medium = Medium::Ethernet;
        caps.max_transmission_unit = self.config.mtu + ETH_HLEN;
        caps.max_burst_size = Some(self.config.tx_ring_size);
        caps.checksum.ipv4 = Checksum::Rx;
        caps.checksum.tcp = Checksum::Rx;
        caps.checksum.udp = Checksum::Rx;
        caps
    }

    /// Poll channel status until `bit` is set
    fn wait_status(&self, bit: u32, budget: u32, delay_us: u32) -> bool {
        for _ in 0..budget {
            if self.hw.read32(DMA_CH0_STATUS) & bit != 0 {
                return true;
            }
            self.hw.delay_us(delay_us);
        }
        false
    }
}

impl<P: Platform> Drop for Dwceqos<P> {
    fn drop(&mut self) {
        self.stop();
        self.link.lock().shutdown(&self.hw);
        let released = self.rx.lock().release(&self.hw);
        self.hw.detach(self.irq_id);
        kprintln!("[DWCEQOS] Detached, {} receive buffers released", released);
    }
}

// ============================================================================
// Attach helpers
// ============================================================================

/// Returns the receive ring's buffers to the pool unless committed
struct RxGuard<'a, A: BufferAllocator> {
    alloc: &'a A,
    rx: &'a mut RxRing,
    armed: bool,
}

impl<'a, A: BufferAllocator> RxGuard<'a, A> {
    fn new(alloc: &'a A, rx: &'a mut RxRing) -> Self {
        Self {
            alloc,
            rx,
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<A: BufferAllocator> Deref for RxGuard<'_, A> {
    type Target = RxRing;

    fn deref(&self) -> &RxRing {
        self.rx
    }
}

impl<A: BufferAllocator> DerefMut for RxGuard<'_, A> {
    fn deref_mut(&mut self) -> &mut RxRing {
        self.rx
    }
}

impl<A: BufferAllocator> Drop for RxGuard<'_, A> {
    fn drop(&mut self) {
        if self.armed {
            let released = self.rx.release(self.alloc);
            kprintln!("[DWCEQOS] Attach failed, {} receive buffers released", released);
        }
    }
}

/// Detaches the interrupt unless committed
struct IrqGuard<'a, I: InterruptControl> {
    irq: &'a I,
    id: InterruptId,
    armed: bool,
}

impl<'a, I: InterruptControl> IrqGuard<'a, I> {
    fn attach(irq: &'a I, vector: u32) -> Result<Self, NetworkError> {
        let id = irq.attach(vector).inspect_err(|e| {
            kprintln!("[DWCEQOS] Cannot attach irq {}: {}", vector, e);
        })?;
        Ok(Self {
            irq,
            id,
            armed: true,
        })
    }

    fn commit(mut self) -> InterruptId {
        self.armed = false;
        self.id
    }
}

impl<I: InterruptControl> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.armed {
            self.irq.detach(self.id);
        }
    }
}

/// Software-reset the DMA and MAC; `false` if SWR never self-cleared
fn reset_dma<P: Platform>(hw: &P) -> bool {
    hw.write32(DMA_MODE, DMA_MODE_SWR);
    for _ in 0..RESET_POLL_BUDGET {
        if hw.read32(DMA_MODE) & DMA_MODE_SWR == 0 {
            return true;
        }
        hw.delay_us(RESET_POLL_DELAY_US);
    }
    false
}

fn init_dma<P: Platform>(hw: &P, config: &Config) {
    let mut sysbus = DMA_SYSBUS_BLEN16 | DMA_SYSBUS_BLEN8;
    if config.bus_width >= 64 {
        sysbus |= DMA_SYSBUS_EAME;
    }
    hw.write32(DMA_SYSBUS_MODE, sysbus);
    hw.write32(DMA_CH0_CONTROL, DMA_CH_CONTROL_PBLX8);
    hw.write32(
        DMA_CH0_TX_CONTROL,
        (DMA_PBL << DMA_CH_TXPBL_SHIFT) | DMA_CH_TX_OSF,
    );
    let rbsz = ((config.rx_buf_size as u32) << DMA_CH_RBSZ_SHIFT) & DMA_CH_RBSZ_MASK;
    hw.write32(DMA_CH0_RX_CONTROL, (DMA_PBL << DMA_CH_RXPBL_SHIFT) | rbsz);
}

fn init_mtl<P: Platform>(hw: &P) {
    hw.write32(
        MTL_TXQ0_OPERATION_MODE,
        MTL_TXQ_TSF | MTL_TXQ_TXQEN | (MTL_QUEUE_BLOCKS << MTL_TXQ_TQS_SHIFT),
    );
    hw.write32(
        MTL_RXQ0_OPERATION_MODE,
        MTL_RXQ_RSF | (MTL_QUEUE_BLOCKS << MTL_RXQ_RQS_SHIFT),
    );
}

fn init_mac<P: Platform>(hw: &P, config: &Config) {
    let mac = config.mac.as_bytes();
    hw.write32(
        MAC_ADDRESS0_HIGH,
        u32::from(mac[5]) << 8 | u32::from(mac[4]),
    );
    hw.write32(
        MAC_ADDRESS0_LOW,
        u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]]),
    );

    let giant = (config.max_frame_len() + VLAN_HLEN + ETH_FCS_LEN) as u32 & MAC_EXT_GPSL_MASK;
    hw.write32(MAC_EXT_CONFIGURATION, giant);
    hw.write32(MAC_RXQ_CTRL0, MAC_RXQ0_EN_DCB);
    hw.write32(MAC_INTERRUPT_ENABLE, 0);
    hw.write32(MAC_Q0_TX_FLOW_CTRL, 0);
    hw.write32(MAC_RX_FLOW_CTRL, 0);
    hw.write32(
        MAC_PACKET_FILTER,
        if config.promiscuous { MAC_PACKET_FILTER_PR } else { 0 },
    );
}
