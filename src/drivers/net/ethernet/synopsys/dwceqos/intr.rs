//! Interrupt dispatch
//!
//! ```text
//!   Idle ──(irq fires: mask, queue)──▶ Queued ──(worker)──▶ Processing
//!    ▲                                                          │
//!    └───────────────────(enable_interrupt: unmask)─────────────┘
//! ```
//!
//! [`Dwceqos::interrupt`] runs in hard-interrupt context and only masks the
//! source. [`Dwceqos::process_interrupt`] runs in the deferred worker: it
//! acknowledges channel status and drives the receive drain and transmit
//! resumption until the hardware stops reporting work. Re-enabling the
//! source is a separate step so the OS can run it wherever it likes.

use super::Dwceqos;
use super::regs::*;
use super::stats;
use crate::drivers::net::netdev::NetworkStack;
use crate::drivers::net::platform::Platform;
use core::sync::atomic::{AtomicU8, Ordering};

/// Upper bound on status passes per worker run
pub const MAX_INTR_PASSES: u32 = 64;

/// Status bits that keep the worker looping
const WORK_BITS: u32 = DMA_CH_RI | DMA_CH_TBU | DMA_CH_FBE;

/// What the hard-interrupt handler asks of the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Schedule [`Dwceqos::process_interrupt`]
    QueueWorker,
    /// Worker already pending
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IrqState {
    Idle = 0,
    Queued = 1,
    Processing = 2,
}

/// Lock-free dispatcher state shared by the three contexts
pub struct IrqTracker(AtomicU8);

impl IrqTracker {
    pub const fn new() -> Self {
        Self(AtomicU8::new(IrqState::Idle as u8))
    }

    pub fn state(&self) -> IrqState {
        match self.0.load(Ordering::Acquire) {
            1 => IrqState::Queued,
            2 => IrqState::Processing,
            _ => IrqState::Idle,
        }
    }

    /// Idle → Queued; `false` if the worker is already pending or running
    fn queue(&self) -> bool {
        self.0
            .compare_exchange(
                IrqState::Idle as u8,
                IrqState::Queued as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(super) fn set(&self, state: IrqState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for IrqTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> Dwceqos<P> {
    /// Hard-interrupt handler: mask the source and defer to the worker
    pub fn interrupt(&self) -> IrqReturn {
        self.hw.mask(self.config.irq);
        if self.irq_state.queue() {
            IrqReturn::QueueWorker
        } else {
            IrqReturn::None
        }
    }

    /// Worker: service the channel until no receive, TX-unavailable or
    /// bus-error status remains
    ///
    /// Leaves the source masked; call [`Dwceqos::enable_interrupt`] after.
    pub fn process_interrupt(&self, stack: &dyn NetworkStack) {
        self.irq_state.set(IrqState::Processing);
        stats::bump(&self.stats.interrupts);

        for _ in 0..MAX_INTR_PASSES {
            let status = self.hw.read32(DMA_CH0_STATUS);
            if status & WORK_BITS == 0 {
                break;
            }
            // Acknowledge before servicing so new completions re-latch
            self.hw.write32(
                DMA_CH0_STATUS,
                status & (WORK_BITS | DMA_CH_NIS | DMA_CH_AIS),
            );

            if status & DMA_CH_FBE != 0 {
                stats::bump(&self.stats.bus_errors);
                kprintln!("[DWCEQOS] Fatal bus error, DMA status {:#010x}", status);
            }

            if status & DMA_CH_RI != 0 {
                self.receive(stack);
            }

            if status & DMA_CH_TBU != 0 {
                self.resume_transmit(stack);
            }
        }

        // Work that latched after the last pass (or outlived the pass budget)
        // stays pending so the source fires again once unmasked
        let rest = self.hw.read32(DMA_CH0_STATUS) & DMA_CH_STATUS_ALL & !WORK_BITS;
        if rest != 0 {
            self.hw.write32(DMA_CH0_STATUS, rest);
        }
    }

    /// Unmask the source after the worker has run
    ///
    /// A stopped interface stays masked.
    pub fn enable_interrupt(&self) {
        if self.is_running() {
            self.irq_state.set(IrqState::Idle);
            self.hw.unmask(self.config.irq, self.irq_id);
        }
    }

    pub fn irq_state(&self) -> IrqState {
        self.irq_state.state()
    }

    /// TBU: restart a stalled transmit under the send lock, else just reap
    fn resume_transmit(&self, stack: &dyn NetworkStack) {
        let link_up = self.link_up();
        let mut tx = self.tx.lock();
        if tx.is_stalled() {
            tx.start(&self.hw, stack, &self.stats, link_up);
        } else {
            tx.reap(&self.hw);
        }
    }
}
