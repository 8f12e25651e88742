//! Device drivers subsystem
//!
//! Organized by device class:
//! - `irqchip`: Interrupt controllers
//! - `net`: Network device drivers and their platform interfaces

pub mod irqchip;
pub mod net;
