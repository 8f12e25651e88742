//! MDIO (clause 22) access to the external PHY
//!
//! Every transaction polls `MAC_MDIO_ADDRESS.GB` with a fixed budget before
//! and after issuing the command. Exceeding the budget is logged and the
//! access completes anyway: reads then return whatever `MAC_MDIO_DATA`
//! holds, which callers must tolerate.

use super::regs::*;
use crate::drivers::net::netdev::NetworkError;
use crate::drivers::net::platform::{Delay, RegisterIo};

// ============================================================================
// Clause 22 PHY registers
// ============================================================================

pub const MII_BMCR: u32 = 0x00;
pub const MII_BMSR: u32 = 0x01;
pub const MII_PHYSID1: u32 = 0x02;
pub const MII_PHYSID2: u32 = 0x03;
pub const MII_ADVERTISE: u32 = 0x04;
pub const MII_LPA: u32 = 0x05;
pub const MII_CTRL1000: u32 = 0x09;
pub const MII_STAT1000: u32 = 0x0A;

// BMCR bits
pub const BMCR_RESET: u16 = 1 << 15;
pub const BMCR_ANENABLE: u16 = 1 << 12;
pub const BMCR_PDOWN: u16 = 1 << 11;
pub const BMCR_ANRESTART: u16 = 1 << 9;

// BMSR bits
pub const BMSR_LSTATUS: u16 = 1 << 2;
pub const BMSR_ANEGCOMPLETE: u16 = 1 << 5;

// ADVERTISE / LPA bits (same layout on both sides)
pub const ADVERTISE_CSMA: u16 = 0x0001;
pub const ADVERTISE_10HALF: u16 = 1 << 5;
pub const ADVERTISE_10FULL: u16 = 1 << 6;
pub const ADVERTISE_100HALF: u16 = 1 << 7;
pub const ADVERTISE_100FULL: u16 = 1 << 8;
pub const ADVERTISE_PAUSE_CAP: u16 = 1 << 10;
pub const ADVERTISE_PAUSE_ASYM: u16 = 1 << 11;
pub const ADVERTISE_ALL: u16 =
    ADVERTISE_10HALF | ADVERTISE_10FULL | ADVERTISE_100HALF | ADVERTISE_100FULL;

// CTRL1000 / STAT1000 bits
pub const ADVERTISE_1000HALF: u16 = 1 << 8;
pub const ADVERTISE_1000FULL: u16 = 1 << 9;
pub const LPA_1000HALF: u16 = 1 << 10;
pub const LPA_1000FULL: u16 = 1 << 11;

/// Poll until the bus is idle
fn wait_idle<P: RegisterIo + Delay + ?Sized>(hw: &P) -> Result<(), NetworkError> {
    for _ in 0..MDIO_POLL_BUDGET {
        if hw.read32(MAC_MDIO_ADDRESS) & MDIO_ADDR_GB == 0 {
            return Ok(());
        }
        hw.delay_us(MDIO_POLL_DELAY_US);
    }
    Err(NetworkError::Timeout)
}

fn command(phy: u32, reg: u32, goc: u32) -> u32 {
    ((phy & 0x1F) << MDIO_ADDR_PA_SHIFT)
        | ((reg & 0x1F) << MDIO_ADDR_RDA_SHIFT)
        | MDIO_ADDR_CR_250_300
        | goc
        | MDIO_ADDR_GB
}

/// Read PHY register `reg` of the PHY at `phy`
pub fn read<P: RegisterIo + Delay + ?Sized>(hw: &P, phy: u32, reg: u32) -> u16 {
    if wait_idle(hw).is_err() {
        kprintln!("[DWCEQOS] PHY: MDIO busy before read of reg {:#04x}", reg);
    }

    hw.write32(MAC_MDIO_ADDRESS, command(phy, reg, MDIO_ADDR_GOC_READ));

    if wait_idle(hw).is_err() {
        kprintln!("[DWCEQOS] PHY: MDIO read timeout, reg {:#04x}", reg);
    }

    (hw.read32(MAC_MDIO_DATA) & MDIO_DATA_MASK) as u16
}

/// Write `value` to PHY register `reg` of the PHY at `phy`
pub fn write<P: RegisterIo + Delay + ?Sized>(hw: &P, phy: u32, reg: u32, value: u16) {
    if wait_idle(hw).is_err() {
        kprintln!("[DWCEQOS] PHY: MDIO busy before write of reg {:#04x}", reg);
    }

    hw.write32(MAC_MDIO_DATA, value as u32);
    hw.write32(MAC_MDIO_ADDRESS, command(phy, reg, MDIO_ADDR_GOC_WRITE));

    if wait_idle(hw).is_err() {
        kprintln!("[DWCEQOS] PHY: MDIO write timeout, reg {:#04x}", reg);
    }
}

/// PHY identifier (PHYSID1:PHYSID2)
pub fn phy_id<P: RegisterIo + Delay + ?Sized>(hw: &P, phy: u32) -> u32 {
    let id1 = read(hw, phy, MII_PHYSID1) as u32;
    let id2 = read(hw, phy, MII_PHYSID2) as u32;
    (id1 << 16) | id2
}
