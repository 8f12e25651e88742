//! Link/PHY negotiation state machine
//!
//! ```text
//!            init / set_media                link + resolved
//!   Down ────────────────────▶ Negotiating ──────────────────▶ Up(speed, duplex, flow)
//!     ▲                             ▲                               │
//!     │ set_media (power-down)      └───────── link lost ───────────┘
//!     └──────────────────────────────  (restart autoneg, report Down)
//! ```
//!
//! The monitor is polled from a periodic tick. Link-up is only reported once
//! both speed and duplex resolve from the advertisement intersection;
//! link-loss is reported on the first poll that sees it.

use super::mdio::{self, *};
use super::regs::*;
use crate::drivers::net::platform::{Delay, RegisterIo};
use core::fmt;

/// Polling interval of the link monitor
pub const LINK_POLL_INTERVAL_MS: u32 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Mbps10,
    Mbps100,
    Mbps1000,
}

impl Speed {
    pub const fn mbps(self) -> u32 {
        match self {
            Speed::Mbps10 => 10,
            Speed::Mbps100 => 100,
            Speed::Mbps1000 => 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
    Full,
}

/// Negotiated PAUSE directions
///
/// `tx`: the MAC sends PAUSE frames. `rx`: the MAC honours received ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowControl {
    pub tx: bool,
    pub rx: bool,
}

impl FlowControl {
    pub const NONE: Self = Self { tx: false, rx: false };
    pub const BOTH: Self = Self { tx: true, rx: true };
}

/// PAUSE capabilities advertised to the link partner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseAdvert {
    pub symmetric: bool,
    pub asymmetric: bool,
}

impl PauseAdvert {
    pub const NONE: Self = Self {
        symmetric: false,
        asymmetric: false,
    };

    fn bits(self) -> u16 {
        let mut bits = 0;
        if self.symmetric {
            bits |= ADVERTISE_PAUSE_CAP;
        }
        if self.asymmetric {
            bits |= ADVERTISE_PAUSE_ASYM;
        }
        bits
    }
}

impl Default for PauseAdvert {
    fn default() -> Self {
        Self {
            symmetric: true,
            asymmetric: true,
        }
    }
}

/// Requested media: full autonegotiation or one advertised mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaRequest {
    #[default]
    Auto,
    Fixed(Speed, Duplex),
}

impl MediaRequest {
    /// ADVERTISE and CTRL1000 bits for this request (without PAUSE bits)
    fn advertisement(self) -> (u16, u16) {
        match self {
            MediaRequest::Auto => (ADVERTISE_ALL, ADVERTISE_1000FULL | ADVERTISE_1000HALF),
            MediaRequest::Fixed(Speed::Mbps10, Duplex::Half) => (ADVERTISE_10HALF, 0),
            MediaRequest::Fixed(Speed::Mbps10, Duplex::Full) => (ADVERTISE_10FULL, 0),
            MediaRequest::Fixed(Speed::Mbps100, Duplex::Half) => (ADVERTISE_100HALF, 0),
            MediaRequest::Fixed(Speed::Mbps100, Duplex::Full) => (ADVERTISE_100FULL, 0),
            MediaRequest::Fixed(Speed::Mbps1000, Duplex::Half) => (0, ADVERTISE_1000HALF),
            MediaRequest::Fixed(Speed::Mbps1000, Duplex::Full) => (0, ADVERTISE_1000FULL),
        }
    }
}

impl fmt::Display for MediaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaRequest::Auto => write!(f, "auto"),
            MediaRequest::Fixed(speed, Duplex::Half) => write!(f, "{}half", speed.mbps()),
            MediaRequest::Fixed(speed, Duplex::Full) => write!(f, "{}full", speed.mbps()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// PHY powered down or not yet initialised
    Down,
    /// Autonegotiation in progress or link not resolved
    Negotiating,
    Up {
        speed: Speed,
        duplex: Duplex,
        flow: FlowControl,
    },
}

impl LinkState {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Up { .. })
    }
}

/// Transition the caller must report to the network stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up {
        speed: Speed,
        duplex: Duplex,
        flow: FlowControl,
    },
    Down,
}

/// Resolve PAUSE directions from both advertisements (full duplex only)
///
/// Follows IEEE 802.3 Annex 28B table 28B-3.
pub fn resolve_flow(local: u16, remote: u16) -> FlowControl {
    let common = local & remote;
    if common & ADVERTISE_PAUSE_CAP != 0 {
        FlowControl::BOTH
    } else if common & ADVERTISE_PAUSE_ASYM != 0 {
        if local & ADVERTISE_PAUSE_CAP != 0 {
            FlowControl { tx: false, rx: true }
        } else if remote & ADVERTISE_PAUSE_CAP != 0 {
            FlowControl { tx: true, rx: false }
        } else {
            FlowControl::NONE
        }
    } else {
        FlowControl::NONE
    }
}

/// Highest common mode of the two advertisements
fn resolve_mode(adv: u16, lpa: u16, ctrl1000: u16, stat1000: u16) -> Option<(Speed, Duplex)> {
    let common1000 = ctrl1000 & (stat1000 >> 2);
    let common = adv & lpa;

    if common1000 & ADVERTISE_1000FULL != 0 {
        Some((Speed::Mbps1000, Duplex::Full))
    } else if common1000 & ADVERTISE_1000HALF != 0 {
        Some((Speed::Mbps1000, Duplex::Half))
    } else if common & ADVERTISE_100FULL != 0 {
        Some((Speed::Mbps100, Duplex::Full))
    } else if common & ADVERTISE_100HALF != 0 {
        Some((Speed::Mbps100, Duplex::Half))
    } else if common & ADVERTISE_10FULL != 0 {
        Some((Speed::Mbps10, Duplex::Full))
    } else if common & ADVERTISE_10HALF != 0 {
        Some((Speed::Mbps10, Duplex::Half))
    } else {
        None
    }
}

/// PHY monitor for one MAC
pub struct LinkMonitor {
    phy: u32,
    phy_id: Option<u32>,
    media: MediaRequest,
    pause: PauseAdvert,
    state: LinkState,
}

impl LinkMonitor {
    pub fn new(phy: u32, media: MediaRequest, pause: PauseAdvert) -> Self {
        Self {
            phy,
            phy_id: None,
            media,
            pause,
            state: LinkState::Down,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn media(&self) -> MediaRequest {
        self.media
    }

    pub fn is_up(&self) -> bool {
        self.state.is_up()
    }

    /// Identifier read from the PHY at the last start, `None` if nothing
    /// answered at the configured address
    pub fn phy_id(&self) -> Option<u32> {
        self.phy_id
    }

    /// Program the advertisement and start autonegotiation
    pub fn start<P: RegisterIo + Delay + ?Sized>(&mut self, hw: &P) {
        // An empty MDIO address reads back all ones (or zero on some buses)
        self.phy_id = match mdio::phy_id(hw, self.phy) {
            0 | 0xFFFF_FFFF => {
                kprintln!("[DWCEQOS] PHY: no response at address {}", self.phy);
                None
            }
            id => {
                kprintln!("[DWCEQOS] PHY: id {:#010x} at address {}", id, self.phy);
                Some(id)
            }
        };
        let (adv, adv1000) = self.media.advertisement();
        mdio::write(hw, self.phy, MII_ADVERTISE, adv | self.pause.bits() | ADVERTISE_CSMA);
        mdio::write(hw, self.phy, MII_CTRL1000, adv1000);
        mdio::write(hw, self.phy, MII_BMCR, BMCR_ANENABLE | BMCR_ANRESTART);
        self.state = LinkState::Negotiating;
    }

    /// Sample the PHY once
    ///
    /// Returns the transition to report, if any.
    pub fn poll<P: RegisterIo + Delay + ?Sized>(&mut self, hw: &P) -> Option<LinkEvent> {
        if self.state == LinkState::Down {
            return None;
        }

        // Link status latches low: the first read clears a stale failure
        let _ = mdio::read(hw, self.phy, MII_BMSR);
        let bmsr = mdio::read(hw, self.phy, MII_BMSR);

        if bmsr & BMSR_LSTATUS == 0 {
            if self.state.is_up() {
                kprintln!("[DWCEQOS] Link down");
                self.state = LinkState::Negotiating;
                mdio::write(hw, self.phy, MII_BMCR, BMCR_ANENABLE | BMCR_ANRESTART);
                return Some(LinkEvent::Down);
            }
            return None;
        }

        if bmsr & BMSR_ANEGCOMPLETE == 0 {
            return None;
        }

        let adv = mdio::read(hw, self.phy, MII_ADVERTISE);
        let lpa = mdio::read(hw, self.phy, MII_LPA);
        let ctrl1000 = mdio::read(hw, self.phy, MII_CTRL1000);
        let stat1000 = mdio::read(hw, self.phy, MII_STAT1000);

        let (speed, duplex) = resolve_mode(adv, lpa, ctrl1000, stat1000)?;
        let flow = match duplex {
            Duplex::Full => resolve_flow(adv, lpa),
            Duplex::Half => FlowControl::NONE,
        };

        let next = LinkState::Up {
            speed,
            duplex,
            flow,
        };
        if self.state == next {
            return None;
        }

        program_mac(hw, speed, duplex, flow);
        self.state = next;
        kprintln!(
            "[DWCEQOS] Link up: {} Mbps, {} duplex, flow tx={} rx={}",
            speed.mbps(),
            if duplex == Duplex::Full { "full" } else { "half" },
            flow.tx,
            flow.rx
        );
        Some(LinkEvent::Up {
            speed,
            duplex,
            flow,
        })
    }

    /// Apply an administrative media request
    ///
    /// A request equal to the current one, or a fixed mode the link already
    /// runs at, is ignored. Otherwise the PHY is power-cycled, link-down is
    /// reported, and autonegotiation restarts restricted to the requested
    /// mode.
    pub fn set_media<P: RegisterIo + Delay + ?Sized>(
        &mut self,
        hw: &P,
        media: MediaRequest,
    ) -> Option<LinkEvent> {
        if media == self.media {
            return None;
        }
        if let (MediaRequest::Fixed(speed, duplex), LinkState::Up { speed: s, duplex: d, .. }) =
            (media, self.state)
        {
            if speed == s && duplex == d {
                return None;
            }
        }

        kprintln!("[DWCEQOS] PHY: media {} -> {}", self.media, media);

        mdio::write(hw, self.phy, MII_BMCR, BMCR_PDOWN);
        self.state = LinkState::Down;

        mdio::write(hw, self.phy, MII_BMCR, 0);
        self.media = media;
        self.start(hw);

        Some(LinkEvent::Down)
    }

    /// Power the PHY down
    pub fn shutdown<P: RegisterIo + Delay + ?Sized>(&mut self, hw: &P) {
        mdio::write(hw, self.phy, MII_BMCR, BMCR_PDOWN);
        self.state = LinkState::Down;
    }
}

/// Program MAC speed, duplex and PAUSE handling for a resolved link
fn program_mac<P: RegisterIo + ?Sized>(hw: &P, speed: Speed, duplex: Duplex, flow: FlowControl) {
    let mut cfg = hw.read32(MAC_CONFIGURATION) & !(MAC_CONFIG_SPEED_MASK | MAC_CONFIG_DM);
    cfg |= match speed {
        Speed::Mbps1000 => 0,
        Speed::Mbps100 => MAC_CONFIG_PS | MAC_CONFIG_FES,
        Speed::Mbps10 => MAC_CONFIG_PS,
    };
    if duplex == Duplex::Full {
        cfg |= MAC_CONFIG_DM;
    }
    hw.write32(MAC_CONFIGURATION, cfg);

    let tx_flow = if flow.tx {
        MAC_TX_FLOW_TFE | (MAC_PAUSE_TIME << MAC_TX_FLOW_PT_SHIFT)
    } else {
        0
    };
    hw.write32(MAC_Q0_TX_FLOW_CTRL, tx_flow);
    hw.write32(MAC_RX_FLOW_CTRL, if flow.rx { MAC_RX_FLOW_RFE } else { 0 });
}
