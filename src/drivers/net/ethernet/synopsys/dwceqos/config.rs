//! Driver configuration
//!
//! A [`Config`] comes from defaults, from the device tree, or from the
//! classic comma-separated option string:
//!
//! ```text
//! mac=02:00:00:00:00:01,mtu=1500,receive=256,transmit=256,speed=100,duplex=full,
//! phy=1,pause=sym,promiscuous,irq=89,iobase=0x4033c000,rxbuf=2048,buswidth=64
//! ```
//!
//! Every path ends in [`Config::validate`]; invalid values are rejected, not
//! replaced.

use super::desc::MAX_DESC_BUF_LEN;
use super::link::{Duplex, MediaRequest, PauseAdvert, Speed};
use crate::drivers::net::netdev::{ConfigError, NetworkError};
use crate::dt::HardwareInfo;
use smoltcp::wire::EthernetAddress;

/// GMAC0 on S32G2
pub const DEFAULT_BASE: usize = 0x4033_C000;
/// GMAC0 interrupt on S32G2 (SPI 57)
pub const DEFAULT_IRQ: u32 = 89;

pub const DEFAULT_MTU: usize = 1500;
pub const MIN_MTU: usize = 68;
pub const MAX_MTU: usize = 9000;

pub const DEFAULT_RING_SIZE: usize = 256;
pub const MIN_RING_SIZE: usize = 8;
pub const MAX_RING_SIZE: usize = 1024;

pub const DEFAULT_RX_BUF_SIZE: usize = 2048;
pub const DEFAULT_BUS_WIDTH: u32 = 64;
pub const DEFAULT_PHY: u32 = 1;

/// Ethernet header length
pub const ETH_HLEN: usize = 14;
/// 802.1Q tag length
pub const VLAN_HLEN: usize = 4;
/// Frame check sequence length
pub const ETH_FCS_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Register window base address
    pub base: usize,
    /// Interrupt vector
    pub irq: u32,
    pub mac: EthernetAddress,
    /// Layer-3 MTU
    pub mtu: usize,
    pub rx_ring_size: usize,
    pub tx_ring_size: usize,
    /// Receive buffer size in bytes
    pub rx_buf_size: usize,
    /// AXI data width in bits
    pub bus_width: u32,
    pub phy: u32,
    pub media: MediaRequest,
    pub pause: PauseAdvert,
    pub promiscuous: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            irq: DEFAULT_IRQ,
            mac: EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            mtu: DEFAULT_MTU,
            rx_ring_size: DEFAULT_RING_SIZE,
            tx_ring_size: DEFAULT_RING_SIZE,
            rx_buf_size: DEFAULT_RX_BUF_SIZE,
            bus_width: DEFAULT_BUS_WIDTH,
            phy: DEFAULT_PHY,
            media: MediaRequest::Auto,
            pause: PauseAdvert::default(),
            promiscuous: false,
        }
    }
}

impl Config {
    /// Largest frame accepted on receive, without VLAN tag or FCS
    pub fn max_frame_len(&self) -> usize {
        self.mtu + ETH_HLEN
    }

    /// Check every field
    ///
    /// # Errors
    ///
    /// The first offending field, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for size in [self.rx_ring_size, self.tx_ring_size] {
            if !size.is_power_of_two() || !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&size) {
                return Err(ConfigError::RingSize(size));
            }
        }

        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(ConfigError::Mtu(self.mtu));
        }

        if !matches!(self.bus_width, 32 | 64 | 128) {
            return Err(ConfigError::BusWidth(self.bus_width));
        }

        let width_bytes = (self.bus_width / 8) as usize;
        let needed = self.max_frame_len() + VLAN_HLEN + ETH_FCS_LEN;
        if self.rx_buf_size % width_bytes != 0
            || self.rx_buf_size < needed
            || self.rx_buf_size > MAX_DESC_BUF_LEN
        {
            return Err(ConfigError::BufferWidth {
                size: self.rx_buf_size,
                width_bytes,
            });
        }

        if self.phy > 31 {
            return Err(ConfigError::PhyAddress(self.phy));
        }

        if !self.mac.is_unicast() || self.mac.0 == [0; 6] {
            return Err(ConfigError::MacAddress);
        }

        Ok(())
    }

    /// Parse a comma-separated option string over the defaults
    ///
    /// # Errors
    ///
    /// Unknown keys, malformed values, and anything `validate` rejects.
    pub fn parse_options(options: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut speed: Option<Option<Speed>> = None;
        let mut duplex: Option<Option<Duplex>> = None;

        for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = match option.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (option, None),
            };

            match key {
                "mac" => config.mac = parse_mac(required(value)?)?,
                "mtu" => config.mtu = parse_number(required(value)?)?,
                "receive" => config.rx_ring_size = parse_number(required(value)?)?,
                "transmit" => config.tx_ring_size = parse_number(required(value)?)?,
                "rxbuf" => config.rx_buf_size = parse_number(required(value)?)?,
                "buswidth" => config.bus_width = parse_number(required(value)?)?,
                "phy" => config.phy = parse_number(required(value)?)?,
                "irq" => config.irq = parse_number(required(value)?)?,
                "iobase" => config.base = parse_number(required(value)?)?,
                "speed" => {
                    speed = Some(match required(value)? {
                        "auto" => None,
                        "10" => Some(Speed::Mbps10),
                        "100" => Some(Speed::Mbps100),
                        "1000" => Some(Speed::Mbps1000),
                        _ => return Err(ConfigError::Media),
                    })
                }
                "duplex" => {
                    duplex = Some(match required(value)? {
                        "auto" => None,
                        "half" => Some(Duplex::Half),
                        "full" => Some(Duplex::Full),
                        _ => return Err(ConfigError::Media),
                    })
                }
                "pause" => {
                    config.pause = match required(value)? {
                        "none" | "off" => PauseAdvert::NONE,
                        "sym" => PauseAdvert {
                            symmetric: true,
                            asymmetric: false,
                        },
                        "asym" => PauseAdvert {
                            symmetric: false,
                            asymmetric: true,
                        },
                        "both" | "on" => PauseAdvert::default(),
                        _ => return Err(ConfigError::UnknownOption),
                    }
                }
                "promiscuous" => {
                    config.promiscuous = match value {
                        None | Some("1") | Some("on") => true,
                        Some("0") | Some("off") => false,
                        Some(_) => return Err(ConfigError::BadNumber),
                    }
                }
                _ => return Err(ConfigError::UnknownOption),
            }
        }

        config.media = match (speed.flatten(), duplex.flatten()) {
            (None, None) => MediaRequest::Auto,
            (Some(s), Some(d)) => MediaRequest::Fixed(s, d),
            (Some(s), None) => MediaRequest::Fixed(s, Duplex::Full),
            (None, Some(_)) => return Err(ConfigError::Media),
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults with the register window and interrupt taken from the first
    /// compatible device tree node
    ///
    /// # Errors
    ///
    /// `HardwareNotPresent` if no node matches or it lacks `reg`/`interrupts`.
    pub fn from_device_tree(hw: &HardwareInfo) -> Result<Self, NetworkError> {
        let node = hw.find_ethernet().ok_or(NetworkError::HardwareNotPresent)?;
        let config = Self {
            base: node.base_address().ok_or(NetworkError::HardwareNotPresent)?,
            irq: node.gic_interrupt().ok_or(NetworkError::HardwareNotPresent)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn required(value: Option<&str>) -> Result<&str, ConfigError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingValue),
    }
}

/// Decimal or `0x`-prefixed hexadecimal
fn parse_number<T: TryFrom<u64>>(s: &str) -> Result<T, ConfigError> {
    let n = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    }
    .map_err(|_| ConfigError::BadNumber)?;
    T::try_from(n).map_err(|_| ConfigError::BadNumber)
}

/// `aa:bb:cc:dd:ee:ff` (also accepts `-` separators)
fn parse_mac(s: &str) -> Result<EthernetAddress, ConfigError> {
    let mut bytes = [0u8; 6];
    let mut parts = s.split([':', '-']);
    for byte in bytes.iter_mut() {
        let part = parts.next().ok_or(ConfigError::MacAddress)?;
        if part.len() != 2 {
            return Err(ConfigError::MacAddress);
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| ConfigError::MacAddress)?;
    }
    if parts.next().is_some() {
        return Err(ConfigError::MacAddress);
    }
    Ok(EthernetAddress(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_parse_full_option_string() {
        let config = Config::parse_options(
            "mac=02:11:22:33:44:55, mtu=1400,receive=128,transmit=64,speed=100,duplex=half,\
             phy=7,pause=asym,promiscuous,irq=90,iobase=0x40344000",
        )
        .unwrap();

        assert_eq!(config.mac, EthernetAddress([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(config.mtu, 1400);
        assert_eq!(config.rx_ring_size, 128);
        assert_eq!(config.tx_ring_size, 64);
        assert_eq!(config.media, MediaRequest::Fixed(Speed::Mbps100, Duplex::Half));
        assert_eq!(config.phy, 7);
        assert!(!config.pause.symmetric);
        assert!(config.pause.asymmetric);
        assert!(config.promiscuous);
        assert_eq!(config.irq, 90);
        assert_eq!(config.base, 0x4034_4000);
    }

    #[test]
    fn test_speed_without_duplex_is_full() {
        let config = Config::parse_options("speed=1000").unwrap();
        assert_eq!(config.media, MediaRequest::Fixed(Speed::Mbps1000, Duplex::Full));
    }

    #[test]
    fn test_duplex_without_speed_rejected() {
        assert_eq!(Config::parse_options("duplex=full"), Err(ConfigError::Media));
        assert_eq!(Config::parse_options("speed=42"), Err(ConfigError::Media));
    }

    #[test]
    fn test_ring_size_must_be_power_of_two() {
        assert_eq!(
            Config::parse_options("receive=100"),
            Err(ConfigError::RingSize(100))
        );
        assert_eq!(
            Config::parse_options("transmit=2048"),
            Err(ConfigError::RingSize(2048))
        );
        assert_eq!(Config::parse_options("transmit=4"), Err(ConfigError::RingSize(4)));
    }

    #[test]
    fn test_mtu_range() {
        assert_eq!(Config::parse_options("mtu=40"), Err(ConfigError::Mtu(40)));
        // Jumbo MTU needs a larger receive buffer
        assert_eq!(
            Config::parse_options("mtu=9000"),
            Err(ConfigError::BufferWidth {
                size: 2048,
                width_bytes: 8
            })
        );
        assert!(Config::parse_options("mtu=9000,rxbuf=9088").is_ok());
    }

    #[test]
    fn test_buffer_must_match_bus_width() {
        assert_eq!(
            Config::parse_options("rxbuf=2044"),
            Err(ConfigError::BufferWidth {
                size: 2044,
                width_bytes: 8
            })
        );
        assert!(Config::parse_options("rxbuf=2044,buswidth=32").is_ok());
        assert_eq!(
            Config::parse_options("buswidth=48"),
            Err(ConfigError::BusWidth(48))
        );
    }

    #[test]
    fn test_bad_values_rejected() {
        assert_eq!(Config::parse_options("bogus=1"), Err(ConfigError::UnknownOption));
        assert_eq!(Config::parse_options("mtu=abc"), Err(ConfigError::BadNumber));
        assert_eq!(Config::parse_options("mtu"), Err(ConfigError::MissingValue));
        assert_eq!(Config::parse_options("phy=32"), Err(ConfigError::PhyAddress(32)));
        assert_eq!(
            Config::parse_options("mac=01:00:5e:00:00:01"),
            Err(ConfigError::MacAddress)
        );
        assert_eq!(
            Config::parse_options("mac=00:00:00:00:00:00"),
            Err(ConfigError::MacAddress)
        );
        assert_eq!(
            Config::parse_options("mac=02:00:00:00:01"),
            Err(ConfigError::MacAddress)
        );
    }

    #[test]
    fn test_empty_string_gives_defaults() {
        assert_eq!(Config::parse_options(""), Ok(Config::default()));
    }
}
