//! DWC Ethernet QoS register map
//!
//! Offsets are relative to the controller base. Only the registers the
//! driver programs are listed.
//!
//! # References
//!
//! - Synopsys DesignWare Cores Ethernet QoS Databook 5.10a
//! - NXP S32G2 Reference Manual, GMAC chapter
//! - Linux: drivers/net/ethernet/stmicro/stmmac/dwmac4.h

// ============================================================================
// MAC Registers
// ============================================================================

pub const MAC_CONFIGURATION: usize = 0x0000;
pub const MAC_EXT_CONFIGURATION: usize = 0x0004;
pub const MAC_PACKET_FILTER: usize = 0x0008;
pub const MAC_Q0_TX_FLOW_CTRL: usize = 0x0070;
pub const MAC_RX_FLOW_CTRL: usize = 0x0090;
pub const MAC_RXQ_CTRL0: usize = 0x00A0;
pub const MAC_INTERRUPT_STATUS: usize = 0x00B0;
pub const MAC_INTERRUPT_ENABLE: usize = 0x00B4;
pub const MAC_VERSION: usize = 0x0110;
pub const MAC_MDIO_ADDRESS: usize = 0x0200;
pub const MAC_MDIO_DATA: usize = 0x0204;
pub const MAC_ADDRESS0_HIGH: usize = 0x0300;
pub const MAC_ADDRESS0_LOW: usize = 0x0304;

// MAC_CONFIGURATION bits
pub const MAC_CONFIG_RE: u32 = 1 << 0; // Receiver enable
pub const MAC_CONFIG_TE: u32 = 1 << 1; // Transmitter enable
pub const MAC_CONFIG_DM: u32 = 1 << 13; // Full duplex
pub const MAC_CONFIG_FES: u32 = 1 << 14; // 100 Mbps when PS is set
pub const MAC_CONFIG_PS: u32 = 1 << 15; // Port select: 10/100 (MII)
pub const MAC_CONFIG_JE: u32 = 1 << 16; // Jumbo packet enable
pub const MAC_CONFIG_ACS: u32 = 1 << 20; // Strip pad/FCS
pub const MAC_CONFIG_CST: u32 = 1 << 21; // Strip FCS for type frames
pub const MAC_CONFIG_IPC: u32 = 1 << 27; // Checksum offload
pub const MAC_CONFIG_SPEED_MASK: u32 = MAC_CONFIG_PS | MAC_CONFIG_FES;

// MAC_EXT_CONFIGURATION: giant packet size limit
pub const MAC_EXT_GPSL_MASK: u32 = 0x3FFF;

// MAC_PACKET_FILTER bits
pub const MAC_PACKET_FILTER_PR: u32 = 1 << 0; // Promiscuous
pub const MAC_PACKET_FILTER_PM: u32 = 1 << 4; // Pass all multicast

// MAC_Q0_TX_FLOW_CTRL bits
pub const MAC_TX_FLOW_TFE: u32 = 1 << 1; // Transmit PAUSE frames
pub const MAC_TX_FLOW_PT_SHIFT: u32 = 16;
pub const MAC_PAUSE_TIME: u32 = 0xFFFF;

// MAC_RX_FLOW_CTRL bits
pub const MAC_RX_FLOW_RFE: u32 = 1 << 0; // Honour received PAUSE frames

// MAC_RXQ_CTRL0: queue 0 enabled for generic traffic
pub const MAC_RXQ0_EN_DCB: u32 = 0b10;

// MAC_VERSION fields
pub const MAC_VERSION_SNPSVER_MASK: u32 = 0xFF;
pub const MAC_VERSION_MIN: u32 = 0x40;

// MAC_MDIO_ADDRESS bits
pub const MDIO_ADDR_GB: u32 = 1 << 0; // Busy
pub const MDIO_ADDR_GOC_SHIFT: u32 = 2;
pub const MDIO_ADDR_GOC_WRITE: u32 = 0b01 << MDIO_ADDR_GOC_SHIFT;
pub const MDIO_ADDR_GOC_READ: u32 = 0b11 << MDIO_ADDR_GOC_SHIFT;
pub const MDIO_ADDR_CR_SHIFT: u32 = 8; // CSR clock range
pub const MDIO_ADDR_CR_250_300: u32 = 5 << MDIO_ADDR_CR_SHIFT;
pub const MDIO_ADDR_RDA_SHIFT: u32 = 16; // Register address
pub const MDIO_ADDR_PA_SHIFT: u32 = 21; // PHY address
pub const MDIO_DATA_MASK: u32 = 0xFFFF;

// ============================================================================
// MTL Registers
// ============================================================================

pub const MTL_TXQ0_OPERATION_MODE: usize = 0x0D00;
pub const MTL_RXQ0_OPERATION_MODE: usize = 0x0D30;

pub const MTL_TXQ_TSF: u32 = 1 << 1; // Store and forward
pub const MTL_TXQ_TXQEN: u32 = 0b10 << 2; // Queue enabled
pub const MTL_TXQ_TQS_SHIFT: u32 = 16;
pub const MTL_RXQ_RSF: u32 = 1 << 5; // Store and forward
pub const MTL_RXQ_RQS_SHIFT: u32 = 20;

/// MTL FIFO size programmed for queue 0, in 256-byte blocks minus one
pub const MTL_QUEUE_BLOCKS: u32 = 0x1F;

// ============================================================================
// DMA Registers
// ============================================================================

pub const DMA_MODE: usize = 0x1000;
pub const DMA_SYSBUS_MODE: usize = 0x1004;

pub const DMA_CH0_CONTROL: usize = 0x1100;
pub const DMA_CH0_TX_CONTROL: usize = 0x1104;
pub const DMA_CH0_RX_CONTROL: usize = 0x1108;
pub const DMA_CH0_TXDESC_LIST_HADDR: usize = 0x1110;
pub const DMA_CH0_TXDESC_LIST_ADDR: usize = 0x1114;
pub const DMA_CH0_RXDESC_LIST_HADDR: usize = 0x1118;
pub const DMA_CH0_RXDESC_LIST_ADDR: usize = 0x111C;
pub const DMA_CH0_TXDESC_TAIL_PTR: usize = 0x1120;
pub const DMA_CH0_RXDESC_TAIL_PTR: usize = 0x1128;
pub const DMA_CH0_TXDESC_RING_LEN: usize = 0x112C;
pub const DMA_CH0_RXDESC_RING_LEN: usize = 0x1130;
pub const DMA_CH0_INTERRUPT_ENABLE: usize = 0x1134;
pub const DMA_CH0_STATUS: usize = 0x1160;

// DMA_MODE bits
pub const DMA_MODE_SWR: u32 = 1 << 0; // Software reset, self-clearing

// DMA_SYSBUS_MODE bits
pub const DMA_SYSBUS_BLEN16: u32 = 1 << 3;
pub const DMA_SYSBUS_BLEN8: u32 = 1 << 2;
pub const DMA_SYSBUS_EAME: u32 = 1 << 11; // 40-bit addressing

// DMA_CH0_CONTROL bits
pub const DMA_CH_CONTROL_PBLX8: u32 = 1 << 16;

// DMA_CH0_TX_CONTROL bits
pub const DMA_CH_TX_ST: u32 = 1 << 0; // Start transmission
pub const DMA_CH_TX_OSF: u32 = 1 << 4; // Operate on second packet
pub const DMA_CH_TXPBL_SHIFT: u32 = 16;

// DMA_CH0_RX_CONTROL bits
pub const DMA_CH_RX_SR: u32 = 1 << 0; // Start receive
pub const DMA_CH_RBSZ_SHIFT: u32 = 1;
pub const DMA_CH_RBSZ_MASK: u32 = 0x3FFF << DMA_CH_RBSZ_SHIFT;
pub const DMA_CH_RXPBL_SHIFT: u32 = 16;

/// Programmable burst length used for both directions (x8 when PBLX8 is set)
pub const DMA_PBL: u32 = 8;

// DMA_CH0_INTERRUPT_ENABLE / DMA_CH0_STATUS bits (same positions)
pub const DMA_CH_TI: u32 = 1 << 0; // Transmit complete
pub const DMA_CH_TPS: u32 = 1 << 1; // Transmit process stopped
pub const DMA_CH_TBU: u32 = 1 << 2; // Transmit buffer unavailable
pub const DMA_CH_RI: u32 = 1 << 6; // Receive complete
pub const DMA_CH_RBU: u32 = 1 << 7; // Receive buffer unavailable
pub const DMA_CH_RPS: u32 = 1 << 8; // Receive process stopped
pub const DMA_CH_FBE: u32 = 1 << 12; // Fatal bus error
pub const DMA_CH_AIS: u32 = 1 << 14; // Abnormal interrupt summary
pub const DMA_CH_NIS: u32 = 1 << 15; // Normal interrupt summary

/// Sources enabled while the interface runs
pub const DMA_CH_INTR_DEFAULT: u32 =
    DMA_CH_RI | DMA_CH_TBU | DMA_CH_FBE | DMA_CH_AIS | DMA_CH_NIS;

/// Every W1C status bit the channel reports
pub const DMA_CH_STATUS_ALL: u32 = 0x0000_FFC7;

// ============================================================================
// MMC (statistics counters)
// ============================================================================

pub const MMC_CONTROL: usize = 0x0700;
pub const MMC_TX_OCTET_COUNT_GOOD_BAD: usize = 0x0714;
pub const MMC_TX_PACKET_COUNT_GOOD_BAD: usize = 0x0718;
pub const MMC_TX_UNDERFLOW_ERROR: usize = 0x0748;
pub const MMC_RX_PACKETS_COUNT_GOOD_BAD: usize = 0x0780;
pub const MMC_RX_OCTET_COUNT_GOOD_BAD: usize = 0x0784;
pub const MMC_RX_CRC_ERROR_PACKETS: usize = 0x0794;
pub const MMC_RX_ALIGNMENT_ERROR_PACKETS: usize = 0x0798;
pub const MMC_RX_OVERSIZE_PACKETS_GOOD: usize = 0x07A8;
pub const MMC_RX_FIFO_OVERFLOW_PACKETS: usize = 0x07D4;

// MMC_CONTROL bits
pub const MMC_CONTROL_CNTRST: u32 = 1 << 0; // Reset all counters
pub const MMC_CONTROL_RSTONRD: u32 = 1 << 2; // Reset on read

// ============================================================================
// Timing budgets
// ============================================================================

/// DMA software reset poll budget (iterations of `RESET_POLL_DELAY_US`)
pub const RESET_POLL_BUDGET: u32 = 1000;
pub const RESET_POLL_DELAY_US: u32 = 10;

/// MDIO busy poll budget (iterations of `MDIO_POLL_DELAY_US`)
pub const MDIO_POLL_BUDGET: u32 = 1000;
pub const MDIO_POLL_DELAY_US: u32 = 10;

/// TX drain polls per transmit descriptor at shutdown
pub const DRAIN_POLLS_PER_DESC: u32 = 4;
pub const DRAIN_POLL_DELAY_US: u32 = 10;
