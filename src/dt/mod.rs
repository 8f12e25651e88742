//! Device Tree Parsing
//!
//! Locates the Ethernet QoS controller in the Flattened Device Tree (FDT/DTB)
//! handed over by the bootloader, so the board code does not have to hardcode
//! per-SoC addresses.
//!
//! # Controller nodes
//!
//! ```text
//! gmac0: ethernet@4033c000 {
//!     compatible = "nxp,s32g2-dwmac";
//!     reg = <0x0 0x4033c000 0x0 0x2000>;
//!     interrupts = <GIC_SPI 57 IRQ_TYPE_LEVEL_HIGH>;
//!     phy-handle = <&gmac0_mdio_c_phy1>;
//! };
//! ```
//!
//! S32G nodes use `#address-cells = <2>`, so `reg` carries a 64-bit address.
//! Interrupts are three GIC cells: type (0 = SPI, 1 = PPI), number, flags.
//!
//! # References
//!
//! - [Devicetree Specification](https://devicetree-specification.readthedocs.io/)
//! - Linux: Documentation/devicetree/bindings/net/snps,dwmac.yaml

use alloc::string::String;
use alloc::vec::Vec;
use fdt_rs::base::{DevTree, DevTreeNode, DevTreeProp};
use fdt_rs::prelude::*;

/// Compatible strings of supported controllers, most specific first
pub const DWCEQOS_COMPATIBLE: &[&str] = &[
    "nxp,s32g2-dwmac",
    "snps,dwmac-5.10a",
    "snps,dwc-qos-ethernet-4.10",
];

/// FDT header magic
const FDT_MAGIC: u32 = 0xd00d_feed;

/// Size of the fixed FDT header
const FDT_HEADER_LEN: usize = 40;

/// First GIC interrupt ID of the shared peripheral range
const GIC_SPI_BASE: u32 = 32;
/// First GIC interrupt ID of the private peripheral range
const GIC_PPI_BASE: u32 = 16;

/// Hardware information parsed from device tree
///
/// # Safety
///
/// Contains a raw pointer to the DTB. The blob must remain valid for the
/// lifetime of this struct; bootloader-provided DTBs live for the whole
/// uptime of the system.
pub struct HardwareInfo {
    dtb_ptr: *const u8,
    dtb_size: usize,
}

impl HardwareInfo {
    /// Parse the DTB at `dtb_ptr`
    ///
    /// # Errors
    ///
    /// Returns error if the pointer is null, the magic number is not
    /// 0xd00dfeed, or the header is malformed.
    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    pub fn from_firmware(dtb_ptr: *const u8) -> Result<Self, &'static str> {
        if dtb_ptr.is_null() {
            return Err("DTB pointer is null");
        }

        // SAFETY: Non-null pointer to a bootloader-provided blob; the header
        // is at least FDT_HEADER_LEN bytes long.
        let header = unsafe { core::slice::from_raw_parts(dtb_ptr, FDT_HEADER_LEN) };

        let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if magic != FDT_MAGIC {
            return Err("Invalid DTB magic number");
        }

        // SAFETY: Magic check passed, so the header layout is an FDT header.
        let size = unsafe { DevTree::read_totalsize(header) }
            .map_err(|_| "Failed to read DTB size")?;

        Ok(Self {
            dtb_ptr,
            dtb_size: size,
        })
    }

    /// Get size of DTB in bytes
    pub fn size(&self) -> usize {
        self.dtb_size
    }

    /// Find the first node whose `compatible` property contains `compatible`
    ///
    /// Returns `None` if no matching node exists.
    pub fn find_device(&self, compatible: &str) -> Option<DeviceNode> {
        // SAFETY: dtb_ptr and dtb_size were validated in from_firmware
        let dtb_bytes = unsafe { core::slice::from_raw_parts(self.dtb_ptr, self.dtb_size) };

        // SAFETY: dtb_bytes is a complete DTB (see above)
        let dt = unsafe { DevTree::new(dtb_bytes).ok()? };

        let mut nodes = dt.compatible_nodes(compatible);
        let node = match nodes.next() {
            Ok(Some(n)) => n,
            _ => return None,
        };

        Some(DeviceNode {
            name: node.name().unwrap_or(compatible).into(),
            base_addr: extract_base_address(&node),
            interrupts: extract_cells(&node, "interrupts"),
        })
    }

    /// Find the Ethernet QoS controller, trying each supported compatible
    pub fn find_ethernet(&self) -> Option<DeviceNode> {
        DWCEQOS_COMPATIBLE
            .iter()
            .find_map(|compatible| self.find_device(compatible))
    }
}

fn find_property<'a, 'dt>(node: &'a DevTreeNode<'_, 'dt>, name: &str) -> Option<DevTreeProp<'a, 'dt>> {
    let mut props = node.props();
    while let Ok(Some(prop)) = props.next() {
        if prop.name() == Ok(name) {
            return Some(prop);
        }
    }
    None
}

/// Base address from the `reg` property
///
/// A 16-byte `reg` is `<addr_hi addr_lo size_hi size_lo>`, an 8-byte one is
/// `<addr size>`.
fn extract_base_address(node: &DevTreeNode) -> Option<usize> {
    let prop = find_property(node, "reg")?;
    if prop.length() >= 16 {
        let hi = prop.u32(0).ok()? as u64;
        let lo = prop.u32(1).ok()? as u64;
        usize::try_from((hi << 32) | lo).ok()
    } else {
        prop.u32(0).ok().map(|addr| addr as usize)
    }
}

fn extract_cells(node: &DevTreeNode, name: &str) -> Vec<u32> {
    let mut cells = Vec::new();
    if let Some(prop) = find_property(node, name) {
        for i in 0..prop.length() / 4 {
            if let Ok(val) = prop.u32(i) {
                cells.push(val);
            }
        }
    }
    cells
}

/// A device tree node with the properties the driver needs
pub struct DeviceNode {
    name: String,
    base_addr: Option<usize>,
    interrupts: Vec<u32>,
}

impl DeviceNode {
    /// Node name (e.g., "ethernet@4033c000")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register window from the `reg` property
    pub fn base_address(&self) -> Option<usize> {
        self.base_addr
    }

    /// Raw cells of the `interrupts` property
    pub fn interrupts(&self) -> Option<&[u32]> {
        if self.interrupts.is_empty() {
            None
        } else {
            Some(&self.interrupts)
        }
    }

    /// GIC interrupt ID of the first interrupt specifier
    pub fn gic_interrupt(&self) -> Option<u32> {
        gic_interrupt_id(self.interrupts.get(..3)?)
    }
}

/// Decode a three-cell GIC interrupt specifier into an interrupt ID
pub fn gic_interrupt_id(cells: &[u32]) -> Option<u32> {
    match cells {
        [0, number, _] => Some(GIC_SPI_BASE + number),
        [1, number, _] => Some(GIC_PPI_BASE + number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_dtb_rejected() {
        assert_eq!(
            HardwareInfo::from_firmware(core::ptr::null()).err(),
            Some("DTB pointer is null")
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let blob = [0u8; FDT_HEADER_LEN];
        assert_eq!(
            HardwareInfo::from_firmware(blob.as_ptr()).err(),
            Some("Invalid DTB magic number")
        );
    }

    #[test]
    fn test_gic_interrupt_decoding() {
        assert_eq!(gic_interrupt_id(&[0, 57, 4]), Some(89));
        assert_eq!(gic_interrupt_id(&[1, 9, 4]), Some(25));
        assert_eq!(gic_interrupt_id(&[2, 9, 4]), None);
        assert_eq!(gic_interrupt_id(&[0, 57]), None);
    }

    #[test]
    fn test_node_accessors() {
        let node = DeviceNode {
            name: "ethernet@4033c000".into(),
            base_addr: Some(0x4033_c000),
            interrupts: alloc::vec![0, 57, 4],
        };
        assert_eq!(node.name(), "ethernet@4033c000");
        assert_eq!(node.base_address(), Some(0x4033_c000));
        assert_eq!(node.gic_interrupt(), Some(89));
    }
}
