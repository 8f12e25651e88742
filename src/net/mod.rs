//! Network-side data types shared between the driver and the host stack

pub mod packet;

pub use packet::{ChecksumOffload, Packet, PacketBuf};
pub use smoltcp::wire::EthernetAddress;
