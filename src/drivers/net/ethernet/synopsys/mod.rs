//! Synopsys DesignWare Ethernet controllers

pub mod dwceqos;
