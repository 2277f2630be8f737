//! The register capability set
//!
//! Everything the driver does to the peripheral goes through [`Registers`].
//! The MMIO implementation lives in [`ral`](crate::ral); tests supply a
//! behavioral model instead.
//!
//! Registers marked *indexed* are a window onto the endpoint chosen by
//! [`Reg8::Index`]. Reading or writing them affects whichever endpoint is
//! currently selected.

/// 8-bit controller registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Reg8 {
    /// Function (device) address
    FAddr,
    /// Power management and soft-connect
    Power,
    /// Bus-event interrupt status
    IntrUsb,
    /// TX interrupt enables, endpoints 0 to 7
    IntrTxEL,
    /// TX interrupt enables, endpoints 8 to 15
    IntrTxEH,
    /// RX interrupt enables, endpoints 0 to 7
    IntrRxEL,
    /// RX interrupt enables, endpoints 8 to 15
    IntrRxEH,
    /// Bus-event interrupt enables
    IntrUsbE,
    /// Endpoint selection
    Index,
    /// Device control
    DevCtl,
    /// TX max packet size, in units of eight bytes (indexed)
    TxMaxP,
    /// TX control / status, low byte. `CSR0` for endpoint 0 (indexed)
    TxCsrL,
    /// TX control / status, high byte (indexed)
    TxCsrH,
    /// RX max packet size, in units of eight bytes (indexed)
    RxMaxP,
    /// RX control / status, low byte (indexed)
    RxCsrL,
    /// RX control / status, high byte (indexed)
    RxCsrH,
    /// TX FIFO start address, in units of eight bytes (indexed)
    TxFifoAddr,
    /// TX FIFO size code (indexed)
    TxFifoSize,
    /// RX FIFO start address, in units of eight bytes (indexed)
    RxFifoAddr,
    /// RX FIFO size code (indexed)
    RxFifoSize,
    /// Vendor OTG configuration
    OtgCfg,
    /// Vendor VBUS threshold and interrupt control
    Vth,
    /// Vendor PHY general settings (drive strength)
    Gen,
    /// Vendor interrupt status
    VendorInt,
    /// Vendor device configuration
    DevCfg,
}

/// 16-bit controller registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Reg16 {
    /// TX (and EP0) interrupt status, one bit per endpoint
    IntrTx,
    /// RX interrupt status, one bit per endpoint
    IntrRx,
    /// Received byte count of the packet in the RX FIFO (indexed)
    RxCount,
}

/// Access to a MUSB register file and its FIFO ports
///
/// Implementations perform each access exactly once, in call order.
/// Interrupt status registers are write-one-to-clear.
pub trait Registers {
    /// Read an 8-bit register
    fn read8(&self, reg: Reg8) -> u8;
    /// Write an 8-bit register
    fn write8(&mut self, reg: Reg8, value: u8);
    /// Read a 16-bit register
    fn read16(&self, reg: Reg16) -> u16;
    /// Write a 16-bit register
    fn write16(&mut self, reg: Reg16, value: u16);

    /// Pop one byte from endpoint `ep`'s FIFO
    fn fifo_read8(&mut self, ep: u8) -> u8;
    /// Pop one little-endian word from endpoint `ep`'s FIFO
    fn fifo_read32(&mut self, ep: u8) -> u32;
    /// Push one byte into endpoint `ep`'s FIFO
    fn fifo_write8(&mut self, ep: u8, value: u8);
    /// Push one little-endian word into endpoint `ep`'s FIFO
    fn fifo_write32(&mut self, ep: u8, value: u32);
}
