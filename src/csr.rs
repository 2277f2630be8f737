//! Typed register fields
//!
//! Bit definitions for the MUSB control and status registers, and a
//! [`Musb`] extension trait that reads and writes them by name on any
//! [`Registers`] implementation.

use crate::registers::{Reg16, Reg8, Registers};

bitflags::bitflags! {
    /// `POWER`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Power : u8 {
        const ISO_UPDATE = 1 << 7;
        const SOFT_CONN = 1 << 6;
        const HS_ENABLE = 1 << 5;
        const HS_MODE = 1 << 4;
        const RESET = 1 << 3;
        const RESUME = 1 << 2;
        const SUSPEND = 1 << 1;
        const ENABLE_SUSPEND = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `IS` and `IE`: bus events
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IntrUsb : u8 {
        const VBUS_ERROR = 1 << 7;
        const SESSION_REQUEST = 1 << 6;
        const DISCONNECT = 1 << 5;
        const CONNECT = 1 << 4;
        const SOF = 1 << 3;
        const RESET = 1 << 2;
        const RESUME = 1 << 1;
        const SUSPEND = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `DEVCTL`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DevCtl : u8 {
        const B_DEVICE = 1 << 7;
        const FS_DEVICE = 1 << 6;
        const LS_DEVICE = 1 << 5;
        const HOST_MODE = 1 << 2;
        const HOST_REQUEST = 1 << 1;
        const SESSION = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `CSR0`, the endpoint 0 view of `TXCSRL`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Csr0 : u8 {
        /// Write 1 to clear `SETUP_END`
        const SERVICED_SETUP_END = 1 << 7;
        /// Write 1 to clear `RX_READY`
        const SERVICED_RX_READY = 1 << 6;
        const SEND_STALL = 1 << 5;
        const SETUP_END = 1 << 4;
        const DATA_END = 1 << 3;
        const SENT_STALL = 1 << 2;
        const TX_READY = 1 << 1;
        const RX_READY = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `TXCSRL`, endpoints 1 and up
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TxCsrL : u8 {
        const CLEAR_DATA_TOGGLE = 1 << 6;
        const SENT_STALL = 1 << 5;
        const SEND_STALL = 1 << 4;
        const FLUSH_FIFO = 1 << 3;
        const UNDERRUN = 1 << 2;
        const FIFO_NOT_EMPTY = 1 << 1;
        const TX_READY = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `TXCSRH`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TxCsrH : u8 {
        const AUTO_SET = 1 << 7;
        const ISO = 1 << 6;
        /// Set for TX, clear for RX, on endpoints sharing a FIFO
        const MODE = 1 << 5;
        const DMA_ENABLE = 1 << 4;
        const FORCE_DATA_TOGGLE = 1 << 3;
        const DMA_MODE = 1 << 2;
    }
}

bitflags::bitflags! {
    /// `RXCSRL`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RxCsrL : u8 {
        const CLEAR_DATA_TOGGLE = 1 << 7;
        const SENT_STALL = 1 << 6;
        const SEND_STALL = 1 << 5;
        const FLUSH_FIFO = 1 << 4;
        const DATA_ERROR = 1 << 3;
        const OVERRUN = 1 << 2;
        const FIFO_FULL = 1 << 1;
        const RX_READY = 1 << 0;
    }
}

bitflags::bitflags! {
    /// `RXCSRH`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RxCsrH : u8 {
        const AUTO_CLEAR = 1 << 7;
        const ISO = 1 << 6;
        const DMA_ENABLE = 1 << 5;
        const DISABLE_NYET = 1 << 4;
        const DMA_MODE = 1 << 3;
    }
}

/// Named, typed access to MUSB registers
///
/// Every method is exactly one register access, except the `modify_*`
/// methods, which are one read followed by one write.
pub trait Musb: Registers {
    fn selected(&self) -> u8 {
        self.read8(Reg8::Index)
    }
    fn select(&mut self, ep: u8) {
        self.write8(Reg8::Index, ep)
    }

    fn power(&self) -> Power {
        Power::from_bits_retain(self.read8(Reg8::Power))
    }
    fn write_power(&mut self, power: Power) {
        self.write8(Reg8::Power, power.bits())
    }
    fn modify_power(&mut self, f: impl FnOnce(Power) -> Power) {
        let power = self.power();
        self.write_power(f(power))
    }

    fn dev_ctl(&self) -> DevCtl {
        DevCtl::from_bits_retain(self.read8(Reg8::DevCtl))
    }
    fn modify_dev_ctl(&mut self, f: impl FnOnce(DevCtl) -> DevCtl) {
        let devctl = self.dev_ctl();
        self.write8(Reg8::DevCtl, f(devctl).bits())
    }

    fn intr_usb(&self) -> IntrUsb {
        IntrUsb::from_bits_retain(self.read8(Reg8::IntrUsb))
    }
    fn clear_intr_usb(&mut self, events: IntrUsb) {
        self.write8(Reg8::IntrUsb, events.bits())
    }
    fn write_intr_usb_enable(&mut self, events: IntrUsb) {
        self.write8(Reg8::IntrUsbE, events.bits())
    }

    fn intr_tx(&self) -> u16 {
        self.read16(Reg16::IntrTx)
    }
    fn clear_intr_tx(&mut self, mask: u16) {
        self.write16(Reg16::IntrTx, mask)
    }
    fn intr_rx(&self) -> u16 {
        self.read16(Reg16::IntrRx)
    }
    fn clear_intr_rx(&mut self, mask: u16) {
        self.write16(Reg16::IntrRx, mask)
    }

    /// TX interrupt enables, one bit per endpoint
    fn intr_tx_enable(&self) -> u16 {
        u16::from_le_bytes([self.read8(Reg8::IntrTxEL), self.read8(Reg8::IntrTxEH)])
    }
    fn write_intr_tx_enable(&mut self, mask: u16) {
        let [lo, hi] = mask.to_le_bytes();
        self.write8(Reg8::IntrTxEL, lo);
        self.write8(Reg8::IntrTxEH, hi);
    }
    /// RX interrupt enables, one bit per endpoint
    fn intr_rx_enable(&self) -> u16 {
        u16::from_le_bytes([self.read8(Reg8::IntrRxEL), self.read8(Reg8::IntrRxEH)])
    }
    fn write_intr_rx_enable(&mut self, mask: u16) {
        let [lo, hi] = mask.to_le_bytes();
        self.write8(Reg8::IntrRxEL, lo);
        self.write8(Reg8::IntrRxEH, hi);
    }

    /// Set or clear endpoint `ep`'s TX interrupt enable
    ///
    /// Only the half of the enable register holding `ep` is touched.
    fn set_tx_interrupt(&mut self, ep: u8, enable: bool) {
        let reg = if ep < 8 { Reg8::IntrTxEL } else { Reg8::IntrTxEH };
        update_bit(self, reg, ep % 8, enable)
    }
    /// Set or clear endpoint `ep`'s RX interrupt enable
    fn set_rx_interrupt(&mut self, ep: u8, enable: bool) {
        let reg = if ep < 8 { Reg8::IntrRxEL } else { Reg8::IntrRxEH };
        update_bit(self, reg, ep % 8, enable)
    }

    fn csr0(&self) -> Csr0 {
        Csr0::from_bits_retain(self.read8(Reg8::TxCsrL))
    }
    fn write_csr0(&mut self, csr0: Csr0) {
        self.write8(Reg8::TxCsrL, csr0.bits())
    }
    fn modify_csr0(&mut self, f: impl FnOnce(Csr0) -> Csr0) {
        let csr0 = self.csr0();
        self.write_csr0(f(csr0))
    }

    fn tx_csrl(&self) -> TxCsrL {
        TxCsrL::from_bits_retain(self.read8(Reg8::TxCsrL))
    }
    fn write_tx_csrl(&mut self, csr: TxCsrL) {
        self.write8(Reg8::TxCsrL, csr.bits())
    }
    fn modify_tx_csrl(&mut self, f: impl FnOnce(TxCsrL) -> TxCsrL) {
        let csr = self.tx_csrl();
        self.write_tx_csrl(f(csr))
    }
    fn write_tx_csrh(&mut self, csr: TxCsrH) {
        self.write8(Reg8::TxCsrH, csr.bits())
    }

    fn rx_csrl(&self) -> RxCsrL {
        RxCsrL::from_bits_retain(self.read8(Reg8::RxCsrL))
    }
    fn write_rx_csrl(&mut self, csr: RxCsrL) {
        self.write8(Reg8::RxCsrL, csr.bits())
    }
    fn modify_rx_csrl(&mut self, f: impl FnOnce(RxCsrL) -> RxCsrL) {
        let csr = self.rx_csrl();
        self.write_rx_csrl(f(csr))
    }
    fn write_rx_csrh(&mut self, csr: RxCsrH) {
        self.write8(Reg8::RxCsrH, csr.bits())
    }

    fn rx_count(&self) -> u16 {
        self.read16(Reg16::RxCount)
    }
}

impl<R: Registers + ?Sized> Musb for R {}

fn update_bit<R: Registers + ?Sized>(usb: &mut R, reg: Reg8, bit: u8, set: bool) {
    let value = usb.read8(reg);
    let value = if set {
        value | (1 << bit)
    } else {
        value & !(1 << bit)
    };
    usb.write8(reg, value);
}
