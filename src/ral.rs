//! Register access layer for the MUSB controller
//!
//! The register block follows the Beken integration of the controller:
//! the standard MUSB common and indexed registers, the dynamic FIFO
//! placement registers, one FIFO port per endpoint, and a small vendor
//! block that configures the PHY.

#![allow(non_snake_case, non_upper_case_globals)]

pub use ral_registers::{read_reg, write_reg, RORegister, RWRegister};

use crate::registers::{Reg16, Reg8, Registers};

/// Number of FIFO ports decoded by the controller
pub const FIFO_PORTS: usize = 16;

#[repr(C)]
pub struct RegisterBlock {
    pub FADDR: RWRegister<u8>,
    pub POWER: RWRegister<u8>,
    pub TXIS: RWRegister<u16>,
    pub RXIS: RWRegister<u16>,
    pub IS: RWRegister<u8>,
    pub TXIEL: RWRegister<u8>,
    pub TXIEH: RWRegister<u8>,
    pub RXIEL: RWRegister<u8>,
    pub RXIEH: RWRegister<u8>,
    pub IE: RWRegister<u8>,
    _reserved0: [u8; 2],
    pub EPIDX: RWRegister<u8>,
    pub DEVCTL: RWRegister<u8>,
    pub TXMAXP: RWRegister<u8>,
    pub TXCSRL: RWRegister<u8>,
    pub TXCSRH: RWRegister<u8>,
    pub RXMAXP: RWRegister<u8>,
    pub RXCSRL: RWRegister<u8>,
    pub RXCSRH: RWRegister<u8>,
    pub RXCOUNT: RORegister<u16>,
    _reserved1: [u8; 4],
    pub TXFIFO1: RWRegister<u8>,
    pub TXFIFO2: RWRegister<u8>,
    pub RXFIFO1: RWRegister<u8>,
    pub RXFIFO2: RWRegister<u8>,
    pub FIFO: [RWRegister<u32>; FIFO_PORTS],
    _reserved2: [u8; 0x20],
    pub OTG_CFG: RWRegister<u8>,
    _reserved3: [u8; 7],
    pub VTH: RWRegister<u8>,
    _reserved4: [u8; 3],
    pub GEN: RWRegister<u8>,
    _reserved5: [u8; 7],
    pub INT: RWRegister<u8>,
    _reserved6: [u8; 7],
    pub DEV_CFG: RWRegister<u8>,
}

const _: [(); 1] = [(); (core::mem::size_of::<RegisterBlock>() == 0xA0) as usize];

/// Field definitions for the FIFO placement registers
///
/// `TXFIFO1` / `RXFIFO1` hold the start address, `TXFIFO2` / `RXFIFO2`
/// hold the size code.
pub mod FIFO2 {
    pub mod SZ {
        pub const offset: u8 = 5;
        pub const mask: u8 = 0b111 << offset;
    }
}

/// Memory-mapped controller registers
pub struct Mmio {
    regs: &'static RegisterBlock,
}

// Safety: the register block is owned by this object, as guaranteed by the
// `Peripherals` implementation that produced it.
unsafe impl Send for Mmio {}

impl Mmio {
    /// Take ownership of the controller registers described by `peripherals`
    pub fn new<P: crate::Peripherals>(peripherals: P) -> Self {
        // Safety: the Peripherals contract promises a valid, owned
        // register block at this address.
        let regs = unsafe { &*(peripherals.usb() as *const RegisterBlock) };
        Mmio { regs }
    }

    fn reg8(&self, reg: Reg8) -> &RWRegister<u8> {
        let r = self.regs;
        match reg {
            Reg8::FAddr => &r.FADDR,
            Reg8::Power => &r.POWER,
            Reg8::IntrUsb => &r.IS,
            Reg8::IntrTxEL => &r.TXIEL,
            Reg8::IntrTxEH => &r.TXIEH,
            Reg8::IntrRxEL => &r.RXIEL,
            Reg8::IntrRxEH => &r.RXIEH,
            Reg8::IntrUsbE => &r.IE,
            Reg8::Index => &r.EPIDX,
            Reg8::DevCtl => &r.DEVCTL,
            Reg8::TxMaxP => &r.TXMAXP,
            Reg8::TxCsrL => &r.TXCSRL,
            Reg8::TxCsrH => &r.TXCSRH,
            Reg8::RxMaxP => &r.RXMAXP,
            Reg8::RxCsrL => &r.RXCSRL,
            Reg8::RxCsrH => &r.RXCSRH,
            Reg8::TxFifoAddr => &r.TXFIFO1,
            Reg8::TxFifoSize => &r.TXFIFO2,
            Reg8::RxFifoAddr => &r.RXFIFO1,
            Reg8::RxFifoSize => &r.RXFIFO2,
            Reg8::OtgCfg => &r.OTG_CFG,
            Reg8::Vth => &r.VTH,
            Reg8::Gen => &r.GEN,
            Reg8::VendorInt => &r.INT,
            Reg8::DevCfg => &r.DEV_CFG,
        }
    }

    /// Word port for endpoint `ep`
    ///
    /// Byte accesses go to the same address; the port decodes the width.
    fn fifo(&self, ep: u8) -> *mut u32 {
        core::ptr::addr_of!(self.regs.FIFO[usize::from(ep)]) as *mut u32
    }
}

impl Registers for Mmio {
    fn read8(&self, reg: Reg8) -> u8 {
        self.reg8(reg).read()
    }

    fn write8(&mut self, reg: Reg8, value: u8) {
        self.reg8(reg).write(value)
    }

    fn read16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::IntrTx => read_reg!(crate::ral, self.regs, TXIS),
            Reg16::IntrRx => read_reg!(crate::ral, self.regs, RXIS),
            Reg16::RxCount => read_reg!(crate::ral, self.regs, RXCOUNT),
        }
    }

    fn write16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::IntrTx => write_reg!(crate::ral, self.regs, TXIS, value),
            Reg16::IntrRx => write_reg!(crate::ral, self.regs, RXIS, value),
            // Read-only
            Reg16::RxCount => {}
        }
    }

    fn fifo_read8(&mut self, ep: u8) -> u8 {
        // Safety: valid FIFO port, owned by this object.
        unsafe { core::ptr::read_volatile(self.fifo(ep) as *const u8) }
    }

    fn fifo_read32(&mut self, ep: u8) -> u32 {
        // Safety: see fifo_read8.
        unsafe { core::ptr::read_volatile(self.fifo(ep)) }
    }

    fn fifo_write8(&mut self, ep: u8, value: u8) {
        // Safety: see fifo_read8.
        unsafe { core::ptr::write_volatile(self.fifo(ep) as *mut u8, value) }
    }

    fn fifo_write32(&mut self, ep: u8, value: u32) {
        // Safety: see fifo_read8.
        unsafe { core::ptr::write_volatile(self.fifo(ep), value) }
    }
}

/// Encode a FIFO placement size code for `TXFIFO2` / `RXFIFO2`
///
/// Returns `None` if the code does not fit the size field.
pub fn fifo_size_field(code: u8) -> Option<u8> {
    let value = (code << FIFO2::SZ::offset) & FIFO2::SZ::mask;
    (value >> FIFO2::SZ::offset == code).then_some(value)
}
