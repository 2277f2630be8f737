//! A behavioral model of the controller, for tests
//!
//! The model keeps enough MUSB semantics to exercise the driver:
//! RX ready and RX count follow queued host packets, interrupt status
//! is write-one-to-clear, `CSR0` honors its serviced bits, and flush or
//! data-toggle actions are counted instead of stored. Every write is
//! logged with the endpoint selected at the time.

use crate::csr::{Csr0, RxCsrL, TxCsrL};
use crate::registers::{Reg16, Reg8, Registers};
use std::{collections::VecDeque, vec::Vec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Write {
    Byte { index: u8, reg: Reg8, value: u8 },
    Half { reg: Reg16, value: u16 },
}

#[derive(Default)]
pub struct EndpointRegs {
    pub tx_maxp: u8,
    pub tx_csrl: u8,
    pub tx_csrh: u8,
    pub rx_maxp: u8,
    pub rx_csrl: u8,
    pub rx_csrh: u8,
    pub tx_fifo_addr: u8,
    pub tx_fifo_size: u8,
    pub rx_fifo_addr: u8,
    pub rx_fifo_size: u8,
    /// Host packets waiting in the RX FIFO, oldest first
    pub rx_packets: VecDeque<VecDeque<u8>>,
    /// Bytes loaded into the TX FIFO and not yet taken by the host
    pub tx_fifo: Vec<u8>,
    /// Packets taken by the host
    pub sent: Vec<Vec<u8>>,
    pub toggle_clears: usize,
    pub flushes: usize,
}

#[derive(Default)]
pub struct Mock {
    pub faddr: u8,
    pub power: u8,
    pub intr_usb: u8,
    pub intr_usb_e: u8,
    pub intr_tx: u16,
    pub intr_rx: u16,
    pub intr_tx_e: [u8; 2],
    pub intr_rx_e: [u8; 2],
    pub index: u8,
    pub devctl: u8,
    pub otg_cfg: u8,
    pub vth: u8,
    pub gen: u8,
    pub vendor_int: u8,
    pub dev_cfg: u8,
    pub eps: [EndpointRegs; 16],
    pub writes: Vec<Write>,
    pub fifo_word_accesses: usize,
    pub fifo_byte_accesses: usize,
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    fn ep(&self) -> &EndpointRegs {
        &self.eps[usize::from(self.index)]
    }

    fn ep_mut(&mut self) -> &mut EndpointRegs {
        &mut self.eps[usize::from(self.index)]
    }

    /// The host sends a SETUP packet to endpoint 0
    pub fn host_setup(&mut self, packet: [u8; 8]) {
        self.host_out(0, &packet);
    }

    /// The host sends an OUT packet
    pub fn host_out(&mut self, ep: u8, data: &[u8]) {
        self.eps[usize::from(ep)]
            .rx_packets
            .push_back(data.iter().copied().collect());
        if ep == 0 {
            self.intr_tx |= 1;
        } else {
            self.intr_rx |= 1 << ep;
        }
    }

    /// The host takes an armed IN packet, if there is one
    pub fn host_in(&mut self, ep: u8) -> Option<Vec<u8>> {
        let regs = &mut self.eps[usize::from(ep)];
        let ready = if ep == 0 {
            Csr0::TX_READY.bits()
        } else {
            TxCsrL::TX_READY.bits()
        };
        if regs.tx_csrl & ready == 0 {
            return None;
        }
        regs.tx_csrl &= !ready;
        if ep == 0 {
            regs.tx_csrl &= !Csr0::DATA_END.bits();
        }
        let packet = core::mem::take(&mut regs.tx_fifo);
        regs.sent.push(packet.clone());
        self.intr_tx |= 1 << ep;
        Some(packet)
    }

    /// Endpoint 0 finished a stage without moving data
    pub fn ep0_event(&mut self) {
        self.intr_tx |= 1;
    }

    /// Set bits in `CSR0` the way the controller would
    pub fn raise_csr0(&mut self, bits: Csr0) {
        self.eps[0].tx_csrl |= bits.bits();
        self.intr_tx |= 1;
    }

    pub fn bus_event(&mut self, events: crate::csr::IntrUsb) {
        self.intr_usb |= events.bits();
    }

    pub fn take_writes(&mut self) -> Vec<Write> {
        core::mem::take(&mut self.writes)
    }

    /// Writes to one 8-bit register, in order
    pub fn writes_to(&self, index: u8, reg: Reg8) -> Vec<u8> {
        self.writes
            .iter()
            .filter_map(|write| match *write {
                Write::Byte {
                    index: i,
                    reg: r,
                    value,
                } if i == index && r == reg => Some(value),
                _ => None,
            })
            .collect()
    }

    fn rx_ready(&self) -> bool {
        !self.ep().rx_packets.is_empty()
    }

    fn write_csr0(&mut self, value: u8) {
        let old = Csr0::from_bits_retain(self.eps[0].tx_csrl);
        let value = Csr0::from_bits_retain(value);
        let mut new = (old & (Csr0::TX_READY | Csr0::DATA_END | Csr0::SETUP_END))
            | (value & (Csr0::TX_READY | Csr0::DATA_END | Csr0::SEND_STALL))
            | (old & value & Csr0::SENT_STALL);
        if value.contains(Csr0::SERVICED_RX_READY) {
            self.eps[0].rx_packets.pop_front();
        }
        if value.contains(Csr0::SERVICED_SETUP_END) {
            new.remove(Csr0::SETUP_END);
        }
        self.eps[0].tx_csrl = new.bits();
    }

    fn write_tx_csrl(&mut self, value: u8) {
        let ep = self.ep_mut();
        let old = TxCsrL::from_bits_retain(ep.tx_csrl);
        let value = TxCsrL::from_bits_retain(value);
        let mut new = (old & TxCsrL::TX_READY)
            | (value & (TxCsrL::TX_READY | TxCsrL::SEND_STALL))
            | (old & value & (TxCsrL::UNDERRUN | TxCsrL::SENT_STALL));
        if value.contains(TxCsrL::CLEAR_DATA_TOGGLE) {
            ep.toggle_clears += 1;
        }
        if value.contains(TxCsrL::FLUSH_FIFO) {
            ep.flushes += 1;
            ep.tx_fifo.clear();
            new.remove(TxCsrL::TX_READY);
        }
        ep.tx_csrl = new.bits();
    }

    fn write_rx_csrl(&mut self, value: u8) {
        let ep = self.ep_mut();
        let old = RxCsrL::from_bits_retain(ep.rx_csrl);
        let value = RxCsrL::from_bits_retain(value);
        let new = (value & RxCsrL::SEND_STALL)
            | (old & value & (RxCsrL::OVERRUN | RxCsrL::DATA_ERROR | RxCsrL::SENT_STALL));
        if value.contains(RxCsrL::CLEAR_DATA_TOGGLE) {
            ep.toggle_clears += 1;
        }
        let released = if value.contains(RxCsrL::FLUSH_FIFO) {
            ep.flushes += 1;
            ep.rx_packets.pop_front().is_some()
        } else if !value.contains(RxCsrL::RX_READY) {
            ep.rx_packets.pop_front().is_some()
        } else {
            false
        };
        ep.rx_csrl = new.bits();
        let waiting = !ep.rx_packets.is_empty();
        // The second FIFO packet raises its own interrupt.
        if released && waiting {
            self.intr_rx |= 1 << self.index;
        }
    }

    fn pop_rx(&mut self, ep: u8) -> u8 {
        self.eps[usize::from(ep)]
            .rx_packets
            .front_mut()
            .and_then(VecDeque::pop_front)
            .unwrap_or(0)
    }
}

impl Registers for Mock {
    fn read8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::FAddr => self.faddr,
            Reg8::Power => self.power,
            Reg8::IntrUsb => self.intr_usb,
            Reg8::IntrTxEL => self.intr_tx_e[0],
            Reg8::IntrTxEH => self.intr_tx_e[1],
            Reg8::IntrRxEL => self.intr_rx_e[0],
            Reg8::IntrRxEH => self.intr_rx_e[1],
            Reg8::IntrUsbE => self.intr_usb_e,
            Reg8::Index => self.index,
            Reg8::DevCtl => self.devctl,
            Reg8::TxMaxP => self.ep().tx_maxp,
            Reg8::TxCsrL if self.index == 0 => {
                let ready = if self.rx_ready() {
                    Csr0::RX_READY.bits()
                } else {
                    0
                };
                self.ep().tx_csrl | ready
            }
            Reg8::TxCsrL => self.ep().tx_csrl,
            Reg8::TxCsrH => self.ep().tx_csrh,
            Reg8::RxMaxP => self.ep().rx_maxp,
            Reg8::RxCsrL => {
                let ready = if self.rx_ready() {
                    RxCsrL::RX_READY.bits()
                } else {
                    0
                };
                self.ep().rx_csrl | ready
            }
            Reg8::RxCsrH => self.ep().rx_csrh,
            Reg8::TxFifoAddr => self.ep().tx_fifo_addr,
            Reg8::TxFifoSize => self.ep().tx_fifo_size,
            Reg8::RxFifoAddr => self.ep().rx_fifo_addr,
            Reg8::RxFifoSize => self.ep().rx_fifo_size,
            Reg8::OtgCfg => self.otg_cfg,
            Reg8::Vth => self.vth,
            Reg8::Gen => self.gen,
            Reg8::VendorInt => self.vendor_int,
            Reg8::DevCfg => self.dev_cfg,
        }
    }

    fn write8(&mut self, reg: Reg8, value: u8) {
        self.writes.push(Write::Byte {
            index: self.index,
            reg,
            value,
        });
        match reg {
            Reg8::FAddr => self.faddr = value,
            Reg8::Power => self.power = value,
            Reg8::IntrUsb => self.intr_usb &= !value,
            Reg8::IntrTxEL => self.intr_tx_e[0] = value,
            Reg8::IntrTxEH => self.intr_tx_e[1] = value,
            Reg8::IntrRxEL => self.intr_rx_e[0] = value,
            Reg8::IntrRxEH => self.intr_rx_e[1] = value,
            Reg8::IntrUsbE => self.intr_usb_e = value,
            Reg8::Index => self.index = value,
            Reg8::DevCtl => self.devctl = value,
            Reg8::TxMaxP => self.ep_mut().tx_maxp = value,
            Reg8::TxCsrL if self.index == 0 => self.write_csr0(value),
            Reg8::TxCsrL => self.write_tx_csrl(value),
            Reg8::TxCsrH => self.ep_mut().tx_csrh = value,
            Reg8::RxMaxP => self.ep_mut().rx_maxp = value,
            Reg8::RxCsrL => self.write_rx_csrl(value),
            Reg8::RxCsrH => self.ep_mut().rx_csrh = value,
            Reg8::TxFifoAddr => self.ep_mut().tx_fifo_addr = value,
            Reg8::TxFifoSize => self.ep_mut().tx_fifo_size = value,
            Reg8::RxFifoAddr => self.ep_mut().rx_fifo_addr = value,
            Reg8::RxFifoSize => self.ep_mut().rx_fifo_size = value,
            Reg8::OtgCfg => self.otg_cfg = value,
            Reg8::Vth => self.vth = value,
            Reg8::Gen => self.gen = value,
            Reg8::VendorInt => self.vendor_int &= !value,
            Reg8::DevCfg => self.dev_cfg = value,
        }
    }

    fn read16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::IntrTx => self.intr_tx,
            Reg16::IntrRx => self.intr_rx,
            Reg16::RxCount => self
                .ep()
                .rx_packets
                .front()
                .map_or(0, |packet| packet.len() as u16),
        }
    }

    fn write16(&mut self, reg: Reg16, value: u16) {
        self.writes.push(Write::Half { reg, value });
        match reg {
            Reg16::IntrTx => self.intr_tx &= !value,
            Reg16::IntrRx => self.intr_rx &= !value,
            Reg16::RxCount => {}
        }
    }

    fn fifo_read8(&mut self, ep: u8) -> u8 {
        self.fifo_byte_accesses += 1;
        self.pop_rx(ep)
    }

    fn fifo_read32(&mut self, ep: u8) -> u32 {
        self.fifo_word_accesses += 1;
        u32::from_le_bytes([
            self.pop_rx(ep),
            self.pop_rx(ep),
            self.pop_rx(ep),
            self.pop_rx(ep),
        ])
    }

    fn fifo_write8(&mut self, ep: u8, value: u8) {
        self.fifo_byte_accesses += 1;
        self.eps[usize::from(ep)].tx_fifo.push(value);
    }

    fn fifo_write32(&mut self, ep: u8, value: u32) {
        self.fifo_word_accesses += 1;
        self.eps[usize::from(ep)]
            .tx_fifo
            .extend_from_slice(&value.to_le_bytes());
    }
}
