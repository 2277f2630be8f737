//! Endpoint configuration, stalls, and FIFO status

use crate::{
    csr::{Csr0, Musb, RxCsrH, RxCsrL, TxCsrH, TxCsrL},
    driver::Driver,
    ral,
    registers::{Reg8, Registers},
    state::{Ep0Stage, CONTROL_MAX_PACKET_SIZE},
};
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection, UsbError,
};

/// Largest max packet size that the FIFO placement registers can describe
const MAX_FIFO_PACKET: u16 = 1024;

bitflags::bitflags! {
    /// Optional endpoint behaviors
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EndpointFlags : u8 {
        /// IN: the controller arms a packet once the FIFO holds a full one
        const AUTO_SET = 1 << 0;
        /// OUT: the controller clears RX ready once a full packet is read
        const AUTO_CLEAR = 1 << 1;
        /// Enable DMA requests, mode 0
        const DMA_MODE_0 = 1 << 2;
        /// Enable DMA requests, mode 1
        const DMA_MODE_1 = 1 << 3;
        /// OUT: don't respond with NYET to high-speed PING
        const DISABLE_NYET = 1 << 4;
    }
}

/// How to open an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub address: EndpointAddress,
    pub kind: EndpointType,
    /// The `wMaxPacketSize` of the endpoint descriptor
    ///
    /// Only the packet size bits are used.
    pub max_packet_size: u16,
    pub flags: EndpointFlags,
}

impl EndpointConfig {
    pub const fn new(address: EndpointAddress, kind: EndpointType, max_packet_size: u16) -> Self {
        EndpointConfig {
            address,
            kind,
            max_packet_size,
            flags: EndpointFlags::empty(),
        }
    }

    pub const fn with_flags(mut self, flags: EndpointFlags) -> Self {
        self.flags = flags;
        self
    }
}

fn is_iso(kind: EndpointType) -> bool {
    matches!(kind, EndpointType::Isochronous { .. })
}

fn tx_attributes(flags: EndpointFlags, kind: EndpointType) -> TxCsrH {
    let mut csrh = TxCsrH::MODE;
    if flags.contains(EndpointFlags::AUTO_SET) {
        csrh |= TxCsrH::AUTO_SET;
    }
    if flags.contains(EndpointFlags::DMA_MODE_0) {
        csrh |= TxCsrH::DMA_ENABLE;
    }
    if flags.contains(EndpointFlags::DMA_MODE_1) {
        csrh |= TxCsrH::DMA_ENABLE | TxCsrH::DMA_MODE;
    }
    if is_iso(kind) {
        csrh |= TxCsrH::ISO;
    }
    csrh
}

fn rx_attributes(flags: EndpointFlags, kind: EndpointType) -> RxCsrH {
    let mut csrh = RxCsrH::empty();
    if flags.contains(EndpointFlags::AUTO_CLEAR) {
        csrh |= RxCsrH::AUTO_CLEAR;
    }
    if flags.contains(EndpointFlags::DMA_MODE_0) {
        csrh |= RxCsrH::DMA_ENABLE;
    }
    if flags.contains(EndpointFlags::DMA_MODE_1) {
        csrh |= RxCsrH::DMA_ENABLE | RxCsrH::DMA_MODE;
    }
    if flags.contains(EndpointFlags::DISABLE_NYET) {
        csrh |= RxCsrH::DISABLE_NYET;
    }
    if is_iso(kind) {
        csrh |= RxCsrH::ISO;
    }
    csrh
}

impl<R: Registers, const EP_COUNT: usize> Driver<R, EP_COUNT> {
    /// Returns the endpoint index, or an error if the driver doesn't
    /// manage that endpoint
    pub(crate) fn check_index(&self, ep_addr: EndpointAddress) -> Result<u8, UsbError> {
        let index = ep_addr.index();
        if index < EP_COUNT {
            Ok(index as u8)
        } else {
            Err(UsbError::InvalidEndpoint)
        }
    }

    /// Open an endpoint
    ///
    /// Opening endpoint 0, in either direction, configures both directions
    /// as the control endpoint. Any other endpoint is given its own slice of
    /// the FIFO, and its data toggle is reset.
    ///
    /// Returns `InvalidEndpoint` if the driver doesn't manage the endpoint, or
    /// `EndpointMemoryOverflow` if there's no FIFO space for the packet size.
    pub fn open(&mut self, config: EndpointConfig) -> usb_device::Result<()> {
        let index = self.check_index(config.address)?;
        if index == 0 {
            let (out_ep, in_ep) = self.endpoints.control_mut();
            out_ep.open(EndpointType::Control, CONTROL_MAX_PACKET_SIZE);
            in_ep.open(EndpointType::Control, CONTROL_MAX_PACKET_SIZE);
            return Ok(());
        }

        let max_packet_size = config.max_packet_size & 0x7FF;
        if max_packet_size > MAX_FIFO_PACKET {
            return Err(UsbError::EndpointMemoryOverflow);
        }
        let allocation = self
            .fifo
            .allocate(usize::from(max_packet_size))
            .ok_or(UsbError::EndpointMemoryOverflow)?;
        let size = ral::fifo_size_field(allocation.size_code())
            .ok_or(UsbError::EndpointMemoryOverflow)?;
        let address = (allocation.offset >> 3) as u8;
        let max_packet = (max_packet_size >> 3) as u8;

        self.with_selected(index, |driver| {
            let usb = &mut driver.usb;
            match config.address.direction() {
                UsbDirection::Out => {
                    usb.write8(Reg8::RxMaxP, max_packet);
                    usb.write_rx_csrh(rx_attributes(config.flags, config.kind));
                    if usb.rx_csrl().contains(RxCsrL::RX_READY) {
                        usb.write_rx_csrl(RxCsrL::CLEAR_DATA_TOGGLE | RxCsrL::FLUSH_FIFO);
                    } else {
                        usb.write_rx_csrl(RxCsrL::CLEAR_DATA_TOGGLE);
                    }
                    usb.write8(Reg8::RxFifoAddr, address);
                    usb.write8(Reg8::RxFifoSize, size);
                }
                UsbDirection::In => {
                    usb.write8(Reg8::TxMaxP, max_packet);
                    usb.write_tx_csrh(tx_attributes(config.flags, config.kind));
                    if usb.tx_csrl().contains(TxCsrL::TX_READY) {
                        usb.write_tx_csrl(TxCsrL::CLEAR_DATA_TOGGLE | TxCsrL::FLUSH_FIFO);
                    } else {
                        usb.write_tx_csrl(TxCsrL::CLEAR_DATA_TOGGLE);
                    }
                    usb.write8(Reg8::TxFifoAddr, address);
                    usb.write8(Reg8::TxFifoSize, size);
                }
            }
        });

        if let Some(ep) = self.endpoints.get_mut(config.address) {
            ep.open(config.kind, max_packet_size);
        }
        debug!(
            "EP{} {} OPEN MPS {} FIFO {}+{}",
            index,
            config.address,
            max_packet_size,
            allocation.offset,
            allocation.size
        );
        Ok(())
    }

    /// Close an endpoint
    ///
    /// The endpoint's interrupt is masked and any transfer is abandoned.
    /// Its FIFO space is not reclaimed until the next bus reset. Closing
    /// endpoint 0 does nothing.
    pub fn close(&mut self, ep_addr: EndpointAddress) -> usb_device::Result<()> {
        let index = self.check_index(ep_addr)?;
        if index == 0 {
            return Ok(());
        }
        match ep_addr.direction() {
            UsbDirection::Out => self.usb.set_rx_interrupt(index, false),
            UsbDirection::In => self.usb.set_tx_interrupt(index, false),
        }
        if let Some(ep) = self.endpoints.get_mut(ep_addr) {
            ep.close();
        }
        debug!("EP{} {} CLOSE", index, ep_addr);
        Ok(())
    }

    /// Stall an endpoint
    ///
    /// Stalling either direction of endpoint 0 stalls the control transfer.
    /// The control endpoint recovers on its own once the stall is sent.
    pub fn set_stall(&mut self, ep_addr: EndpointAddress) -> usb_device::Result<()> {
        let index = self.check_index(ep_addr)?;
        self.with_selected(index, |driver| {
            if index == 0 {
                driver.ep0_stage = Ep0Stage::Stalled;
                driver
                    .usb
                    .modify_csr0(|csr0| csr0 | Csr0::SEND_STALL | Csr0::SERVICED_RX_READY);
            } else {
                match ep_addr.direction() {
                    UsbDirection::Out => driver
                        .usb
                        .modify_rx_csrl(|csr| csr | RxCsrL::SEND_STALL),
                    UsbDirection::In => driver
                        .usb
                        .modify_tx_csrl(|csr| csr | TxCsrL::SEND_STALL),
                }
            }
        });
        if let Some(ep) = self.endpoints.get_mut(ep_addr) {
            ep.set_stalled(true);
        }
        debug!("EP{} {} STALL", index, ep_addr);
        Ok(())
    }

    /// Clear an endpoint's stall
    ///
    /// For endpoints other than endpoint 0, this also resets the data toggle.
    /// A stalled control transfer goes back to waiting for a SETUP.
    pub fn clear_stall(&mut self, ep_addr: EndpointAddress) -> usb_device::Result<()> {
        let index = self.check_index(ep_addr)?;
        self.with_selected(index, |driver| {
            if index == 0 {
                driver
                    .usb
                    .modify_csr0(|csr0| csr0 - (Csr0::SEND_STALL | Csr0::SENT_STALL));
                if driver.ep0_stage == Ep0Stage::Stalled {
                    driver.ep0_stage = Ep0Stage::Setup;
                }
                return;
            }
            let usb = &mut driver.usb;
            match ep_addr.direction() {
                UsbDirection::Out => {
                    usb.modify_rx_csrl(|csr| csr - (RxCsrL::SEND_STALL | RxCsrL::SENT_STALL));
                    usb.modify_rx_csrl(|csr| csr | RxCsrL::CLEAR_DATA_TOGGLE);
                }
                UsbDirection::In => {
                    usb.modify_tx_csrl(|csr| csr - (TxCsrL::SEND_STALL | TxCsrL::SENT_STALL));
                    usb.modify_tx_csrl(|csr| csr | TxCsrL::CLEAR_DATA_TOGGLE);
                }
            }
        });
        if let Some(ep) = self.endpoints.get_mut(ep_addr) {
            ep.set_stalled(false);
        }
        debug!("EP{} {} UNSTALL", index, ep_addr);
        Ok(())
    }

    /// Indicates if the endpoint is stalled
    ///
    /// For endpoint 0, that's whether the control transfer is stalled. For
    /// other endpoints, that's whether the controller is sending stalls.
    pub fn is_stalled(&mut self, ep_addr: EndpointAddress) -> usb_device::Result<bool> {
        let index = self.check_index(ep_addr)?;
        if index == 0 {
            return Ok(self.ep0_stage == Ep0Stage::Stalled);
        }
        Ok(self.with_selected(index, |driver| match ep_addr.direction() {
            UsbDirection::Out => driver.usb.rx_csrl().contains(RxCsrL::SEND_STALL),
            UsbDirection::In => driver.usb.tx_csrl().contains(TxCsrL::SEND_STALL),
        }))
    }

    /// Returns the size of the packet waiting in an OUT endpoint's FIFO
    ///
    /// Returns 0 if no packet is waiting.
    pub fn out_data_avail(&mut self, ep_addr: EndpointAddress) -> usb_device::Result<usize> {
        let index = self.check_index(ep_addr)?;
        Ok(self.with_selected(index, |driver| {
            let ready = if index == 0 {
                driver.usb.csr0().contains(Csr0::RX_READY)
            } else {
                driver.usb.rx_csrl().contains(RxCsrL::RX_READY)
            };
            if ready {
                usize::from(driver.usb.rx_count())
            } else {
                0
            }
        }))
    }

    /// Returns how many bytes an IN endpoint's FIFO accepts right now
    ///
    /// That's one max packet when the FIFO is free, and 0 while a packet is
    /// still waiting for the host.
    pub fn in_data_avail(&mut self, ep_addr: EndpointAddress) -> usb_device::Result<usize> {
        let index = self.check_index(ep_addr)?;
        let busy = self.with_selected(index, |driver| driver.tx_busy(index));
        if busy {
            return Ok(0);
        }
        Ok(self
            .endpoints
            .in_ep_mut(usize::from(index))
            .max_packet_size()
            .into())
    }

    /// Indicates if endpoint `index`, which must be selected, holds an armed
    /// IN packet
    pub(crate) fn tx_busy(&self, index: u8) -> bool {
        if index == 0 {
            self.usb.csr0().contains(Csr0::TX_READY)
        } else {
            self.usb.tx_csrl().contains(TxCsrL::TX_READY)
        }
    }
}
