//! Transfers started by the caller
//!
//! `start_read` and `start_write` begin multi-packet transfers that the
//! interrupt handler finishes. `read_packet` and `write_packet` move one
//! packet right away.

use crate::{
    csr::{Csr0, Musb, RxCsrL, TxCsrL},
    driver::Driver,
    events::Events,
    fifo,
    registers::Registers,
    state::{in_address, out_address, Ep0Stage},
    time::Monotonic,
};
use usb_device::{endpoint::EndpointAddress, UsbError};

/// Most packets moved by one drain of an OUT endpoint
///
/// The FIFO holds at most two packets per endpoint. Seeing RX ready more
/// often than this means the controller is stuck.
pub const DRAIN_LIMIT: usize = 8;

/// Most FIFO polls made by [`wait_in_data_avail()`](Driver::wait_in_data_avail)
pub const MAX_POLL_ITERATIONS: u32 = 3000;

impl<R: Registers, const EP_COUNT: usize> Driver<R, EP_COUNT> {
    /// Start sending `data` on an IN endpoint
    ///
    /// The first packet is loaded now. The interrupt handler loads the rest,
    /// and signals [`on_in_complete()`](Events::on_in_complete) when every
    /// byte is sent. An empty `data` sends a zero-length packet.
    ///
    /// On endpoint 0, this sends the data stage of a control read, or the
    /// status stage of a control write.
    ///
    /// Returns `InvalidEndpoint` if the driver doesn't manage the endpoint,
    /// `InvalidState` if the endpoint isn't open, or `WouldBlock` if the
    /// endpoint still holds a packet for the host.
    ///
    /// # Safety
    ///
    /// `data` must stay valid, and must not be modified, until the transfer
    /// completes, or until the endpoint is reset, closed, or stalled.
    pub unsafe fn start_write(
        &mut self,
        ep_addr: EndpointAddress,
        data: &[u8],
    ) -> usb_device::Result<()> {
        let index = self.check_index(ep_addr)?;
        if !self.endpoints.in_ep_mut(usize::from(index)).is_enabled() {
            return Err(UsbError::InvalidState);
        }

        self.with_selected(index, |driver| {
            if driver.tx_busy(index) {
                return Err(UsbError::WouldBlock);
            }
            driver
                .endpoints
                .in_ep_mut(usize::from(index))
                .begin(data.as_ptr() as *mut u8, data.len());

            if index == 0 {
                if data.is_empty() {
                    driver.ep0_stage = if driver.setup.data_len() == 0 {
                        Ep0Stage::InStatus
                    } else {
                        Ep0Stage::InZeroLengthPacket
                    };
                    driver.usb.write_csr0(Csr0::TX_READY | Csr0::DATA_END);
                } else {
                    driver.ep0_stage = Ep0Stage::InData;
                    driver.load_ep0_in_packet();
                }
            } else {
                driver.usb.set_tx_interrupt(index, true);
                driver.load_in_packet(index);
            }
            Ok(())
        })
    }

    /// Start receiving into `buffer` on an OUT endpoint
    ///
    /// The transfer completes on a short packet, or once `buffer` is full,
    /// and signals [`on_out_complete()`](Events::on_out_complete). Packets
    /// already waiting are moved now, so completion may be signaled before
    /// this returns. An empty `buffer` does nothing.
    ///
    /// On endpoint 0, this receives the data stage of a control write.
    ///
    /// Returns `InvalidEndpoint` if the driver doesn't manage the endpoint, or
    /// `InvalidState` if the endpoint isn't open.
    ///
    /// # Safety
    ///
    /// `buffer` must stay valid, and must not be accessed, until the transfer
    /// completes, or until the endpoint is reset, closed, or stalled.
    pub unsafe fn start_read<E: Events + ?Sized>(
        &mut self,
        ep_addr: EndpointAddress,
        buffer: &mut [u8],
        events: &mut E,
    ) -> usb_device::Result<()> {
        let index = self.check_index(ep_addr)?;
        let ep = self.endpoints.out_ep_mut(usize::from(index));
        if !ep.is_enabled() {
            return Err(UsbError::InvalidState);
        }
        if buffer.is_empty() {
            return Ok(());
        }
        ep.begin(buffer.as_mut_ptr(), buffer.len());

        if index == 0 {
            self.ep0_stage = Ep0Stage::OutData;
            return Ok(());
        }

        self.with_selected(index, |driver| {
            for _ in 0..DRAIN_LIMIT {
                if !driver.usb.rx_csrl().contains(RxCsrL::RX_READY) {
                    driver.usb.set_rx_interrupt(index, true);
                    return;
                }
                if driver.receive_packet(index, events) {
                    return;
                }
            }
            if driver.usb.rx_csrl().contains(RxCsrL::RX_READY) {
                driver.rx_overrun(index, events);
            } else {
                driver.usb.set_rx_interrupt(index, true);
            }
        });
        Ok(())
    }

    /// Load the next packet of an IN transfer, and arm it
    ///
    /// Endpoint `index` must be selected.
    pub(crate) fn load_in_packet(&mut self, index: u8) {
        let ep = self.endpoints.in_ep_mut(usize::from(index));
        let len = ep.next_packet_len();
        // Safety: the caller's buffer lives until the transfer completes, and
        // len is within the remaining bytes.
        fifo::write(&mut self.usb, index, unsafe { ep.pending_in(len) });
        self.usb.write_tx_csrl(TxCsrL::TX_READY);
    }

    /// Move the waiting packet of an OUT transfer into the caller's buffer
    ///
    /// Endpoint `index` must be selected, and must have RX ready. Returns
    /// `true` if the transfer ended, either complete or abandoned.
    pub(crate) fn receive_packet<E: Events + ?Sized>(&mut self, index: u8, events: &mut E) -> bool {
        let count = usize::from(self.usb.rx_count());
        let ep = self.endpoints.out_ep_mut(usize::from(index));
        if count > ep.bytes_remaining() {
            self.rx_overrun(index, events);
            return true;
        }

        // Safety: the caller's buffer lives until the transfer completes, and
        // count is within the remaining bytes.
        fifo::read(&mut self.usb, index, unsafe { ep.pending_out(count) });
        self.usb.modify_rx_csrl(|csr| csr - RxCsrL::RX_READY);
        ep.advance(count);

        if count < usize::from(ep.max_packet_size()) || ep.bytes_remaining() == 0 {
            let total = ep.bytes_transferred();
            self.usb.set_rx_interrupt(index, false);
            trace!("EP{} OUT COMPLETE {}", index, total);
            events.on_out_complete(out_address(index), total);
            true
        } else {
            false
        }
    }

    /// Abandon an OUT transfer, dropping the waiting packet
    ///
    /// Endpoint `index` must be selected.
    pub(crate) fn rx_overrun<E: Events + ?Sized>(&mut self, index: u8, events: &mut E) {
        warn!("EP{} OUT OVERRUN", index);
        self.usb.write_rx_csrl(RxCsrL::FLUSH_FIFO);
        self.usb.set_rx_interrupt(index, false);
        let ep = self.endpoints.out_ep_mut(usize::from(index));
        debug!("EP{} ABANDONED AFTER {}", index, ep.bytes_transferred());
        ep.begin(core::ptr::null_mut(), 0);
        events.on_transfer_error(out_address(index), UsbError::BufferOverflow);
    }

    /// Read one packet from an OUT endpoint
    ///
    /// Returns the packet's size, or 0 if no packet is waiting. Returns
    /// `BufferOverflow` if the packet doesn't fit in `buffer`; the packet
    /// stays in the FIFO.
    pub fn read_packet(
        &mut self,
        ep_addr: EndpointAddress,
        buffer: &mut [u8],
    ) -> usb_device::Result<usize> {
        let index = self.check_index(ep_addr)?;
        self.with_selected(index, |driver| {
            let usb = &mut driver.usb;
            let ready = if index == 0 {
                usb.csr0().contains(Csr0::RX_READY)
            } else {
                usb.rx_csrl().contains(RxCsrL::RX_READY)
            };
            if !ready {
                return Ok(0);
            }

            let count = usize::from(usb.rx_count());
            let buffer = buffer.get_mut(..count).ok_or(UsbError::BufferOverflow)?;
            fifo::read(usb, index, buffer);

            if index == 0 {
                usb.write_csr0(Csr0::SERVICED_RX_READY);
            } else {
                usb.modify_rx_csrl(|csr| {
                    csr - (RxCsrL::OVERRUN
                        | RxCsrL::DATA_ERROR
                        | RxCsrL::SEND_STALL
                        | RxCsrL::SENT_STALL)
                });
                usb.modify_rx_csrl(|csr| csr - RxCsrL::RX_READY);
            }
            Ok(count)
        })
    }

    /// Write one packet to an IN endpoint
    ///
    /// Writes as much of `data` as fits in one packet, and returns that size.
    /// An empty `data` sends a zero-length packet. Returns `WouldBlock` if the
    /// endpoint still holds a packet for the host, or `InvalidState` if the
    /// endpoint isn't open.
    pub fn write_packet(
        &mut self,
        ep_addr: EndpointAddress,
        data: &[u8],
    ) -> usb_device::Result<usize> {
        let index = self.check_index(ep_addr)?;
        let ep = self.endpoints.in_ep_mut(usize::from(index));
        if !ep.is_enabled() {
            return Err(UsbError::InvalidState);
        }
        let max_packet_size = usize::from(ep.max_packet_size());

        self.with_selected(index, |driver| {
            let usb = &mut driver.usb;
            if index != 0 && usb.tx_csrl().contains(TxCsrL::UNDERRUN) {
                usb.modify_tx_csrl(|csr| csr - TxCsrL::UNDERRUN);
            }
            if driver.tx_busy(index) {
                return Err(UsbError::WouldBlock);
            }

            let len = data.len().min(max_packet_size);
            fifo::write(&mut driver.usb, index, &data[..len]);
            if index == 0 {
                driver.usb.write_csr0(Csr0::TX_READY);
            } else {
                driver.usb.modify_tx_csrl(|csr| csr | TxCsrL::TX_READY);
            }
            Ok(len)
        })
    }

    /// Wait until an IN endpoint accepts another packet
    ///
    /// Returns the number of polls it took, or `WouldBlock` once `timeout_us`
    /// microseconds pass on `clock`. Polling also stops after
    /// [`MAX_POLL_ITERATIONS`].
    pub fn wait_in_data_avail(
        &mut self,
        ep_addr: EndpointAddress,
        timeout_us: u32,
        clock: &mut impl Monotonic,
    ) -> usb_device::Result<u32> {
        let ep_addr = in_address(self.check_index(ep_addr)?);
        let start = clock.now_us();
        for poll in 0..MAX_POLL_ITERATIONS {
            if self.in_data_avail(ep_addr)? != 0 {
                return Ok(poll);
            }
            if clock.now_us().saturating_sub(start) >= u64::from(timeout_us) {
                break;
            }
        }
        warn!("{} STILL BUSY", ep_addr);
        Err(UsbError::WouldBlock)
    }
}
