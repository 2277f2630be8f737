//! Control transfers on endpoint 0
//!
//! Endpoint 0 raises one interrupt per transaction. The driver tracks the
//! control transfer's stage in [`Ep0Stage`], and decides what each interrupt
//! means from that stage.
//!
//! A control read moves `Setup -> InData -> OutStatus -> Setup`. A control
//! write moves `Setup -> OutData -> InStatus -> Setup`, and a request without
//! data moves `Setup -> InStatus -> Setup`. A stall, or a SETUP that ends a
//! transfer early, returns to `Setup`.

use crate::{
    csr::{Csr0, Musb},
    driver::Driver,
    events::Events,
    fifo,
    registers::{Reg8, Registers},
    state::{in_address, out_address, Ep0Stage},
    transfer::DRAIN_LIMIT,
};
use usb_device::UsbError;

impl<R: Registers, const EP_COUNT: usize> Driver<R, EP_COUNT> {
    /// Handle an endpoint 0 interrupt
    ///
    /// Endpoint 0 must be selected.
    pub(crate) fn service_ep0<E: Events + ?Sized>(&mut self, events: &mut E) {
        let csr0 = self.usb.csr0();
        if csr0.contains(Csr0::SENT_STALL) {
            self.usb.modify_csr0(|csr0| csr0 - Csr0::SENT_STALL);
            self.ep0_stage = Ep0Stage::Setup;
            debug!("EP0 STALLED");
            return;
        }

        if csr0.contains(Csr0::SETUP_END) {
            self.usb.write_csr0(Csr0::SERVICED_SETUP_END);
            self.ep0_stage = Ep0Stage::Setup;
            debug!("EP0 SETUP END");
        }

        if self.pending_address != 0 {
            self.usb.write8(Reg8::FAddr, self.pending_address);
            debug!("ADDRESS {} APPLIED", self.pending_address);
            self.pending_address = 0;
        }

        match self.ep0_stage {
            Ep0Stage::Setup => self.receive_setup(events),
            Ep0Stage::InData => self.ep0_in_data(events),
            Ep0Stage::OutData => self.ep0_out_data(events),
            Ep0Stage::InStatus | Ep0Stage::InZeroLengthPacket => {
                self.ep0_stage = Ep0Stage::Setup;
                events.on_in_complete(in_address(0), 0);
                self.receive_setup(events);
            }
            Ep0Stage::OutStatus => {
                self.ep0_stage = Ep0Stage::Setup;
                self.receive_setup(events);
            }
            Ep0Stage::Stalled => {
                if self.usb.csr0().contains(Csr0::RX_READY) {
                    self.ep0_stage = Ep0Stage::Setup;
                    self.receive_setup(events);
                }
            }
        }
    }

    /// Read a waiting SETUP packet
    ///
    /// Anything that isn't exactly eight bytes is left in the FIFO.
    fn receive_setup<E: Events + ?Sized>(&mut self, events: &mut E) {
        if !self.usb.csr0().contains(Csr0::RX_READY) {
            return;
        }
        let count = self.usb.rx_count();
        if count != 8 {
            warn!("EP0 IGNORED {} BYTE SETUP", count);
            return;
        }

        fifo::read(&mut self.usb, 0, &mut self.setup.0);
        if self.setup.data_len() == 0 {
            self.usb
                .write_csr0(Csr0::SERVICED_RX_READY | Csr0::DATA_END);
        } else {
            self.usb.write_csr0(Csr0::SERVICED_RX_READY);
        }
        trace!("EP0 SETUP {:x}", self.setup.0);
        events.on_setup(&self.setup.0);
    }

    /// Arm the next packet of a control read
    ///
    /// The final packet of the data stage carries `DATA_END`. That's a short
    /// packet, or the packet that completes the host's requested length.
    pub(crate) fn load_ep0_in_packet(&mut self) {
        let requested = usize::from(self.setup.data_len());
        let ep = self.endpoints.in_ep_mut(0);
        let len = ep.next_packet_len();
        let last = len == ep.bytes_remaining()
            && (len < usize::from(ep.max_packet_size())
                || ep.bytes_transferred() + len >= requested);

        // Safety: the caller's buffer lives until the transfer completes, and
        // len is within the remaining bytes.
        fifo::write(&mut self.usb, 0, unsafe { ep.pending_in(len) });

        if last {
            self.usb.write_csr0(Csr0::TX_READY | Csr0::DATA_END);
        } else {
            self.usb.write_csr0(Csr0::TX_READY);
        }
    }

    fn ep0_in_data<E: Events + ?Sized>(&mut self, events: &mut E) {
        let ep = self.endpoints.in_ep_mut(0);
        let sent = ep.next_packet_len();
        ep.advance(sent);
        if ep.bytes_remaining() > 0 {
            self.load_ep0_in_packet();
            return;
        }
        let total = ep.bytes_transferred();
        self.ep0_stage = Ep0Stage::OutStatus;
        trace!("EP0 IN COMPLETE {}", total);
        events.on_in_complete(in_address(0), total);
    }

    fn ep0_out_data<E: Events + ?Sized>(&mut self, events: &mut E) {
        for _ in 0..DRAIN_LIMIT {
            if !self.usb.csr0().contains(Csr0::RX_READY) {
                return;
            }
            let count = usize::from(self.usb.rx_count());
            let ep = self.endpoints.out_ep_mut(0);
            if count > ep.bytes_remaining() {
                self.ep0_overrun(events);
                return;
            }

            // Safety: the caller's buffer lives until the transfer completes,
            // and count is within the remaining bytes.
            fifo::read(&mut self.usb, 0, unsafe { ep.pending_out(count) });
            ep.advance(count);

            if count < usize::from(ep.max_packet_size()) || ep.bytes_remaining() == 0 {
                let total = ep.bytes_transferred();
                self.usb
                    .write_csr0(Csr0::SERVICED_RX_READY | Csr0::DATA_END);
                self.ep0_stage = Ep0Stage::InStatus;
                trace!("EP0 OUT COMPLETE {}", total);
                events.on_out_complete(out_address(0), total);
                return;
            }
            self.usb.write_csr0(Csr0::SERVICED_RX_READY);
        }

        if self.usb.csr0().contains(Csr0::RX_READY) {
            self.ep0_overrun(events);
        }
    }

    /// Refuse the rest of a control write
    fn ep0_overrun<E: Events + ?Sized>(&mut self, events: &mut E) {
        warn!("EP0 OUT OVERRUN");
        self.usb
            .write_csr0(Csr0::SERVICED_RX_READY | Csr0::SEND_STALL);
        self.ep0_stage = Ep0Stage::Stalled;
        events.on_transfer_error(out_address(0), UsbError::BufferOverflow);
    }
}
