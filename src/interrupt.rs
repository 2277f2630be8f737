//! Interrupt dispatch

use crate::{
    csr::{IntrUsb, Musb, RxCsrL, TxCsrL},
    driver::Driver,
    events::Events,
    registers::{Reg8, Registers},
    state::{in_address, Ep0Stage, CONTROL_MAX_PACKET_SIZE},
};

impl<R: Registers, const EP_COUNT: usize> Driver<R, EP_COUNT> {
    /// Handle the controller's interrupt
    ///
    /// Call this from the USB interrupt handler. Bus events and endpoint
    /// events are acknowledged, then delivered to `events`. The selected
    /// endpoint is the same when this returns.
    pub fn on_interrupt<E: Events + ?Sized>(&mut self, events: &mut E) {
        let bus = self.usb.intr_usb();
        let tx = self.usb.intr_tx();
        let rx = self.usb.intr_rx();
        self.usb.clear_intr_usb(bus);
        self.usb.clear_intr_tx(tx);
        self.usb.clear_intr_rx(rx);

        let previous = self.usb.selected();

        if bus.contains(IntrUsb::RESET) {
            self.bus_reset();
            events.on_reset();
        }
        if bus.contains(IntrUsb::RESUME) {
            debug!("RESUME");
            events.on_resume();
        }
        if bus.contains(IntrUsb::SUSPEND) {
            debug!("SUSPEND");
            events.on_suspend();
        }
        if bus.contains(IntrUsb::SOF) {
            events.on_start_of_frame();
        }

        let tx = tx & self.usb.intr_tx_enable();
        if tx & 1 != 0 {
            self.usb.select(0);
            self.service_ep0(events);
        }
        for index in 1..EP_COUNT as u8 {
            if tx & (1 << index) != 0 {
                self.usb.select(index);
                self.service_tx(index, events);
            }
        }

        let rx = rx & self.usb.intr_rx_enable();
        for index in 1..EP_COUNT as u8 {
            if rx & (1 << index) != 0 {
                self.usb.select(index);
                self.service_rx(index, events);
            }
        }

        self.usb.select(previous);
    }

    /// Return to the state after a bus reset
    ///
    /// Every endpoint except endpoint 0 closes, transfers in flight are
    /// forgotten, and the FIFO is free again.
    fn bus_reset(&mut self) {
        self.endpoints.reset();
        self.fifo.reset(usize::from(CONTROL_MAX_PACKET_SIZE));
        self.pending_address = 0;
        self.ep0_stage = Ep0Stage::Setup;

        self.usb.write_intr_tx_enable(1);
        self.usb.write_intr_rx_enable(0);
        for index in 1..EP_COUNT as u8 {
            self.usb.select(index);
            self.usb.write8(Reg8::TxFifoAddr, 0);
            self.usb.write8(Reg8::TxFifoSize, 0);
            self.usb.write8(Reg8::RxFifoAddr, 0);
            self.usb.write8(Reg8::RxFifoSize, 0);
        }
        debug!("RESET");
    }

    /// Handle a TX interrupt on endpoint `index`, which must be selected
    fn service_tx<E: Events + ?Sized>(&mut self, index: u8, events: &mut E) {
        let csr = self.usb.tx_csrl();
        if csr.contains(TxCsrL::SENT_STALL) {
            self.usb.modify_tx_csrl(|csr| csr - TxCsrL::SENT_STALL);
            debug!("EP{} IN STALLED", index);
            return;
        }
        if csr.contains(TxCsrL::UNDERRUN) {
            self.usb.modify_tx_csrl(|csr| csr - TxCsrL::UNDERRUN);
        }
        if csr.contains(TxCsrL::TX_READY) {
            return;
        }

        let ep = self.endpoints.in_ep_mut(usize::from(index));
        let sent = ep.next_packet_len();
        ep.advance(sent);
        if ep.bytes_remaining() > 0 {
            self.load_in_packet(index);
            return;
        }

        let total = ep.bytes_transferred();
        self.usb.set_tx_interrupt(index, false);
        trace!("EP{} IN COMPLETE {}", index, total);
        events.on_in_complete(in_address(index), total);
    }

    /// Handle an RX interrupt on endpoint `index`, which must be selected
    fn service_rx<E: Events + ?Sized>(&mut self, index: u8, events: &mut E) {
        if self.usb.rx_csrl().contains(RxCsrL::SENT_STALL) {
            self.usb.modify_rx_csrl(|csr| csr - RxCsrL::SENT_STALL);
            debug!("EP{} OUT STALLED", index);
        }

        // One packet per interrupt. The controller raises the next one.
        if self.usb.rx_csrl().contains(RxCsrL::RX_READY) {
            self.receive_packet(index, events);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        csr::{IntrUsb, TxCsrL},
        driver::Driver,
        endpoint::EndpointConfig,
        events::recorder::{Event, Recorder},
        mock::Mock,
        state::{in_address, out_address, Ep0Stage},
        transfer::DRAIN_LIMIT,
    };
    use usb_device::{endpoint::EndpointType, UsbError};

    fn driver() -> (Driver<Mock>, Recorder) {
        let mut driver = Driver::new(Mock::new());
        driver.registers().intr_tx_e = [1, 0];
        for address in [in_address(1), out_address(1), in_address(2)] {
            driver
                .open(EndpointConfig::new(address, EndpointType::Bulk, 64))
                .unwrap();
        }
        driver.registers().take_writes();
        (driver, Recorder::default())
    }

    #[test]
    fn bus_reset() {
        let (mut driver, mut events) = driver();
        let mut buffer = [0u8; 64];
        unsafe { driver.start_read(out_address(1), &mut buffer, &mut events) }.unwrap();
        driver.set_address(9);
        driver.registers().index = 2;

        driver.registers().bus_event(IntrUsb::RESET);
        driver.on_interrupt(&mut events);

        assert_eq!(events.take(), [Event::Reset]);
        assert_eq!(driver.ep0_stage(), Ep0Stage::Setup);
        assert_eq!(driver.pending_address(), 0);
        assert_eq!(driver.fifo_cursor(), 64);
        assert!(!driver.endpoint(in_address(1)).unwrap().is_enabled());
        assert!(!driver.endpoint(out_address(1)).unwrap().is_enabled());
        let ep0 = driver.endpoint(in_address(0)).unwrap();
        assert!(ep0.is_enabled());
        assert_eq!(ep0.max_packet_size(), 64);

        let usb = driver.registers();
        assert_eq!(usb.intr_tx_e, [1, 0]);
        assert_eq!(usb.intr_rx_e, [0, 0]);
        assert_eq!(usb.eps[1].tx_fifo_size, 0);
        assert_eq!(usb.eps[2].tx_fifo_addr, 0);
        assert_eq!(usb.intr_usb, 0);
        assert_eq!(usb.index, 2);
    }

    #[test]
    fn reset_comes_before_endpoint_events() {
        const GET_DESCRIPTOR: [u8; 8] = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00];
        let (mut driver, mut events) = driver();
        let mut control = [0u8; 16];
        let mut bulk = [0u8; 64];
        unsafe {
            driver.start_read(out_address(0), &mut control, &mut events).unwrap();
            driver.start_read(out_address(1), &mut bulk, &mut events).unwrap();
        }
        assert_eq!(driver.ep0_stage(), Ep0Stage::OutData);
        driver.set_address(5);
        driver.registers().intr_tx_e = [0, 0];

        driver.registers().bus_event(IntrUsb::RESET);
        driver.registers().host_setup(GET_DESCRIPTOR);
        driver.registers().host_out(1, &[1; 8]);
        driver.on_interrupt(&mut events);

        assert_eq!(events.take(), [Event::Reset, Event::Setup(GET_DESCRIPTOR)]);
        assert_eq!(driver.ep0_stage(), Ep0Stage::Setup);
        assert_eq!(driver.pending_address(), 0);
        assert_eq!(driver.fifo_cursor(), 64);
        assert_eq!(control, [0; 16]);
        assert_eq!(bulk, [0; 64]);
        assert_eq!(driver.registers().eps[1].rx_packets.len(), 1);
        assert!(driver.registers().eps[0].rx_packets.is_empty());
    }

    #[test]
    fn bus_events() {
        let (mut driver, mut events) = driver();
        driver
            .registers()
            .bus_event(IntrUsb::SUSPEND | IntrUsb::RESUME | IntrUsb::SOF);
        driver.on_interrupt(&mut events);
        assert_eq!(
            events.take(),
            [Event::Resume, Event::Suspend, Event::StartOfFrame]
        );
        assert_eq!(driver.registers().intr_usb, 0);
    }

    #[test]
    fn in_transfer_in_packets() {
        let (mut driver, mut events) = driver();
        let data: std::vec::Vec<u8> = (0..100).collect();
        unsafe { driver.start_write(in_address(1), &data) }.unwrap();
        assert_eq!(driver.registers().intr_tx_e, [0b11, 0]);

        assert_eq!(driver.registers().host_in(1).unwrap(), &data[..64]);
        driver.on_interrupt(&mut events);
        assert!(events.take().is_empty());
        assert_eq!(driver.endpoint(in_address(1)).unwrap().bytes_remaining(), 36);

        assert_eq!(driver.registers().host_in(1).unwrap(), &data[64..]);
        driver.on_interrupt(&mut events);
        assert_eq!(events.take(), [Event::InComplete(0x81, 100)]);
        assert_eq!(driver.registers().intr_tx_e, [1, 0]);
        assert_eq!(driver.registers().eps[1].sent.len(), 2);
        assert_eq!(driver.registers().index, 0);
    }

    #[test]
    fn underrun_is_cleared() {
        let (mut driver, mut events) = driver();
        unsafe { driver.start_write(in_address(2), &[1, 2, 3]) }.unwrap();
        driver.registers().host_in(2);
        driver.registers().eps[2].tx_csrl |= TxCsrL::UNDERRUN.bits();
        driver.on_interrupt(&mut events);
        assert_eq!(events.take(), [Event::InComplete(0x82, 3)]);
        assert_eq!(driver.registers().eps[2].tx_csrl, 0);
    }

    #[test]
    fn sent_stall_is_acknowledged() {
        let (mut driver, mut events) = driver();
        driver.set_stall(in_address(1)).unwrap();
        driver.registers().intr_tx_e = [0b11, 0];
        driver.registers().eps[1].tx_csrl |= TxCsrL::SENT_STALL.bits();
        driver.registers().intr_tx |= 1 << 1;
        driver.on_interrupt(&mut events);
        assert!(events.take().is_empty());
        assert_eq!(
            driver.registers().eps[1].tx_csrl & TxCsrL::SENT_STALL.bits(),
            0
        );
    }

    #[test]
    fn masked_endpoints_are_ignored() {
        let (mut driver, mut events) = driver();
        driver.registers().host_out(1, &[1, 2, 3]);
        driver.registers().intr_tx |= 1 << 2;
        driver.on_interrupt(&mut events);
        assert!(events.take().is_empty());
        assert_eq!(driver.registers().eps[1].rx_packets.len(), 1);
        assert_eq!(driver.registers().intr_rx, 0);
        assert_eq!(driver.registers().intr_tx, 0);
    }

    #[test]
    fn out_transfer_overrun() {
        let (mut driver, mut events) = driver();
        let mut buffer = [0u8; 16];
        unsafe { driver.start_read(out_address(1), &mut buffer, &mut events) }.unwrap();
        driver.registers().host_out(1, &[3; 32]);
        driver.on_interrupt(&mut events);
        assert_eq!(
            events.take(),
            [Event::Error(0x01, UsbError::BufferOverflow)]
        );
        assert_eq!(driver.registers().eps[1].flushes, 1);
        assert_eq!(driver.registers().intr_rx_e, [0, 0]);
        assert_eq!(buffer, [0; 16]);
    }

    #[test]
    fn out_transfer_short_packet() {
        let (mut driver, mut events) = driver();
        let mut buffer = [0u8; 256];
        unsafe { driver.start_read(out_address(1), &mut buffer, &mut events) }.unwrap();
        driver.registers().host_out(1, &[4; 64]);
        driver.registers().host_out(1, &[5; 1]);

        driver.on_interrupt(&mut events);
        assert!(events.take().is_empty());
        assert_eq!(driver.registers().eps[1].rx_packets.len(), 1);

        driver.on_interrupt(&mut events);
        assert_eq!(events.take(), [Event::OutComplete(0x01, 65)]);
        assert_eq!(buffer[64], 5);
        assert!(driver.registers().eps[1].rx_packets.is_empty());
    }

    #[test]
    fn out_transfer_longer_than_one_drain() {
        let (mut driver, mut events) = driver();
        let mut buffer = [0u8; 1024];
        unsafe { driver.start_read(out_address(1), &mut buffer, &mut events) }.unwrap();

        for packet in 0..(DRAIN_LIMIT as u8 + 2) {
            driver.registers().host_out(1, &[packet; 64]);
            driver.on_interrupt(&mut events);
        }
        assert!(events.take().is_empty());
        assert_eq!(driver.registers().eps[1].flushes, 0);
        assert_eq!(driver.registers().intr_rx_e, [1 << 1, 0]);
        let received = (DRAIN_LIMIT + 2) * 64;
        assert_eq!(
            driver.endpoint(out_address(1)).unwrap().bytes_transferred(),
            received
        );

        for _ in DRAIN_LIMIT + 2..16 {
            driver.registers().host_out(1, &[0xAA; 64]);
        }
        for _ in DRAIN_LIMIT + 2..16 {
            driver.on_interrupt(&mut events);
        }
        assert_eq!(events.take(), [Event::OutComplete(0x01, 1024)]);
        assert_eq!(driver.registers().intr_rx_e, [0, 0]);
        assert_eq!(&buffer[64 * 9..64 * 10], &[9; 64]);
        assert_eq!(&buffer[received..], &[0xAA; 1024 - (DRAIN_LIMIT + 2) * 64]);
    }

    #[test]
    fn selection_is_restored() {
        let (mut driver, mut events) = driver();
        unsafe { driver.start_write(in_address(2), &[1]) }.unwrap();
        driver.registers().host_in(2);
        driver.registers().host_setup([0x80, 0x06, 0, 1, 0, 0, 0x12, 0]);
        driver.registers().index = 1;
        driver.on_interrupt(&mut events);
        assert_eq!(events.take().len(), 2);
        assert_eq!(driver.registers().index, 1);
    }
}
