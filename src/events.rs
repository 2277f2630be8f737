//! Events delivered to the USB device stack

use usb_device::{endpoint::EndpointAddress, UsbError};

/// Receives controller events
///
/// The driver calls these methods from [`on_interrupt()`](crate::Driver::on_interrupt),
/// and from [`start_read()`](crate::Driver::start_read) when data was already
/// waiting. Implementations must not block. They also must not call back into
/// a [`BusAdapter`](crate::BusAdapter) that's dispatching the event; record the
/// work, and act on it after the driver call returns.
pub trait Events {
    /// The host reset the bus
    ///
    /// Every endpoint except endpoint 0 is closed, and the device address
    /// is zero.
    fn on_reset(&mut self);

    /// Endpoint 0 received a SETUP packet
    fn on_setup(&mut self, setup: &[u8; 8]);

    /// An IN transfer completed after sending `transferred` bytes
    fn on_in_complete(&mut self, ep_addr: EndpointAddress, transferred: usize);

    /// An OUT transfer completed after receiving `transferred` bytes
    ///
    /// The transfer completes on a short packet, or when the buffer is full.
    fn on_out_complete(&mut self, ep_addr: EndpointAddress, transferred: usize);

    /// An OUT transfer was abandoned
    ///
    /// The driver signals [`UsbError::BufferOverflow`] when the host sent
    /// more data than the transfer's buffer holds.
    fn on_transfer_error(&mut self, ep_addr: EndpointAddress, error: UsbError);

    /// The bus was suspended
    fn on_suspend(&mut self) {}

    /// The bus resumed from suspend
    fn on_resume(&mut self) {}

    /// A start-of-frame token arrived
    fn on_start_of_frame(&mut self) {}
}
