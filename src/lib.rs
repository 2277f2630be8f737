//! A USB device driver for MUSB controllers
//!
//! `musb-usbd` drives the Mentor Graphics MUSB ("Inventra") USB device
//! controller, as found on Beken microcontrollers. It manages endpoint
//! configuration, the dynamic FIFO, and the endpoint 0 control transfer state
//! machine, and moves packets between the FIFO and your buffers. A USB device
//! stack sits on top, and learns what happened through [`Events`].
//!
//! To interface the library, you must define a safe implementation of
//! [`Peripherals`]. See the peripherals documentation for more information.
//!
//! # Example
//!
//! ```no_run
//! use musb_usbd::{BusAdapter, EndpointConfig, Events, Peripherals, Speed};
//! use usb_device::{endpoint::{EndpointAddress, EndpointType}, UsbError};
//!
//! # const USB_BASE: usize = 0x4600_2000;
//! struct Usb;
//! unsafe impl Peripherals for Usb {
//!     fn usb(&self) -> *const () {
//!         USB_BASE as *const ()
//!     }
//! }
//!
//! struct Stack;
//! impl Events for Stack {
//!     fn on_reset(&mut self) {}
//!     fn on_setup(&mut self, setup: &[u8; 8]) {}
//!     fn on_in_complete(&mut self, ep: EndpointAddress, transferred: usize) {}
//!     fn on_out_complete(&mut self, ep: EndpointAddress, transferred: usize) {}
//!     fn on_transfer_error(&mut self, ep: EndpointAddress, error: UsbError) {}
//! }
//!
//! let bus: BusAdapter<_> = BusAdapter::with_peripherals(Usb);
//! bus.initialize(Speed::High);
//! bus.open(EndpointConfig::new(
//!     EndpointAddress::from(0x81),
//!     EndpointType::Bulk,
//!     512,
//! ))
//! .unwrap();
//!
//! // In the USB interrupt handler:
//! bus.on_interrupt(&mut Stack);
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod bus;
mod csr;
mod driver;
mod endpoint;
mod ep0;
mod events;
mod fifo;
mod interrupt;
mod ral;
mod registers;
mod state;
mod time;
mod transfer;

#[cfg(test)]
mod mock;

pub use bus::BusAdapter;
pub use driver::{Driver, EndpointRegisters, PortSpeed, RegisterDump, Speed};
pub use endpoint::{EndpointConfig, EndpointFlags};
pub use events::Events;
pub use fifo::FIFO_CAPACITY;
pub use ral::Mmio;
pub use registers::{Reg16, Reg8, Registers};
pub use state::{EndpointState, Ep0Stage, CONTROL_MAX_PACKET_SIZE, MAX_ENDPOINTS};
pub use time::{CycleCounter, Monotonic};
pub use transfer::{DRAIN_LIMIT, MAX_POLL_ITERATIONS};

/// A type that owns the USB controller's register block
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that
/// owns the MUSB register block of one controller. The pointer
/// returned by [`usb()`](Peripherals::usb) is assumed to be
/// valid for the life of the program, and will be cast to a
/// register definition.
///
/// # Example
///
/// ```no_run
/// use musb_usbd::Peripherals;
///
/// /// Owns the USB controller
/// struct Usb(());
///
/// impl Usb {
///     /// # Safety
///     ///
///     /// Call once; the returned object owns the registers.
///     pub unsafe fn steal() -> Self {
///         Usb(())
///     }
/// }
///
/// unsafe impl Peripherals for Usb {
///     fn usb(&self) -> *const () {
///         0x4600_2000 as *const ()
///     }
/// }
///
/// let usb = unsafe { Usb::steal() };
/// assert_eq!(usb.usb(), 0x4600_2000 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the MUSB register block
    /// for this controller
    fn usb(&self) -> *const ();
}
