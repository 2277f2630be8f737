//! Interrupt-safe sharing of a driver

use crate::{
    driver::{Driver, PortSpeed, RegisterDump, Speed},
    endpoint::EndpointConfig,
    events::Events,
    ral::Mmio,
    registers::Registers,
    state::{Ep0Stage, MAX_ENDPOINTS},
    time::Monotonic,
    Peripherals,
};
use core::cell::RefCell;
use cortex_m::interrupt::{self, Mutex};
use usb_device::endpoint::EndpointAddress;

/// A [`Driver`] shared between an interrupt handler and the rest of the
/// program
///
/// Every method runs in a critical section, so a caller's register sequence
/// can't be interrupted by [`on_interrupt()`](BusAdapter::on_interrupt).
///
/// Event handlers called from `on_interrupt()` must not call back into the
/// same `BusAdapter`. That panics, since the driver is already borrowed.
pub struct BusAdapter<R, const EP_COUNT: usize = MAX_ENDPOINTS> {
    driver: Mutex<RefCell<Driver<R, EP_COUNT>>>,
}

impl<const EP_COUNT: usize> BusAdapter<Mmio, EP_COUNT> {
    /// Create an adapter for the controller owned by `peripherals`
    ///
    /// The controller isn't touched until you call
    /// [`initialize()`](BusAdapter::initialize).
    pub fn with_peripherals<P: Peripherals>(peripherals: P) -> Self {
        Self::new(Driver::new(Mmio::new(peripherals)))
    }
}

impl<R: Registers, const EP_COUNT: usize> BusAdapter<R, EP_COUNT> {
    /// Wrap a driver
    pub fn new(driver: Driver<R, EP_COUNT>) -> Self {
        BusAdapter {
            driver: Mutex::new(RefCell::new(driver)),
        }
    }

    /// Interrupt-safe, mutable access to the driver
    pub fn with_driver<T>(&self, func: impl FnOnce(&mut Driver<R, EP_COUNT>) -> T) -> T {
        interrupt::free(|cs| {
            let driver = self.driver.borrow(cs);
            let mut driver = driver.borrow_mut();
            func(&mut driver)
        })
    }

    /// See [`Driver::on_interrupt()`]
    pub fn on_interrupt<E: Events + ?Sized>(&self, events: &mut E) {
        self.with_driver(|driver| driver.on_interrupt(events))
    }

    /// See [`Driver::initialize()`]
    pub fn initialize(&self, speed: Speed) {
        self.with_driver(|driver| driver.initialize(speed))
    }

    /// See [`Driver::deinitialize()`]
    pub fn deinitialize(&self) {
        self.with_driver(|driver| driver.deinitialize())
    }

    /// See [`Driver::set_address()`]
    pub fn set_address(&self, address: u8) {
        self.with_driver(|driver| driver.set_address(address))
    }

    /// See [`Driver::port_speed()`]
    pub fn port_speed(&self) -> PortSpeed {
        self.with_driver(|driver| driver.port_speed())
    }

    /// See [`Driver::force_full_speed()`]
    pub fn force_full_speed(&self) -> bool {
        self.with_driver(|driver| driver.force_full_speed())
    }

    /// See [`Driver::ep0_stage()`]
    pub fn ep0_stage(&self) -> Ep0Stage {
        self.with_driver(|driver| driver.ep0_stage())
    }

    /// See [`Driver::open()`]
    pub fn open(&self, config: EndpointConfig) -> usb_device::Result<()> {
        self.with_driver(|driver| driver.open(config))
    }

    /// See [`Driver::close()`]
    pub fn close(&self, ep_addr: EndpointAddress) -> usb_device::Result<()> {
        self.with_driver(|driver| driver.close(ep_addr))
    }

    /// See [`Driver::set_stall()`]
    pub fn set_stall(&self, ep_addr: EndpointAddress) -> usb_device::Result<()> {
        self.with_driver(|driver| driver.set_stall(ep_addr))
    }

    /// See [`Driver::clear_stall()`]
    pub fn clear_stall(&self, ep_addr: EndpointAddress) -> usb_device::Result<()> {
        self.with_driver(|driver| driver.clear_stall(ep_addr))
    }

    /// See [`Driver::is_stalled()`]
    pub fn is_stalled(&self, ep_addr: EndpointAddress) -> usb_device::Result<bool> {
        self.with_driver(|driver| driver.is_stalled(ep_addr))
    }

    /// See [`Driver::start_write()`]
    ///
    /// # Safety
    ///
    /// See [`Driver::start_write()`].
    pub unsafe fn start_write(
        &self,
        ep_addr: EndpointAddress,
        data: &[u8],
    ) -> usb_device::Result<()> {
        self.with_driver(|driver| driver.start_write(ep_addr, data))
    }

    /// See [`Driver::start_read()`]
    ///
    /// # Safety
    ///
    /// See [`Driver::start_read()`].
    pub unsafe fn start_read<E: Events + ?Sized>(
        &self,
        ep_addr: EndpointAddress,
        buffer: &mut [u8],
        events: &mut E,
    ) -> usb_device::Result<()> {
        self.with_driver(|driver| driver.start_read(ep_addr, buffer, events))
    }

    /// See [`Driver::read_packet()`]
    pub fn read_packet(
        &self,
        ep_addr: EndpointAddress,
        buffer: &mut [u8],
    ) -> usb_device::Result<usize> {
        self.with_driver(|driver| driver.read_packet(ep_addr, buffer))
    }

    /// See [`Driver::write_packet()`]
    pub fn write_packet(
        &self,
        ep_addr: EndpointAddress,
        data: &[u8],
    ) -> usb_device::Result<usize> {
        self.with_driver(|driver| driver.write_packet(ep_addr, data))
    }

    /// See [`Driver::out_data_avail()`]
    pub fn out_data_avail(&self, ep_addr: EndpointAddress) -> usb_device::Result<usize> {
        self.with_driver(|driver| driver.out_data_avail(ep_addr))
    }

    /// See [`Driver::in_data_avail()`]
    pub fn in_data_avail(&self, ep_addr: EndpointAddress) -> usb_device::Result<usize> {
        self.with_driver(|driver| driver.in_data_avail(ep_addr))
    }

    /// See [`Driver::wait_in_data_avail()`]
    ///
    /// The whole wait is one critical section. Prefer short timeouts.
    pub fn wait_in_data_avail(
        &self,
        ep_addr: EndpointAddress,
        timeout_us: u32,
        clock: &mut impl Monotonic,
    ) -> usb_device::Result<u32> {
        self.with_driver(|driver| driver.wait_in_data_avail(ep_addr, timeout_us, clock))
    }

    /// See [`Driver::dump_registers()`]
    pub fn dump_registers(&self) -> RegisterDump<EP_COUNT> {
        self.with_driver(|driver| driver.dump_registers())
    }
}
