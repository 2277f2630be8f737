//! The MUSB device driver
//!
//! `Driver` owns the controller registers and all endpoint state. Its
//! operations are split across modules: endpoint configuration in
//! `endpoint`, the control endpoint in `ep0`, interrupt handling in
//! `interrupt`, and caller-driven transfers in `transfer`.

use crate::{
    csr::{DevCtl, IntrUsb, Musb, Power},
    fifo,
    registers::{Reg8, Registers},
    state::{
        EndpointState, EndpointTable, Ep0Stage, SetupPacket, CONTROL_MAX_PACKET_SIZE,
        MAX_ENDPOINTS,
    },
};
use usb_device::endpoint::EndpointAddress;

/// VBUS interrupt enable, in `VTH`
const VTH_VBUS_INTERRUPT: u8 = 1 << 7;
/// D+ pull-up, in `OTG_CFG`
const OTG_CFG_DP_PULL_UP: u8 = 0x08;
/// Device role, in `OTG_CFG`
const OTG_CFG_DEVICE: u8 = 0x01;
/// Vendor-recommended device configuration
const DEV_CFG_DEVICE: u8 = 0xF4;
/// Strongest D+ and D- drivers, in `GEN`
const GEN_DRIVE_STRENGTH: u8 = (0x7 << 4) | 0x7;

/// USB low / full / high speed setting.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Speed {
    /// Throttle to low / full speeds.
    ///
    /// If a host is capable of high-speed, this will prevent
    /// the device from enumerating as a high-speed device.
    LowFull,
    /// High speed.
    ///
    /// A high-speed device can still interface a low / full
    /// speed host, so use this setting for the most flexibility.
    #[default]
    High,
}

/// The bus speed negotiated with the host
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum PortSpeed {
    /// No speed reported; the device is probably not connected
    Unknown,
    Low,
    Full,
    High,
}

/// A USB device driver for one MUSB controller
///
/// After you create a `Driver` with [`new()`](Driver::new), call
/// [`initialize()`](Driver::initialize) once, then route the controller's
/// interrupt to [`on_interrupt()`](Driver::on_interrupt).
///
/// `EP_COUNT` is the number of endpoints, per direction, that the
/// driver manages. It must be between 1 and 16.
pub struct Driver<R, const EP_COUNT: usize = MAX_ENDPOINTS> {
    pub(crate) usb: R,
    pub(crate) endpoints: EndpointTable<EP_COUNT>,
    pub(crate) fifo: fifo::Allocator,
    pub(crate) setup: SetupPacket,
    pub(crate) ep0_stage: Ep0Stage,
    pub(crate) pending_address: u8,
}

impl<R: Registers, const EP_COUNT: usize> Driver<R, EP_COUNT> {
    const VALID_EP_COUNT: () = assert!(
        EP_COUNT >= 1 && EP_COUNT <= 16,
        "EP_COUNT must be between 1 and 16"
    );

    /// Create a new `Driver`
    ///
    /// Creation does not touch the registers. The driver starts as if the
    /// bus just reset: only endpoint 0 is open.
    pub fn new(usb: R) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_EP_COUNT;
        Driver {
            usb,
            endpoints: EndpointTable::new(),
            fifo: fifo::Allocator::new(usize::from(CONTROL_MAX_PACKET_SIZE)),
            setup: SetupPacket::new(),
            ep0_stage: Ep0Stage::Setup,
            pending_address: 0,
        }
    }

    /// Initialize the PHY and the controller, and connect to the bus
    ///
    /// Assumes that the controller's clocks are on. You **must** call this
    /// once, before the controller's interrupt is unmasked.
    pub fn initialize(&mut self, speed: Speed) {
        let vth = self.usb.read8(Reg8::Vth);
        self.usb.write8(Reg8::Vth, vth & !VTH_VBUS_INTERRUPT);

        self.usb.write8(Reg8::OtgCfg, OTG_CFG_DP_PULL_UP);
        self.usb.write8(Reg8::DevCfg, DEV_CFG_DEVICE);
        let otg_cfg = self.usb.read8(Reg8::OtgCfg);
        self.usb.write8(Reg8::OtgCfg, otg_cfg | OTG_CFG_DEVICE);

        let pending = self.usb.read8(Reg8::VendorInt);
        self.usb.write8(Reg8::VendorInt, pending);

        self.usb.write8(Reg8::Gen, GEN_DRIVE_STRENGTH);

        self.usb.modify_power(|power| match speed {
            Speed::High => power | Power::HS_ENABLE,
            Speed::LowFull => power - Power::HS_ENABLE,
        });

        self.usb.select(0);
        self.usb.write8(Reg8::FAddr, 0);
        self.usb.modify_dev_ctl(|devctl| devctl | DevCtl::SESSION);

        self.usb
            .write_intr_usb_enable(IntrUsb::RESET | IntrUsb::SUSPEND | IntrUsb::RESUME);
        self.usb.write_intr_tx_enable(1);
        self.usb.write_intr_rx_enable(0);

        self.usb.modify_power(|power| power | Power::SOFT_CONN);
        debug!("INITIALIZED");
    }

    /// Mask every controller interrupt and disconnect from the bus
    pub fn deinitialize(&mut self) {
        self.usb.write_intr_usb_enable(IntrUsb::empty());
        self.usb.write_intr_tx_enable(0);
        self.usb.write_intr_rx_enable(0);
        self.usb.modify_power(|power| power - Power::SOFT_CONN);
        debug!("DEINITIALIZED");
    }

    /// Set the device address
    ///
    /// Address 0 takes effect immediately. Any other address takes effect
    /// when endpoint 0 next interrupts, which is after the status stage of
    /// the SET_ADDRESS request.
    pub fn set_address(&mut self, address: u8) {
        if address == 0 {
            self.usb.write8(Reg8::FAddr, 0);
        }
        self.pending_address = address;
        debug!("ADDRESS {}", address);
    }

    /// Returns the address that will be applied on the next endpoint 0 interrupt
    ///
    /// Zero means that nothing is pending.
    pub fn pending_address(&self) -> u8 {
        self.pending_address
    }

    /// Returns the bus speed negotiated with the host
    pub fn port_speed(&self) -> PortSpeed {
        if self.usb.power().contains(Power::HS_MODE) {
            return PortSpeed::High;
        }
        let devctl = self.usb.dev_ctl();
        if devctl.contains(DevCtl::FS_DEVICE) {
            PortSpeed::Full
        } else if devctl.contains(DevCtl::LS_DEVICE) {
            PortSpeed::Low
        } else {
            PortSpeed::Unknown
        }
    }

    /// Stop negotiating high speed
    ///
    /// Returns `true` if the controller still reports high speed negotiation
    /// as enabled after the change.
    pub fn force_full_speed(&mut self) -> bool {
        self.usb.modify_power(|power| power - Power::HS_ENABLE);
        self.usb.power().contains(Power::HS_ENABLE)
    }

    /// Returns the stage of the control transfer on endpoint 0
    pub fn ep0_stage(&self) -> Ep0Stage {
        self.ep0_stage
    }

    /// Returns the state of an endpoint
    ///
    /// Returns `None` if the endpoint index is out of range.
    pub fn endpoint(&self, ep_addr: EndpointAddress) -> Option<&EndpointState> {
        self.endpoints.get(ep_addr)
    }

    /// Returns the next free FIFO byte offset
    pub fn fifo_cursor(&self) -> usize {
        self.fifo.cursor()
    }

    /// Run `func` with endpoint `index` selected, then restore the previous
    /// selection
    pub(crate) fn with_selected<T>(&mut self, index: u8, func: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.usb.selected();
        self.usb.select(index);
        let result = func(self);
        self.usb.select(previous);
        result
    }

    /// Capture the controller's registers
    ///
    /// The selected endpoint is unchanged when this returns.
    pub fn dump_registers(&mut self) -> RegisterDump<EP_COUNT> {
        let mut dump = RegisterDump {
            faddr: self.usb.read8(Reg8::FAddr),
            power: self.usb.read8(Reg8::Power),
            devctl: self.usb.read8(Reg8::DevCtl),
            intr_usb_enable: self.usb.read8(Reg8::IntrUsbE),
            intr_tx_enable: self.usb.intr_tx_enable(),
            intr_rx_enable: self.usb.intr_rx_enable(),
            index: self.usb.selected(),
            endpoints: [EndpointRegisters::default(); EP_COUNT],
        };
        for index in 0..EP_COUNT {
            let regs = self.with_selected(index as u8, |driver| {
                let usb = &driver.usb;
                EndpointRegisters {
                    tx_max_packet: usb.read8(Reg8::TxMaxP),
                    tx_csrl: usb.read8(Reg8::TxCsrL),
                    tx_csrh: usb.read8(Reg8::TxCsrH),
                    rx_max_packet: usb.read8(Reg8::RxMaxP),
                    rx_csrl: usb.read8(Reg8::RxCsrL),
                    rx_csrh: usb.read8(Reg8::RxCsrH),
                    tx_fifo: [usb.read8(Reg8::TxFifoAddr), usb.read8(Reg8::TxFifoSize)],
                    rx_fifo: [usb.read8(Reg8::RxFifoAddr), usb.read8(Reg8::RxFifoSize)],
                }
            });
            debug!(
                "EP{} TXCSR {=u8:#x} {=u8:#x} RXCSR {=u8:#x} {=u8:#x}",
                index,
                regs.tx_csrl,
                regs.tx_csrh,
                regs.rx_csrl,
                regs.rx_csrh
            );
            dump.endpoints[index] = regs;
        }
        debug!(
            "FADDR {} POWER {=u8:#x} DEVCTL {=u8:#x} TXIE {=u16:#x} RXIE {=u16:#x}",
            dump.faddr,
            dump.power,
            dump.devctl,
            dump.intr_tx_enable,
            dump.intr_rx_enable
        );
        dump
    }

    /// Access the registers
    #[cfg(test)]
    pub(crate) fn registers(&mut self) -> &mut R {
        &mut self.usb
    }
}

/// A snapshot of the controller registers
#[derive(Clone, Copy, Debug)]
pub struct RegisterDump<const EP_COUNT: usize> {
    pub faddr: u8,
    pub power: u8,
    pub devctl: u8,
    pub intr_usb_enable: u8,
    pub intr_tx_enable: u16,
    pub intr_rx_enable: u16,
    /// The selected endpoint
    pub index: u8,
    pub endpoints: [EndpointRegisters; EP_COUNT],
}

/// A snapshot of one endpoint's indexed registers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndpointRegisters {
    pub tx_max_packet: u8,
    pub tx_csrl: u8,
    pub tx_csrh: u8,
    pub rx_max_packet: u8,
    pub rx_csrl: u8,
    pub rx_csrh: u8,
    /// FIFO start address and size code
    pub tx_fifo: [u8; 2],
    /// FIFO start address and size code
    pub rx_fifo: [u8; 2],
}
