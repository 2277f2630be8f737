//! Endpoint and control transfer state
//!
//! The driver keeps one [`EndpointState`] per endpoint, per direction. The
//! state describes how the endpoint was opened, and the progress of the
//! transfer that's using it.

use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// The maximum supported number of endpoints, per direction
pub const MAX_ENDPOINTS: usize = 8;

/// Max packet size of the control endpoint
pub const CONTROL_MAX_PACKET_SIZE: u16 = 64;

/// Stage of the control transfer on endpoint 0
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Ep0Stage {
    /// Waiting for a SETUP packet
    Setup,
    /// Sending the data stage of a control read
    InData,
    /// Receiving the data stage of a control write
    OutData,
    /// Sending the status stage of a control write
    InStatus,
    /// Waiting for the host's status stage of a control read
    OutStatus,
    /// Sending a zero-length packet to end a control read
    InZeroLengthPacket,
    /// Endpoint 0 is stalled
    Stalled,
}

/// Buffer for the most recent SETUP packet
#[repr(C, align(32))]
pub(crate) struct SetupPacket(pub [u8; 8]);

impl SetupPacket {
    pub const fn new() -> Self {
        SetupPacket([0; 8])
    }

    /// Returns `wLength`, the length of the data stage
    pub fn data_len(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }
}

/// Configuration and transfer progress of one endpoint direction
#[derive(Clone, Copy, Debug)]
pub struct EndpointState {
    max_packet_size: u16,
    kind: EndpointType,
    stalled: bool,
    enabled: bool,
    /// Next byte to move. Caller-owned, valid until the transfer completes.
    buffer: *mut u8,
    remaining: usize,
    transferred: usize,
}

// Safety: the buffer pointer is only dereferenced by the driver that owns
// this state, under the transfer contract of start_read / start_write.
unsafe impl Send for EndpointState {}

impl EndpointState {
    /// A closed endpoint
    pub const fn new() -> Self {
        EndpointState {
            max_packet_size: 0,
            kind: EndpointType::Control,
            stalled: false,
            enabled: false,
            buffer: core::ptr::null_mut(),
            remaining: 0,
            transferred: 0,
        }
    }

    /// The open control endpoint
    fn control() -> Self {
        EndpointState {
            max_packet_size: CONTROL_MAX_PACKET_SIZE,
            enabled: true,
            ..Self::new()
        }
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn kind(&self) -> EndpointType {
        self.kind
    }

    /// Indicates if the endpoint has been stalled by software
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Indicates if the endpoint is open
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bytes left to move in the current transfer
    pub fn bytes_remaining(&self) -> usize {
        self.remaining
    }

    /// Bytes moved so far in the current transfer
    pub fn bytes_transferred(&self) -> usize {
        self.transferred
    }

    pub(crate) fn open(&mut self, kind: EndpointType, max_packet_size: u16) {
        *self = EndpointState {
            max_packet_size,
            kind,
            enabled: true,
            ..Self::new()
        };
    }

    pub(crate) fn close(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Start a transfer over `len` bytes at `buffer`
    pub(crate) fn begin(&mut self, buffer: *mut u8, len: usize) {
        self.buffer = buffer;
        self.remaining = len;
        self.transferred = 0;
    }

    /// Size of the next packet to send
    pub(crate) fn next_packet_len(&self) -> usize {
        self.remaining.min(usize::from(self.max_packet_size))
    }

    /// Account for `len` bytes moved, and advance the buffer
    pub(crate) fn advance(&mut self, len: usize) {
        debug_assert!(len <= self.remaining);
        // Safety: len never exceeds the remaining bytes of the caller's buffer.
        self.buffer = unsafe { self.buffer.add(len) };
        self.remaining -= len;
        self.transferred += len;
    }

    /// The next `len` bytes of an IN transfer
    ///
    /// # Safety
    ///
    /// The transfer's buffer must still be valid, and `len` must not exceed
    /// the remaining bytes.
    pub(crate) unsafe fn pending_in(&self, len: usize) -> &[u8] {
        if len == 0 {
            return &[];
        }
        core::slice::from_raw_parts(self.buffer, len)
    }

    /// The next `len` bytes of an OUT transfer
    ///
    /// # Safety
    ///
    /// See [`pending_in`](EndpointState::pending_in).
    pub(crate) unsafe fn pending_out(&mut self, len: usize) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        core::slice::from_raw_parts_mut(self.buffer, len)
    }
}

/// Endpoint state for both directions of `COUNT` endpoints
pub(crate) struct EndpointTable<const COUNT: usize> {
    out_eps: [EndpointState; COUNT],
    in_eps: [EndpointState; COUNT],
}

impl<const COUNT: usize> EndpointTable<COUNT> {
    /// A table with only the control endpoint open
    pub fn new() -> Self {
        let mut table = EndpointTable {
            out_eps: [EndpointState::new(); COUNT],
            in_eps: [EndpointState::new(); COUNT],
        };
        table.out_eps[0] = EndpointState::control();
        table.in_eps[0] = EndpointState::control();
        table
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn get(&self, ep_addr: EndpointAddress) -> Option<&EndpointState> {
        match ep_addr.direction() {
            UsbDirection::Out => self.out_eps.get(ep_addr.index()),
            UsbDirection::In => self.in_eps.get(ep_addr.index()),
        }
    }

    pub fn get_mut(&mut self, ep_addr: EndpointAddress) -> Option<&mut EndpointState> {
        match ep_addr.direction() {
            UsbDirection::Out => self.out_eps.get_mut(ep_addr.index()),
            UsbDirection::In => self.in_eps.get_mut(ep_addr.index()),
        }
    }

    /// Both directions of endpoint 0
    pub fn control_mut(&mut self) -> (&mut EndpointState, &mut EndpointState) {
        (&mut self.out_eps[0], &mut self.in_eps[0])
    }

    pub fn in_ep_mut(&mut self, index: usize) -> &mut EndpointState {
        &mut self.in_eps[index]
    }

    pub fn out_ep_mut(&mut self, index: usize) -> &mut EndpointState {
        &mut self.out_eps[index]
    }
}

/// Address of the OUT endpoint at `index`
pub(crate) fn out_address(index: u8) -> EndpointAddress {
    EndpointAddress::from(index & 0x7F)
}

/// Address of the IN endpoint at `index`
pub(crate) fn in_address(index: u8) -> EndpointAddress {
    EndpointAddress::from(index | 0x80)
}
