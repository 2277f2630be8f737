//! FIFO space allocation and FIFO port copies
//!
//! The controller shares one packet RAM across every endpoint. Each
//! endpoint direction claims a power-of-two slice of it when it's opened,
//! and data moves through a per-endpoint port register.

use crate::registers::Registers;

/// Size of the shared packet RAM, in bytes
///
/// The placement registers hold the start address in units of eight bytes,
/// in eight bits.
pub const FIFO_CAPACITY: usize = 2048;

/// Smallest FIFO slice
const MIN_BUCKET: usize = 8;
/// Largest FIFO slice
const MAX_BUCKET: usize = 2048;

/// A slice of the shared FIFO
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Start of the slice, in bytes
    pub offset: u16,
    /// Length of the slice, in bytes. Always a power of two.
    pub size: u16,
}

impl Allocation {
    /// Returns the hardware size code, `log2(size / 8)`
    pub fn size_code(&self) -> u8 {
        (self.size / MIN_BUCKET as u16).trailing_zeros() as u8
    }
}

/// Rounds `max_packet_size` up to a FIFO bucket
///
/// Returns `None` if the packet is larger than the largest bucket.
fn bucket(max_packet_size: usize) -> Option<usize> {
    let size = max_packet_size.max(MIN_BUCKET).checked_next_power_of_two()?;
    (size <= MAX_BUCKET).then_some(size)
}

/// Monotonic FIFO space allocator
///
/// Space is never reclaimed. Call [`reset()`](Allocator::reset) when the
/// bus resets and every endpoint is reconfigured.
pub struct Allocator {
    cursor: usize,
}

impl Allocator {
    /// Create an allocator that has handed out the first `reserved` bytes
    pub const fn new(reserved: usize) -> Self {
        Allocator { cursor: reserved }
    }

    /// Forget every allocation except the first `reserved` bytes
    pub fn reset(&mut self, reserved: usize) {
        self.cursor = reserved;
    }

    /// Returns the next free byte offset
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Allocate a FIFO slice large enough for `max_packet_size`
    ///
    /// Returns `None` if no bucket fits the packet, or if the FIFO is out of
    /// space. The allocator is unchanged when allocation fails.
    pub fn allocate(&mut self, max_packet_size: usize) -> Option<Allocation> {
        let size = bucket(max_packet_size)?;
        let end = self.cursor.checked_add(size)?;
        if end > FIFO_CAPACITY {
            return None;
        }
        let allocation = Allocation {
            offset: self.cursor as u16,
            size: size as u16,
        };
        self.cursor = end;
        Some(allocation)
    }
}

/// Returns `true` if word transfers may be used for `ptr`
fn word_aligned(ptr: *const u8) -> bool {
    ptr as usize % core::mem::align_of::<u32>() == 0
}

/// Push all of `data` into endpoint `ep`'s FIFO
///
/// Uses word transfers, then bytes for the tail, when `data` is word aligned.
/// Otherwise, every transfer is a byte.
pub fn write<R: Registers + ?Sized>(usb: &mut R, ep: u8, data: &[u8]) {
    if word_aligned(data.as_ptr()) {
        let mut words = data.chunks_exact(4);
        for word in &mut words {
            usb.fifo_write32(ep, u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        }
        for &byte in words.remainder() {
            usb.fifo_write8(ep, byte);
        }
    } else {
        for &byte in data {
            usb.fifo_write8(ep, byte);
        }
    }
}

/// Fill all of `buffer` from endpoint `ep`'s FIFO
///
/// Access widths follow the same rules as [`write`].
pub fn read<R: Registers + ?Sized>(usb: &mut R, ep: u8, buffer: &mut [u8]) {
    if word_aligned(buffer.as_ptr()) {
        let mut words = buffer.chunks_exact_mut(4);
        for word in &mut words {
            word.copy_from_slice(&usb.fifo_read32(ep).to_le_bytes());
        }
        for byte in words.into_remainder() {
            *byte = usb.fifo_read8(ep);
        }
    } else {
        for byte in buffer {
            *byte = usb.fifo_read8(ep);
        }
    }
}
