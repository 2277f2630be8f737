//! Time sources for bounded polling

use core::num::NonZeroU32;

/// A monotonic microsecond clock
///
/// [`wait_in_data_avail()`](crate::Driver::wait_in_data_avail) uses a
/// `Monotonic` to bound its busy-wait.
pub trait Monotonic {
    /// Returns the microseconds elapsed since some fixed point
    fn now_us(&mut self) -> u64;
}

/// A [`Monotonic`] clock over the Cortex-M DWT cycle counter
///
/// The cycle counter must already be enabled. Call [`now_us()`](Monotonic::now_us)
/// at least once per counter period (`2^32` cycles) so that wrap-around
/// is accounted for.
pub struct CycleCounter {
    cycles_per_us: NonZeroU32,
    last: u32,
    cycles: u64,
}

impl CycleCounter {
    /// Create a clock for a core running at `cycles_per_us` MHz
    pub fn new(cycles_per_us: NonZeroU32) -> Self {
        Self::starting_at(cycles_per_us, cortex_m::peripheral::DWT::cycle_count())
    }

    fn starting_at(cycles_per_us: NonZeroU32, last: u32) -> Self {
        CycleCounter {
            cycles_per_us,
            last,
            cycles: 0,
        }
    }

    /// Account for the counter reading `now`, and return the elapsed microseconds
    fn advance(&mut self, now: u32) -> u64 {
        self.cycles += u64::from(now.wrapping_sub(self.last));
        self.last = now;
        self.cycles / u64::from(self.cycles_per_us.get())
    }
}

impl Monotonic for CycleCounter {
    fn now_us(&mut self) -> u64 {
        self.advance(cortex_m::peripheral::DWT::cycle_count())
    }
}

#[cfg(test)]
mod tests {
    use super::CycleCounter;
    use core::num::NonZeroU32;

    const MHZ_120: NonZeroU32 = match NonZeroU32::new(120) {
        Some(mhz) => mhz,
        None => panic!(),
    };

    #[test]
    fn counts_whole_microseconds() {
        let mut clock = CycleCounter::starting_at(MHZ_120, 1_000);
        assert_eq!(clock.advance(1_000), 0);
        assert_eq!(clock.advance(1_119), 0);
        assert_eq!(clock.advance(1_120), 1);
        assert_eq!(clock.advance(1_000 + 120 * 50), 50);
    }

    #[test]
    fn counter_wrap_keeps_counting() {
        let mut clock = CycleCounter::starting_at(MHZ_120, u32::MAX - 59);
        assert_eq!(clock.advance(60), 1);
        assert_eq!(clock.advance(60 + 240), 3);
    }
}
