use embedded_hal::blocking::delay::{DelayMs, DelayUs};

/// Free-running microsecond counter. Wraps at u32::MAX, compare with `wrapping_sub`.
pub trait Monotonic {
    fn micros(&mut self) -> u32;
}

/// Everything a test sequence needs from the timer peripheral.
pub trait Clock: DelayMs<u16> + DelayUs<u16> + Monotonic {}
impl<T: DelayMs<u16> + DelayUs<u16> + Monotonic> Clock for T {}

pub fn elapsed_us(clock: &mut impl Monotonic, since: u32) -> u32 {
    clock.micros().wrapping_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);
    impl Monotonic for Counter {
        fn micros(&mut self) -> u32 {
            self.0
        }
    }

    #[test]
    fn elapsed_survives_wraparound() {
        let mut clock = Counter(5);
        assert_eq!(elapsed_us(&mut clock, u32::MAX - 4), 10);
    }
}
