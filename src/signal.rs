// Digital test signal primitives. Settle delays are the caller's job.

use embedded_hal::digital::v2::{InputPin, OutputPin};

pub fn assert_signal<P: OutputPin>(pin: &mut P, level: bool) {
    if level {
        pin.set_high().ok();
    } else {
        pin.set_low().ok();
    }
}

// A sense pin that can't be read counts as "no signal".
pub fn read_digital<I: InputPin>(pin: &I) -> bool {
    pin.is_high().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;
    impl InputPin for Broken {
        type Error = ();
        fn is_high(&self) -> Result<bool, ()> {
            Err(())
        }
        fn is_low(&self) -> Result<bool, ()> {
            Err(())
        }
    }

    struct Level(bool);
    impl OutputPin for Level {
        type Error = ();
        fn set_low(&mut self) -> Result<(), ()> {
            self.0 = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), ()> {
            self.0 = true;
            Ok(())
        }
    }

    #[test]
    fn unreadable_sense_is_not_detected() {
        assert!(!read_digital(&Broken));
    }

    #[test]
    fn asserts_requested_level() {
        let mut pin = Level(false);
        assert_signal(&mut pin, true);
        assert!(pin.0);
        assert_signal(&mut pin, false);
        assert!(!pin.0);
    }
}
