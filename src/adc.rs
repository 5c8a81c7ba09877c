// This file wraps the tester's on-chip ADC. PCB-specific values (reference voltage, channel connections) can be found in the pcb_mapping file.

use embedded_hal::blocking::delay::DelayMs;

use crate::Fxd;

pub const ADC_FULL_SCALE: u16 = 1023; // 10-bit converter

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum AdcChannel {
    A0 = 0,
    A1 = 1,
    A2 = 2,
    A3 = 3,
    A4 = 4,
    A5 = 5,
    A6 = 6,
    A7 = 7,
}

/// A single raw conversion from one of the converter's inputs.
pub trait AdcRead {
    fn read_count(&mut self, channel: AdcChannel) -> u16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    pub samples: u16,
    pub spacing_ms: u16,
}

/// Mean of a burst of conversions. Only lives for the duration of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragedSample {
    total: u32,
    samples: u16,
    vref_millivolts: u16,
}
impl AveragedSample {
    pub fn samples(&self) -> u16 {
        self.samples
    }
    // Rounded to the nearest count
    pub fn mean_count(&self) -> u16 {
        let n = self.samples as u32;
        ((self.total + n / 2) / n) as u16
    }
    pub fn millivolts(&self) -> u16 {
        ((self.total as u64 * self.vref_millivolts as u64) / (self.samples as u64 * ADC_FULL_SCALE as u64)) as u16
    }
}

pub struct Adc<A> {
    converter: A,
    vref_millivolts: u16,
}
impl<A: AdcRead> Adc<A> {
    pub fn new(converter: A, vref_millivolts: u16) -> Adc<A> {
        Adc { converter, vref_millivolts }
    }
    pub fn vref_millivolts(&self) -> u16 {
        self.vref_millivolts
    }
    pub fn read_count(&mut self, channel: AdcChannel) -> u16 {
        self.converter.read_count(channel).min(ADC_FULL_SCALE)
    }
    pub fn count_to_millivolts(&self, count: u16) -> u16 {
        ((count as u32 * self.vref_millivolts as u32) / ADC_FULL_SCALE as u32) as u16
    }
    pub fn count_to_volts(&self, count: u16) -> Fxd {
        Fxd::from_num(count) * Fxd::from_num(self.vref_millivolts) / (Fxd::from_num(ADC_FULL_SCALE) * Fxd::from_num(1000))
    }
    // Spacing between conversions keeps the burst from locking onto supply ripple.
    pub fn read_averaged(&mut self, channel: AdcChannel, sampling: Sampling, delay: &mut impl DelayMs<u16>) -> AveragedSample {
        let samples = sampling.samples.max(1);
        let mut total: u32 = 0;
        for i in 0..samples {
            if i > 0 {
                delay.delay_ms(sampling.spacing_ms);
            }
            total += self.read_count(channel) as u32;
        }
        AveragedSample { total, samples, vref_millivolts: self.vref_millivolts }
    }
}
