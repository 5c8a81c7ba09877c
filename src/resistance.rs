// DC resistance engine. A fixed test current is switched through the cable with its far end on the shorting bar.
// Pass/fail looks at the raw ADC count only, the calibrated ohm figure is informational.

use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;

use crate::adc::{AdcRead, Sampling};
use crate::calibration::{CalibrationRejected, CalibrationStore, CircuitCounts};
use crate::pcb_common::MAX_RESISTANCE_CIRCUITS;
use crate::profile::SenseTopology;
use crate::rig::TestRig;
use crate::switch_matrix::Path;
use crate::timing::Clock;
use crate::Fxd;

/// Calibration-relative cable resistance, clamped to zero.
pub mod derivation {
    use super::*;

    pub fn derive_milliohms(topology: SenseTopology, vcc: Fxd, sense_ohms: Fxd, v_meas: Fxd, v_cal: Fxd) -> u32 {
        let (i_cal, rise) = match topology {
            SenseTopology::HighSide => ((vcc - v_cal).checked_div(sense_ohms), v_meas - v_cal),
            SenseTopology::LowSide => (v_cal.checked_div(sense_ohms), v_cal - v_meas),
        };
        let Some(i_cal) = i_cal.filter(|i| *i > Fxd::ZERO) else { return 0 };
        let ohms = rise.checked_div(i_cal).unwrap_or(Fxd::MAX);
        let milliohms = ohms.saturating_mul(Fxd::from_num(1000));
        enforce_bounds(milliohms)
    }

    fn enforce_bounds(milliohms: Fxd) -> u32 {
        if milliohms <= Fxd::ZERO {
            0
        } else {
            milliohms.saturating_to_num::<u32>()
        }
    }
}
use derivation::derive_milliohms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitReading {
    pub raw: u16,
    pub baseline: Option<u16>,
    pub milliohms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResistanceReport {
    pub passed: bool,
    pub circuits: Vec<CircuitReading, MAX_RESISTANCE_CIRCUITS>,
}
impl ResistanceReport {
    pub fn calibrated(&self) -> bool {
        self.circuits.iter().all(|c| c.milliohms.is_some())
    }
}

fn measure_circuit<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, circuit: usize, sampling: Sampling) -> u16
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let Some(spec) = rig.profile().resistance.circuits.get(circuit).copied() else { return 0 };
    let current_settle = rig.profile().timings.current_settle_ms;
    rig.with_path(Path::Resistance { circuit }, |rig| {
        rig.sources().current_enable.set_high().ok();
        rig.settle(current_settle);
        rig.sample(spec.channel, sampling).mean_count()
    })
}

pub fn run_resistance<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, store: &CalibrationStore) -> ResistanceReport
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let spec = rig.profile().resistance;
    let vcc = rig.adc().count_to_volts(crate::adc::ADC_FULL_SCALE);
    let sense_ohms = Fxd::from_num(spec.sense_resistor_milliohms) / Fxd::from_num(1000);

    let mut circuits = Vec::new();
    let mut passed = true;
    for circuit in 0..spec.circuits.len().min(MAX_RESISTANCE_CIRCUITS) {
        let raw = measure_circuit(rig, circuit, spec.test);
        passed &= spec.passes(raw);
        let baseline = store.baseline(circuit);
        let milliohms = baseline.map(|cal| {
            let adc = rig.adc();
            derive_milliohms(spec.topology, vcc, sense_ohms, adc.count_to_volts(raw), adc.count_to_volts(cal))
        });
        circuits.push(CircuitReading { raw, baseline, milliohms }).ok();
    }
    ResistanceReport { passed, circuits }
}

/// Measures every circuit against the reference cable and stores all baselines, or none of them.
pub fn calibrate<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, store: &mut CalibrationStore) -> Result<CircuitCounts, CalibrationRejected>
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let spec = rig.profile().resistance;
    let mut readings = CircuitCounts::new();
    for circuit in 0..spec.circuits.len().min(MAX_RESISTANCE_CIRCUITS) {
        readings.push(measure_circuit(rig, circuit, spec.calibration)).ok();
    }
    if readings.iter().any(|raw| spec.rejects_reference(*raw)) {
        return Err(CalibrationRejected { readings });
    }
    store.commit(&readings);
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volts(v: f64) -> Fxd {
        Fxd::from_num(v)
    }

    #[test]
    fn high_side_measures_rise_over_baseline() {
        // 0.5 V baseline at 5 V through 10 ohm gives 0.45 A, another 0.45 V is one ohm
        let mohm = derive_milliohms(SenseTopology::HighSide, volts(5.0), volts(10.0), volts(0.95), volts(0.5));
        assert!((999..=1000).contains(&mohm), "{mohm}");
    }

    #[test]
    fn low_side_measures_drop_below_baseline() {
        // 4.5 V baseline through 10 ohm gives 0.45 A
        let mohm = derive_milliohms(SenseTopology::LowSide, volts(5.0), volts(10.0), volts(4.05), volts(4.5));
        assert!((999..=1000).contains(&mohm), "{mohm}");
    }

    #[test]
    fn never_negative() {
        assert_eq!(derive_milliohms(SenseTopology::HighSide, volts(5.0), volts(10.0), volts(0.2), volts(0.5)), 0);
        assert_eq!(derive_milliohms(SenseTopology::LowSide, volts(5.0), volts(10.0), volts(4.9), volts(4.5)), 0);
    }

    #[test]
    fn degenerate_baseline_reads_zero() {
        assert_eq!(derive_milliohms(SenseTopology::HighSide, volts(5.0), volts(10.0), volts(5.0), volts(5.0)), 0);
        assert_eq!(derive_milliohms(SenseTopology::LowSide, volts(5.0), volts(10.0), volts(0.0), volts(0.0)), 0);
    }

    #[test]
    fn low_side_is_monotonic_in_baseline() {
        let meas = volts(4.2);
        let mut last = 0;
        for cal_mv in [4300u32, 4400, 4500, 4600, 4700, 4800] {
            let cal = Fxd::from_num(cal_mv) / Fxd::from_num(1000);
            let mohm = derive_milliohms(SenseTopology::LowSide, volts(5.0), volts(10.0), meas, cal);
            assert!(mohm >= last);
            last = mohm;
        }
    }

    #[test]
    fn equal_reading_and_baseline_is_zero() {
        for topology in [SenseTopology::HighSide, SenseTopology::LowSide] {
            assert_eq!(derive_milliohms(topology, volts(5.0), volts(10.0), volts(2.0), volts(2.0)), 0);
        }
    }
}
