// Capacitance engine. Times an RC charge of the cable from the far end floating, C = t / (R * k).

use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::adc::AdcRead;
use crate::calibration::CalibrationStore;
use crate::profile::{CapacitanceSpec, ChargeThreshold};
use crate::rig::TestRig;
use crate::switch_matrix::Path;
use crate::timing::{elapsed_us, Clock};
use crate::Fxd;

pub mod rc_equations {
    use super::*;

    // C[pF] = t[us] / (R[Mohm] * k), reported in tenths of a picofarad.
    pub fn charge_time_to_decipf(time_us: u32, charge_resistor_kilohms: u32, threshold: ChargeThreshold) -> u32 {
        let denominator = Fxd::from_num(charge_resistor_kilohms) * threshold.time_constant_multiple();
        let decipf = (Fxd::from_num(time_us) * Fxd::from_num(10_000)).checked_div(denominator).unwrap_or(Fxd::ZERO);
        if decipf <= Fxd::ZERO {
            0
        } else {
            decipf.round().saturating_to_num::<u32>()
        }
    }
}
use rc_equations::charge_time_to_decipf;

/// Averaged charge cycles before the stray constant is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeMeasurement {
    pub time_us: u32,
    pub raw_decipf: u32,
    pub samples: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitanceOutcome {
    Measured { decipf: u32, time_us: u32, samples: u8, in_band: bool },
    Timeout,
}

fn time_one_charge<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, spec: &CapacitanceSpec) -> Option<u32>
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    rig.sources().cap_charge.set_low().ok();
    rig.sources().cap_discharge.set_high().ok();
    rig.settle(spec.discharge_ms);
    rig.sources().cap_discharge.set_low().ok();

    let threshold = spec.threshold.adc_count();
    let start = rig.clock().micros();
    rig.sources().cap_charge.set_high().ok();
    let crossed = loop {
        let count = rig.read_count(spec.channel);
        let elapsed = elapsed_us(rig.clock(), start);
        if count >= threshold {
            break Some(elapsed);
        }
        if elapsed > spec.timeout_us {
            break None;
        }
    };
    rig.sources().cap_charge.set_low().ok();
    crossed
}

/// Runs every charge cycle and averages the ones that crossed the threshold. `None` when none did.
pub fn measure_charge<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, spec: &CapacitanceSpec) -> Option<ChargeMeasurement>
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let (total_us, samples) = rig.with_path(Path::Capacitance, |rig| {
        let mut total_us: u64 = 0;
        let mut samples: u8 = 0;
        for cycle in 0..spec.cycles {
            if cycle > 0 {
                rig.settle(spec.cycle_gap_ms);
            }
            if let Some(t) = time_one_charge(rig, spec) {
                total_us += t as u64;
                samples += 1;
            }
        }
        (total_us, samples)
    });
    if samples == 0 {
        return None;
    }
    let time_us = ((total_us + samples as u64 / 2) / samples as u64) as u32;
    Some(ChargeMeasurement {
        time_us,
        raw_decipf: charge_time_to_decipf(time_us, spec.charge_resistor_kilohms, spec.threshold),
        samples,
    })
}

pub fn run_capacitance<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, spec: &CapacitanceSpec, store: &CalibrationStore) -> CapacitanceOutcome
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    match measure_charge(rig, spec) {
        None => CapacitanceOutcome::Timeout,
        Some(m) => {
            let decipf = m.raw_decipf.saturating_sub(store.stray_decipf());
            CapacitanceOutcome::Measured {
                decipf,
                time_us: m.time_us,
                samples: m.samples,
                in_band: (spec.pass_min_decipf..=spec.pass_max_decipf).contains(&decipf),
            }
        }
    }
}

/// Measures the empty fixture and keeps the result as the stray constant. A timeout keeps the old constant.
pub fn calibrate_stray<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, spec: &CapacitanceSpec, store: &mut CalibrationStore) -> Option<u32>
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let m = measure_charge(rig, spec)?;
    store.set_stray_decipf(m.raw_decipf);
    Some(m.raw_decipf)
}
