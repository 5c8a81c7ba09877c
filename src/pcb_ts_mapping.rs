// This file acts as an abstraction layer for board-specific values of the 2-conductor (TS) fixture.

pub use crate::pcb_common::*;
use crate::adc::Sampling;
use crate::profile::{CableProfile, CapacitanceSpec, ChargeThreshold, Conductor, MatrixLabels, MatrixOrder, ResistanceCircuit, ResistanceSpec, SenseTopology, SupplyMonitor, Timings};

pub mod adc_channels {
    use crate::adc::AdcChannel;

    pub const RESISTANCE_SENSE: AdcChannel = AdcChannel::A0;
    pub const CAPACITANCE_SENSE: AdcChannel = AdcChannel::A1; // dedicated, the resistance node has too much parasitic load
    pub const SUPPLY_MONITOR: AdcChannel = AdcChannel::A2;
}

pub mod circuit_constants {
    pub const ADC_VREF_MILLIVOLTS: u16 = 5000; // ratiometric to the supply
    pub const SENSE_RESISTOR_MILLIOHMS: u32 = 10_000;
    pub const CHARGE_RESISTOR_KILOHMS: u32 = 2_200;
    pub const SUPPLY_DIVIDER: u16 = 2;
}

pub mod thresholds {
    pub const RESISTANCE_PASS_MAX_ADC: u16 = 150;
    pub const CALIBRATION_REJECT_ABOVE_ADC: u16 = 600; // an open fixture pulls the node towards the rail
    pub const CAPACITANCE_TIMEOUT_US: u32 = 100_000;
    pub const STRAY_CAPACITANCE_DECIPF: u32 = 200;
    pub const CAPACITANCE_PASS_MIN_DECIPF: u32 = 500;
    pub const CAPACITANCE_PASS_MAX_DECIPF: u32 = 20_000;
}

const CONDUCTORS: [Conductor; 2] = [
    Conductor { name: "TIP", code: "T", drive_line: 0, sense_line: 0 },
    Conductor { name: "SLEEVE", code: "S", drive_line: 1, sense_line: 1 },
];

const RESISTANCE_CIRCUITS: [ResistanceCircuit; 1] = [
    ResistanceCircuit { label: "", channel: adc_channels::RESISTANCE_SENSE, conductor: 0, select: RelayState::IDLE },
];

pub const PROFILE: CableProfile = CableProfile {
    tester_id: "CT-TS-01",
    vref_millivolts: circuit_constants::ADC_VREF_MILLIVOLTS,
    conductors: &CONDUCTORS,
    matrix: MatrixLabels { prefix: "", order: MatrixOrder::DiagonalFirst },
    resistance: ResistanceSpec {
        circuits: &RESISTANCE_CIRCUITS,
        return_conductor: 1,
        topology: SenseTopology::HighSide,
        sense_resistor_milliohms: circuit_constants::SENSE_RESISTOR_MILLIOHMS,
        pass_threshold: thresholds::RESISTANCE_PASS_MAX_ADC,
        calibration_limit: thresholds::CALIBRATION_REJECT_ABOVE_ADC,
        test: Sampling { samples: 20, spacing_ms: 5 },
        calibration: Sampling { samples: 50, spacing_ms: 10 },
    },
    capacitance: Some(CapacitanceSpec {
        channel: adc_channels::CAPACITANCE_SENSE,
        charge_resistor_kilohms: circuit_constants::CHARGE_RESISTOR_KILOHMS,
        threshold: ChargeThreshold::HalfSupply,
        timeout_us: thresholds::CAPACITANCE_TIMEOUT_US,
        discharge_ms: 10,
        cycles: 5,
        cycle_gap_ms: 10,
        default_stray_decipf: thresholds::STRAY_CAPACITANCE_DECIPF,
        pass_min_decipf: thresholds::CAPACITANCE_PASS_MIN_DECIPF,
        pass_max_decipf: thresholds::CAPACITANCE_PASS_MAX_DECIPF,
    }),
    shell: None,
    supply: SupplyMonitor {
        channel: adc_channels::SUPPLY_MONITOR,
        divider: circuit_constants::SUPPLY_DIVIDER,
        min_millivolts: 4500,
        max_millivolts: 5500,
        sampling: Sampling { samples: 10, spacing_ms: 1 },
    },
    timings: Timings { relay_settle_ms: 20, signal_settle_ms: 5, current_settle_ms: 10, indicator_on_ms: 100, heartbeat_ms: 1000 },
};
