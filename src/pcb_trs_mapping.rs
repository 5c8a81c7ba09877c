// This file acts as an abstraction layer for board-specific values of the 3-conductor (TRS) fixture.
// This board predates the capacitance network and senses resistance on the low side.

pub use crate::pcb_common::*;
use crate::adc::Sampling;
use crate::profile::{CableProfile, Conductor, MatrixLabels, MatrixOrder, ResistanceCircuit, ResistanceSpec, SenseTopology, SupplyMonitor, Timings};

pub mod adc_channels {
    use crate::adc::AdcChannel;

    pub const RESISTANCE_SENSE: AdcChannel = AdcChannel::A0;
    pub const SUPPLY_MONITOR: AdcChannel = AdcChannel::A2;
}

pub mod circuit_constants {
    pub const ADC_VREF_MILLIVOLTS: u16 = 5000;
    pub const SENSE_RESISTOR_MILLIOHMS: u32 = 10_000;
    pub const SUPPLY_DIVIDER: u16 = 2;
}

pub mod thresholds {
    pub const RESISTANCE_PASS_MIN_ADC: u16 = 880;
    pub const CALIBRATION_REJECT_BELOW_ADC: u16 = 700; // nothing flows through the sense resistor without a cable
}

const CONDUCTORS: [Conductor; 3] = [
    Conductor { name: "TIP", code: "T", drive_line: 0, sense_line: 0 },
    Conductor { name: "RING", code: "R", drive_line: 1, sense_line: 1 },
    Conductor { name: "SLEEVE", code: "S", drive_line: 2, sense_line: 2 },
];

const RESISTANCE_CIRCUITS: [ResistanceCircuit; 1] = [
    ResistanceCircuit { label: "", channel: adc_channels::RESISTANCE_SENSE, conductor: 0, select: RelayState::IDLE },
];

pub const PROFILE: CableProfile = CableProfile {
    tester_id: "CT-TRS-01",
    vref_millivolts: circuit_constants::ADC_VREF_MILLIVOLTS,
    conductors: &CONDUCTORS,
    matrix: MatrixLabels { prefix: "", order: MatrixOrder::DiagonalFirst },
    resistance: ResistanceSpec {
        circuits: &RESISTANCE_CIRCUITS,
        return_conductor: 2,
        topology: SenseTopology::LowSide,
        sense_resistor_milliohms: circuit_constants::SENSE_RESISTOR_MILLIOHMS,
        pass_threshold: thresholds::RESISTANCE_PASS_MIN_ADC,
        calibration_limit: thresholds::CALIBRATION_REJECT_BELOW_ADC,
        test: Sampling { samples: 20, spacing_ms: 5 },
        calibration: Sampling { samples: 50, spacing_ms: 10 },
    },
    capacitance: None,
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
