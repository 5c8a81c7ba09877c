// This file acts as an abstraction layer for board-specific values of the 3-pin (XLR) fixture.
// Pin 2 and pin 3 are measured as separate resistance circuits, K3 moves the measure bus from pin 2 to pin 3.
// Both connector shells have a fixture contact, the shells are checked against pin 1.

pub use crate::pcb_common::*;
use crate::adc::Sampling;
use crate::profile::{CableProfile, CapacitanceSpec, ChargeThreshold, Conductor, MatrixLabels, MatrixOrder, ResistanceCircuit, ResistanceSpec, SenseTopology, ShellBondSpec, SupplyMonitor, Timings};

pub mod adc_channels {
    use crate::adc::AdcChannel;

    pub const RESISTANCE_SENSE: AdcChannel = AdcChannel::A0;
    pub const CAPACITANCE_SENSE: AdcChannel = AdcChannel::A1;
    pub const SUPPLY_MONITOR: AdcChannel = AdcChannel::A2;
}

pub mod circuit_constants {
    pub const ADC_VREF_MILLIVOLTS: u16 = 5000;
    pub const SENSE_RESISTOR_MILLIOHMS: u32 = 10_000;
    pub const CHARGE_RESISTOR_KILOHMS: u32 = 2_200;
    pub const SUPPLY_DIVIDER: u16 = 2;
}

pub mod thresholds {
    pub const RESISTANCE_PASS_MAX_ADC: u16 = 150;
    pub const CALIBRATION_REJECT_ABOVE_ADC: u16 = 600;
    pub const CAPACITANCE_TIMEOUT_US: u32 = 100_000;
    pub const STRAY_CAPACITANCE_DECIPF: u32 = 200;
    pub const CAPACITANCE_PASS_MIN_DECIPF: u32 = 500;
    pub const CAPACITANCE_PASS_MAX_DECIPF: u32 = 20_000;
}

const CONDUCTORS: [Conductor; 3] = [
    Conductor { name: "PIN1", code: "1", drive_line: 0, sense_line: 0 },
    Conductor { name: "PIN2", code: "2", drive_line: 1, sense_line: 1 },
    Conductor { name: "PIN3", code: "3", drive_line: 2, sense_line: 2 },
];

const RESISTANCE_CIRCUITS: [ResistanceCircuit; 2] = [
    ResistanceCircuit { label: "P2", channel: adc_channels::RESISTANCE_SENSE, conductor: 1, select: RelayState::IDLE },
    ResistanceCircuit { label: "P3", channel: adc_channels::RESISTANCE_SENSE, conductor: 2, select: RelayState::IDLE.with(RelayLine::ConductorSelect) },
];

pub const PROFILE: CableProfile = CableProfile {
    tester_id: "CT-XLR-01",
    vref_millivolts: circuit_constants::ADC_VREF_MILLIVOLTS,
    conductors: &CONDUCTORS,
    matrix: MatrixLabels { prefix: "P", order: MatrixOrder::RowMajor },
    resistance: ResistanceSpec {
        circuits: &RESISTANCE_CIRCUITS,
        return_conductor: 0, // shield
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
        threshold: ChargeThreshold::TimeConstant,
        timeout_us: thresholds::CAPACITANCE_TIMEOUT_US,
        discharge_ms: 10,
        cycles: 5,
        cycle_gap_ms: 10,
        default_stray_decipf: thresholds::STRAY_CAPACITANCE_DECIPF,
        pass_min_decipf: thresholds::CAPACITANCE_PASS_MIN_DECIPF,
        pass_max_decipf: thresholds::CAPACITANCE_PASS_MAX_DECIPF,
    }),
    shell: Some(ShellBondSpec { ground_conductor: 0 }),
    supply: SupplyMonitor {
        channel: adc_channels::SUPPLY_MONITOR,
        divider: circuit_constants::SUPPLY_DIVIDER,
        min_millivolts: 4500,
        max_millivolts: 5500,
        sampling: Sampling { samples: 10, spacing_ms: 1 },
    },
    timings: Timings { relay_settle_ms: 20, signal_settle_ms: 5, current_settle_ms: 10, indicator_on_ms: 100, heartbeat_ms: 1000 },
};
