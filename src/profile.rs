// Static description of a board variant. Every engine is driven from one of these tables instead of per-variant code.

use crate::adc::{AdcChannel, Sampling, ADC_FULL_SCALE};
use crate::pcb_common::{RelayState, MAX_CONDUCTORS};
use crate::Fxd;

/// One electrically distinct path through the cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conductor {
    pub name: &'static str, // used in defect codes, e.g. TIP_OPEN
    pub code: &'static str, // used in matrix field names, e.g. TS
    pub drive_line: usize,  // index into TesterPins::drive
    pub sense_line: usize,  // index into TesterPins::sense
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixOrder {
    DiagonalFirst, // each row starts with its own diagonal entry: TT, TS, SS, ST
    RowMajor,      // plain row-major order: P11, P12, ... P33
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixLabels {
    pub prefix: &'static str,
    pub order: MatrixOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseTopology {
    HighSide, // sense resistor between supply and cable, node voltage rises with resistance
    LowSide,  // sense resistor between cable and ground, node voltage falls with resistance
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResistanceCircuit {
    pub label: &'static str, // prefix on response fields. Empty on single circuit boards
    pub channel: AdcChannel,
    pub conductor: usize,
    pub select: RelayState, // extra relay lines that put this circuit on the measure bus
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResistanceSpec {
    pub circuits: &'static [ResistanceCircuit],
    pub return_conductor: usize, // carries the test current back from the shorting bar
    pub topology: SenseTopology,
    pub sense_resistor_milliohms: u32,
    pub pass_threshold: u16,    // raw ADC count
    pub calibration_limit: u16, // raw ADC count beyond which no reference cable is present
    pub test: Sampling,
    pub calibration: Sampling,
}
impl ResistanceSpec {
    pub fn passes(&self, raw: u16) -> bool {
        match self.topology {
            SenseTopology::HighSide => raw <= self.pass_threshold,
            SenseTopology::LowSide => raw >= self.pass_threshold,
        }
    }
    pub fn rejects_reference(&self, raw: u16) -> bool {
        match self.topology {
            SenseTopology::HighSide => raw > self.calibration_limit,
            SenseTopology::LowSide => raw < self.calibration_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeThreshold {
    HalfSupply,   // t = RC ln2
    TimeConstant, // t = RC, 63.2% of supply
}
impl ChargeThreshold {
    pub fn adc_count(&self) -> u16 {
        match self {
            ChargeThreshold::HalfSupply => ADC_FULL_SCALE / 2 + 1,
            ChargeThreshold::TimeConstant => ((ADC_FULL_SCALE as u32 * 632 + 500) / 1000) as u16,
        }
    }
    pub fn time_constant_multiple(&self) -> Fxd {
        match self {
            ChargeThreshold::HalfSupply => Fxd::from_num(fixed::consts::LN_2),
            ChargeThreshold::TimeConstant => Fxd::from_num(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitanceSpec {
    pub channel: AdcChannel,
    pub charge_resistor_kilohms: u32,
    pub threshold: ChargeThreshold,
    pub timeout_us: u32,
    pub discharge_ms: u16,
    pub cycles: u8,
    pub cycle_gap_ms: u16,
    pub default_stray_decipf: u32,
    pub pass_min_decipf: u32,
    pub pass_max_decipf: u32,
}

/// Boards whose connectors have a metal shell bonded to one of the conductors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellBondSpec {
    pub ground_conductor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyMonitor {
    pub channel: AdcChannel,
    pub divider: u16,
    pub min_millivolts: u16,
    pub max_millivolts: u16,
    pub sampling: Sampling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub relay_settle_ms: u16,
    pub signal_settle_ms: u16,
    pub current_settle_ms: u16,
    pub indicator_on_ms: u16,
    pub heartbeat_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableProfile {
    pub tester_id: &'static str,
    pub vref_millivolts: u16,
    pub conductors: &'static [Conductor],
    pub matrix: MatrixLabels,
    pub resistance: ResistanceSpec,
    pub capacitance: Option<CapacitanceSpec>,
    pub shell: Option<ShellBondSpec>,
    pub supply: SupplyMonitor,
    pub timings: Timings,
}
impl CableProfile {
    pub fn conductor_count(&self) -> usize {
        self.conductors.len().min(MAX_CONDUCTORS)
    }
}
