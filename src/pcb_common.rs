// This file contains fixture structures shared by every board variant. Variant-specific values live in the pcb_*_mapping files.

use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};

pub const MAX_CONDUCTORS: usize = 3;
pub const MAX_RESISTANCE_CIRCUITS: usize = 2;
pub const RELAY_LINE_COUNT: usize = 4;
pub const INDICATOR_COUNT: usize = 4;

// Relay lines on the switch matrix. Every line is de-energized when the tester is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayLine {
    FarEnd = 0,          // K1: far end of the cable to the drive lines. Idle: far end on the shorting bar
    DriveIsolate = 1,    // K2: detaches the drive lines so the far end floats
    ConductorSelect = 2, // K3: second resistance circuit onto the measure bus
    MeasureMode = 3,     // K4: measure bus to the test current source. Idle: measure bus to the capacitance network
}
impl RelayLine {
    pub const ALL: [RelayLine; RELAY_LINE_COUNT] = [RelayLine::FarEnd, RelayLine::DriveIsolate, RelayLine::ConductorSelect, RelayLine::MeasureMode];

    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of energized relay lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayState(u8);
impl RelayState {
    pub const IDLE: RelayState = RelayState(0);

    pub const fn with(self, line: RelayLine) -> RelayState {
        RelayState(self.0 | line.mask())
    }
    pub const fn union(self, other: RelayState) -> RelayState {
        RelayState(self.0 | other.0)
    }
    pub const fn is_energized(&self, line: RelayLine) -> bool {
        self.0 & line.mask() != 0
    }
    pub const fn is_idle(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Status = 0,
    Pass = 1,
    Fail = 2,
    Error = 3,
}
impl Indicator {
    pub const ALL: [Indicator; INDICATOR_COUNT] = [Indicator::Status, Indicator::Pass, Indicator::Fail, Indicator::Error];

    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Status => "STATUS",
            Indicator::Pass => "PASS",
            Indicator::Fail => "FAIL",
            Indicator::Error => "ERROR",
        }
    }
}

// Structures that group commonly used pins together.
// Outputs share one pin type so they can be held in arrays; boards with distinct pin types wrap them in an erased pin.
pub struct IndicatorPins<P> {
    pub status: P,
    pub pass: P,
    pub fail: P,
    pub error: P,
}
impl<P: OutputPin> IndicatorPins<P> {
    pub fn pin(&mut self, indicator: Indicator) -> &mut P {
        match indicator {
            Indicator::Status => &mut self.status,
            Indicator::Pass => &mut self.pass,
            Indicator::Fail => &mut self.fail,
            Indicator::Error => &mut self.error,
        }
    }
    pub fn set(&mut self, indicator: Indicator, on: bool) -> Result<(), P::Error> {
        if on { self.pin(indicator).set_high() } else { self.pin(indicator).set_low() }
    }
    pub fn all_off(&mut self) {
        for indicator in Indicator::ALL {
            self.set(indicator, false).ok();
        }
    }
}
impl<P: OutputPin + StatefulOutputPin> IndicatorPins<P> {
    pub fn toggle(&mut self, indicator: Indicator) {
        let pin = self.pin(indicator);
        if pin.is_set_high().unwrap_or(false) {
            pin.set_low().ok();
        } else {
            pin.set_high().ok();
        }
    }
}

pub struct SourcePins<P> {
    pub current_enable: P, // switches the fixed test current onto the measure bus
    pub cap_charge: P,     // charges the measure bus through the charge resistor
    pub cap_discharge: P,  // discharge FET, pulls the measure bus to ground through the discharge resistor
}
impl<P: OutputPin> SourcePins<P> {
    pub fn all_off(&mut self) {
        self.current_enable.set_low().ok();
        self.cap_charge.set_low().ok();
        self.cap_discharge.set_low().ok();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEnd {
    Near,
    Far,
}

// Contacts on the metal body of each connector, on fixtures for shelled connectors.
pub struct ShellPins<P, I> {
    pub drive: P,      // test signal onto the far end shell contact
    pub near_sense: I, // pulled down
    pub far_sense: I,  // pulled down
}
impl<P, I> ShellPins<P, I> {
    pub fn sense(&self, end: ShellEnd) -> &I {
        match end {
            ShellEnd::Near => &self.near_sense,
            ShellEnd::Far => &self.far_sense,
        }
    }
}
impl<P: OutputPin, I> ShellPins<P, I> {
    pub fn release(&mut self) {
        self.drive.set_low().ok();
    }
}

pub struct TesterPins<P, I> {
    pub relays: [P; RELAY_LINE_COUNT], // indexed by RelayLine
    pub drive: [P; MAX_CONDUCTORS],    // test signal into the far end of each conductor
    pub sense: [I; MAX_CONDUCTORS],    // near end sense lines, pulled down
    pub indicators: IndicatorPins<P>,
    pub sources: SourcePins<P>,
    pub shell: Option<ShellPins<P, I>>, // None on fixtures without shell contacts
}
