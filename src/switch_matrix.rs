// Relay sequencing. Routes the cable into one of the measurement sub-circuits and waits out the contact bounce.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};

use crate::pcb_common::{RelayLine, RelayState, RELAY_LINE_COUNT};
use crate::profile::CableProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    Continuity { driver: usize },
    Resistance { circuit: usize },
    Capacitance,
}

pub const CONTINUITY_LINES: RelayState = RelayState::IDLE.with(RelayLine::FarEnd);
pub const RESISTANCE_LINES: RelayState = RelayState::IDLE.with(RelayLine::MeasureMode);
pub const CAPACITANCE_LINES: RelayState = RelayState::IDLE.with(RelayLine::FarEnd).with(RelayLine::DriveIsolate);

pub struct SwitchMatrix<P> {
    relays: [P; RELAY_LINE_COUNT],
    state: RelayState,
    active_driver: Option<usize>,
    profile: &'static CableProfile,
}
impl<P: OutputPin> SwitchMatrix<P> {
    /// Forces every line to its de-energized position.
    pub fn new(relays: [P; RELAY_LINE_COUNT], profile: &'static CableProfile) -> SwitchMatrix<P> {
        let mut matrix = SwitchMatrix { relays, state: RelayState::IDLE, active_driver: None, profile };
        matrix.apply(RelayState::IDLE);
        matrix
    }

    pub fn relay_state_for(&self, path: Path) -> RelayState {
        match path {
            Path::Continuity { .. } => CONTINUITY_LINES,
            Path::Resistance { circuit } => match self.profile.resistance.circuits.get(circuit) {
                Some(c) => RESISTANCE_LINES.union(c.select),
                None => RESISTANCE_LINES,
            },
            Path::Capacitance => CAPACITANCE_LINES,
        }
    }

    /// Nothing on the new path can be trusted until this returns.
    pub fn select(&mut self, path: Path, delay: &mut impl DelayMs<u16>) {
        let target = self.relay_state_for(path);
        self.active_driver = match path {
            Path::Continuity { driver } => Some(driver),
            _ => None,
        };
        self.transition(target, delay);
    }

    pub fn reset(&mut self, delay: &mut impl DelayMs<u16>) {
        self.active_driver = None;
        self.transition(RelayState::IDLE, delay);
    }

    pub fn state(&self) -> RelayState {
        self.state
    }
    pub fn active_driver(&self) -> Option<usize> {
        self.active_driver
    }

    fn transition(&mut self, target: RelayState, delay: &mut impl DelayMs<u16>) {
        let changed = target != self.state;
        self.apply(target);
        if changed {
            delay.delay_ms(self.profile.timings.relay_settle_ms);
        }
    }

    // Every line is rewritten, not just the ones that differ, so a line disturbed behind our back is still corrected.
    fn apply(&mut self, target: RelayState) {
        for line in RelayLine::ALL {
            let pin = &mut self.relays[line as usize];
            if target.is_energized(line) {
                pin.set_high().ok();
            } else {
                pin.set_low().ok();
            }
        }
        self.state = target;
    }
}
impl<P: OutputPin + StatefulOutputPin> SwitchMatrix<P> {
    /// What the output latches actually hold, independent of what we last asked for.
    pub fn read_back(&self) -> RelayState {
        let mut state = RelayState::IDLE;
        for line in RelayLine::ALL {
            if self.relays[line as usize].is_set_high().unwrap_or(false) {
                state = state.with(line);
            }
        }
        state
    }
}
