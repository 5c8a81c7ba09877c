// A simulated fixture. Hands out embedded-hal pins, an ADC and a timer that all act on one shared bench state with virtual time,
// so the full controller can run on a host against a described cable.

use core::cell::RefCell;

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin};
use void::Void;

use crate::adc::{AdcChannel, AdcRead, ADC_FULL_SCALE};
use crate::controller::Controller;
use crate::pcb_common::{Indicator, IndicatorPins, RelayLine, RelayState, ShellEnd, ShellPins, SourcePins, TesterPins, INDICATOR_COUNT, MAX_CONDUCTORS, RELAY_LINE_COUNT};
use crate::profile::{CableProfile, SenseTopology};
use crate::rig::TestRig;
use crate::switch_matrix::{CAPACITANCE_LINES, RESISTANCE_LINES};
use crate::timing::Monotonic;

pub const ADC_CONVERSION_US: u64 = 4;
pub const FIXTURE_LOSS_MILLIOHMS: u32 = 500; // relay contacts and switch transistor
pub const FIXTURE_STRAY_PF: f32 = 20.0;
pub const DEFAULT_SUPPLY_MILLIVOLTS: u16 = 5000;

pub type SimRig<'a> = TestRig<SimOutput<'a>, SimSense<'a>, SimAdc<'a>, SimClock<'a>>;
pub type SimController<'a> = Controller<SimOutput<'a>, SimSense<'a>, SimAdc<'a>, SimClock<'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputId {
    Relay(RelayLine),
    Drive(usize),
    Indicator(Indicator),
    CurrentEnable,
    CapCharge,
    CapDischarge,
    ShellDrive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseId {
    Conductor(usize),
    Shell(ShellEnd),
}

/// Where the connector shells are tied. `near` and `far` bond each shell to the ground conductor at its own end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellBonds {
    pub near: bool,
    pub far: bool,
    pub shell_to_shell: bool,
}

/// The cable under test. `links[far][near]` is a DC path from a far end pin to a near end pin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimCable {
    links: [[bool; MAX_CONDUCTORS]; MAX_CONDUCTORS],
    wire_milliohms: [u32; MAX_CONDUCTORS],
    capacitance_pf: f32,
    shell: ShellBonds,
}
impl SimCable {
    pub fn none() -> SimCable {
        SimCable {
            links: [[false; MAX_CONDUCTORS]; MAX_CONDUCTORS],
            wire_milliohms: [0; MAX_CONDUCTORS],
            capacitance_pf: 0.0,
            shell: ShellBonds { near: false, far: false, shell_to_shell: false },
        }
    }
    pub fn straight(conductors: usize) -> SimCable {
        let mut cable = SimCable::none();
        for i in 0..conductors.min(MAX_CONDUCTORS) {
            cable.links[i][i] = true;
        }
        cable.shell = ShellBonds { near: true, far: true, shell_to_shell: false };
        cable
    }
    pub fn with_open(mut self, i: usize) -> SimCable {
        for j in 0..MAX_CONDUCTORS {
            self.links[i][j] = false;
            self.links[j][i] = false;
        }
        self
    }
    pub fn with_short(mut self, i: usize, j: usize) -> SimCable {
        let (row_i, row_j) = (self.links[i], self.links[j]);
        for k in 0..MAX_CONDUCTORS {
            let bridged = row_i[k] || row_j[k];
            self.links[i][k] = bridged;
            self.links[j][k] = bridged;
        }
        self
    }
    pub fn with_swap(mut self, i: usize, j: usize) -> SimCable {
        self.links.swap(i, j);
        self
    }
    pub fn with_link(mut self, far: usize, near: usize) -> SimCable {
        self.links[far][near] = true;
        self
    }
    pub fn with_wire_milliohms(mut self, i: usize, milliohms: u32) -> SimCable {
        self.wire_milliohms[i] = milliohms;
        self
    }
    pub fn with_capacitance_pf(mut self, pf: f32) -> SimCable {
        self.capacitance_pf = pf;
        self
    }
    pub fn with_shell_bonds(mut self, near: bool, far: bool, shell_to_shell: bool) -> SimCable {
        self.shell = ShellBonds { near, far, shell_to_shell };
        self
    }
    fn is_present(&self) -> bool {
        self.links.iter().flatten().any(|l| *l)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Outputs {
    relays: [bool; RELAY_LINE_COUNT],
    drive: [bool; MAX_CONDUCTORS],
    indicators: [bool; INDICATOR_COUNT],
    current_enable: bool,
    cap_charge: bool,
    cap_discharge: bool,
    shell_drive: bool,
}
impl Outputs {
    fn slot(&mut self, id: OutputId) -> Option<&mut bool> {
        match id {
            OutputId::Relay(line) => self.relays.get_mut(line as usize),
            OutputId::Drive(i) => self.drive.get_mut(i),
            OutputId::Indicator(ind) => self.indicators.get_mut(ind as usize),
            OutputId::CurrentEnable => Some(&mut self.current_enable),
            OutputId::CapCharge => Some(&mut self.cap_charge),
            OutputId::CapDischarge => Some(&mut self.cap_discharge),
            OutputId::ShellDrive => Some(&mut self.shell_drive),
        }
    }
    fn relay_state(&self) -> RelayState {
        RelayLine::ALL.iter().filter(|l| self.relays[**l as usize]).fold(RelayState::IDLE, |s, l| s.with(*l))
    }
}

struct BenchState {
    now_us: u64,
    outputs: Outputs,
    broken: [Option<OutputId>; 4],
    relays_changed_at_us: Option<u64>,
    charge_started_at_us: Option<u64>,
    supply_millivolts: u16,
    cable: SimCable,
    unsettled_samples: u32,
}

pub struct Bench {
    profile: &'static CableProfile,
    state: RefCell<BenchState>,
}
impl Bench {
    pub fn new(profile: &'static CableProfile, cable: SimCable) -> Bench {
        Bench {
            profile,
            state: RefCell::new(BenchState {
                now_us: 0,
                outputs: Outputs::default(),
                broken: [None; 4],
                relays_changed_at_us: None,
                charge_started_at_us: None,
                supply_millivolts: DEFAULT_SUPPLY_MILLIVOLTS,
                cable,
                unsettled_samples: 0,
            }),
        }
    }

    pub fn profile(&self) -> &'static CableProfile {
        self.profile
    }

    // Hardware handles

    pub fn tester_pins(&self) -> TesterPins<SimOutput<'_>, SimSense<'_>> {
        let out = |id| SimOutput { bench: self, id };
        let sense = |id| SimSense { bench: self, id };
        TesterPins {
            relays: RelayLine::ALL.map(|l| out(OutputId::Relay(l))),
            drive: [out(OutputId::Drive(0)), out(OutputId::Drive(1)), out(OutputId::Drive(2))],
            sense: [sense(SenseId::Conductor(0)), sense(SenseId::Conductor(1)), sense(SenseId::Conductor(2))],
            indicators: IndicatorPins {
                status: out(OutputId::Indicator(Indicator::Status)),
                pass: out(OutputId::Indicator(Indicator::Pass)),
                fail: out(OutputId::Indicator(Indicator::Fail)),
                error: out(OutputId::Indicator(Indicator::Error)),
            },
            sources: SourcePins {
                current_enable: out(OutputId::CurrentEnable),
                cap_charge: out(OutputId::CapCharge),
                cap_discharge: out(OutputId::CapDischarge),
            },
            shell: self.profile.shell.map(|_| ShellPins {
                drive: out(OutputId::ShellDrive),
                near_sense: sense(SenseId::Shell(ShellEnd::Near)),
                far_sense: sense(SenseId::Shell(ShellEnd::Far)),
            }),
        }
    }
    pub fn adc(&self) -> SimAdc<'_> {
        SimAdc { bench: self }
    }
    pub fn clock(&self) -> SimClock<'_> {
        SimClock { bench: self }
    }

    pub fn split(&self) -> (IndicatorPins<SimOutput<'_>>, SimRig<'_>) {
        let pins = self.tester_pins();
        let rig = TestRig::new(pins.relays, pins.drive, pins.sense, pins.sources, pins.shell, self.adc(), self.clock(), self.profile);
        (pins.indicators, rig)
    }
    pub fn rig(&self) -> SimRig<'_> {
        self.split().1
    }
    pub fn controller(&self) -> SimController<'_> {
        Controller::new(self.tester_pins(), self.adc(), self.clock(), self.profile)
    }

    // Stimulus

    pub fn set_cable(&self, cable: SimCable) {
        self.state.borrow_mut().cable = cable;
    }
    pub fn set_supply_millivolts(&self, millivolts: u16) {
        self.state.borrow_mut().supply_millivolts = millivolts;
    }
    /// Makes every write to `id` fail from now on.
    pub fn break_output(&self, id: OutputId) {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.broken.iter_mut().find(|b| b.is_none()) {
            *slot = Some(id);
        }
    }
    /// Flips a relay line behind the controller's back.
    pub fn force_relay(&self, line: RelayLine, energized: bool) {
        self.write(OutputId::Relay(line), energized).ok();
    }
    pub fn advance_ms(&self, ms: u32) {
        self.state.borrow_mut().now_us += ms as u64 * 1000;
    }

    // Observation

    pub fn relay_lines(&self) -> RelayState {
        self.state.borrow().outputs.relay_state()
    }
    pub fn drive_level(&self, line: usize) -> bool {
        self.state.borrow().outputs.drive.get(line).copied().unwrap_or(false)
    }
    pub fn shell_drive_level(&self) -> bool {
        self.state.borrow().outputs.shell_drive
    }
    pub fn indicator(&self, indicator: Indicator) -> bool {
        self.state.borrow().outputs.indicators[indicator as usize]
    }
    pub fn sources_off(&self) -> bool {
        let outputs = self.state.borrow().outputs;
        !(outputs.current_enable || outputs.cap_charge || outputs.cap_discharge)
    }
    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_us
    }
    /// Sense reads and conversions taken before the relays had time to settle.
    pub fn unsettled_samples(&self) -> u32 {
        self.state.borrow().unsettled_samples
    }

    // Physics

    fn write(&self, id: OutputId, level: bool) -> Result<(), SimPinFault> {
        let mut state = self.state.borrow_mut();
        if state.broken.contains(&Some(id)) {
            return Err(SimPinFault(id));
        }
        let now = state.now_us;
        let previous = state.outputs.slot(id).map(|s| core::mem::replace(s, level));
        match id {
            OutputId::Relay(_) if previous != Some(level) => state.relays_changed_at_us = Some(now),
            OutputId::CapCharge if level && previous != Some(true) => state.charge_started_at_us = Some(now),
            OutputId::CapCharge if !level => state.charge_started_at_us = None,
            _ => (),
        }
        Ok(())
    }

    fn read(&self, id: OutputId) -> bool {
        self.state.borrow_mut().outputs.slot(id).map(|s| *s).unwrap_or(false)
    }

    fn note_sample(&self, state: &mut BenchState) {
        let settle_us = self.profile.timings.relay_settle_ms as u64 * 1000;
        if let Some(changed) = state.relays_changed_at_us {
            if state.now_us - changed < settle_us {
                state.unsettled_samples += 1;
            }
        }
    }

    fn conductor_on_line(&self, line: usize, by_drive: bool) -> Option<usize> {
        self.profile.conductors.iter().position(|c| if by_drive { c.drive_line == line } else { c.sense_line == line })
    }

    fn sense(&self, id: SenseId) -> bool {
        match id {
            SenseId::Conductor(line) => self.conductor_sense(line),
            SenseId::Shell(end) => self.shell_sense(end),
        }
    }

    fn conductor_sense(&self, line: usize) -> bool {
        let mut state = self.state.borrow_mut();
        self.note_sample(&mut state);
        let relays = state.outputs.relay_state();
        if !relays.is_energized(RelayLine::FarEnd) || relays.is_energized(RelayLine::DriveIsolate) {
            return false;
        }
        let Some(near) = self.conductor_on_line(line, false) else { return false };
        (0..MAX_CONDUCTORS).any(|drive_line| {
            state.outputs.drive[drive_line]
                && self.conductor_on_line(drive_line, true).map(|far| state.cable.links[far][near]).unwrap_or(false)
        })
    }

    // Nodes: far end of the ground conductor, its near end, near shell, far shell. A node is high when it
    // conducts to a driven one.
    fn shell_sense(&self, end: ShellEnd) -> bool {
        const GROUND_FAR: usize = 0;
        const GROUND_NEAR: usize = 1;
        const SHELL_NEAR: usize = 2;
        const SHELL_FAR: usize = 3;

        let mut state = self.state.borrow_mut();
        self.note_sample(&mut state);
        let Some(spec) = self.profile.shell else { return false };
        let Some(ground) = self.profile.conductors.get(spec.ground_conductor) else { return false };
        let relays = state.outputs.relay_state();
        let far_end_driven = relays.is_energized(RelayLine::FarEnd)
            && !relays.is_energized(RelayLine::DriveIsolate)
            && state.outputs.drive[ground.drive_line];

        let g = spec.ground_conductor;
        let bonds = state.cable.shell;
        let edges = [
            (GROUND_FAR, GROUND_NEAR, state.cable.links[g][g]),
            (GROUND_NEAR, SHELL_NEAR, bonds.near),
            (GROUND_FAR, SHELL_FAR, bonds.far),
            (SHELL_NEAR, SHELL_FAR, bonds.shell_to_shell),
        ];
        let mut high = [false; 4];
        high[GROUND_FAR] = far_end_driven;
        high[SHELL_FAR] = state.outputs.shell_drive;
        for _ in 0..high.len() {
            for (a, b, joined) in edges {
                if joined && (high[a] || high[b]) {
                    high[a] = true;
                    high[b] = true;
                }
            }
        }
        match end {
            ShellEnd::Near => high[SHELL_NEAR],
            ShellEnd::Far => high[SHELL_FAR],
        }
    }

    fn volts_to_count(&self, fraction_of_vref: f32) -> u16 {
        let count = fraction_of_vref * ADC_FULL_SCALE as f32 + 0.5;
        if count <= 0.0 {
            0
        } else {
            (count as u16).min(ADC_FULL_SCALE)
        }
    }

    fn convert(&self, channel: AdcChannel) -> u16 {
        let mut state = self.state.borrow_mut();
        state.now_us += ADC_CONVERSION_US;
        let profile = self.profile;

        if channel == profile.supply.channel {
            let millivolts = state.supply_millivolts as f32 / profile.supply.divider as f32;
            return self.volts_to_count(millivolts / profile.vref_millivolts as f32);
        }
        self.note_sample(&mut state);
        let relays = state.outputs.relay_state();

        if let Some(cap) = profile.capacitance {
            if channel == cap.channel {
                if relays != CAPACITANCE_LINES || state.outputs.cap_discharge {
                    return 0;
                }
                let Some(start) = state.charge_started_at_us else { return 0 };
                let cable_pf = if state.cable.is_present() { state.cable.capacitance_pf } else { 0.0 };
                let tau_us = cap.charge_resistor_kilohms as f32 * (FIXTURE_STRAY_PF + cable_pf) / 1000.0;
                let t_us = (state.now_us - start) as f32;
                return self.volts_to_count(1.0 - libm::expf(-t_us / tau_us));
            }
        }

        let resistance = profile.resistance;
        let active = resistance.circuits.iter().find(|c| c.channel == channel && RESISTANCE_LINES.union(c.select) == relays);
        let Some(circuit) = active else { return 0 };
        if !state.outputs.current_enable {
            return 0;
        }
        let (c, r) = (circuit.conductor, resistance.return_conductor);
        let closed = state.cable.links[c][c] && state.cable.links[r][r];
        let sense = resistance.sense_resistor_milliohms as f32;
        let fraction = match (resistance.topology, closed) {
            (SenseTopology::HighSide, false) => 1.0,
            (SenseTopology::LowSide, false) => 0.0,
            (topology, true) => {
                let loop_mohm = (FIXTURE_LOSS_MILLIOHMS + state.cable.wire_milliohms[c] + state.cable.wire_milliohms[r]) as f32;
                match topology {
                    SenseTopology::HighSide => loop_mohm / (sense + loop_mohm),
                    SenseTopology::LowSide => sense / (sense + loop_mohm),
                }
            }
        };
        self.volts_to_count(fraction)
    }

    fn delay_us(&self, us: u64) {
        self.state.borrow_mut().now_us += us;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinFault(pub OutputId);

pub struct SimOutput<'a> {
    bench: &'a Bench,
    id: OutputId,
}
impl OutputPin for SimOutput<'_> {
    type Error = SimPinFault;
    fn set_low(&mut self) -> Result<(), SimPinFault> {
        self.bench.write(self.id, false)
    }
    fn set_high(&mut self) -> Result<(), SimPinFault> {
        self.bench.write(self.id, true)
    }
}
impl StatefulOutputPin for SimOutput<'_> {
    fn is_set_high(&self) -> Result<bool, SimPinFault> {
        Ok(self.bench.read(self.id))
    }
    fn is_set_low(&self) -> Result<bool, SimPinFault> {
        Ok(!self.bench.read(self.id))
    }
}

pub struct SimSense<'a> {
    bench: &'a Bench,
    id: SenseId,
}
impl InputPin for SimSense<'_> {
    type Error = Void;
    fn is_high(&self) -> Result<bool, Void> {
        Ok(self.bench.sense(self.id))
    }
    fn is_low(&self) -> Result<bool, Void> {
        Ok(!self.bench.sense(self.id))
    }
}

pub struct SimAdc<'a> {
    bench: &'a Bench,
}
impl AdcRead for SimAdc<'_> {
    fn read_count(&mut self, channel: AdcChannel) -> u16 {
        self.bench.convert(channel)
    }
}

pub struct SimClock<'a> {
    bench: &'a Bench,
}
impl DelayMs<u16> for SimClock<'_> {
    fn delay_ms(&mut self, ms: u16) {
        self.bench.delay_us(ms as u64 * 1000);
    }
}
impl DelayUs<u16> for SimClock<'_> {
    fn delay_us(&mut self, us: u16) {
        self.bench.delay_us(us as u64);
    }
}
impl Monotonic for SimClock<'_> {
    fn micros(&mut self) -> u32 {
        self.bench.now_us() as u32
    }
}
