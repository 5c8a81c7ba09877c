// The command loop. One line in, at most one response line out, every test runs to completion before the next byte is read.

use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal::serial::Read;
use ufmt::{uWrite, uwrite};

use crate::adc::AdcRead;
use crate::calibration::CalibrationStore;
use crate::capacitance::{calibrate_stray, run_capacitance, CapacitanceOutcome};
use crate::continuity::run_continuity;
use crate::dispatcher::{self, Command, ProtocolError};
use crate::encoder::{encode_calibration, encode_capacitance, encode_continuity, encode_error, encode_resistance, encode_shell_bond, encode_stray_calibration, ResponseBuffer};
use crate::pcb_common::{Indicator, IndicatorPins, RelayState, TesterPins};
use crate::profile::CableProfile;
use crate::resistance::{calibrate, run_resistance};
use crate::rig::TestRig;
use crate::self_test::{run_self_test, ControllerState};
use crate::serial::{LineEvent, LineReader};
use crate::shell::run_shell_bond;
use crate::timing::Clock;

pub struct Controller<P, I, A, C> {
    rig: TestRig<P, I, A, C>,
    indicators: IndicatorPins<P>,
    calibration: CalibrationStore,
    state: ControllerState,
    reader: LineReader,
    last_heartbeat_us: u32,
}
impl<P, I, A, C> Controller<P, I, A, C>
where
    P: OutputPin + StatefulOutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    pub fn new(pins: TesterPins<P, I>, converter: A, clock: C, profile: &'static CableProfile) -> Controller<P, I, A, C> {
        let TesterPins { relays, drive, sense, mut indicators, sources, shell } = pins;
        indicators.all_off();
        let default_stray = profile.capacitance.map(|c| c.default_stray_decipf).unwrap_or(0);
        Controller {
            rig: TestRig::new(relays, drive, sense, sources, shell, converter, clock, profile),
            indicators,
            calibration: CalibrationStore::new(default_stray),
            state: ControllerState::Booting,
            reader: LineReader::new(),
            last_heartbeat_us: 0,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }
    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }
    pub fn relay_lines(&self) -> RelayState {
        self.rig.read_back_relays()
    }

    /// Runs the self-test. The outcome is final until the next power cycle.
    pub fn boot<W: uWrite + ?Sized>(&mut self, out: &mut W) -> ControllerState {
        self.state = ControllerState::SelfTestRunning;
        self.rig.restore_idle();
        match run_self_test(&mut self.indicators, &mut self.rig) {
            Ok(millivolts) => {
                dbg_uwriteln!(out, "SELFTEST:SUPPLY_MV:{}", millivolts as u32);
                self.state = ControllerState::Ready;
            }
            Err(fault) => {
                dbg_uwriteln!(out, "SELFTEST:FAULT");
                self.indicators.set(Indicator::Error, true).ok();
                self.state = ControllerState::Faulted(fault);
            }
        }
        self.last_heartbeat_us = self.rig.clock().micros();
        self.state
    }

    /// Parses and executes one command line. Blank lines produce no output.
    pub fn handle_line<W: uWrite + ?Sized>(&mut self, line: &str, out: &mut W) -> Result<(), W::Error> {
        let mut response = ResponseBuffer::new();
        match dispatcher::parse(line) {
            Ok(None) => return Ok(()),
            Ok(Some(command)) => self.execute(command, &mut response, out),
            Err(error) => {
                encode_error(&mut response, &error).ok();
            }
        }
        out.write_str(response.as_str())?;
        out.write_str("\n")
    }

    /// Feeds one received byte. Returns true when it completed a line.
    pub fn receive<W: uWrite + ?Sized>(&mut self, byte: u8, out: &mut W) -> Result<bool, W::Error> {
        match self.reader.push(byte) {
            Some(event) => self.handle_event(event, out).map(|_| true),
            None => Ok(false),
        }
    }

    /// One pass of the main loop: handle a waiting line if there is one, otherwise tend the heartbeat.
    pub fn poll<RX: Read<u8>, W: uWrite + ?Sized>(&mut self, serial: &mut RX, out: &mut W) -> Result<bool, W::Error> {
        match self.reader.poll(serial) {
            Some(event) => self.handle_event(event, out).map(|_| true),
            None => {
                self.heartbeat();
                Ok(false)
            }
        }
    }

    fn handle_event<W: uWrite + ?Sized>(&mut self, event: LineEvent, out: &mut W) -> Result<(), W::Error> {
        match event {
            LineEvent::Line(line) => self.handle_line(&line, out),
            LineEvent::Overflow => {
                let mut response = ResponseBuffer::new();
                encode_error(&mut response, &ProtocolError::LineTooLong).ok();
                out.write_str(response.as_str())?;
                out.write_str("\n")
            }
        }
    }

    pub fn heartbeat(&mut self) {
        if !self.state.is_ready() {
            return;
        }
        let period_us = self.rig.profile().timings.heartbeat_ms.saturating_mul(1000);
        let now = self.rig.clock().micros();
        if now.wrapping_sub(self.last_heartbeat_us) >= period_us {
            self.indicators.toggle(Indicator::Status);
            self.last_heartbeat_us = now;
        }
    }

    fn show_outcome(&mut self, passed: bool) {
        self.indicators.set(Indicator::Pass, passed).ok();
        self.indicators.set(Indicator::Fail, !passed).ok();
    }

    fn execute<W: uWrite + ?Sized>(&mut self, command: Command, response: &mut ResponseBuffer, out: &mut W) {
        let profile = self.rig.profile();
        let missing_network = command.needs_capacitance_network() && profile.capacitance.is_none();
        let missing_contacts = command.needs_shell_contacts() && (profile.shell.is_none() || !self.rig.has_shell_contacts());
        if missing_network || missing_contacts {
            encode_error(response, &ProtocolError::Unsupported(command.keyword())).ok();
            return;
        }
        if command.needs_ready() && !self.state.is_ready() {
            encode_error(response, &ProtocolError::NotReady).ok();
            return;
        }

        match command {
            Command::Id => {
                uwrite!(response, "ID:{}", profile.tester_id).ok();
            }
            Command::Status => {
                response.write_str(if self.state.is_ready() { "STATUS:READY" } else { "STATUS:NOT_READY" }).ok();
            }
            Command::Reset => {
                self.rig.restore_idle();
                response.write_str("OK:RESET").ok();
            }
            Command::Continuity => {
                let report = run_continuity(&mut self.rig);
                self.show_outcome(report.verdict.passed());
                encode_continuity(response, profile, &report).ok();
            }
            Command::Resistance => {
                let report = run_resistance(&mut self.rig, &self.calibration);
                self.show_outcome(report.passed);
                encode_resistance(response, profile, &report).ok();
            }
            Command::Calibrate => {
                dbg_uwriteln!(out, "CAL:MEASURING");
                let result = calibrate(&mut self.rig, &mut self.calibration);
                encode_calibration(response, profile, &result).ok();
            }
            Command::Capacitance => {
                if let Some(spec) = profile.capacitance {
                    let outcome = run_capacitance(&mut self.rig, &spec, &self.calibration);
                    self.show_outcome(matches!(outcome, CapacitanceOutcome::Measured { in_band: true, .. }));
                    encode_capacitance(response, &outcome).ok();
                }
            }
            Command::CapacitanceCalibrate => {
                if let Some(spec) = profile.capacitance {
                    dbg_uwriteln!(out, "CAPCAL:MEASURING");
                    let stray = calibrate_stray(&mut self.rig, &spec, &mut self.calibration);
                    encode_stray_calibration(response, stray).ok();
                }
            }
            Command::ShellBond => {
                if let Some(spec) = profile.shell {
                    let report = run_shell_bond(&mut self.rig, &spec);
                    self.show_outcome(report.passed());
                    encode_shell_bond(response, &report).ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb_ts_mapping::PROFILE;
    use crate::sim::{Bench, SimCable};

    fn ask(controller: &mut crate::sim::SimController<'_>, line: &str) -> std::string::String {
        let mut out = ResponseBuffer::new();
        controller.handle_line(line, &mut out).unwrap();
        out.as_str().trim_end().into()
    }

    #[test]
    fn refuses_tests_before_boot() {
        let bench = Bench::new(&PROFILE, SimCable::straight(2));
        let mut controller = bench.controller();
        assert_eq!(controller.state(), ControllerState::Booting);
        assert_eq!(ask(&mut controller, "CONT"), "ERROR:NOT_READY");
        assert_eq!(ask(&mut controller, "STATUS"), "STATUS:NOT_READY");
        assert_eq!(ask(&mut controller, "ID"), "ID:CT-TS-01");
    }

    #[test]
    fn outcome_drives_pass_and_fail_leds() {
        let bench = Bench::new(&PROFILE, SimCable::straight(2));
        let mut controller = bench.controller();
        controller.boot(&mut ResponseBuffer::new());
        ask(&mut controller, "CONT");
        assert!(bench.indicator(Indicator::Pass));
        assert!(!bench.indicator(Indicator::Fail));

        bench.set_cable(SimCable::none());
        ask(&mut controller, "CONT");
        assert!(!bench.indicator(Indicator::Pass));
        assert!(bench.indicator(Indicator::Fail));
    }

    #[test]
    fn heartbeat_only_toggles_when_ready_and_due() {
        let bench = Bench::new(&PROFILE, SimCable::straight(2));
        let mut controller = bench.controller();
        controller.heartbeat();
        assert!(!bench.indicator(Indicator::Status));

        controller.boot(&mut ResponseBuffer::new());
        controller.heartbeat();
        assert!(!bench.indicator(Indicator::Status));
        bench.advance_ms(1000);
        controller.heartbeat();
        assert!(bench.indicator(Indicator::Status));
        bench.advance_ms(400);
        controller.heartbeat();
        assert!(bench.indicator(Indicator::Status));
        bench.advance_ms(600);
        controller.heartbeat();
        assert!(!bench.indicator(Indicator::Status));
    }

    #[test]
    fn faulted_controller_lights_error_led() {
        let bench = Bench::new(&PROFILE, SimCable::straight(2));
        bench.set_supply_millivolts(6000);
        let mut controller = bench.controller();
        assert!(matches!(controller.boot(&mut ResponseBuffer::new()), ControllerState::Faulted(_)));
        assert!(bench.indicator(Indicator::Error));
        controller.heartbeat();
        bench.advance_ms(2000);
        controller.heartbeat();
        assert!(!bench.indicator(Indicator::Status));
    }
}
