// The measurement fixture as one object: relays, drive and sense lines, sources, ADC and timer.
// Engines only reach a measurement path through `with_path`, which puts the fixture back to idle afterwards.

use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin};

use crate::adc::{Adc, AdcChannel, AdcRead, AveragedSample, Sampling};
use crate::pcb_common::{RelayState, ShellEnd, ShellPins, SourcePins, MAX_CONDUCTORS};
use crate::profile::CableProfile;
use crate::signal::{assert_signal, read_digital};
use crate::switch_matrix::{Path, SwitchMatrix};
use crate::timing::Clock;

pub struct TestRig<P, I, A, C> {
    switch: SwitchMatrix<P>,
    drive: [P; MAX_CONDUCTORS],
    sense: [I; MAX_CONDUCTORS],
    sources: SourcePins<P>,
    shell: Option<ShellPins<P, I>>,
    adc: Adc<A>,
    clock: C,
    profile: &'static CableProfile,
}
impl<P: OutputPin, I: InputPin, A: AdcRead, C: Clock> TestRig<P, I, A, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relays: [P; crate::pcb_common::RELAY_LINE_COUNT],
        drive: [P; MAX_CONDUCTORS],
        sense: [I; MAX_CONDUCTORS],
        sources: SourcePins<P>,
        shell: Option<ShellPins<P, I>>,
        converter: A,
        clock: C,
        profile: &'static CableProfile,
    ) -> TestRig<P, I, A, C> {
        let mut rig = TestRig {
            switch: SwitchMatrix::new(relays, profile),
            drive,
            sense,
            sources,
            shell,
            adc: Adc::new(converter, profile.vref_millivolts),
            clock,
            profile,
        };
        for pin in rig.drive.iter_mut() {
            assert_signal(pin, false);
        }
        rig.sources.all_off();
        if let Some(shell) = rig.shell.as_mut() {
            shell.release();
        }
        rig
    }

    pub fn profile(&self) -> &'static CableProfile {
        self.profile
    }
    pub fn clock(&mut self) -> &mut C {
        &mut self.clock
    }
    pub fn adc(&self) -> &Adc<A> {
        &self.adc
    }
    pub fn sources(&mut self) -> &mut SourcePins<P> {
        &mut self.sources
    }
    pub fn relay_state(&self) -> RelayState {
        self.switch.state()
    }

    /// Routes the fixture onto `path`, runs `f`, then restores idle whatever `f` returned.
    pub fn with_path<R>(&mut self, path: Path, f: impl FnOnce(&mut Self) -> R) -> R {
        self.select(path);
        let result = f(self);
        self.restore_idle();
        result
    }

    // Moving between drivers on the continuity path does not touch the relays, so no relay settle is incurred.
    pub fn select(&mut self, path: Path) {
        self.switch.select(path, &mut self.clock);
    }

    pub fn restore_idle(&mut self) {
        for pin in self.drive.iter_mut() {
            assert_signal(pin, false);
        }
        self.sources.all_off();
        if let Some(shell) = self.shell.as_mut() {
            shell.release();
        }
        self.switch.reset(&mut self.clock);
    }

    /// Drives the test signal onto the active continuity driver. No-op on other paths.
    pub fn assert_signal(&mut self, level: bool) {
        let Some(driver) = self.switch.active_driver() else { return };
        let Some(conductor) = self.profile.conductors.get(driver) else { return };
        if let Some(pin) = self.drive.get_mut(conductor.drive_line) {
            assert_signal(pin, level);
        }
    }

    pub fn read_sense(&self, conductor: usize) -> bool {
        self.profile
            .conductors
            .get(conductor)
            .and_then(|c| self.sense.get(c.sense_line))
            .map(read_digital)
            .unwrap_or(false)
    }

    pub fn has_shell_contacts(&self) -> bool {
        self.shell.is_some()
    }

    /// Drives the far end shell contact. No-op on fixtures without shell contacts.
    pub fn assert_shell_signal(&mut self, level: bool) {
        if let Some(shell) = self.shell.as_mut() {
            assert_signal(&mut shell.drive, level);
        }
    }

    pub fn read_shell(&self, end: ShellEnd) -> bool {
        self.shell.as_ref().map(|shell| read_digital(shell.sense(end))).unwrap_or(false)
    }

    pub fn settle(&mut self, ms: u16) {
        self.clock.delay_ms(ms);
    }

    pub fn sample(&mut self, channel: AdcChannel, sampling: Sampling) -> AveragedSample {
        self.adc.read_averaged(channel, sampling, &mut self.clock)
    }

    pub fn read_count(&mut self, channel: AdcChannel) -> u16 {
        self.adc.read_count(channel)
    }
}
impl<P: OutputPin + StatefulOutputPin, I: InputPin, A: AdcRead, C: Clock> TestRig<P, I, A, C> {
    pub fn read_back_relays(&self) -> RelayState {
        self.switch.read_back()
    }
}
