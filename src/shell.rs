// Shell bond test for connectors with a metal body. The ground conductor is driven from the far end while both shell
// contacts are sensed, then the far shell contact is driven on its own and the near one sensed.
// Each field reports whether the two points conduct. The cable joins them in a loop, so a single missing bond
// only shows up when the other paths around the loop are missing too.

use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;

use crate::adc::AdcRead;
use crate::pcb_common::ShellEnd;
use crate::profile::ShellBondSpec;
use crate::rig::TestRig;
use crate::switch_matrix::Path;
use crate::timing::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDefect {
    NoCable,
    NearOpen,         // near shell does not reach the ground conductor
    FarOpen,          // far shell does not reach the ground conductor
    ShellToShellOpen, // far shell does not reach the near shell
}
impl ShellDefect {
    pub fn code(&self) -> &'static str {
        match self {
            ShellDefect::NoCable => "NO_CABLE",
            ShellDefect::NearOpen => "NEAR_OPEN",
            ShellDefect::FarOpen => "FAR_OPEN",
            ShellDefect::ShellToShellOpen => "SS_OPEN",
        }
    }
}

pub type ShellDefects = Vec<ShellDefect, 3>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellBondReport {
    pub ground_seen: bool, // ground conductor reached its own near end sense line
    pub near: bool,
    pub far: bool,
    pub shell_to_shell: bool,
}
impl ShellBondReport {
    pub fn passed(&self) -> bool {
        self.near && self.far && self.shell_to_shell
    }

    pub fn defects(&self) -> ShellDefects {
        let mut defects = ShellDefects::new();
        if !(self.ground_seen || self.near || self.far || self.shell_to_shell) {
            defects.push(ShellDefect::NoCable).ok();
            return defects;
        }
        let checks = [(self.near, ShellDefect::NearOpen), (self.far, ShellDefect::FarOpen), (self.shell_to_shell, ShellDefect::ShellToShellOpen)];
        for (bonded, defect) in checks {
            if !bonded {
                defects.push(defect).ok();
            }
        }
        defects
    }
}

pub fn run_shell_bond<P, I, A, C>(rig: &mut TestRig<P, I, A, C>, spec: &ShellBondSpec) -> ShellBondReport
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let settle = rig.profile().timings.signal_settle_ms;
    let ground = spec.ground_conductor;
    rig.with_path(Path::Continuity { driver: ground }, |rig| {
        rig.assert_signal(true);
        rig.settle(settle);
        let ground_seen = rig.read_sense(ground);
        let near = rig.read_shell(ShellEnd::Near);
        let far = rig.read_shell(ShellEnd::Far);

        rig.assert_signal(false);
        rig.assert_shell_signal(true);
        rig.settle(settle);
        let shell_to_shell = rig.read_shell(ShellEnd::Near);

        ShellBondReport { ground_seen, near, far, shell_to_shell }
    })
}
