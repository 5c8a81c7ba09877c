// Session calibration. Lives in RAM only, a power cycle returns the tester to uncalibrated.

use heapless::Vec;

use crate::pcb_common::MAX_RESISTANCE_CIRCUITS;

pub type CircuitCounts = Vec<u16, MAX_RESISTANCE_CIRCUITS>;

/// A reference reading that says no reference cable is attached. Nothing was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationRejected {
    pub readings: CircuitCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationStore {
    baselines: [Option<u16>; MAX_RESISTANCE_CIRCUITS],
    stray_decipf: u32,
}
impl CalibrationStore {
    pub fn new(default_stray_decipf: u32) -> CalibrationStore {
        CalibrationStore { baselines: [None; MAX_RESISTANCE_CIRCUITS], stray_decipf: default_stray_decipf }
    }

    pub fn baseline(&self, circuit: usize) -> Option<u16> {
        self.baselines.get(circuit).copied().flatten()
    }

    // Baselines are only ever written together, so checking the first is enough.
    pub fn is_calibrated(&self) -> bool {
        self.baselines[0].is_some()
    }

    /// Replaces every baseline at once.
    pub fn commit(&mut self, readings: &[u16]) {
        let mut next = [None; MAX_RESISTANCE_CIRCUITS];
        for (slot, reading) in next.iter_mut().zip(readings) {
            *slot = Some(*reading);
        }
        self.baselines = next;
    }

    pub fn stray_decipf(&self) -> u32 {
        self.stray_decipf
    }
    pub fn set_stray_decipf(&mut self, decipf: u32) {
        self.stray_decipf = decipf;
    }
}
