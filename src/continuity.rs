// Continuity engine. Drives each conductor at the far end in turn and records which near end sense lines respond.

use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;

use crate::adc::AdcRead;
use crate::pcb_common::MAX_CONDUCTORS;
use crate::rig::TestRig;
use crate::switch_matrix::Path;
use crate::timing::Clock;

/// Entry (d, s) is set when driving conductor d was detected on sense line s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityMatrix {
    size: usize,
    cells: [[bool; MAX_CONDUCTORS]; MAX_CONDUCTORS],
}
impl ConnectivityMatrix {
    pub fn new(size: usize) -> ConnectivityMatrix {
        ConnectivityMatrix { size: size.min(MAX_CONDUCTORS), cells: [[false; MAX_CONDUCTORS]; MAX_CONDUCTORS] }
    }
    pub fn from_rows(size: usize, rows: [[bool; MAX_CONDUCTORS]; MAX_CONDUCTORS]) -> ConnectivityMatrix {
        let mut matrix = ConnectivityMatrix::new(size);
        for d in 0..matrix.size {
            for s in 0..matrix.size {
                matrix.cells[d][s] = rows[d][s];
            }
        }
        matrix
    }
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn get(&self, driven: usize, sensed: usize) -> bool {
        driven < self.size && sensed < self.size && self.cells[driven][sensed]
    }
    pub fn set(&mut self, driven: usize, sensed: usize, detected: bool) {
        if driven < self.size && sensed < self.size {
            self.cells[driven][sensed] = detected;
        }
    }
    pub fn is_identity(&self) -> bool {
        (0..self.size).all(|d| (0..self.size).all(|s| self.cells[d][s] == (d == s)))
    }
    pub fn is_empty(&self) -> bool {
        (0..self.size).all(|d| (0..self.size).all(|s| !self.cells[d][s]))
    }
    fn row_empty(&self, i: usize) -> bool {
        (0..self.size).all(|s| !self.cells[i][s])
    }
    fn column_empty(&self, i: usize) -> bool {
        (0..self.size).all(|d| !self.cells[d][i])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    NoCable,
    Reversed,
    Open(usize),
    Short(usize, usize),   // bridged, at least one of the pair still reaches its own end
    Crossed(usize, usize), // swapped, neither reaches its own end
    Unknown,
}

// Three opens, three pairs and the residual.
pub const MAX_DEFECTS: usize = 8;
pub type Defects = Vec<Defect, MAX_DEFECTS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Defects),
}
impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityReport {
    pub matrix: ConnectivityMatrix,
    pub verdict: Verdict,
}

fn single(defect: Defect) -> Verdict {
    let mut defects = Defects::new();
    defects.push(defect).ok();
    Verdict::Fail(defects)
}

pub fn classify(matrix: &ConnectivityMatrix) -> Verdict {
    let n = matrix.size();
    if matrix.is_empty() {
        return single(Defect::NoCable);
    }
    if matrix.is_identity() {
        return Verdict::Pass;
    }
    if n == 2 && !matrix.get(0, 0) && !matrix.get(1, 1) && matrix.get(0, 1) && matrix.get(1, 0) {
        return single(Defect::Reversed);
    }

    let mut defects = Defects::new();
    for i in 0..n {
        if matrix.row_empty(i) && matrix.column_empty(i) {
            defects.push(Defect::Open(i)).ok();
        }
    }
    // No combination of opens and bridges gives a signal path that only works one way.
    let mut one_way = false;
    for i in 0..n {
        for j in (i + 1)..n {
            match (matrix.get(i, j), matrix.get(j, i)) {
                (true, true) if matrix.get(i, i) || matrix.get(j, j) => {
                    defects.push(Defect::Short(i, j)).ok();
                }
                (true, true) => {
                    defects.push(Defect::Crossed(i, j)).ok();
                }
                (true, false) | (false, true) => one_way = true,
                (false, false) => (),
            }
        }
    }
    if one_way || defects.is_empty() {
        defects.push(Defect::Unknown).ok();
    }
    Verdict::Fail(defects)
}

pub fn run_continuity<P, I, A, C>(rig: &mut TestRig<P, I, A, C>) -> ContinuityReport
where
    P: OutputPin,
    I: InputPin,
    A: AdcRead,
    C: Clock,
{
    let n = rig.profile().conductor_count();
    let settle = rig.profile().timings.signal_settle_ms;
    let matrix = rig.with_path(Path::Continuity { driver: 0 }, |rig| {
        let mut matrix = ConnectivityMatrix::new(n);
        for driven in 0..n {
            rig.select(Path::Continuity { driver: driven });
            rig.assert_signal(true);
            rig.settle(settle);
            for sensed in 0..n {
                matrix.set(driven, sensed, rig.read_sense(sensed));
            }
            rig.assert_signal(false);
            rig.settle(settle);
        }
        matrix
    });
    ContinuityReport { verdict: classify(&matrix), matrix }
}
