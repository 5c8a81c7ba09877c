// Response formatting. Every response is one line of colon separated fields, built in a fixed buffer before it is sent.

use heapless::String;
use ufmt::{uWrite, uwrite};

use crate::calibration::CalibrationRejected;
use crate::capacitance::CapacitanceOutcome;
use crate::continuity::{ContinuityReport, Defect, Verdict};
use crate::dispatcher::ProtocolError;
use crate::profile::{CableProfile, MatrixOrder};
use crate::resistance::ResistanceReport;
use crate::shell::ShellBondReport;

pub const RESPONSE_CAPACITY: usize = 192;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResponseBuffer(String<RESPONSE_CAPACITY>);
impl ResponseBuffer {
    pub fn new() -> ResponseBuffer {
        ResponseBuffer(String::new())
    }
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
    pub fn clear(&mut self) {
        self.0.clear();
    }
}
impl uWrite for ResponseBuffer {
    type Error = ();
    fn write_str(&mut self, s: &str) -> Result<(), ()> {
        self.0.push_str(s)
    }
}

/// Writes `value` scaled by 10^decimals as a fixed point number, e.g. (1234, 3) -> 1.234
pub fn write_fixed<W: uWrite + ?Sized>(w: &mut W, value: u32, decimals: u8) -> Result<(), W::Error> {
    let scale = 10u32.pow(decimals as u32);
    uwrite!(w, "{}", value / scale)?;
    if decimals == 0 {
        return Ok(());
    }
    w.write_char('.')?;
    let mut frac = value % scale;
    let mut place = scale / 10;
    while place > 0 {
        let digit = (frac / place) as u8;
        w.write_char((b'0' + digit) as char)?;
        frac %= place;
        place /= 10;
    }
    Ok(())
}

fn write_bit<W: uWrite + ?Sized>(w: &mut W, bit: bool) -> Result<(), W::Error> {
    w.write_char(if bit { '1' } else { '0' })
}

// Field name then value, for one cell of the connectivity matrix.
fn write_cell<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, report: &ContinuityReport, driven: usize, sensed: usize) -> Result<(), W::Error> {
    w.write_char(':')?;
    w.write_str(profile.matrix.prefix)?;
    w.write_str(profile.conductors[driven].code)?;
    w.write_str(profile.conductors[sensed].code)?;
    w.write_char(':')?;
    write_bit(w, report.matrix.get(driven, sensed))
}

pub fn write_matrix_fields<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, report: &ContinuityReport) -> Result<(), W::Error> {
    let n = report.matrix.size().min(profile.conductors.len());
    for driven in 0..n {
        match profile.matrix.order {
            MatrixOrder::DiagonalFirst => {
                write_cell(w, profile, report, driven, driven)?;
                for sensed in (0..n).filter(|s| *s != driven) {
                    write_cell(w, profile, report, driven, sensed)?;
                }
            }
            MatrixOrder::RowMajor => {
                for sensed in 0..n {
                    write_cell(w, profile, report, driven, sensed)?;
                }
            }
        }
    }
    Ok(())
}

pub fn write_defect<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, defect: &Defect) -> Result<(), W::Error> {
    let name = |i: usize| profile.conductors.get(i).map(|c| c.name).unwrap_or("?");
    match *defect {
        Defect::NoCable => w.write_str("NO_CABLE"),
        Defect::Reversed => w.write_str("REVERSED"),
        Defect::Unknown => w.write_str("UNKNOWN"),
        Defect::Open(i) => uwrite!(w, "{}_OPEN", name(i)),
        Defect::Short(i, j) => uwrite!(w, "{}_{}_SHORT", name(i), name(j)),
        Defect::Crossed(i, j) => uwrite!(w, "{}_{}_CROSSED", name(i), name(j)),
    }
}

pub fn encode_continuity<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, report: &ContinuityReport) -> Result<(), W::Error> {
    match &report.verdict {
        Verdict::Pass => {
            w.write_str("RESULT:PASS")?;
            write_matrix_fields(w, profile, report)
        }
        Verdict::Fail(defects) => {
            w.write_str("RESULT:FAIL")?;
            write_matrix_fields(w, profile, report)?;
            w.write_str(":REASON:")?;
            for (i, defect) in defects.iter().enumerate() {
                if i > 0 {
                    w.write_char(',')?;
                }
                write_defect(w, profile, defect)?;
            }
            Ok(())
        }
    }
}

pub fn encode_resistance<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, report: &ResistanceReport) -> Result<(), W::Error> {
    let circuits = profile.resistance.circuits;
    w.write_str(if report.passed { "RES:PASS" } else { "RES:FAIL" })?;
    for (spec, reading) in circuits.iter().zip(report.circuits.iter()) {
        uwrite!(w, ":{}ADC:{}", spec.label, reading.raw as u32)?;
    }
    if !report.calibrated() {
        return w.write_str(":OHM:UNCAL");
    }
    for (spec, reading) in circuits.iter().zip(report.circuits.iter()) {
        uwrite!(w, ":{}CAL:{}", spec.label, reading.baseline.unwrap_or(0) as u32)?;
    }
    for (spec, reading) in circuits.iter().zip(report.circuits.iter()) {
        let milliohms = reading.milliohms.unwrap_or(0);
        uwrite!(w, ":{}MOHM:{}:{}OHM:", spec.label, milliohms, spec.label)?;
        write_fixed(w, milliohms, 3)?;
    }
    Ok(())
}

fn write_counts<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, readings: &[u16]) -> Result<(), W::Error> {
    for (spec, raw) in profile.resistance.circuits.iter().zip(readings) {
        uwrite!(w, ":{}ADC:{}", spec.label, *raw as u32)?;
    }
    Ok(())
}

pub fn encode_calibration<W: uWrite + ?Sized>(w: &mut W, profile: &CableProfile, result: &Result<crate::calibration::CircuitCounts, CalibrationRejected>) -> Result<(), W::Error> {
    match result {
        Ok(readings) => {
            w.write_str("CAL:OK")?;
            write_counts(w, profile, readings)
        }
        Err(rejected) => {
            w.write_str("CAL:FAIL")?;
            write_counts(w, profile, &rejected.readings)?;
            w.write_str(":NO_CABLE")
        }
    }
}

pub fn encode_capacitance<W: uWrite + ?Sized>(w: &mut W, outcome: &CapacitanceOutcome) -> Result<(), W::Error> {
    match *outcome {
        CapacitanceOutcome::Timeout => w.write_str("CAP:FAIL:TIMEOUT"),
        CapacitanceOutcome::Measured { decipf, time_us, samples, in_band } => {
            w.write_str(if in_band { "CAP:PASS:PF:" } else { "CAP:WARN:PF:" })?;
            write_fixed(w, decipf, 1)?;
            uwrite!(w, ":TIME_US:{}:SAMPLES:{}", time_us, samples as u32)
        }
    }
}

pub fn encode_stray_calibration<W: uWrite + ?Sized>(w: &mut W, stray_decipf: Option<u32>) -> Result<(), W::Error> {
    match stray_decipf {
        Some(decipf) => {
            w.write_str("CAPCAL:OK:PF:")?;
            write_fixed(w, decipf, 1)
        }
        None => w.write_str("CAPCAL:FAIL:TIMEOUT"),
    }
}

pub fn encode_shell_bond<W: uWrite + ?Sized>(w: &mut W, report: &ShellBondReport) -> Result<(), W::Error> {
    w.write_str(if report.passed() { "SHELL:PASS" } else { "SHELL:FAIL" })?;
    w.write_str(":NEAR:")?;
    write_bit(w, report.near)?;
    w.write_str(":FAR:")?;
    write_bit(w, report.far)?;
    w.write_str(":SS:")?;
    write_bit(w, report.shell_to_shell)?;
    if report.passed() {
        return Ok(());
    }
    w.write_str(":REASON:")?;
    for (i, defect) in report.defects().iter().enumerate() {
        if i > 0 {
            w.write_char(',')?;
        }
        w.write_str(defect.code())?;
    }
    Ok(())
}

pub fn encode_error<W: uWrite + ?Sized>(w: &mut W, error: &ProtocolError) -> Result<(), W::Error> {
    match error {
        ProtocolError::NotReady => w.write_str("ERROR:NOT_READY"),
        ProtocolError::LineTooLong => w.write_str("ERROR:LINE_TOO_LONG"),
        ProtocolError::Unsupported(command) => uwrite!(w, "ERROR:UNSUPPORTED:{}", *command),
        ProtocolError::UnknownCommand(text) => {
            w.write_str("ERROR:UNKNOWN_CMD:")?;
            for c in text.chars() {
                w.write_char(c.to_ascii_uppercase())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::{classify, ConnectivityMatrix};
    use crate::resistance::CircuitReading;
    use crate::{pcb_trs_mapping, pcb_ts_mapping, pcb_xlr_mapping};
    use heapless::Vec;

    fn render(f: impl FnOnce(&mut ResponseBuffer) -> Result<(), ()>) -> std::string::String {
        let mut buf = ResponseBuffer::new();
        f(&mut buf).unwrap();
        buf.as_str().into()
    }

    fn report(size: usize, rows: [[bool; 3]; 3]) -> ContinuityReport {
        let matrix = ConnectivityMatrix::from_rows(size, rows);
        ContinuityReport { verdict: classify(&matrix), matrix }
    }

    #[test]
    fn fixed_point_pads_fraction() {
        assert_eq!(render(|w| write_fixed(w, 1234, 3)), "1.234");
        assert_eq!(render(|w| write_fixed(w, 5, 3)), "0.005");
        assert_eq!(render(|w| write_fixed(w, 0, 1)), "0.0");
        assert_eq!(render(|w| write_fixed(w, 42, 0)), "42");
    }

    #[test]
    fn trs_matrix_is_diagonal_first() {
        let r = report(3, [[true, false, false], [false, true, false], [false, false, true]]);
        assert_eq!(
            render(|w| encode_continuity(w, &pcb_trs_mapping::PROFILE, &r)),
            "RESULT:PASS:TT:1:TR:0:TS:0:RR:1:RT:0:RS:0:SS:1:ST:0:SR:0"
        );
    }

    #[test]
    fn xlr_matrix_is_row_major_with_prefix() {
        let r = report(3, [[true, false, false], [false, false, false], [false, false, true]]);
        assert_eq!(
            render(|w| encode_continuity(w, &pcb_xlr_mapping::PROFILE, &r)),
            "RESULT:FAIL:P11:1:P12:0:P13:0:P21:0:P22:0:P23:0:P31:0:P32:0:P33:1:REASON:PIN2_OPEN"
        );
    }

    #[test]
    fn several_defects_are_comma_joined() {
        let r = report(3, [[false, false, false], [false, true, true], [false, true, true]]);
        let line = render(|w| encode_continuity(w, &pcb_trs_mapping::PROFILE, &r));
        assert!(line.ends_with(":REASON:TIP_OPEN,RING_SLEEVE_SHORT"), "{line}");
    }

    #[test]
    fn uncalibrated_resistance() {
        let mut circuits = Vec::new();
        circuits.push(CircuitReading { raw: 49, baseline: None, milliohms: None }).unwrap();
        let r = ResistanceReport { passed: true, circuits };
        assert_eq!(render(|w| encode_resistance(w, &pcb_ts_mapping::PROFILE, &r)), "RES:PASS:ADC:49:OHM:UNCAL");
    }

    #[test]
    fn two_circuit_resistance_labels_every_field() {
        let mut circuits = Vec::new();
        circuits.push(CircuitReading { raw: 60, baseline: Some(49), milliohms: Some(245) }).unwrap();
        circuits.push(CircuitReading { raw: 200, baseline: Some(50), milliohms: Some(3_310) }).unwrap();
        let r = ResistanceReport { passed: false, circuits };
        assert_eq!(
            render(|w| encode_resistance(w, &pcb_xlr_mapping::PROFILE, &r)),
            "RES:FAIL:P2ADC:60:P3ADC:200:P2CAL:49:P3CAL:50:P2MOHM:245:P2OHM:0.245:P3MOHM:3310:P3OHM:3.310"
        );
    }

    #[test]
    fn rejected_calibration_keeps_readings() {
        let mut readings = Vec::new();
        readings.push(1023).unwrap();
        let result = Err(CalibrationRejected { readings });
        assert_eq!(render(|w| encode_calibration(w, &pcb_ts_mapping::PROFILE, &result)), "CAL:FAIL:ADC:1023:NO_CABLE");
    }

    #[test]
    fn capacitance_lines() {
        let measured = CapacitanceOutcome::Measured { decipf: 1015, time_us: 183, samples: 5, in_band: true };
        assert_eq!(render(|w| encode_capacitance(w, &measured)), "CAP:PASS:PF:101.5:TIME_US:183:SAMPLES:5");
        assert_eq!(render(|w| encode_capacitance(w, &CapacitanceOutcome::Timeout)), "CAP:FAIL:TIMEOUT");
        assert_eq!(render(|w| encode_stray_calibration(w, Some(212))), "CAPCAL:OK:PF:21.2");
    }

    #[test]
    fn shell_bond_lines() {
        let bonded = ShellBondReport { ground_seen: true, near: true, far: true, shell_to_shell: true };
        assert_eq!(render(|w| encode_shell_bond(w, &bonded)), "SHELL:PASS:NEAR:1:FAR:1:SS:1");
        let lifted = ShellBondReport { ground_seen: true, near: false, far: true, shell_to_shell: false };
        assert_eq!(render(|w| encode_shell_bond(w, &lifted)), "SHELL:FAIL:NEAR:0:FAR:1:SS:0:REASON:NEAR_OPEN,SS_OPEN");
    }

    #[test]
    fn unknown_command_is_echoed_upper_case() {
        assert_eq!(render(|w| encode_error(w, &ProtocolError::UnknownCommand("hello"))), "ERROR:UNKNOWN_CMD:HELLO");
        assert_eq!(render(|w| encode_error(w, &ProtocolError::Unsupported("CAP"))), "ERROR:UNSUPPORTED:CAP");
    }
}
