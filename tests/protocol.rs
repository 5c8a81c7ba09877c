use cable_tester::encoder::ResponseBuffer;
use cable_tester::pcb_common::{Indicator, RelayLine};
use cable_tester::self_test::ControllerState;
use cable_tester::sim::{Bench, SimCable, SimController};
use cable_tester::{pcb_trs_mapping, pcb_ts_mapping, pcb_xlr_mapping};

fn booted(bench: &Bench) -> SimController<'_> {
    let mut controller = bench.controller();
    controller.boot(&mut ResponseBuffer::new());
    controller
}

// Last line written, DBG: lines come first when enabled.
fn ask(controller: &mut SimController<'_>, line: &str) -> String {
    let mut out = ResponseBuffer::new();
    controller.handle_line(line, &mut out).unwrap();
    out.as_str().lines().last().unwrap_or("").to_string()
}

fn pf_field(line: &str) -> f32 {
    let fields: Vec<&str> = line.split(':').collect();
    let at = fields.iter().position(|f| *f == "PF").expect("no PF field");
    fields[at + 1].parse().expect("PF is not a number")
}

#[test]
fn ts_good_cable_passes() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2));
    let mut controller = booted(&bench);
    assert_eq!(controller.state(), ControllerState::Ready);
    assert_eq!(ask(&mut controller, "CONT"), "RESULT:PASS:TT:1:TS:0:SS:1:ST:0");
}

#[test]
fn ts_reversed_cable() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2).with_swap(0, 1));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "cont"), "RESULT:FAIL:TT:0:TS:1:SS:0:ST:1:REASON:REVERSED");
}

#[test]
fn ts_nothing_plugged_in() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::none());
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CONT"), "RESULT:FAIL:TT:0:TS:0:SS:0:ST:0:REASON:NO_CABLE");
}

#[test]
fn ts_one_way_leak_is_unknown() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2).with_link(0, 1));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CONT"), "RESULT:FAIL:TT:1:TS:1:SS:1:ST:0:REASON:UNKNOWN");
}

#[test]
fn trs_open_conductor_is_named() {
    let bench = Bench::new(&pcb_trs_mapping::PROFILE, SimCable::straight(3).with_open(1));
    let mut controller = booted(&bench);
    assert_eq!(
        ask(&mut controller, "CONT"),
        "RESULT:FAIL:TT:1:TR:0:TS:0:RR:0:RT:0:RS:0:SS:1:ST:0:SR:0:REASON:RING_OPEN"
    );
}

#[test]
fn trs_short_is_named() {
    let bench = Bench::new(&pcb_trs_mapping::PROFILE, SimCable::straight(3).with_short(0, 2));
    let mut controller = booted(&bench);
    let line = ask(&mut controller, "CONT");
    assert!(line.contains(":TS:1:"), "{line}");
    assert!(line.contains(":ST:1:"), "{line}");
    assert!(line.ends_with(":REASON:TIP_SLEEVE_SHORT"), "{line}");
}

#[test]
fn xlr_every_open_pin_is_detected() {
    for pin in 0..3 {
        let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3).with_open(pin));
        let mut controller = booted(&bench);
        let line = ask(&mut controller, "CONT");
        let expected = format!(":REASON:PIN{}_OPEN", pin + 1);
        assert!(line.ends_with(&expected), "{line}");
        let diagonal = format!(":P{}{}:0:", pin + 1, pin + 1);
        assert!(line.contains(&diagonal), "{line}");
    }
}

#[test]
fn calibration_without_reference_is_rejected() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::none());
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAL"), "CAL:FAIL:ADC:1023:NO_CABLE");
    assert!(!controller.calibration().is_calibrated());
    assert_eq!(ask(&mut controller, "RES"), "RES:FAIL:ADC:1023:OHM:UNCAL");
}

#[test]
fn short_reference_round_trips_to_zero() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "RES"), "RES:PASS:ADC:49:OHM:UNCAL");
    assert_eq!(ask(&mut controller, "CAL"), "CAL:OK:ADC:49");
    assert_eq!(ask(&mut controller, "RES"), "RES:PASS:ADC:49:CAL:49:MOHM:0:OHM:0.000");
}

#[test]
fn cable_resistance_reads_against_baseline() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2));
    let mut controller = booted(&bench);
    ask(&mut controller, "CAL");
    bench.set_cable(SimCable::straight(2).with_wire_milliohms(0, 1_000));
    let line = ask(&mut controller, "RES");
    assert!(line.starts_with("RES:PASS:ADC:133:CAL:49:MOHM:"), "{line}");
    let milliohms: u32 = line.split(':').nth(7).unwrap().parse().unwrap();
    assert!((800..=1000).contains(&milliohms), "{milliohms}");
}

#[test]
fn rejected_calibration_keeps_previous_baseline() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAL"), "CAL:OK:ADC:49");
    bench.set_cable(SimCable::none());
    assert_eq!(ask(&mut controller, "CAL"), "CAL:FAIL:ADC:1023:NO_CABLE");
    bench.set_cable(SimCable::straight(2));
    assert_eq!(ask(&mut controller, "RES"), "RES:PASS:ADC:49:CAL:49:MOHM:0:OHM:0.000");
}

#[test]
fn trs_low_side_calibration() {
    let bench = Bench::new(&pcb_trs_mapping::PROFILE, SimCable::none());
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAL"), "CAL:FAIL:ADC:0:NO_CABLE");
    bench.set_cable(SimCable::straight(3));
    assert_eq!(ask(&mut controller, "CAL"), "CAL:OK:ADC:974");
    assert_eq!(ask(&mut controller, "RES"), "RES:PASS:ADC:974:CAL:974:MOHM:0:OHM:0.000");
    bench.set_cable(SimCable::straight(3).with_wire_milliohms(2, 2_000));
    assert!(ask(&mut controller, "RES").starts_with("RES:FAIL:"));
}

#[test]
fn xlr_calibrates_both_circuits_or_neither() {
    let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3).with_open(2));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAL"), "CAL:FAIL:P2ADC:49:P3ADC:1023:NO_CABLE");
    assert!(controller.calibration().baseline(0).is_none());
    assert_eq!(ask(&mut controller, "RES"), "RES:FAIL:P2ADC:49:P3ADC:1023:OHM:UNCAL");

    bench.set_cable(SimCable::straight(3));
    assert_eq!(ask(&mut controller, "CAL"), "CAL:OK:P2ADC:49:P3ADC:49");
    assert_eq!(
        ask(&mut controller, "RES"),
        "RES:PASS:P2ADC:49:P3ADC:49:P2CAL:49:P3CAL:49:P2MOHM:0:P2OHM:0.000:P3MOHM:0:P3OHM:0.000"
    );
}

#[test]
fn capacitance_of_a_short_cable() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2).with_capacitance_pf(100.0));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAP"), "CAP:PASS:PF:100.7:TIME_US:184:SAMPLES:5");
}

#[test]
fn stray_calibration_is_subtracted() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::none());
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAPCAL"), "CAPCAL:OK:PF:21.0");
    assert_eq!(controller.calibration().stray_decipf(), 210);
    bench.set_cable(SimCable::straight(2).with_capacitance_pf(100.0));
    let pf = pf_field(&ask(&mut controller, "CAP"));
    assert!((99.0..=101.0).contains(&pf), "{pf}");
}

#[test]
fn huge_capacitance_times_out_instead_of_reading_zero() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2).with_capacitance_pf(100_000.0));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAP"), "CAP:FAIL:TIMEOUT");
    assert_eq!(ask(&mut controller, "CAPCAL"), "CAPCAL:FAIL:TIMEOUT");
    assert_eq!(controller.calibration().stray_decipf(), pcb_ts_mapping::PROFILE.capacitance.unwrap().default_stray_decipf);
}

#[test]
fn empty_fixture_reads_zero_not_negative() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::none());
    let mut controller = booted(&bench);
    let line = ask(&mut controller, "CAP");
    assert!(line.starts_with("CAP:WARN:PF:"), "{line}");
    assert!(pf_field(&line) < 5.0, "{line}");
}

#[test]
fn xlr_uses_time_constant_threshold() {
    let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3).with_capacitance_pf(100.0));
    let mut controller = booted(&bench);
    let line = ask(&mut controller, "CAP");
    assert!(line.starts_with("CAP:PASS:"), "{line}");
    let pf = pf_field(&line);
    assert!((98.0..=102.0).contains(&pf), "{pf}");
}

#[test]
fn capacitance_needs_the_network() {
    let bench = Bench::new(&pcb_trs_mapping::PROFILE, SimCable::straight(3));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "CAP"), "ERROR:UNSUPPORTED:CAP");
    assert_eq!(ask(&mut controller, "capcal"), "ERROR:UNSUPPORTED:CAPCAL");
}

#[test]
fn xlr_bonded_shells_pass() {
    let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "SHELL"), "SHELL:PASS:NEAR:1:FAR:1:SS:1");
    assert!(bench.indicator(Indicator::Pass));
    assert!(bench.relay_lines().is_idle());
    assert!(!bench.shell_drive_level());
}

#[test]
fn xlr_lifted_near_shell_fails() {
    let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3).with_shell_bonds(false, true, false));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "shell"), "SHELL:FAIL:NEAR:0:FAR:1:SS:0:REASON:NEAR_OPEN,SS_OPEN");
    assert!(bench.indicator(Indicator::Fail));
}

#[test]
fn xlr_shell_with_open_ground_pin() {
    let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3).with_open(0));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "SHELL"), "SHELL:FAIL:NEAR:0:FAR:1:SS:0:REASON:NEAR_OPEN,SS_OPEN");

    bench.set_cable(SimCable::none());
    assert_eq!(ask(&mut controller, "SHELL"), "SHELL:FAIL:NEAR:0:FAR:0:SS:0:REASON:NO_CABLE");
}

#[test]
fn shell_test_needs_shell_contacts() {
    for profile in [&pcb_ts_mapping::PROFILE, &pcb_trs_mapping::PROFILE] {
        let bench = Bench::new(profile, SimCable::straight(profile.conductors.len()));
        let mut controller = booted(&bench);
        assert_eq!(ask(&mut controller, "SHELL"), "ERROR:UNSUPPORTED:SHELL");
    }
}

#[test]
fn faulted_controller_only_answers_queries() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2));
    bench.set_supply_millivolts(4000);
    let mut controller = booted(&bench);
    assert!(matches!(controller.state(), ControllerState::Faulted(_)));
    for command in ["CONT", "RES", "CAL", "CAP", "CAPCAL"] {
        assert_eq!(ask(&mut controller, command), "ERROR:NOT_READY");
    }
    assert_eq!(ask(&mut controller, "STATUS"), "STATUS:NOT_READY");
    assert_eq!(ask(&mut controller, "ID"), "ID:CT-TS-01");
    assert_eq!(ask(&mut controller, "RESET"), "OK:RESET");
    assert_eq!(ask(&mut controller, "STATUS"), "STATUS:NOT_READY");
}

#[test]
fn unknown_and_blank_lines() {
    let bench = Bench::new(&pcb_ts_mapping::PROFILE, SimCable::straight(2));
    let mut controller = booted(&bench);
    assert_eq!(ask(&mut controller, "selftest"), "ERROR:UNKNOWN_CMD:SELFTEST");
    let mut out = ResponseBuffer::new();
    controller.handle_line("   \r", &mut out).unwrap();
    assert_eq!(out.as_str(), "");
    assert_eq!(ask(&mut controller, " status \r"), "STATUS:READY");
}

#[test]
fn reset_is_idempotent_from_any_relay_configuration() {
    let bench = Bench::new(&pcb_xlr_mapping::PROFILE, SimCable::straight(3));
    let mut controller = booted(&bench);
    for line in RelayLine::ALL {
        bench.force_relay(line, true);
        assert_eq!(ask(&mut controller, "RESET"), "OK:RESET");
        assert!(controller.relay_lines().is_idle());
        assert_eq!(ask(&mut controller, "RESET"), "OK:RESET");
        assert!(bench.relay_lines().is_idle());
    }
}
