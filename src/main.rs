use cable_tester::pcb_mapping::PROFILE;
use cable_tester::sim::{Bench, SimCable, SimController};
use std::convert::Infallible;
use std::io::{self, BufRead, Read, Write};
use std::time::{Duration, Instant};
use ufmt::uWrite;

// Collects everything the controller writes so it can be shown and forwarded.
#[derive(Default)]
struct Capture(String);
impl uWrite for Capture {
    type Error = Infallible;
    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        self.0.push_str(s);
        Ok(())
    }
}

fn prompt(text: &str) -> Option<String> {
    print!("{}", text);
    io::stdout().flush().ok();
    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

// The command-line front end for the simulated tester.
fn main() {
    println!("==============================");
    println!("  Cable Tester Bench Simulator ");
    println!("==============================");

    let bench = Bench::new(&PROFILE, pick_cable(PROFILE.conductors.len()));
    let mut controller = bench.controller();
    let mut boot_log = Capture::default();
    let state = controller.boot(&mut boot_log);
    print!("{}", boot_log.0);
    println!("Tester {} booted: {:?}", PROFILE.tester_id, state);

    loop {
        println!("\nSelect mode:");
        println!("  1. Manual Command Input");
        println!("  2. Listen on Serial Port");
        println!("  3. Change Cable");
        println!("  4. Exit");
        let Some(choice) = prompt("> ") else { break };
        match choice.as_str() {
            "1" => run_manual_mode(&mut controller),
            "2" => run_serial_mode(&bench, &mut controller),
            "3" => bench.set_cable(pick_cable(PROFILE.conductors.len())),
            "4" => break,
            _ => eprintln!("[ERROR] Invalid choice. Please enter 1, 2, 3 or 4."),
        }
    }
}

fn pick_cable(conductors: usize) -> SimCable {
    println!("\nCable on the bench:");
    println!("  1. Good cable");
    println!("  2. Reversed (first two conductors swapped)");
    println!("  3. First conductor open");
    println!("  4. First two conductors shorted");
    println!("  5. Nothing plugged in");
    println!("  6. Near end shell bond lifted");
    let straight = SimCable::straight(conductors).with_wire_milliohms(0, 150).with_capacitance_pf(100.0);
    match prompt("Select a cable (number, default 1): ").as_deref() {
        Some("2") => straight.with_swap(0, 1),
        Some("3") => straight.with_open(0),
        Some("4") => straight.with_short(0, 1),
        Some("5") => SimCable::none(),
        Some("6") => straight.with_shell_bonds(false, true, false),
        Some("") | Some("1") | None => straight,
        Some(other) => {
            eprintln!("[WARNING] Unknown cable '{}'. Using a good cable.", other);
            straight
        }
    }
}

// Handles the manual command input mode.
fn run_manual_mode(controller: &mut SimController<'_>) {
    println!("\n--- Manual Mode ---");
    println!("Enter commands, or type 'back' to return to the main menu.");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(input) = line else { break };
        if input.trim().eq_ignore_ascii_case("back") {
            break;
        }
        let mut response = Capture::default();
        controller.handle_line(&input, &mut response).ok();
        for reply in response.0.lines() {
            println!("< {}", reply);
        }
        print!("> ");
        io::stdout().flush().ok();
    }
}

// Handles the serial port listening mode. Bench time follows the wall clock so the heartbeat runs.
fn run_serial_mode(bench: &Bench, controller: &mut SimController<'_>) {
    println!("\n--- Serial Mode ---");

    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            eprintln!("[ERROR] Could not enumerate serial ports: {}", e);
            return;
        }
    };
    if ports.is_empty() {
        eprintln!("[ERROR] No serial ports found.");
        return;
    }
    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }
    let port_index: usize = match prompt("Select a port (number): ").and_then(|s| s.parse().ok()) {
        Some(i) if i < ports.len() => i,
        _ => {
            eprintln!("[ERROR] Invalid port selection.");
            return;
        }
    };
    let port_name = &ports[port_index].port_name;

    let baud_rates = [9600, 19200, 38400, 57600, 115200];
    println!("Available baud rates:");
    for (i, &rate) in baud_rates.iter().enumerate() {
        println!("  {}: {}", i, rate);
    }
    let baud_rate = match prompt("Select a baud rate (number): ").and_then(|s| s.parse::<usize>().ok()) {
        Some(i) if i < baud_rates.len() => baud_rates[i],
        _ => {
            eprintln!("[ERROR] Invalid baud rate selection.");
            return;
        }
    };

    let mut port = match serialport::new(port_name, baud_rate).timeout(Duration::from_millis(10)).open() {
        Ok(port) => port,
        Err(e) => {
            eprintln!("[ERROR] Failed to open port '{}': {}", port_name, e);
            return;
        }
    };
    println!("\nListening on {} at {} baud. Press Ctrl+C to exit.", port_name, baud_rate);

    let mut serial_buf = [0u8; 128];
    let mut last_tick = Instant::now();
    loop {
        match port.read(&mut serial_buf) {
            Ok(bytes_read) => {
                for &byte in &serial_buf[..bytes_read] {
                    let mut response = Capture::default();
                    controller.receive(byte, &mut response).ok();
                    if response.0.is_empty() {
                        continue;
                    }
                    for reply in response.0.lines() {
                        println!("< {}", reply);
                    }
                    if let Err(e) = port.write_all(response.0.as_bytes()) {
                        eprintln!("[ERROR] Failed to write to serial port: {}", e);
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => (),
            Err(e) => eprintln!("[ERROR] Serial port error: {}", e),
        }
        let elapsed = last_tick.elapsed();
        if elapsed.as_millis() > 0 {
            bench.advance_ms(elapsed.as_millis() as u32);
            last_tick = Instant::now();
        }
        controller.heartbeat();
    }
}
