/**
 * Motor Console
 *
 * Interactive front end for the motor controller:
 * 1. Connects to the motor board over UART
 * 2. Streams telemetry into the shared buffer
 * 3. Runs P / PI / PID speed control in the background
 * 4. Takes manual commands and mode changes from stdin
 *
 * Usage: motor_console [port] [baud]
 * Default: /dev/ttyUSB0, 115200
 */

use motor_link::config::DEFAULT_BAUD;
use motor_link::motor::HELP;
use motor_link::{logger, MotorConfig, MotorController, Request};
use log::LevelFilter;
use std::io::{self, Write};
use std::sync::Arc;

fn print_status(controller: &MotorController) {
    let status = controller.status();
    println!(
        "[STATUS] link={} mode={} variant={} setpoint=s,{} last_output={} dropped={}",
        if status.connected { "up" } else { "down" },
        status.mode,
        status.variant,
        status.setpoint_cmd,
        status.last_output_cmd.map(|v| format!("s,{}", v)).unwrap_or_else(|| "-".to_string()),
        status.dropped_lines,
    );
    match status.latest {
        Some(sample) => println!(
            "[TELEMETRY] dir={} speed={:.1} rpm current={:.3} A",
            sample.direction, sample.speed_rpm, sample.current_amps
        ),
        None => println!("[TELEMETRY] no samples yet"),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let port = args.get(1).map(|s| s.as_str()).unwrap_or("/dev/ttyUSB0");
    let baud: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_BAUD);

    if let Err(e) = logger::init(LevelFilter::Info) {
        eprintln!("logger: {}", e);
    }

    println!("==============================================");
    println!("  Motor Link Console");
    println!("==============================================");
    println!("  Port: {}", port);
    println!("  Baud: {}", baud);
    println!("==============================================\n");

    let controller = Arc::new(MotorController::with_config(port, MotorConfig::default().with_baud(baud)));

    match controller.connect() {
        Ok(()) => println!("[CONNECTED]"),
        Err(e) => println!("[NOT CONNECTED] {} (use 'connect [port]')", e),
    }

    let handle = Arc::clone(&controller).start_background();

    println!("\n[Commands]\n{}\n", HELP);

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let request = match Request::parse(&input) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                println!("[INVALID] {}", e);
                continue;
            }
        };

        match request {
            Request::Quit => break,
            Request::Help => println!("{}", HELP),
            Request::Status => print_status(&controller),
            other => match controller.dispatch(other) {
                Ok(()) => println!("[OK] mode={}", controller.mode()),
                Err(e) => println!("[ERROR] {}", e),
            },
        }
    }

    println!("[SHUTDOWN]");
    controller.shutdown();
    let _ = handle.join();
    if let Err(e) = controller.disconnect() {
        println!("[ERROR] {}", e);
    }
    println!("Goodbye!");
}
