/*!
 * timerctl - Timer Device Client
 *
 * Arms the timer device and blocks until it fires:
 * - Duration comes from the arguments (e.g. `timerctl 1m 30s`) or a prompt
 * - An optional custom message is prompted for; empty keeps the default
 */

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use tracing::{debug, info};

use timer_device::{init_tracing, parse_duration, ControlCommand, TimerDevice};

fn prompt(stdin: &mut impl BufRead, text: &str) -> Result<String> {
    print!("{}", text);
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    let read = stdin.read_line(&mut line).context("Failed to read input")?;
    if read == 0 {
        bail!("Input closed before a value was entered");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn main() -> Result<()> {
    init_tracing();

    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let duration_input = if args.is_empty() {
        println!("\n(e.g., \"1m 30s\", 45s, 1h)");
        prompt(&mut stdin, "Enter a timer duration: ")?
    } else {
        args.join(" ")
    };

    let custom_message = prompt(
        &mut stdin,
        "Enter the message to display after the timer expires or just press enter:\n",
    )?;

    let duration_ms = parse_duration(&duration_input)
        .with_context(|| format!("Invalid duration provided: '{}'", duration_input))?;
    if duration_ms <= 0 {
        bail!("Invalid duration provided: total must be positive");
    }

    let device = TimerDevice::from_env().context("Failed to load timer device")?;
    let mut session = device.open().context("Failed to open device")?;

    if !custom_message.is_empty() {
        session.write(custom_message.as_bytes())?;
    }

    println!("\nSetting timer for {} ms...", duration_ms);
    session
        .control(ControlCommand::SetTimer { duration_ms })
        .context("Failed to set timer")?;

    println!("Waiting for the timer to expire...");
    let reply = session.read().context("Read failed")?;
    println!("Read from driver: {}", reply);

    session.close()?;

    let stats = device.stats();
    debug!(stats = %stats.to_json()?, "Device statistics");

    device.shutdown()?;
    info!("Done");
    Ok(())
}
