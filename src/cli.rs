// src/cli.rs
//
// Headless front end: list ports, monitor one, show settings.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ErrorKind;
use crate::io::serial::{open_and_report, spawn_reader, Message, MessageConsumer, PollDriver};
use crate::io::StopReason;
use crate::logging::init_logging;
use crate::settings::{load_settings, save_settings, MonitorSettings};

#[derive(Parser, Debug)]
#[command(name = "espmon", version, about = "Monitor START/END framed messages from USB serial devices")]
pub struct Cli {
    /// Debug logging for the monitor library
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: <config dir>/espmon/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List candidate serial ports
    List {
        /// Print the ports as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Open a port and print every framed message
    Monitor(MonitorArgs),
    /// Print the effective settings as TOML
    Config {
        /// Also write them to the settings file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Device path; defaults to the configured port, then discovery
    #[arg(short, long)]
    port: Option<String>,

    /// Which discovered port to use when no path is given
    #[arg(short, long, default_value_t = 0)]
    index: usize,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Bound the frame buffer to this many bytes
    #[arg(long)]
    max_buffer: Option<usize>,

    /// One JSON object per message on stdout
    #[arg(long)]
    json: bool,
}

// ============================================================================
// Console output
// ============================================================================

/// Prints messages to `out` (stdout by default) and status/errors to stderr.
/// A failed write, e.g. a closed pipe, closes the printer.
struct ConsolePrinter<W: Write = std::io::Stdout> {
    out: W,
    json: bool,
    closed: bool,
}

impl ConsolePrinter {
    fn stdout(json: bool) -> Self {
        ConsolePrinter::new(std::io::stdout(), json)
    }
}

impl<W: Write> ConsolePrinter<W> {
    fn new(out: W, json: bool) -> Self {
        ConsolePrinter {
            out,
            json,
            closed: false,
        }
    }

    fn write_message(&mut self, message: &Message) -> std::io::Result<()> {
        if self.json {
            let line = serde_json::to_string(message)?;
            writeln!(self.out, "{}", line)?;
        } else {
            writeln!(self.out, "Received:")?;
            for line in message.lines() {
                writeln!(self.out, "    {}", line)?;
            }
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}

impl<W: Write> MessageConsumer for ConsolePrinter<W> {
    fn on_message(&mut self, message: Message) {
        if self.closed {
            return;
        }
        if let Err(e) = self.write_message(&message) {
            tracing::debug!("Output closed: {}", e);
            self.closed = true;
        }
    }

    fn on_status(&mut self, status: &str) {
        eprintln!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), status);
    }

    fn on_error(&mut self, _kind: ErrorKind, detail: &str) {
        eprintln!(
            "{} Error: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            detail
        );
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ============================================================================
// Commands
// ============================================================================

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if cli.log_dir.is_some() {
        settings.log_dir = cli.log_dir.clone();
    }

    if let Err(e) = init_logging(&settings.log_filter, cli.verbose, settings.log_dir.as_deref()) {
        eprintln!("{}", e);
    }

    match cli.command {
        Command::List { json } => list(&settings, json),
        Command::Monitor(args) => monitor(settings, args).await,
        Command::Config { write } => {
            print!("{}", toml::to_string_pretty(&settings)?);
            if write {
                let path = save_settings(&settings, cli.config.as_deref())?;
                eprintln!("Settings written to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn list(settings: &MonitorSettings, json: bool) -> anyhow::Result<ExitCode> {
    let ports = settings.discovery().list();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else {
        for port in &ports {
            println!("{:<16} {}", port.display_name, port.path);
        }
    }
    if ports.is_empty() {
        ConsolePrinter::stdout(json).on_status("No ports found");
    }
    Ok(ExitCode::SUCCESS)
}

async fn monitor(mut settings: MonitorSettings, args: MonitorArgs) -> anyhow::Result<ExitCode> {
    if let Some(ms) = args.interval_ms {
        settings.poll_interval_ms = ms;
    }
    if args.max_buffer.is_some() {
        settings.max_buffered_bytes = args.max_buffer;
    }

    let mut printer = ConsolePrinter::stdout(args.json);

    let Some(path) = choose_port(&settings, &args)? else {
        printer.on_status("No ports found");
        return Ok(ExitCode::FAILURE);
    };

    let Some(session) = open_and_report(&path, &mut printer) else {
        return Ok(ExitCode::FAILURE);
    };

    let driver =
        PollDriver::with_framer(session, settings.framer()).read_size(settings.read_chunk_size);
    let cancel = Arc::new(AtomicBool::new(false));
    let (handle, mut rx) = spawn_reader(driver, settings.poll_interval(), cancel.clone());

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    event.deliver_to(&mut printer);
                    if printer.is_closed() {
                        // Nowhere to print; dropping rx stops the reader
                        cancel.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.load(Ordering::Relaxed) => {
                // Loop exits at the next tick; keep draining until Ended
                cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    drop(rx);
    let reason = handle.await.context("Reader task failed")?;
    Ok(match reason {
        StopReason::Stopped => ExitCode::SUCCESS,
        StopReason::Error => ExitCode::FAILURE,
    })
}

/// Explicit path, then the configured default, then the N-th discovered port.
fn choose_port(settings: &MonitorSettings, args: &MonitorArgs) -> anyhow::Result<Option<String>> {
    if let Some(ref port) = args.port {
        return Ok(Some(port.clone()));
    }
    if let Some(ref port) = settings.default_port {
        return Ok(Some(port.clone()));
    }

    let ports = settings.discovery().list();
    if ports.is_empty() {
        return Ok(None);
    }
    match ports.get(args.index) {
        Some(port) => {
            tracing::info!("Using {} ({})", port.display_name, port.path);
            Ok(Some(port.path.clone()))
        }
        None => bail!(
            "Port index {} out of range ({} port{} found)",
            args.index,
            ports.len(),
            if ports.len() == 1 { "" } else { "s" }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_args(port: Option<&str>, index: usize) -> MonitorArgs {
        MonitorArgs {
            port: port.map(str::to_string),
            index,
            interval_ms: None,
            max_buffer: None,
            json: false,
        }
    }

    fn settings_with_dev(names: &[&str]) -> (tempfile::TempDir, MonitorSettings) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let settings = MonitorSettings {
            device_dir: dir.path().to_path_buf(),
            enumeration: crate::settings::EnumerationSource::Directory,
            ..MonitorSettings::default()
        };
        (dir, settings)
    }

    #[test]
    fn test_cli_parses_monitor() {
        let cli = Cli::try_parse_from([
            "espmon", "-v", "monitor", "--port", "/dev/ttyUSB0", "--interval-ms", "50", "--json",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
                assert_eq!(args.interval_ms, Some(50));
                assert!(args.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_printer_formats_lines() {
        let mut printer = ConsolePrinter::new(Vec::new(), false);
        printer.on_message(Message::from_body("temp=21\nhum=40\n"));

        assert_eq!(
            String::from_utf8(printer.out.clone()).unwrap(),
            "Received:\n    temp=21\n    hum=40\n\n"
        );
        assert!(!printer.is_closed());
    }

    #[test]
    fn test_printer_closes_on_write_error() {
        let mut printer = ConsolePrinter::new(BrokenPipe, true);
        assert!(!printer.is_closed());

        printer.on_message(Message::from_body("x"));
        assert!(printer.is_closed());
    }

    #[test]
    fn test_explicit_port_wins() {
        let settings = MonitorSettings {
            default_port: Some("/dev/ttyACM3".to_string()),
            ..MonitorSettings::default()
        };
        let chosen = choose_port(&settings, &monitor_args(Some("/dev/ttyUSB7"), 0)).unwrap();
        assert_eq!(chosen.as_deref(), Some("/dev/ttyUSB7"));

        let chosen = choose_port(&settings, &monitor_args(None, 0)).unwrap();
        assert_eq!(chosen.as_deref(), Some("/dev/ttyACM3"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_discovered_port_by_index() {
        let (dir, settings) = settings_with_dev(&["ttyUSB0", "ttyS1"]);

        let chosen = choose_port(&settings, &monitor_args(None, 0)).unwrap();
        let expected = dir.path().join("ttyUSB0").to_string_lossy().into_owned();
        assert_eq!(chosen, Some(expected));

        assert!(choose_port(&settings, &monitor_args(None, 3)).is_err());
    }

    #[test]
    fn test_no_ports_is_not_an_error() {
        let (_dir, settings) = settings_with_dev(&[]);
        assert_eq!(choose_port(&settings, &monitor_args(None, 0)).unwrap(), None);
    }
}
