//! Access controller daemon.
//!
//! Opens every configured serial device, identifies the terminal on the
//! far side, and keeps reconnecting forever. One supervisor task per
//! endpoint; the authenticator is shared across all of them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{CommandFactory, Parser};
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use porter_auth::Authenticator;
use porter_core::constants::DEFAULT_BAUD_RATE;
use porter_core::{Error, PhysicalActions, Result, SystemClock};
use porter_handlers::{Backends, SimpleDoorbell, dispatch};
use porter_terminal::run_endpoint;

mod gpio;
use gpio::GpioActions;

#[derive(Parser)]
#[command(name = "porter", about = "Door access controller for serial keypad terminals")]
struct Cli {
    /// User authentication file.
    #[arg(long, value_name = "PATH", default_value = "/var/access/users.csv")]
    users: PathBuf,

    /// Log file; stdout when not given.
    #[arg(long, value_name = "PATH")]
    logfile: Option<PathBuf>,

    /// Serial endpoints to supervise.
    #[arg(value_name = "DEVICE[:BAUD]")]
    endpoints: Vec<String>,
}

fn parse_endpoint(arg: &str) -> Result<(String, u32)> {
    match arg.split_once(':') {
        None => Ok((arg.to_string(), DEFAULT_BAUD_RATE)),
        Some((device, baud)) => {
            let baud = baud
                .parse()
                .map_err(|_| Error::Config(format!("invalid baud rate in '{arg}'")))?;
            Ok((device.to_string(), baud))
        }
    }
}

fn init_logging(logfile: Option<&PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match logfile {
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Config(format!("cannot open log file: {e}")))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.endpoints.is_empty() {
        eprint!("{}", Cli::command().render_help());
        std::process::exit(1);
    }

    // Parse everything before spawning anything: bad arguments are
    // fatal, a dead serial port is merely retried.
    let mut endpoints = Vec::with_capacity(cli.endpoints.len());
    for arg in &cli.endpoints {
        endpoints.push(parse_endpoint(arg)?);
    }

    init_logging(cli.logfile.as_ref())?;
    info!(version = porter_core::VERSION, "starting");

    let actions: Arc<dyn PhysicalActions> = Arc::new(GpioActions::new());
    let backends = Backends {
        authenticator: Arc::new(
            Authenticator::load(&cli.users, Arc::new(SystemClock))
                .map_err(|e| Error::Config(format!("cannot load user file: {e}")))?,
        ),
        actions: Arc::clone(&actions),
        doorbell: Arc::new(SimpleDoorbell::new(actions)),
    };

    let mut supervisors = Vec::new();
    for (device, baud) in endpoints {
        let label = format!("{device}:{baud}");
        let backends = backends.clone();
        let open = {
            let device = device.clone();
            async move || {
                tokio_serial::new(&device, baud)
                    .open_native_async()
                    .map_err(std::io::Error::from)
            }
        };
        supervisors.push(tokio::spawn(run_endpoint(label, open, move |name| {
            dispatch(name, &backends)
        })));
    }

    // The supervisors never return; this blocks forever.
    futures::future::join_all(supervisors).await;
    Ok(())
}
