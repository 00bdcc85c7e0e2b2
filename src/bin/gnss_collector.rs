use actioncam_rs::config::Config;
use actioncam_rs::gnss::{GnssCollector, SerialNmeaPort};
use actioncam_rs::health::SensorHealth;
use actioncam_rs::ipc::{ControlCommand, ControlFlag, FlagTarget, NamedPipeChannel};
use actioncam_rs::storage::{JsonArrayLog, LogTarget, RotatingLog};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gnss_collector")]
#[command(about = "GNSS NMEA collector writing rotating JSON record files", long_about = None)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the serial device
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    actioncam_rs::init_logging();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(port) = args.port {
        config.gnss.serial_port = port;
    }
    if let Some(baud) = args.baud {
        config.gnss.baud_rate = baud;
    }
    if let Some(dir) = args.log_dir {
        config.gnss.log_dir = dir;
    }
    let gnss = config.gnss;

    info!(
        "Starting GNSS collector on {} @ {} baud",
        gnss.serial_port, gnss.baud_rate
    );

    let flag = ControlFlag::new();
    let health = Arc::new(SensorHealth::new("GNSS", Duration::from_secs(5)));

    let target = LogTarget::new(&gnss.log_dir, &gnss.file_prefix, "json", gnss.rotation_age());
    let collector = GnssCollector::new(
        SerialNmeaPort::new(&gnss.serial_port, gnss.baud_rate),
        flag.clone(),
        RotatingLog::<JsonArrayLog<_>>::new(target),
        Arc::clone(&health),
    )
    .with_record_interval(gnss.record_interval());
    thread::Builder::new()
        .name("gnss-reader".into())
        .spawn(move || collector.run())
        .context("spawning GNSS thread")?;

    let channel = NamedPipeChannel::<ControlCommand, _>::new(
        &gnss.fifo_path,
        FlagTarget::new("GNSS", flag).with_health(health),
    );
    let listener = channel
        .spawn("gnss-commands")
        .context("spawning command thread")?;

    if listener.join().is_err() {
        warn!("Command listener panicked");
    }
    loop {
        thread::park();
    }
}
