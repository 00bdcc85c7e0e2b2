use actioncam_rs::acquisition::AcquisitionLoop;
use actioncam_rs::config::Config;
use actioncam_rs::fanout::LoggingLoop;
use actioncam_rs::health::SensorHealth;
use actioncam_rs::ipc::{ControlCommand, ControlFlag, FlagTarget, MessageQueue, NamedPipeChannel};
use actioncam_rs::ring_buffer::SharedRing;
use actioncam_rs::sensors::ImuBoard;
use actioncam_rs::storage::{AttitudeCsv, LogTarget, RotatingLog};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "imu_collector")]
#[command(
    about = "IMU acquisition, attitude fusion and CSV/message-queue logging",
    long_about = None
)]
struct Args {
    /// JSON config file (defaults apply for anything missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the I2C bus number
    #[arg(long)]
    i2c_bus: Option<u8>,

    /// Override the CSV output directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Start acquiring immediately instead of waiting for `start`
    #[arg(long)]
    autostart: bool,
}

fn main() -> Result<()> {
    actioncam_rs::init_logging();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bus) = args.i2c_bus {
        config.imu.i2c_bus = bus;
    }
    if let Some(dir) = args.log_dir {
        config.imu.log_dir = dir;
    }
    let imu = config.imu;

    info!("Starting IMU collector");
    info!("  I2C bus: /dev/i2c-{}", imu.i2c_bus);
    info!("  Control FIFO: {}", imu.fifo_path.display());
    info!("  Log dir: {}", imu.log_dir.display());

    // One flag gates both acquisition and recording
    let flag = ControlFlag::new();
    if args.autostart {
        flag.set(true);
    }
    let ring = SharedRing::new(imu.ring_capacity);
    let health = Arc::new(SensorHealth::new("IMU", Duration::from_secs(2)));

    match ImuBoard::open(&imu) {
        Ok(board) => {
            if !board.has_magnetometer() {
                warn!("Continuing without magnetometer");
            }
            let acquisition =
                AcquisitionLoop::new(board, ring.clone(), flag.clone(), Arc::clone(&health))
                    .with_timing(imu.sample_period(), imu.idle_poll());
            thread::Builder::new()
                .name("imu-acquisition".into())
                .spawn(move || acquisition.run())
                .context("spawning acquisition thread")?;
        }
        Err(e) => warn!(
            "IMU initialization failed, continuing without sensor data: {}",
            e
        ),
    }

    let target = LogTarget::new(&imu.log_dir, &imu.file_prefix, "csv", imu.rotation_age());
    let mut logger = LoggingLoop::new(ring, flag.clone(), RotatingLog::<AttitudeCsv>::new(target))
        .with_poll(imu.log_poll());
    match MessageQueue::create_fresh(imu.msg_key) {
        Ok(queue) => logger = logger.with_publisher(Box::new(queue)),
        Err(e) => warn!("Message queue unavailable, continuing without it: {}", e),
    }
    thread::Builder::new()
        .name("imu-logger".into())
        .spawn(move || logger.run())
        .context("spawning logging thread")?;

    let channel = NamedPipeChannel::<ControlCommand, _>::new(
        &imu.fifo_path,
        FlagTarget::new("IMU", flag).with_health(health),
    );
    let listener = channel
        .spawn("imu-commands")
        .context("spawning command thread")?;

    if listener.join().is_err() {
        warn!("Command listener panicked");
    }
    // Without a command channel the loops keep their last state
    loop {
        thread::park();
    }
}
