use actioncam_rs::config::Config;
use actioncam_rs::ipc::{CommandFile, RecordingControl, SharedFrameBuffer};
use actioncam_rs::storage::LogTarget;
use actioncam_rs::video::{ControlPoller, FileRecordingSink, RecordingController};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "video_bridge")]
#[command(
    about = "Publish raw BGRA preview frames to shared memory and record them on demand",
    long_about = None
)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Raw frame stream (defaults to stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Override the recording directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    actioncam_rs::init_logging();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = args.output_dir {
        config.video.output_dir = dir;
    }
    let video = config.video;
    let layout = video.frame_layout();
    info!(
        "Video bridge: preview {}x{} ({} bytes/frame), recording to {}",
        layout.width,
        layout.height,
        layout.frame_bytes(),
        video.output_dir.display()
    );

    let attached = SharedFrameBuffer::attach(video.frame_shm_key, &video.frame_semaphore, layout);
    let frames = match attached {
        Ok(buffer) => Some(buffer),
        Err(e) => {
            warn!("Preview hand-off disabled: {}", e);
            None
        }
    };

    let shared = match RecordingControl::attach(video.control_shm_key) {
        Ok(control) => Some(control),
        Err(e) => {
            warn!("Recording flag unavailable, command file only: {}", e);
            None
        }
    };

    let target = LogTarget::new(
        &video.output_dir,
        &video.file_prefix,
        &video.file_extension,
        chrono::Duration::hours(24),
    );
    let controller = Arc::new(Mutex::new(RecordingController::new(
        FileRecordingSink::new(),
        target,
    )));

    let poller = ControlPoller::new(
        Arc::clone(&controller),
        shared,
        CommandFile::new(&video.command_file),
    )
    .with_interval(video.control_poll());
    thread::Builder::new()
        .name("video-control".into())
        .spawn(move || poller.run())
        .context("spawning control thread")?;

    let input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };
    let mut input = BufReader::with_capacity(layout.frame_bytes(), input);

    let mut frame = vec![0u8; layout.frame_bytes()];
    let mut count: u64 = 0;
    loop {
        match input.read_exact(&mut frame) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("Input ended after {} frames", count);
                break;
            }
            Err(e) => return Err(e).context("reading frame"),
        }
        count += 1;

        if let Some(buffer) = &frames {
            if let Err(e) = buffer.write_frame(&frame) {
                warn!("Frame {} not published: {}", count, e);
            }
        }

        let mut recorder = controller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = recorder.write_frame(&frame) {
            warn!("Frame {} not recorded: {}", count, e);
        }
    }

    controller
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stop();
    Ok(())
}
