use actioncam_rs::config::Config;
use actioncam_rs::error::ActionCamError;
use actioncam_rs::ipc::{
    send_command, CommandFile, ControlCommand, RecordingControl, SharedFrameBuffer, Vocabulary,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "camctl")]
#[command(about = "Control the action camera collectors", long_about = None)]
struct Args {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a command token to a collector's control pipe
    Send {
        /// `imu`, `gnss` or a pipe path
        target: String,
        /// `start`, `stop` or `status`
        token: String,
    },
    /// Drive the shared recording flag read by the video bridge
    Record {
        #[arg(value_enum)]
        action: RecordAction,
    },
    /// Drop a token into the video command file
    Video { token: String },
    /// Copy the current preview frame to a file
    Snapshot { output: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RecordAction {
    Start,
    Stop,
    Toggle,
    Status,
}

fn pipe_for(config: &Config, target: &str) -> PathBuf {
    match target {
        "imu" => config.imu.fifo_path.clone(),
        "gnss" => config.gnss.fifo_path.clone(),
        path => PathBuf::from(path),
    }
}

fn main() -> Result<()> {
    actioncam_rs::init_logging();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::Send { target, token } => {
            let Some(command) = ControlCommand::parse_token(&token) else {
                bail!("unknown command {:?} (expected start, stop or status)", token);
            };
            let pipe = pipe_for(&config, &target);
            match send_command(&pipe, command.as_token()) {
                Ok(()) => println!("Sent {} to {}", command.as_token(), pipe.display()),
                Err(ActionCamError::Ipc { source, .. })
                    if source.raw_os_error() == Some(libc::ENXIO) =>
                {
                    bail!("no collector is listening on {}", pipe.display());
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("writing to {}", pipe.display()))
                }
            }
        }
        Command::Record { action } => {
            let control = RecordingControl::attach(config.video.control_shm_key)
                .context("attaching recording flag")?;
            let recording = match action {
                RecordAction::Start => {
                    control.set_recording(true);
                    true
                }
                RecordAction::Stop => {
                    control.set_recording(false);
                    false
                }
                RecordAction::Toggle => control.toggle(),
                RecordAction::Status => control.is_recording(),
            };
            println!("Recording: {}", if recording { "on" } else { "off" });
        }
        Command::Video { token } => {
            let Some(command) = ControlCommand::parse_token(&token) else {
                bail!("unknown command {:?} (expected start, stop or status)", token);
            };
            let file = CommandFile::new(&config.video.command_file);
            file.post_command(command)
                .with_context(|| format!("writing {}", file.path().display()))?;
            println!("Posted {} to {}", command.as_token(), file.path().display());
        }
        Command::Snapshot { output } => {
            let video = &config.video;
            let buffer = SharedFrameBuffer::attach(
                video.frame_shm_key,
                &video.frame_semaphore,
                video.frame_layout(),
            )
            .context("attaching preview frame")?;
            let frame = buffer.read_frame().context("reading preview frame")?;
            std::fs::write(&output, &frame)
                .with_context(|| format!("writing {}", output.display()))?;
            let layout = buffer.layout();
            println!(
                "Saved {}x{} BGRA frame ({} bytes) to {}",
                layout.width,
                layout.height,
                frame.len(),
                output.display()
            );
        }
    }
    Ok(())
}
