//! framelinkd - screen-to-camera receiver daemon
//!
//! This daemon:
//! 1. Loads the receiver configuration (JSON or TOML)
//! 2. Feeds captured luminance frames from a demuxed raw stream into the
//!    frame queue at the configured rate
//! 3. Runs the decode pipeline until the transmitted file reconstructs
//! 4. Verifies the bytes with SHA-1 and writes them to the output directory
//!
//! The camera/video demuxer is an external collaborator; it hands this
//! daemon a stream of concatenated width*height luminance frames.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use framelink::{Frame, FrameQueue, LogProgress, Receiver, ReceiverConfig, SaveToDirectory};

#[derive(Parser, Debug)]
#[command(name = "framelinkd", about = "Screen-to-camera file transfer receiver")]
struct Args {
    /// Receiver config file (JSON or TOML).
    #[arg(long, env = "FRAMELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Raw frame stream: concatenated width*height 8-bit luminance frames.
    #[arg(long)]
    frames: PathBuf,

    /// Frame width in pixels.
    #[arg(long)]
    width: usize,

    /// Frame height in pixels.
    #[arg(long)]
    height: usize,

    /// Directory the received file is written into.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Name of the received file.
    #[arg(long, default_value = "received.bin")]
    output: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReceiverConfig::load_from(path)?,
        None => ReceiverConfig::load()?,
    };
    if args.width == 0 || args.height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }

    let frame_bytes = args.width * args.height;
    let stream_len = std::fs::metadata(&args.frames)
        .with_context(|| format!("failed to stat {}", args.frames.display()))?
        .len();
    let frame_total = stream_len / frame_bytes as u64;
    if frame_total == 0 {
        return Err(anyhow!(
            "{} holds no complete {}x{} frame",
            args.frames.display(),
            args.width,
            args.height
        ));
    }
    log::info!(
        "replaying {} frames of {}x{} from {}",
        frame_total,
        args.width,
        args.height,
        args.frames.display()
    );

    let queue = FrameQueue::new(config.queue_capacity);
    let interrupt = queue.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupted; abandoning reception");
        interrupt.abort();
    })
    .context("failed to install interrupt handler")?;

    let producer_queue = queue.clone();
    let frames_path = args.frames.clone();
    let (width, height, fps) = (args.width, args.height, config.fps);
    let producer = std::thread::spawn(move || -> Result<()> {
        let mut reader = File::open(&frames_path)
            .with_context(|| format!("failed to open {}", frames_path.display()))?;
        let pacing = Duration::from_millis(1000 / fps.max(1) as u64);
        let mut buffer = vec![0u8; width * height];
        loop {
            match reader.read_exact(&mut buffer) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context("failed to read frame stream"),
            }
            let frame = Frame::new(buffer.clone(), width, height)
                .expect("buffer sized to width * height");
            if !producer_queue.push(frame) {
                break;
            }
            std::thread::sleep(pacing);
        }
        producer_queue.close();
        Ok(())
    });

    let mut receiver = Receiver::new(config).with_output_name(args.output);
    receiver.set_frame_total(frame_total);
    let mut progress = LogProgress;
    let mut sink = SaveToDirectory::new(args.output_dir);
    let summary = receiver.run(&queue, &mut progress, &mut sink)?;

    queue.abort();
    producer
        .join()
        .map_err(|_| anyhow!("frame producer panicked"))??;

    match summary {
        Some(summary) => {
            log::info!(
                "received {} bytes over {} frames ({} packets), sha1={}",
                summary.file_byte_length,
                summary.frames_seen,
                summary.packets_accepted,
                summary.sha1_hex
            );
            Ok(())
        }
        None => Err(anyhow!(
            "frame stream ended before the transfer completed ({} of {} frames decoded usefully)",
            queue.produced(),
            frame_total
        )),
    }
}
