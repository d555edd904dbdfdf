//! demo - in-process encode/decode loopback
//!
//! Synthesizes a random payload, renders it as barcode frames (with idle
//! frames, a featureless frame, shuffled delivery, optional camera noise and
//! reversed-polarity frames), and runs the full receive pipeline against
//! them. Exercises every stage without a screen or camera.

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};

use framelink::{
    BarcodeSynthesizer, FrameQueue, LogProgress, MemorySink, Receiver, ReceiverConfig,
};

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Synthetic end-to-end receiver demo")]
struct Args {
    /// Receiver config file (JSON or TOML); defaults apply without one.
    #[arg(long, env = "FRAMELINK_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Payload size in bytes.
    #[arg(long, default_value_t = 4096)]
    bytes: usize,

    /// Repair packets per source block on top of the source packets.
    #[arg(long, default_value_t = 8)]
    repair: u32,

    /// RNG seed for payload, shuffle, and noise.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Uniform luminance noise amplitude; 0 disables.
    #[arg(long, default_value_t = 12)]
    noise: u8,

    /// Deliver frames in transmission order instead of shuffling them.
    #[arg(long)]
    in_order: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReceiverConfig::load_from(path)?,
        None => ReceiverConfig::default(),
    };
    if args.bytes == 0 {
        return Err(anyhow!("payload must be non-empty"));
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let payload: Vec<u8> = (0..args.bytes).map(|_| rng.gen()).collect();
    let expected_sha1 = hex::encode(Sha1::digest(&payload));
    log::info!("payload: {} bytes, sha1={}", payload.len(), expected_sha1);

    let synth = BarcodeSynthesizer::new(&config);
    let packets = synth.packetize(&payload, args.repair);
    log::info!(
        "transmitting {} packets as {}x{} px frames",
        packets.len(),
        synth.frame_side(),
        synth.frame_side()
    );

    // Idle and featureless frames first, as a real capture would open with.
    let mut frames = vec![synth.blank_frame(), synth.idle_frame(), synth.idle_frame()];
    for (index, packet) in packets.iter().enumerate() {
        // Every third frame ships with reversed payload polarity.
        let mut frame = synth.render_frame(payload.len() as u32, packet, index % 3 == 2);
        if args.noise > 0 {
            synth.add_noise(&mut frame, &mut rng, args.noise);
        }
        frames.push(frame);
    }
    if !args.in_order {
        frames.shuffle(&mut rng);
    }
    let frame_total = frames.len() as u64;

    let queue = FrameQueue::new(0);
    let producer_queue = queue.clone();
    let producer = std::thread::spawn(move || {
        for frame in frames {
            if !producer_queue.push(frame) {
                break;
            }
        }
        producer_queue.close();
    });

    let mut receiver = Receiver::new(config).with_output_name("demo.bin");
    receiver.set_frame_total(frame_total);
    let mut progress = LogProgress;
    let mut sink = MemorySink::default();
    let summary = receiver.run(&queue, &mut progress, &mut sink)?;
    producer.join().map_err(|_| anyhow!("producer panicked"))?;

    let summary = summary.ok_or_else(|| anyhow!("frames exhausted before completion"))?;
    let (received, _) = sink.received.ok_or_else(|| anyhow!("sink never invoked"))?;
    if received != payload {
        return Err(anyhow!("received bytes differ from the payload"));
    }
    if summary.sha1_hex != expected_sha1 {
        return Err(anyhow!(
            "digest mismatch: sent {}, received {}",
            expected_sha1,
            summary.sha1_hex
        ));
    }
    log::info!(
        "loopback ok: {} bytes over {} frames, {} packets accepted",
        summary.file_byte_length,
        summary.frames_seen,
        summary.packets_accepted
    );
    Ok(())
}
