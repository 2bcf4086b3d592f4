//! Offline automix renderer
//!
//! Decodes the given tracks, mixes them back to back with beat-matched
//! crossfades and records the continuous mix to a WAV file.
//!
//! ```text
//! automix-render <out.wav> <track>... [--config <path>]
//! ```
//!
//! Without `--config` the default config file is used if present. Set
//! `RUST_LOG=debug` for per-deck scheduling output.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use automix_core::audio_file::{SymphoniaSource, TrackSource};
use automix_core::config::{default_config_path, load_config, MixerConfig};
use automix_core::engine::{AudioContext, MixerEngine, MixerEventKind};
use automix_core::recording::WavSink;
use automix_core::{StereoBuffer, DEFAULT_SAMPLE_RATE};

struct Args {
    output: PathBuf,
    tracks: Vec<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("usage: automix-render <out.wav> <track>... [--config <path>]");
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    if positional.len() < 2 {
        bail!("usage: automix-render <out.wav> <track>... [--config <path>]");
    }
    let output = positional.remove(0);
    Ok(Args {
        output,
        tracks: positional,
        config,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config: MixerConfig = load_config(&config_path);
    config.validate();
    let block_size = config.block_size;

    let ctx = AudioContext::offline(DEFAULT_SAMPLE_RATE);
    let mut engine = MixerEngine::new(ctx, config, Box::new(SymphoniaSource::new()));
    let events = engine.subscribe();

    let sink = WavSink::create(&args.output, DEFAULT_SAMPLE_RATE)
        .with_context(|| format!("Failed to open {:?}", args.output))?;
    engine.connect(Box::new(sink));

    for track in &args.tracks {
        engine.enqueue(TrackSource::File(track.clone()));
    }
    engine.start();

    let mut block = StereoBuffer::silence(block_size);
    let mut failed = 0usize;
    while !engine.is_idle() {
        engine.render(&mut block).context("Rendering failed")?;
        for event in events.try_iter() {
            match event.kind {
                MixerEventKind::LoadFailed(reason) => {
                    failed += 1;
                    log::warn!("automix-render: skipped {}: {}", event.track, reason);
                }
                MixerEventKind::Playing => {
                    log::info!("automix-render: {} playing at {:.1}s", event.track, engine.now())
                }
                _ => {}
            }
        }
    }
    engine.disconnect();

    log::info!(
        "automix-render: {:.1}s mix of {} track(s) written to {:?}",
        engine.now(),
        args.tracks.len() - failed,
        args.output
    );
    Ok(())
}
