mod bounce;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use spaceloop_core::Session;
use spaceloop_project::list_loops;
use spaceloop_synth::SynthClient;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "spaceloop", about = "Spatial loop sequencer")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    play: PlayArgs,
}

#[derive(clap::Args)]
struct PlayArgs {
    /// Exported loop to start with instead of a fresh random one
    loop_file: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Export the loop when stopping
    #[arg(long)]
    export: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one iteration of an exported loop to a WAV file
    Bounce {
        loop_file: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,
    },
    /// List the loops in the export directory
    List,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Some(Commands::Bounce {
            loop_file,
            output,
            sample_rate,
        }) => {
            let mut synth = SynthClient::connect(&config.synth_url, config.synth_timeout())?;
            bounce::bounce_file(
                &loop_file,
                &output,
                sample_rate,
                &mut synth,
                config.synth_timeout(),
            )
        }
        Some(Commands::List) => {
            for meta in list_loops(&[&config.session.export_dir]) {
                println!(
                    "{:<24} {:>6.1} bpm {:>3} bars {:>2} tracks {:>3} notes  {}",
                    meta.name,
                    meta.bpm,
                    meta.duration_in_bars,
                    meta.track_count,
                    meta.note_count,
                    meta.path.display()
                );
            }
            Ok(())
        }
        None => play(&config, cli.play),
    }
}

/// Explicit paths must exist. The default one is created with the defaults
/// on first run.
fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        anyhow::ensure!(path.exists(), "config file {} not found", path.display());
        return Ok(Config::load(&path));
    }
    let Some(path) = Config::default_path() else {
        return Ok(Config::default());
    };
    let config = Config::load(&path);
    if !path.exists() {
        config.save(&path);
        log::info!("wrote default config to {}", path.display());
    }
    Ok(config)
}

fn play(config: &Config, args: PlayArgs) -> anyhow::Result<()> {
    let engine = spaceloop_engine::start().context("starting audio output")?;
    let clock = Arc::new(engine.clock());

    let synth = SynthClient::connect(&config.synth_url, config.synth_timeout()).unwrap_or_else(|e| {
        log::error!("{e}; samples stay silent");
        SynthClient::offline()
    });

    let mut session = Session::new(
        config.session.clone(),
        Box::new(engine),
        Box::new(synth),
        clock,
    )?;
    if let Some(path) = &args.loop_file {
        session.import_loop(path)?;
    }
    session.play();

    let period = config.control_period();
    let stop_at = args.seconds.map(|s| session.now() + s.max(0.0));
    while stop_at.is_none_or(|end| session.now() < end) {
        let started = Instant::now();
        session.tick();
        thread::sleep(period.saturating_sub(started.elapsed()));
    }

    session.stop();
    session.tick();
    if args.export {
        let path = session.export_loop()?;
        log::info!("exported '{}' to {}", session.current_loop().name(), path.display());
    }
    // let the cancelled voices drain before the stream closes
    thread::sleep(Duration::from_millis(50));
    Ok(())
}
