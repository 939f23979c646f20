//! fpsim - deterministic first-person character simulation
//!
//! Headless demo: a scripted client predicts against an authority over a
//! simulated lossy link, optionally recording and re-verifying the inputs.

mod loopback;
mod scripted_input;

use anyhow::{bail, Result};
use fpsim_core::SimConfig;
use fpsim_net::LinkConditions;
use loopback::LoopbackOptions;
use scripted_input::ScriptedInputPlayer;
use std::{env, path::PathBuf};
use tracing::{info, warn};

fn main() -> Result<()> {
    // INFO by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting fpsim v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1));
    let config = match &cli.config {
        Some(path) => SimConfig::try_load_from_path(path)?,
        None => SimConfig::load(),
    };
    config.validate()?;

    let script = match &cli.script {
        Some(path) => ScriptedInputPlayer::from_path(path)?,
        None => ScriptedInputPlayer::demo(),
    };
    if cli.verify_replay && cli.record.is_none() {
        bail!("--verify-replay requires --record");
    }

    let options = LoopbackOptions {
        ticks: cli.ticks,
        link: cli.link,
        record: cli.record.clone(),
        sensitivity: 1.0,
    };
    let report = loopback::run(&config, script, &options)?;
    info!(
        ticks = report.ticks,
        entity = report.entity,
        client_shots = report.client_shots,
        authority_shots = report.authority_shots,
        interactions = report.interactions_completed,
        divergence = report.divergence(),
        "loopback finished"
    );
    info!(
        snapshots = report.prediction.snapshots_applied,
        corrections = report.prediction.corrections,
        stale = report.prediction.stale_ignored,
        replayed = report.prediction.replayed_ticks,
        avg_correction = report.prediction.avg_correction_distance,
        max_correction = report.prediction.max_correction_distance,
        "prediction"
    );
    info!(
        to_server = ?report.to_server,
        to_client = ?report.to_client,
        "link"
    );
    if report.client_shots != report.authority_shots {
        warn!(
            client = report.client_shots,
            authority = report.authority_shots,
            "shot counts differ"
        );
    }

    if let (true, Some(path)) = (cli.verify_replay, &cli.record) {
        let replayed = loopback::replay_log(&config, path, report.entity)?;
        if replayed != report.authority {
            bail!(
                "replay diverged: {:?} vs {:?}",
                replayed.motion.position,
                report.authority.motion.position
            );
        }
        info!(path = %path.display(), "replay matches the authoritative run");
    }

    Ok(())
}

#[derive(Debug)]
struct CliOptions {
    config: Option<PathBuf>,
    ticks: u64,
    link: LinkConditions,
    script: Option<PathBuf>,
    record: Option<PathBuf>,
    verify_replay: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config: None,
            ticks: 600,
            link: LinkConditions {
                latency_ticks: 3,
                jitter_ticks: 2,
                drop_rate: 0.05,
                seed: 1,
            },
            script: None,
            record: None,
            verify_replay: false,
        }
    }
}

impl CliOptions {
    fn parse<I>(mut args: I) -> Self
    where
        I: Iterator<Item = String>,
    {
        let mut opts = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    if let Some(path) = args.next() {
                        opts.config = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--config requires a file path");
                    }
                }
                "--ticks" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.ticks = value,
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--ticks must be an integer");
                            }
                        }
                    } else {
                        tracing::error!("--ticks requires an integer");
                    }
                }
                "--latency" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.link.latency_ticks = value,
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--latency must be a tick count");
                            }
                        }
                    } else {
                        tracing::error!("--latency requires a tick count");
                    }
                }
                "--jitter" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.link.jitter_ticks = value,
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--jitter must be a tick count");
                            }
                        }
                    } else {
                        tracing::error!("--jitter requires a tick count");
                    }
                }
                "--drop-rate" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<f64>() {
                            Ok(value) if (0.0..1.0).contains(&value) => {
                                opts.link.drop_rate = value;
                            }
                            Ok(value) => {
                                tracing::error!(value, "--drop-rate must be within 0..1");
                            }
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--drop-rate must be a number");
                            }
                        }
                    } else {
                        tracing::error!("--drop-rate requires a number");
                    }
                }
                "--seed" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.link.seed = value,
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--seed must be an integer");
                            }
                        }
                    } else {
                        tracing::error!("--seed requires an integer");
                    }
                }
                "--script" => {
                    if let Some(path) = args.next() {
                        opts.script = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--script requires a file path");
                    }
                }
                "--record" => {
                    if let Some(path) = args.next() {
                        opts.record = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--record requires a file path");
                    }
                }
                "--verify-replay" => opts.verify_replay = true,
                "--perfect-link" => opts.link = LinkConditions::PERFECT,
                other => {
                    tracing::warn!(arg = other, "Ignoring unknown argument");
                }
            }
        }
        opts
    }
}
