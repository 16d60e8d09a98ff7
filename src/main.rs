use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use taskpulse::config::{Config, ConfigError, load_config, load_config_from_path};
use taskpulse::logging::{LogFormat, init_tracing, parse_level};
use taskpulse::monitor::{Monitor, SamplerSettings};
use taskpulse::report::render_text;

#[derive(Parser)]
#[command(
    name = "taskpulse",
    about = "Headless host telemetry sampler: CPU, GPU, memory, disks, processes, network"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Maximum number of processes kept per snapshot
    #[arg(long)]
    process_limit: Option<usize>,

    /// Print one JSON object per snapshot instead of a text report
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Process rows shown in the text report
    #[arg(long)]
    top: Option<usize>,

    /// Stop after this many snapshots
    #[arg(long)]
    cycles: Option<u64>,

    /// Pin a process so it stays at the top of the list
    #[arg(long)]
    pin: Option<u32>,

    /// Skip GPU probing
    #[arg(long, default_value_t = false)]
    no_gpu: bool,

    /// Log level: error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let (config, config_error) = load_config_for_cli(&cli);

    let level_name = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let level = parse_level(level_name).ok_or_else(|| eyre!("unknown log level `{level_name}`"))?;
    init_tracing(level, LogFormat::from_str_config(&config.logging.format))?;
    if let Some(err) = config_error {
        tracing::warn!(error = %err, "using default config");
    }

    if cli.cycles == Some(0) {
        return Err(eyre!("--cycles must be greater than 0"));
    }

    run(&cli, &config).await
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let json = cli.json || config.output.format.eq_ignore_ascii_case("json");
    let top = cli.top.unwrap_or(config.output.top);

    let mut settings = SamplerSettings::from_config(config);
    if cli.no_gpu {
        settings.gpu = None;
    }
    tracing::debug!(?settings, "starting monitor");

    let mut monitor = Monitor::new(settings);
    let (_subscription, mut snapshots) = monitor.subscribe_channel();
    if let Some(pid) = cli.pin {
        monitor.pin(pid);
    }
    monitor.start()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0u64;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            maybe_snapshot = snapshots.recv() => {
                let Some(snapshot) = maybe_snapshot else {
                    break;
                };
                if json {
                    serde_json::to_writer(&mut stdout, snapshot.as_ref())?;
                    writeln!(stdout)?;
                } else {
                    write!(stdout, "{}", render_text(&snapshot, top))?;
                }
                stdout.flush()?;

                seen += 1;
                if cli.cycles.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    // Give the in-flight cycle a bounded chance to finish.
    if tokio::time::timeout(Duration::from_secs(10), monitor.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("sampler did not stop within 10s");
    }
    Ok(())
}

/// Config with CLI overrides applied. A broken file falls back to defaults;
/// its error is handed back so it can be logged once tracing is installed.
fn load_config_for_cli(cli: &Cli) -> (Config, Option<ConfigError>) {
    let loaded = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    let (mut config, error) = match loaded {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    if let Some(interval) = cli.interval_ms {
        config.sampler.interval_ms = interval;
    }
    if let Some(limit) = cli.process_limit {
        config.sampler.process_limit = limit;
    }

    (config, error)
}
