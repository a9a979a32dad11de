use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use linux_embedded_hal::I2cdev;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use miniscale_logger::config::{parse_addr, Addr, Config};
use miniscale_logger::sampler::{Sampler, SamplerSettings, TARE_SETTLE};
use miniscale_logger::scale::{FilterUpdate, MiniScale};

/// Log weight from the M5Stack Unit MiniScale to daily CSV files.
#[derive(Debug, Parser)]
#[command(name = "miniscale-logger", version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory for the daily CSV files
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// I2C bus number (/dev/i2c-N)
    #[arg(long)]
    bus: Option<u8>,
    /// I2C address, hex or decimal (e.g. 0x26)
    #[arg(long)]
    addr: Option<String>,
    /// Seconds between samples
    #[arg(long)]
    interval: Option<f64>,
    /// Name tag mixed into the file name
    #[arg(long)]
    name: Option<String>,
    /// Echo each row to stdout
    #[arg(long)]
    print: bool,
    /// Tare once on startup (careful if a load is already present)
    #[arg(long)]
    tare_on_start: bool,
    /// Write this GAP (counts per gram) on startup
    #[arg(long)]
    gap: Option<f32>,
    /// Apply the three filter values on startup
    #[arg(long)]
    set_filters: bool,
    /// Low-pass filter enable, 0 or 1
    #[arg(long)]
    lp_filter_enabled: Option<u8>,
    /// Averaging level, 0..=50
    #[arg(long)]
    avg_filter_level: Option<u8>,
    /// EMA alpha, 0..=99
    #[arg(long)]
    ema_filter_alpha: Option<u8>,
    /// Multiply final grams by this (use -1 for inverted wiring)
    #[arg(long)]
    sign: Option<f32>,
}

/// CLI flags win over config-file values.
fn overlay(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(bus) = cli.bus {
        config.bus = bus;
    }
    if let Some(addr) = &cli.addr {
        config.addr = Addr::Number(parse_addr(addr)?);
    }
    if let Some(interval) = cli.interval {
        config.interval = interval;
    }
    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if cli.print {
        config.print = true;
    }
    if cli.tare_on_start {
        config.tare_on_start = true;
    }
    if let Some(gap) = cli.gap {
        config.gap = Some(gap);
    }
    if cli.set_filters {
        config.set_filters = true;
    }
    if let Some(v) = cli.lp_filter_enabled {
        config.lp_filter_enabled = v;
    }
    if let Some(v) = cli.avg_filter_level {
        config.avg_filter_level = v;
    }
    if let Some(v) = cli.ema_filter_alpha {
        config.ema_filter_alpha = v;
    }
    if let Some(sign) = cli.sign {
        config.sign = sign;
    }
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "miniscale_logger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    overlay(&mut config, &cli)?;

    let addr = config.address()?;
    let interval = config.sample_interval()?;
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })?;

    let device = config.device_path();
    let i2c = I2cdev::new(&device).with_context(|| format!("failed to open {device}"))?;
    let mut scale = MiniScale::new(i2c, addr);
    tracing::info!("scale opened on {} at {:#04x}", device, addr);

    // Startup configuration is best effort: a failed write is reported and
    // the loop starts anyway.
    if let Some(gap) = config.gap {
        if let Err(err) = scale.set_gap(gap) {
            tracing::warn!("failed to write GAP {} on startup: {}", gap, err);
        }
    }
    if config.set_filters {
        let update = FilterUpdate {
            low_pass_enabled: Some(config.lp_filter_enabled != 0),
            avg_level: Some(config.avg_filter_level),
            ema_alpha: Some(config.ema_filter_alpha),
        };
        if let Err(err) = scale.set_filters(update) {
            tracing::warn!("failed to write filters on startup: {}", err);
        }
    }
    if config.tare_on_start {
        tracing::info!("taring on startup");
        match scale.tare() {
            Ok(()) => tokio::time::sleep(TARE_SETTLE).await,
            Err(err) => tracing::warn!("tare on startup failed: {}", err),
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = stop_tx.send(true);
    });

    let settings = SamplerSettings {
        data_dir: config.data_dir.clone(),
        name_tag: config.name.clone(),
        interval,
        sign: config.sign,
        echo: config.print,
        wait_release: true,
    };
    Sampler::new(scale, settings, stop_rx).run().await
}
