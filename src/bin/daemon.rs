// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! omen-fand: fan control daemon. Polls the EC temperature registers,
//! drives both fans along the configured curve and keeps firmware
//! automatic fan management suspended until shutdown.

use anyhow::Context;
use clap::Parser;
use omen_fan_utility::config::{self, ServiceConfig};
use omen_fan_utility::control::{Action, ControlSettings, Controller};
use omen_fan_utility::curve::SpeedCurve;
use omen_fan_utility::ec::{self, EcAccess, EcDev, OverrideGuard};
use omen_fan_utility::lifecycle::{self, PidFile};
use omen_fan_utility::logger::{self, DiagLog};
use std::io;
use std::time::{Duration, Instant};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "omen-fand", about = "HP OMEN EC fan control daemon")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Path to the EC debugfs interface.
    #[arg(short, long, default_value = ec::DEFAULT_EC_PATH)]
    device: String,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(Some(&cli.config));
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Cannot load config from {}", config_path.display()))?;
    let svc = cfg.service;
    svc.validate().map_err(anyhow::Error::msg)?;

    let curve = SpeedCurve::new(&svc.temp_curve, &svc.speed_curve, svc.idle_speed)
        .map_err(anyhow::Error::msg)?;

    lifecycle::ensure_root().map_err(anyhow::Error::msg)?;

    let ec = EcDev::new(&cli.device);
    let pidfile = PidFile::create(lifecycle::DEFAULT_PID_PATH)
        .context("Cannot write PID marker file")?;

    let diag = DiagLog::new(logger::DEFAULT_LOG_PATH, svc.enable_logging);
    diag.remove(); // drop any stale journal from a previous run
    diag.log(&format!("Service started - PID: {}", std::process::id()));
    diag.log(&format!(
        "Config: TEMP_CURVE={:?}, SPEED_CURVE={:?}",
        svc.temp_curve, svc.speed_curve
    ));
    diag.log(&format!(
        "Settings: COOLDOWN={}s, SMOOTHING={}, DEADBAND={}%",
        svc.cooldown, svc.smoothing, svc.deadband
    ));

    let mut controller = Controller::new(
        curve,
        ControlSettings {
            smoothing_factor: svc.smoothing,
            cooldown: Duration::from_secs(svc.cooldown),
            deadband_percent: svc.deadband,
        },
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut interval = time::interval(Duration::from_secs(svc.poll_interval));

    // Claims manual control now; the guard restores firmware control on
    // every exit path, including register I/O failures below.
    let guard = OverrideGuard::claim(&ec)
        .context("Cannot claim manual fan control from the firmware")?;
    log::info!(
        "Claimed manual fan control via {} (poll every {}s)",
        ec.path().display(),
        svc.poll_interval
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_iteration(&ec, &mut controller, &diag, &svc)
                    .context("EC register access failed")?;
            }
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    diag.log("Service stopped");
    drop(pidfile);
    diag.remove();
    guard.release().context("Failed to restore firmware fan control")?;
    log::info!("Restored firmware fan control");
    Ok(())
}

// ---------------------------------------------------------------------------
// Control loop iteration
// ---------------------------------------------------------------------------

fn run_iteration<E: EcAccess>(
    ec: &E,
    controller: &mut Controller,
    diag: &DiagLog,
    svc: &ServiceConfig,
) -> io::Result<()> {
    let temps = ec::read_temps(ec)?;
    let now = Instant::now();
    let report = controller.step(f64::from(temps.max()), now);

    if let Action::Apply(speed) = report.action {
        ec::set_fan_speeds(ec, speed, svc.fan1_max, svc.fan2_max)?;
        diag.log(&format!(
            "SPEED CHANGE: CPU={}°C GPU={}°C Max={}°C | Target={:.1}% Smoothed={:.1}% Final={}% | Action={}",
            temps.cpu, temps.gpu, temps.max(),
            report.target, report.smoothed, speed, report.transition
        ));
    }

    if controller.heartbeat_due(now, Duration::from_secs(svc.log_interval)) {
        diag.log(&format!(
            "STATUS: CPU={}°C GPU={}°C Max={}°C | Target={:.1}% Smoothed={:.1}% Current={}% | {}",
            temps.cpu, temps.gpu, temps.max(),
            report.target, report.smoothed,
            controller.state().last_applied.unwrap_or(0),
            report.status_label()
        ));
    }

    // Firmware occasionally re-arms its own management; keep the claim
    // fresh every iteration.
    ec::assert_override(ec)
}
