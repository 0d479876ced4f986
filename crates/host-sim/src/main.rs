//! Headless host that drives a component session on a timer.
mod config;
mod demo;
mod world;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use component_core::{Diagnostics, ProfileRecorder, SourceHandle, TracingNotifier};
use component_runtime::{
    ComponentRegistrar, ComponentSession, Envelope, ExternalUpdate, Host, SessionConfig,
    SessionError, SessionHandle, SessionStatus,
};
use config::SimConfig;
use tracing::{info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use world::SimHost;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = SimConfig::from_env()?;
    let _guard = setup_logging(&config)?;

    run(config).await
}

async fn run(config: SimConfig) -> Result<()> {
    let registrar = ComponentRegistrar::shared();
    let source = registrar.add_source(&demo::DemoSource::new(config.debug))?;
    registrar.mark_load_on_init(&source, 0);

    let profiler = Arc::new(ProfileRecorder::new());
    let diagnostics = Diagnostics::new(Arc::new(TracingNotifier), profiler.clone());
    let mut session = ComponentSession::new(
        SimHost::new(&config),
        Arc::clone(&registrar),
        SessionConfig::default(),
    )
    .with_diagnostics(diagnostics);
    demo::register_routes(session.router_mut(), &source);

    let background = tokio::spawn(background(
        session.handle(),
        source.clone(),
        config.tick_interval * 10,
    ));

    let mut interval = tokio::time::interval(config.tick_interval);
    for tick in 1..=config.ticks {
        interval.tick().await;
        session.tick();
        match session.status() {
            SessionStatus::Initialized => script(&mut session, tick),
            SessionStatus::NotInitialized => trace!(target: "sim", tick, "Waiting for host"),
            SessionStatus::Terminated => {
                warn!(target: "sim", tick, "Session terminated early");
                break;
            }
        }
    }

    let frames = session.store().map_or(0, |store| store.frame());
    session.close();
    info!(target: "sim", frames, attached = session.host().is_attached(), "Simulation finished");

    match background.await? {
        Ok(pulses) => info!(target: "sim", pulses, "Background task stopped"),
        Err(err) => warn!(target: "sim", error = %err, "Background task failed"),
    }

    for row in profiler.report() {
        info!(
            target: "sim::profile",
            source = %row.source,
            label = %row.label,
            invocations = row.stats.invocations,
            total = ?row.stats.total,
            mean = ?row.stats.mean(),
            worst = ?row.stats.worst,
            "Profile"
        );
    }
    Ok(())
}

/// Host-side happenings, keyed off the tick count.
fn script(session: &mut ComponentSession<SimHost>, tick: u64) {
    if tick % 50 == 0 {
        session.save();
    }
    if tick % 20 == 0 {
        let handle = session.handle();
        let thrusters = session
            .host()
            .existing_targets()
            .iter()
            .flat_map(|grid| grid.children())
            .filter(|block| block.subtype() == Some("thruster"))
            .collect::<Vec<_>>();
        for block in thrusters {
            if let Err(err) = handle.raise_entity_event(demo::IGNITE, block) {
                warn!(target: "sim", error = %err, "Ignite rejected");
            }
        }
    }
    match tick {
        80 => {
            let grid = session.host_mut().spawn_grid();
            session.target_added(&grid);
        }
        120 => session.updating_stopped(),
        125 => session.updating_resumed(),
        160 => {
            if let Some(grid) = session.host_mut().despawn_grid() {
                session.target_removed(&grid);
            }
        }
        _ => {}
    }
}

/// Talks to the session from off the driving loop until it closes.
async fn background(
    handle: SessionHandle,
    source: SourceHandle,
    period: Duration,
) -> Result<u64, SessionError> {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    let watchdog = handle.register_update_handler(
        ExternalUpdate {
            frequency: 20,
            source: source.clone(),
            label: "watchdog".into(),
            owner: None,
        },
        || {
            trace!(target: "sim", "Watchdog");
            Ok(())
        },
    )?;
    handle.register_component_group(&source, demo::LATE_GROUP)?;

    let mut pulses = 0;
    loop {
        interval.tick().await;
        match pulse(&handle, pulses) {
            Ok(()) => pulses += 1,
            Err(SessionError::QueueClosed) => break,
            Err(err) => return Err(err),
        }
        if pulses == 5 {
            handle.unregister_update_handler(watchdog)?;
        }
    }
    Ok(pulses)
}

fn pulse(handle: &SessionHandle, n: u64) -> Result<(), SessionError> {
    handle.raise_session_event(demo::PULSE)?;
    handle.deliver_message(Envelope::new(demo::CHAT, 7, format!("ping {n}")))
}

/// Setup logging to both stderr and file
fn setup_logging(config: &SimConfig) -> Result<WorkerGuard> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let run_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let run_dir = config.log_dir.join(format!("run_{run_id}"));
    std::fs::create_dir_all(&run_dir)?;

    let file_appender = tracing_appender::rolling::never(&run_dir, "host-sim.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    info!("Logging initialized: run={}", run_id);
    info!("Log file: {}/host-sim.log", run_dir.display());

    Ok(guard)
}
