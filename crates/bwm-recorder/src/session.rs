//! Recording session lifecycle
//!
//! Connect the source, let it settle, record until the duration elapses or
//! the user interrupts, then tear everything down exactly once:
//! disconnect, end-of-stream marker, viewer exit, sink close.

use crate::viewer::ViewerProcess;
use anyhow::{bail, Context, Result};
use bwm_core::{BwmResult, SampleSource};
use bwm_processing::{
    shared_callback, CsvRecordWriter, DispatchStats, IngestionDispatcher, MonitorConfig, Publisher,
    ResultSink, SharedDispatcher, ShutdownCoordinator, ShutdownReason,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub output: PathBuf,
    pub reason: ShutdownReason,
    pub stats: DispatchStats,
    pub records_written: u64,
}

/// Run one session to completion
///
/// Only startup failures (invalid configuration, unusable output file) are
/// returned as errors; anything later ends the session through the
/// coordinator and still runs the teardown.
pub async fn run_session(
    config: &MonitorConfig,
    output: &Path,
    mut source: Box<dyn SampleSource>,
) -> Result<SessionReport> {
    config.validate().context("invalid configuration")?;
    if source.channel_count() != config.acquisition.channel_count {
        bail!(
            "source {} delivers {} channels, configuration expects {}",
            source.name(),
            source.channel_count(),
            config.acquisition.channel_count
        );
    }
    if (source.sampling_rate() - config.acquisition.sampling_rate).abs() > 1e-6 {
        bail!(
            "source {} samples at {} Hz, configuration expects {} Hz",
            source.name(),
            source.sampling_rate(),
            config.acquisition.sampling_rate
        );
    }

    let session_id = Uuid::new_v4();
    let writer = CsvRecordWriter::create(output, &config.bands)
        .with_context(|| format!("creating output file {}", output.display()))?;
    let (publisher, receiver) = Publisher::channel();
    let dispatcher = IngestionDispatcher::new(config, ResultSink::new(Box::new(writer), publisher))?
        .into_shared();
    let coordinator = ShutdownCoordinator::new();

    info!(
        %session_id,
        output = %output.display(),
        source = source.name(),
        window = config.window_capacity(),
        hop = config.window_hop(),
        "Recording session started"
    );

    let viewer = if config.viewer.enabled {
        match ViewerProcess::spawn(&config.viewer, receiver) {
            Ok(viewer) => Some(viewer),
            Err(e) => {
                warn!(error = %e, "Continuing without viewer");
                None
            }
        }
    } else {
        drop(receiver);
        None
    };

    let interrupt = interrupted();
    tokio::pin!(interrupt);

    if let Err(e) = drive(config, source.as_mut(), &dispatcher, &coordinator, &mut interrupt).await {
        error!(error = %e, "Session loop failed");
        coordinator.request(ShutdownReason::Error(e.to_string()));
    }

    teardown(source.as_mut(), &dispatcher, &coordinator, viewer, config.consumer_grace()).await;

    let reason = coordinator
        .reason()
        .cloned()
        .unwrap_or(ShutdownReason::Teardown);
    let (stats, records_written) = match dispatcher.lock() {
        Ok(guard) => (guard.stats().clone(), guard.sink().records_written()),
        Err(poisoned) => {
            let guard = poisoned.into_inner();
            (guard.stats().clone(), guard.sink().records_written())
        }
    };

    info!(
        %session_id,
        %reason,
        windows = stats.windows_completed,
        records = records_written,
        "Recording session finished"
    );

    Ok(SessionReport {
        session_id,
        output: output.to_path_buf(),
        reason,
        stats,
        records_written,
    })
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

/// Connect, settle and poll until shutdown is requested
async fn drive<I>(
    config: &MonitorConfig,
    source: &mut dyn SampleSource,
    dispatcher: &SharedDispatcher,
    coordinator: &ShutdownCoordinator,
    interrupt: &mut std::pin::Pin<&mut I>,
) -> BwmResult<()>
where
    I: Future<Output = ()>,
{
    source.start(shared_callback(dispatcher))?;

    tokio::select! {
        connected = tokio::time::timeout(CONNECT_TIMEOUT, source.wait_for_connected()) => match connected {
            Ok(Ok(())) => info!(source = source.name(), "Source connected"),
            Ok(Err(e)) => {
                coordinator.request(ShutdownReason::SourceFailure(e.to_string()));
                return Ok(());
            }
            Err(_) => {
                coordinator.request(ShutdownReason::SourceFailure("connection timed out".to_string()));
                return Ok(());
            }
        },
        _ = interrupt.as_mut() => {
            coordinator.request(ShutdownReason::Interrupt);
            return Ok(());
        }
    }

    tokio::select! {
        _ = tokio::time::sleep(config.stabilization()) => {}
        _ = interrupt.as_mut() => {
            coordinator.request(ShutdownReason::Interrupt);
            return Ok(());
        }
    }

    let started = Instant::now();
    let deadline = started + config.recording_duration();
    let mut poll = tokio::time::interval(config.poll_interval());
    info!(duration_secs = config.session.recording_duration_secs, "Recording");

    while !coordinator.is_shutdown_requested() {
        tokio::select! {
            _ = poll.tick() => {
                if let Err(e) = source.health() {
                    coordinator.request(ShutdownReason::SourceFailure(e.to_string()));
                } else if Instant::now() >= deadline {
                    coordinator.request(ShutdownReason::DurationElapsed);
                } else {
                    debug!(elapsed_secs = started.elapsed().as_secs_f64(), "Recording in progress");
                }
            }
            _ = interrupt.as_mut() => {
                coordinator.request(ShutdownReason::Interrupt);
            }
            _ = coordinator.wait_requested() => {}
        }
    }

    Ok(())
}

/// Runs the teardown sequence if this caller wins the claim
async fn teardown(
    source: &mut dyn SampleSource,
    dispatcher: &SharedDispatcher,
    coordinator: &ShutdownCoordinator,
    viewer: Option<ViewerProcess>,
    grace: Duration,
) {
    let Some(guard) = coordinator.begin_teardown() else {
        debug!("Teardown already claimed");
        return;
    };

    if let Some(reason) = coordinator.reason() {
        info!(%reason, "Tearing down session");
    }

    if let Err(e) = source.disconnect().await {
        warn!(error = %e, "Source disconnect failed");
    }

    with_dispatcher(dispatcher, |d| {
        d.publish_end_of_stream();
    });

    if let Some(viewer) = viewer {
        viewer.stop(grace).await;
    }

    with_dispatcher(dispatcher, |d| {
        if let Err(e) = d.close() {
            warn!(error = %e, "Closing record sink failed");
        }
    });

    guard.complete();
}

fn with_dispatcher(dispatcher: &SharedDispatcher, f: impl FnOnce(&mut IngestionDispatcher)) {
    match dispatcher.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}
