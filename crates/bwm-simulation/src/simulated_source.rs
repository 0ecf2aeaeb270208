//! Real-time simulated EEG source for sessions without hardware

use crate::eeg_simulator::{EegSimConfig, EegSimulator};
use async_trait::async_trait;
use bwm_core::{BatchCallback, BwmError, BwmResult, SampleSource};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

/// Configuration for real-time streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// EEG simulation configuration
    pub eeg_config: EegSimConfig,
    /// Delay before the source reports connected
    pub connect_delay_ms: u64,
    /// Playback speed; 1.0 is real time, larger values deliver faster
    pub speed: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            eeg_config: EegSimConfig::default(),
            connect_delay_ms: 200,
            speed: 1.0,
        }
    }
}

/// Connection state published by the streaming task
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Idle,
    Connecting,
    Streaming,
    Stopped,
    Failed(String),
}

/// Simulated headband delivering irregular batches through the callback
pub struct SimulatedEegSource {
    config: StreamConfig,
    status_tx: watch::Sender<SourceStatus>,
    status_rx: watch::Receiver<SourceStatus>,
    task: Option<JoinHandle<()>>,
}

impl SimulatedEegSource {
    pub fn new(config: StreamConfig) -> BwmResult<Self> {
        config.eeg_config.validate()?;
        if !(config.speed.is_finite() && config.speed > 0.0) {
            return Err(BwmError::InvalidConfig {
                reason: format!("playback speed {} must be positive", config.speed),
            });
        }

        let (status_tx, status_rx) = watch::channel(SourceStatus::Idle);
        Ok(SimulatedEegSource {
            config,
            status_tx,
            status_rx,
            task: None,
        })
    }

    pub fn status(&self) -> SourceStatus {
        self.status_rx.borrow().clone()
    }
}

async fn run_stream(
    mut simulator: EegSimulator,
    connect_delay: Duration,
    speed: f64,
    mut on_batch: BatchCallback,
    status: watch::Sender<SourceStatus>,
) {
    sleep(connect_delay).await;
    let _ = status.send(SourceStatus::Streaming);
    info!(
        pattern = %simulator.config().pattern.description(),
        "Simulated EEG stream connected"
    );

    let sampling_rate = simulator.config().sampling_rate;
    loop {
        let batch = match simulator.next_batch() {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Simulated EEG stream failed");
                let _ = status.send(SourceStatus::Failed(e.to_string()));
                return;
            }
        };

        let pause = Duration::from_secs_f64(batch.len() as f64 / sampling_rate / speed);
        on_batch(batch);
        sleep(pause).await;
    }
}

#[async_trait]
impl SampleSource for SimulatedEegSource {
    fn start(&mut self, on_batch: BatchCallback) -> BwmResult<()> {
        if self.task.is_some() {
            return Err(BwmError::Source {
                reason: "simulated source already started".to_string(),
            });
        }

        let simulator = EegSimulator::new(self.config.eeg_config.clone())?;
        let connect_delay = Duration::from_millis(self.config.connect_delay_ms);
        let _ = self.status_tx.send(SourceStatus::Connecting);

        self.task = Some(tokio::spawn(run_stream(
            simulator,
            connect_delay,
            self.config.speed,
            on_batch,
            self.status_tx.clone(),
        )));
        Ok(())
    }

    async fn wait_for_connected(&mut self) -> BwmResult<()> {
        let mut status = self.status_rx.clone();
        loop {
            let current = status.borrow_and_update().clone();
            match current {
                SourceStatus::Streaming => return Ok(()),
                SourceStatus::Failed(reason) => return Err(BwmError::Source { reason }),
                SourceStatus::Idle | SourceStatus::Stopped => {
                    return Err(BwmError::Source {
                        reason: "simulated source is not started".to_string(),
                    })
                }
                SourceStatus::Connecting => {}
            }

            status.changed().await.map_err(|_| BwmError::ChannelClosed)?;
        }
    }

    async fn disconnect(&mut self) -> BwmResult<()> {
        let Some(task) = self.task.take() else {
            debug!("Simulated source disconnect without a running stream");
            return Ok(());
        };

        task.abort();
        // Wait for the task so no callback runs after disconnect returns
        let _ = task.await;
        let _ = self.status_tx.send(SourceStatus::Stopped);
        info!("Simulated EEG stream disconnected");
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.config.eeg_config.channel_count
    }

    fn sampling_rate(&self) -> f64 {
        self.config.eeg_config.sampling_rate
    }

    fn health(&self) -> BwmResult<()> {
        if let SourceStatus::Failed(reason) = self.status() {
            return Err(BwmError::Source { reason });
        }

        // The stream loop only returns through `Failed`, so a finished task panicked
        if self.task.as_ref().is_some_and(|task| task.is_finished()) {
            return Err(BwmError::Source {
                reason: "simulated stream task exited unexpectedly".to_string(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "simulated-eeg"
    }
}

/// Helper to create and start a simulated source in one step
pub fn start_simulated_source(
    config: StreamConfig,
    on_batch: BatchCallback,
) -> BwmResult<SimulatedEegSource> {
    let mut source = SimulatedEegSource::new(config)?;
    source.start(on_batch)?;
    Ok(source)
}
