//! Live consumer process
//!
//! The recorder spawns itself with the `viewer` subcommand and streams
//! [`PublishMessage`] JSON lines into the child's stdin. The child keeps a
//! bounded history per band and redraws on a fixed tick.

use anyhow::{Context, Result};
use bwm_core::{BandPowerResult, BwmError, BwmResult};
use bwm_processing::{PublishMessage, ViewerConfig};
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Parent-side handle on the viewer child process
pub struct ViewerProcess {
    child: Child,
    forwarder: JoinHandle<BwmResult<u64>>,
}

impl ViewerProcess {
    /// Spawn `<current exe> viewer` and start forwarding published messages
    pub fn spawn(config: &ViewerConfig, receiver: UnboundedReceiver<PublishMessage>) -> Result<Self> {
        let exe = std::env::current_exe().context("locating recorder executable")?;
        let mut command = Command::new(exe);
        command
            .arg("viewer")
            .arg("--history")
            .arg(config.history_len.to_string())
            .arg("--tick-ms")
            .arg(config.tick_ms.to_string());
        Self::launch(command, receiver)
    }

    fn launch(mut command: Command, receiver: UnboundedReceiver<PublishMessage>) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("spawning viewer process")?;

        let stdin = child.stdin.take().context("viewer stdin was not piped")?;
        let forwarder = tokio::spawn(forward_messages(receiver, stdin));

        info!(pid = child.id(), "Viewer process started");
        Ok(ViewerProcess { child, forwarder })
    }

    /// Let the child drain up to `grace`, then kill it
    ///
    /// The end-of-stream marker must already be published. Returns the exit
    /// status once the child has been reaped.
    pub async fn stop(mut self, grace: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(grace, &mut self.forwarder).await {
            Ok(Ok(Ok(forwarded))) => debug!(forwarded, "Viewer forwarding finished"),
            Ok(Ok(Err(e))) => warn!(error = %e, "Viewer stopped accepting messages"),
            Ok(Err(e)) => warn!(error = %e, "Viewer forwarding task failed"),
            Err(_) => {
                warn!("Viewer forwarding did not finish in time");
                self.forwarder.abort();
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "Viewer process exited");
                Some(status)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to wait for viewer process");
                None
            }
            Err(_) => {
                warn!("Viewer process did not exit in time, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "Failed to kill viewer process");
                    return None;
                }
                // `kill` waits for the child, so the status is already reaped
                self.child.try_wait().ok().flatten()
            }
        }
    }
}

/// Write each message as one JSON line until the end-of-stream marker
///
/// Returns the number of records forwarded.
pub async fn forward_messages<W>(mut receiver: UnboundedReceiver<PublishMessage>, mut out: W) -> BwmResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut forwarded = 0;
    while let Some(message) = receiver.recv().await {
        let mut line = message.to_json_line()?;
        line.push('\n');
        out.write_all(line.as_bytes())
            .await
            .map_err(|_| BwmError::ChannelClosed)?;
        out.flush().await.map_err(|_| BwmError::ChannelClosed)?;

        if message.is_end_of_stream() {
            break;
        }
        forwarded += 1;
    }

    // Closing stdin tells the child nothing more is coming
    let _ = out.shutdown().await;
    Ok(forwarded)
}

/// Rolling band-power history, one series per band in first-seen order
#[derive(Debug, Clone)]
pub struct BandHistory {
    capacity: usize,
    timestamps: VecDeque<f64>,
    series: Vec<(String, VecDeque<f64>)>,
}

impl BandHistory {
    pub fn new(capacity: usize) -> Self {
        BandHistory {
            capacity: capacity.max(1),
            timestamps: VecDeque::with_capacity(capacity),
            series: Vec::new(),
        }
    }

    pub fn push(&mut self, result: &BandPowerResult) {
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(result.timestamp);

        for band in &result.bands {
            let index = match self.series.iter().position(|(name, _)| *name == band.name) {
                Some(index) => index,
                None => {
                    self.series.push((band.name.clone(), VecDeque::with_capacity(self.capacity)));
                    self.series.len() - 1
                }
            };

            let values = &mut self.series[index].1;
            if values.len() == self.capacity {
                values.pop_front();
            }
            values.push_back(band.power);
        }
    }

    /// Records currently retained
    pub fn record_count(&self) -> usize {
        self.timestamps.len()
    }

    /// One status line: latest value and history mean for every band
    pub fn render(&self) -> String {
        let Some(timestamp) = self.timestamps.back() else {
            return "waiting for data".to_string();
        };

        let columns: Vec<String> = self
            .series
            .iter()
            .map(|(name, values)| {
                let latest = values.back().copied().unwrap_or_default();
                let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
                format!("{} {:>9.3} (avg {:>9.3})", name, latest, mean)
            })
            .collect();

        format!("t={:>10.3} | {}", timestamp, columns.join(" | "))
    }
}

/// Result of draining the local queue on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Queue still open; `usize` records were absorbed
    Open(usize),
    /// End of stream seen or the reader went away
    Finished,
}

/// Absorb everything queued right now without waiting
pub fn drain_into(queue: &mut UnboundedReceiver<PublishMessage>, history: &mut BandHistory) -> DrainStatus {
    let mut absorbed = 0;
    loop {
        match queue.try_recv() {
            Ok(PublishMessage::Record(result)) => {
                history.push(&result);
                absorbed += 1;
            }
            Ok(PublishMessage::EndOfStream) | Err(TryRecvError::Disconnected) => {
                return DrainStatus::Finished;
            }
            Err(TryRecvError::Empty) => return DrainStatus::Open(absorbed),
        }
    }
}

/// Parse JSON lines into the local queue until EOF or end of stream
pub async fn read_messages<R>(reader: R, queue: UnboundedSender<PublishMessage>) -> BwmResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message = match PublishMessage::from_json_line(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping malformed viewer input");
                continue;
            }
        };

        let finished = message.is_end_of_stream();
        if queue.send(message).is_err() || finished {
            break;
        }
    }
    Ok(())
}

/// Entry point of the `viewer` subcommand
pub async fn run_viewer(config: ViewerConfig) -> Result<()> {
    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_messages(BufReader::new(tokio::io::stdin()), queue_tx));

    let mut history = BandHistory::new(config.history_len);
    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    info!(history = config.history_len, tick_ms = config.tick_ms, "Viewer started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match drain_into(&mut queue_rx, &mut history) {
                    DrainStatus::Open(0) => {}
                    DrainStatus::Open(_) => println!("{}", history.render()),
                    DrainStatus::Finished => break,
                }
            }
            _ = &mut interrupt => {
                debug!("Viewer interrupted");
                break;
            }
        }
    }

    reader.abort();
    info!(records = history.record_count(), "Viewer finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwm_core::BandPower;

    impl BandHistory {
        fn values(&self, band: &str) -> Option<&VecDeque<f64>> {
            self.series
                .iter()
                .find(|(name, _)| name == band)
                .map(|(_, values)| values)
        }

        fn latest(&self, band: &str) -> Option<f64> {
            self.values(band).and_then(|values| values.back().copied())
        }
    }

    fn record(timestamp: f64, alpha: f64) -> BandPowerResult {
        BandPowerResult {
            timestamp,
            bands: vec![
                BandPower {
                    name: "Theta".to_string(),
                    power: 1.0,
                },
                BandPower {
                    name: "Alpha".to_string(),
                    power: alpha,
                },
            ],
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = BandHistory::new(3);
        for i in 0..5 {
            history.push(&record(i as f64, i as f64 * 10.0));
        }

        assert_eq!(history.record_count(), 3);
        let alpha: Vec<f64> = history.values("Alpha").unwrap().iter().copied().collect();
        assert_eq!(alpha, vec![20.0, 30.0, 40.0]);
        assert_eq!(history.latest("Alpha"), Some(40.0));
        assert_eq!(history.latest("Gamma"), None);
    }

    #[test]
    fn test_render() {
        let mut history = BandHistory::new(10);
        assert_eq!(history.render(), "waiting for data");

        history.push(&record(1.5, 4.0));
        let line = history.render();
        assert!(line.contains("Theta"));
        assert!(line.find("Theta").unwrap() < line.find("Alpha").unwrap());
    }

    #[test]
    fn test_drain_absorbs_available_then_finishes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut history = BandHistory::new(200);

        assert_eq!(drain_into(&mut rx, &mut history), DrainStatus::Open(0));

        tx.send(PublishMessage::Record(record(1.0, 2.0))).unwrap();
        tx.send(PublishMessage::Record(record(2.0, 3.0))).unwrap();
        assert_eq!(drain_into(&mut rx, &mut history), DrainStatus::Open(2));
        assert_eq!(history.record_count(), 2);

        tx.send(PublishMessage::EndOfStream).unwrap();
        assert_eq!(drain_into(&mut rx, &mut history), DrainStatus::Finished);
    }

    #[test]
    fn test_drain_finishes_when_reader_gone() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut history = BandHistory::new(200);
        tx.send(PublishMessage::Record(record(1.0, 2.0))).unwrap();
        drop(tx);

        assert_eq!(drain_into(&mut rx, &mut history), DrainStatus::Finished);
        assert_eq!(history.record_count(), 1);
    }

    #[tokio::test]
    async fn test_forward_writes_json_lines_until_sentinel() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(PublishMessage::Record(record(1.0, 2.0))).unwrap();
        tx.send(PublishMessage::EndOfStream).unwrap();
        // Never forwarded: the sentinel ends the stream
        tx.send(PublishMessage::Record(record(2.0, 3.0))).unwrap();

        let mut out = Vec::new();
        let forwarded = forward_messages(rx, &mut out).await.unwrap();
        assert_eq!(forwarded, 1);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("{\"type\":\"record\""));
        assert_eq!(lines[1], "{\"type\":\"end_of_stream\"}");
    }

    #[tokio::test]
    async fn test_read_messages_skips_garbage_and_stops_at_sentinel() {
        let input = format!(
            "{}\nnot json\n\n{}\n{}\n",
            PublishMessage::Record(record(1.0, 2.0)).to_json_line().unwrap(),
            PublishMessage::EndOfStream.to_json_line().unwrap(),
            PublishMessage::Record(record(2.0, 3.0)).to_json_line().unwrap(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        read_messages(BufReader::new(input.as_bytes()), tx).await.unwrap();

        assert!(matches!(rx.recv().await, Some(PublishMessage::Record(_))));
        assert_eq!(rx.recv().await, Some(PublishMessage::EndOfStream));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pipeline_round_trip_into_history() {
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        for i in 0..3 {
            publish_tx.send(PublishMessage::Record(record(i as f64, 5.0))).unwrap();
        }
        publish_tx.send(PublishMessage::EndOfStream).unwrap();

        let mut wire = Vec::new();
        forward_messages(publish_rx, &mut wire).await.unwrap();
        read_messages(BufReader::new(wire.as_slice()), queue_tx).await.unwrap();

        let mut history = BandHistory::new(200);
        assert_eq!(drain_into(&mut queue_rx, &mut history), DrainStatus::Finished);
        assert_eq!(history.record_count(), 3);
        assert_eq!(history.latest("Alpha"), Some(5.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_unresponsive_child() {
        // Keeping the sender alive leaves the forwarder pending; `sleep` never reads stdin
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let mut command = Command::new("sleep");
        command.arg("30");
        let viewer = ViewerProcess::launch(command, publish_rx).unwrap();

        let status = tokio::time::timeout(Duration::from_secs(5), viewer.stop(Duration::from_millis(50)))
            .await
            .expect("stop should not wait for the child to finish sleeping");

        let status = status.expect("killed child should be reaped");
        assert!(!status.success());
        drop(publish_tx);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_waits_for_child_to_drain() {
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        publish_tx.send(PublishMessage::Record(record(1.0, 2.0))).unwrap();
        publish_tx.send(PublishMessage::EndOfStream).unwrap();

        let mut command = Command::new("cat");
        command.stdout(Stdio::null());
        let viewer = ViewerProcess::launch(command, publish_rx).unwrap();

        let status = viewer.stop(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());
    }
}
