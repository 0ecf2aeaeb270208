//! Durable record writer and live publish channel
//!
//! Every ready window becomes one CSV row and one [`PublishMessage`]. The
//! publish side is an unbounded channel: a slow consumer grows the queue but
//! never blocks ingestion.

use bwm_core::{BandPowerResult, BandSet, BwmError, BwmResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Append-only store for band-power records
pub trait RecordWriter: Send {
    /// Write one record; records are never reordered
    fn append(&mut self, result: &BandPowerResult) -> BwmResult<()>;

    fn flush(&mut self) -> BwmResult<()>;

    /// Flush and release the underlying resource
    fn close(&mut self) -> BwmResult<()> {
        self.flush()
    }
}

/// CSV writer: `Timestamp,<band-1>,..,<band-k>` header, one row per window
pub struct CsvRecordWriter<W: Write + Send> {
    out: BufWriter<W>,
    columns: Vec<String>,
}

impl CsvRecordWriter<File> {
    /// Create (truncate) a CSV file and write its header
    pub fn create(path: &Path, bands: &BandSet) -> BwmResult<Self> {
        let file = File::create(path).map_err(|e| BwmError::Persistence {
            reason: format!("cannot create {}: {}", path.display(), e),
        })?;
        info!(path = %path.display(), "Recording band powers");
        Self::new(file, bands)
    }
}

impl<W: Write + Send> CsvRecordWriter<W> {
    /// Wrap a writer and emit the header row
    pub fn new(writer: W, bands: &BandSet) -> BwmResult<Self> {
        let mut csv = CsvRecordWriter {
            out: BufWriter::new(writer),
            columns: bands.names().into_iter().map(str::to_string).collect(),
        };

        let header = std::iter::once("Timestamp")
            .chain(csv.columns.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(csv.out, "{}", header)?;
        csv.out.flush()?;

        Ok(csv)
    }
}

impl<W: Write + Send> RecordWriter for CsvRecordWriter<W> {
    fn append(&mut self, result: &BandPowerResult) -> BwmResult<()> {
        if result.bands.len() != self.columns.len() {
            return Err(BwmError::Persistence {
                reason: format!(
                    "record has {} bands, file has {} columns",
                    result.bands.len(),
                    self.columns.len()
                ),
            });
        }

        let mut row = result.timestamp.to_string();
        for power in result.powers() {
            row.push(',');
            row.push_str(&power.to_string());
        }

        writeln!(self.out, "{}", row)?;
        self.out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> BwmResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Item on the publish channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishMessage {
    /// Band powers for one window
    Record(BandPowerResult),
    /// Nothing follows; the consumer should stop
    EndOfStream,
}

impl PublishMessage {
    /// Encode as one JSON line (without the trailing newline)
    pub fn to_json_line(&self) -> BwmResult<String> {
        serde_json::to_string(self).map_err(|e| BwmError::Persistence {
            reason: format!("failed to encode publish message: {}", e),
        })
    }

    pub fn from_json_line(line: &str) -> BwmResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| BwmError::InvalidBatch {
            reason: format!("failed to decode publish message: {}", e),
        })
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, PublishMessage::EndOfStream)
    }
}

/// Producer half of the publish channel
///
/// Sends never block. Once the end-of-stream marker has gone out, further
/// records are dropped so the marker stays last.
#[derive(Debug)]
pub struct Publisher {
    sender: mpsc::UnboundedSender<PublishMessage>,
    ended: AtomicBool,
}

impl Publisher {
    /// Create a publisher and the receiver the consumer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PublishMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let publisher = Publisher {
            sender,
            ended: AtomicBool::new(false),
        };
        (publisher, receiver)
    }

    /// Queue a record; returns false if it was dropped
    pub fn publish(&self, result: BandPowerResult) -> bool {
        if self.ended.load(Ordering::Acquire) {
            debug!("Dropping record published after end of stream");
            return false;
        }

        if self.sender.send(PublishMessage::Record(result)).is_err() {
            // No consumer attached; losing live display data is acceptable
            return false;
        }

        true
    }

    /// Send the end-of-stream marker; only the first call sends
    pub fn publish_end_of_stream(&self) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.sender.send(PublishMessage::EndOfStream).is_ok()
    }
}

/// Persistence plus publication for band-power records
pub struct ResultSink {
    writer: Option<Box<dyn RecordWriter>>,
    publisher: Publisher,
    records_written: u64,
}

impl ResultSink {
    pub fn new(writer: Box<dyn RecordWriter>, publisher: Publisher) -> Self {
        ResultSink {
            writer: Some(writer),
            publisher,
            records_written: 0,
        }
    }

    /// Persist one record in arrival order
    pub fn append(&mut self, result: &BandPowerResult) -> BwmResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| BwmError::Persistence {
            reason: "record sink is closed".to_string(),
        })?;

        writer.append(result)?;
        self.records_written += 1;
        Ok(())
    }

    /// Forward one record to the live consumer without blocking
    pub fn publish(&self, result: BandPowerResult) -> bool {
        self.publisher.publish(result)
    }

    pub fn publish_end_of_stream(&self) -> bool {
        self.publisher.publish_end_of_stream()
    }

    /// Flush and close the record writer; later calls do nothing
    pub fn close(&mut self) -> BwmResult<()> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.close()?;
                info!(records = self.records_written, "Record sink closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

/// In-memory writers shared by the crate's tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::{Arc, Mutex};

    /// Cloneable in-memory byte sink
    #[derive(Clone, Default)]
    pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Record writer that fails on demand and counts calls
    #[derive(Clone, Default)]
    pub struct ScriptedWriter {
        pub appended: Arc<Mutex<Vec<BandPowerResult>>>,
        pub fail_next: Arc<AtomicBool>,
        pub closes: Arc<AtomicU64>,
    }

    impl RecordWriter for ScriptedWriter {
        fn append(&mut self, result: &BandPowerResult) -> BwmResult<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(BwmError::Persistence {
                    reason: "simulated write failure".to_string(),
                });
            }
            self.appended.lock().unwrap().push(result.clone());
            Ok(())
        }

        fn flush(&mut self) -> BwmResult<()> {
            Ok(())
        }

        fn close(&mut self) -> BwmResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedWriter, SharedBuffer};
    use super::*;
    use bwm_core::BandPower;

    fn result(timestamp: f64, powers: &[f64]) -> BandPowerResult {
        BandPowerResult {
            timestamp,
            bands: BandSet::eeg()
                .iter()
                .zip(powers)
                .map(|(b, &power)| BandPower { name: b.name.clone(), power })
                .collect(),
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_csv_header_and_rows() {
        let buffer = SharedBuffer::default();
        let mut writer = CsvRecordWriter::new(buffer.clone(), &BandSet::eeg()).unwrap();

        writer.append(&result(1.5, &[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        writer.append(&result(2.5, &[0.0, 0.25, 0.5, 0.75, 1.0])).unwrap();

        let lines: Vec<String> = buffer.contents().lines().map(str::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "Timestamp,Delta,Theta,Alpha,Beta,Gamma",
                "1.5,1,2,3,4,5",
                "2.5,0,0.25,0.5,0.75,1",
            ]
        );
    }

    #[test]
    fn test_csv_rejects_wrong_band_count() {
        let mut writer = CsvRecordWriter::new(SharedBuffer::default(), &BandSet::eeg()).unwrap();
        let short = result(0.0, &[1.0, 2.0]);

        assert!(matches!(writer.append(&short), Err(BwmError::Persistence { .. })));
    }

    #[test]
    fn test_csv_io_failure_surfaces() {
        assert!(CsvRecordWriter::new(BrokenPipe, &BandSet::eeg()).is_err());
    }

    #[test]
    fn test_csv_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");

        let mut writer = CsvRecordWriter::create(&path, &BandSet::eeg()).unwrap();
        writer.append(&result(10.0, &[1.0; 5])).unwrap();
        writer.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Timestamp,Delta,Theta,Alpha,Beta,Gamma\n10,1,1,1,1,1\n");
    }

    #[test]
    fn test_wire_format() {
        let record = PublishMessage::Record(result(3.0, &[1.0; 5]));
        let line = record.to_json_line().unwrap();
        assert!(line.starts_with(r#"{"type":"record","timestamp":3.0"#));
        assert_eq!(PublishMessage::from_json_line(&line).unwrap(), record);

        let end = PublishMessage::EndOfStream.to_json_line().unwrap();
        assert_eq!(end, r#"{"type":"end_of_stream"}"#);
        assert!(PublishMessage::from_json_line(&end).unwrap().is_end_of_stream());

        assert!(PublishMessage::from_json_line("not json").is_err());
    }

    #[test]
    fn test_end_of_stream_is_last() {
        let (publisher, mut receiver) = Publisher::channel();

        assert!(publisher.publish(result(1.0, &[1.0; 5])));
        assert!(publisher.publish_end_of_stream());
        assert!(!publisher.publish_end_of_stream());
        assert!(!publisher.publish(result(2.0, &[1.0; 5])));

        assert!(matches!(receiver.try_recv(), Ok(PublishMessage::Record(_))));
        assert_eq!(receiver.try_recv().unwrap(), PublishMessage::EndOfStream);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_consumer_does_not_fail() {
        let (publisher, receiver) = Publisher::channel();
        drop(receiver);

        assert!(!publisher.publish(result(1.0, &[1.0; 5])));
    }

    #[test]
    fn test_publish_never_blocks_on_slow_consumer() {
        let (publisher, mut receiver) = Publisher::channel();

        for i in 0..10_000 {
            assert!(publisher.publish(result(i as f64, &[0.0; 5])));
        }

        // Order is preserved
        for i in 0..10_000 {
            match receiver.try_recv().unwrap() {
                PublishMessage::Record(r) => assert_eq!(r.timestamp, i as f64),
                PublishMessage::EndOfStream => panic!("unexpected end of stream"),
            }
        }
    }

    #[test]
    fn test_sink_close_once() {
        let writer = ScriptedWriter::default();
        let (publisher, _receiver) = Publisher::channel();
        let mut sink = ResultSink::new(Box::new(writer.clone()), publisher);

        sink.append(&result(1.0, &[1.0; 5])).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        assert!(sink.is_closed());
        assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
        assert!(sink.append(&result(2.0, &[1.0; 5])).is_err());
        assert_eq!(sink.records_written(), 1);
    }
}
