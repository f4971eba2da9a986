//! Frame replay source
//!
//! Provides `FrameReplaySource` - a runtime process node that replays a
//! pre-segmented I2C frame capture into the graph.
//!
//! Each broadcast destination runs in its own sender thread, so a slow
//! consumer on one destination never blocks the others. All threads share the
//! captured frames via `Arc<[I2cFrame]>`.

use crate::runtime::I2cFrame;
use crate::runtime::Sender;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Source node that replays a captured I2C frame sequence
///
/// This runtime `ProcessNode` (0 inputs, 1 output) feeds a fixed frame
/// sequence into the graph, in capture order.
///
/// ## Threading Model
///
/// This is a **self-threading node** (`is_self_threading() = true`). On the
/// first (and only) call to `work()`, it spawns one internal sender thread
/// **per broadcast destination**. The scheduler thread then waits for
/// `should_stop()` to signal completion, rather than calling `work()`
/// repeatedly.
///
/// If the output is broadcast to multiple receivers, each receiver gets its
/// own independent sender thread. This eliminates head-of-line blocking:
/// slow consumers don't block fast ones.
///
/// # Example
/// ```ignore
/// let source = FrameReplaySource::new(frames);
/// pipeline.add_process("source", source)?;
/// ```
pub struct FrameReplaySource {
    name: String,
    frames: Arc<[I2cFrame]>,

    // Configuration
    max_frames: Option<usize>,

    // Per-destination thread management
    shutdown: Arc<AtomicBool>,
    threads_completed: Arc<AtomicUsize>,
    thread_handles: Option<Vec<JoinHandle<()>>>,
    threads_spawned: bool,
    num_threads: usize,
}

impl FrameReplaySource {
    /// Create a new source from a captured frame sequence
    pub fn new(frames: impl Into<Vec<I2cFrame>>) -> Self {
        Self {
            name: "frame_replay_source".to_string(),
            frames: Arc::from(frames.into()),
            max_frames: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            threads_completed: Arc::new(AtomicUsize::new(0)),
            thread_handles: None,
            threads_spawned: false,
            num_threads: 0,
        }
    }

    /// Set custom name (builder pattern)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Limit the number of frames replayed (for benchmarking)
    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Number of frames in the capture
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Timestamp span of the capture in nanoseconds, if non-empty
    pub fn capture_span(&self) -> Option<(u64, u64)> {
        let first = self.frames.first()?;
        let last = self.frames.last()?;
        Some((first.start_time(), last.end_time()))
    }

    /// Worker thread that replays the capture to one destination.
    ///
    /// Threads are fully independent; if the output is broadcast, each
    /// destination gets its own thread walking the same shared frames.
    fn replay_thread(config: ReplayConfig) {
        let ReplayConfig {
            frames,
            dest,
            sender,
            max_frames,
            shutdown,
            completed,
        } = config;

        let total = max_frames.unwrap_or(frames.len()).min(frames.len());
        let mut frames_sent = 0usize;

        info!("[dest{}] Starting replay thread ({} frames)", dest, total);

        for frame in frames.iter().take(total) {
            if shutdown.load(Ordering::Relaxed) {
                debug!(
                    "[dest{}] Shutdown signal received after {} frames",
                    dest, frames_sent
                );
                break;
            }

            if sender.send(*frame).is_err() {
                debug!(
                    "[dest{}] Receiver disconnected after {} frames",
                    dest, frames_sent
                );
                completed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            frames_sent += 1;
        }

        info!("[dest{}] Replay complete: {} frames sent", dest, frames_sent);

        // split_senders() clones channel handles, so dropping this sender does
        // not disconnect the channel. Signal end-of-stream explicitly.
        sender.close();
        drop(sender);
        completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl ProcessNode for FrameReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.threads_spawned && self.threads_completed.load(Ordering::Relaxed) >= self.num_threads
    }

    fn is_self_threading(&self) -> bool {
        true
    }

    fn num_inputs(&self) -> usize {
        0 // Source node
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
        use crate::runtime::ports::{PortDirection, PortSchema};

        vec![PortSchema::new::<I2cFrame>("frames", 0, PortDirection::Output)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        if self.threads_spawned {
            // Already started - this shouldn't be called again for self-threading nodes
            return Err(WorkError::NodeError(
                "work() called multiple times on self-threading node".to_string(),
            ));
        }

        // First and only call: spawn one thread per connected output destination
        self.threads_spawned = true;

        let senders = outputs
            .first()
            .and_then(|port| port.split_senders::<I2cFrame>())
            .ok_or_else(|| WorkError::NodeError("Output port not connected".to_string()))?;

        info!(
            "Replay source: Spawning {} sender threads for {} frames",
            senders.len(),
            self.frames.len()
        );

        let mut handles = Vec::new();

        for (dest, sender) in senders.into_iter().enumerate() {
            let frames = Arc::clone(&self.frames);
            let max_frames = self.max_frames;
            let shutdown = Arc::clone(&self.shutdown);
            let completed = Arc::clone(&self.threads_completed);

            let handle = std::thread::Builder::new()
                .name(format!("replay_dest{}", dest))
                .spawn(move || {
                    Self::replay_thread(ReplayConfig {
                        frames,
                        dest,
                        sender,
                        max_frames,
                        shutdown,
                        completed,
                    });
                })
                .map_err(|e| {
                    WorkError::NodeError(format!("Failed to spawn replay thread: {}", e))
                })?;

            handles.push(handle);
        }

        self.num_threads = handles.len();
        self.thread_handles = Some(handles);

        Ok(0)
    }
}

impl Drop for FrameReplaySource {
    fn drop(&mut self) {
        // Signal all threads to stop
        self.shutdown.store(true, Ordering::Relaxed);

        // Join all thread handles
        if let Some(handles) = self.thread_handles.take() {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

/// Configuration for a per-destination replay thread
struct ReplayConfig {
    frames: Arc<[I2cFrame]>,
    dest: usize,
    sender: Sender<I2cFrame>,
    max_frames: Option<usize>,
    shutdown: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::{
        AnalyzerMode, Annotation, ClassifierSettings, TransactionClassifier,
    };
    use crate::runtime::Pipeline;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn sample_frames() -> Vec<I2cFrame> {
        vec![
            // Firmware-update command write
            I2cFrame::Start {
                start_time: 0,
                end_time: 10,
            },
            I2cFrame::Address {
                address: 0x12,
                is_read: false,
                start_time: 10,
                end_time: 20,
            },
            I2cFrame::Data {
                value: 0x31,
                start_time: 20,
                end_time: 30,
            },
            // Diagnostic readback of register 0x16
            I2cFrame::Start {
                start_time: 100,
                end_time: 110,
            },
            I2cFrame::Address {
                address: 0x12,
                is_read: false,
                start_time: 110,
                end_time: 120,
            },
            I2cFrame::Data {
                value: 0x16,
                start_time: 120,
                end_time: 130,
            },
            I2cFrame::Address {
                address: 0x12,
                is_read: true,
                start_time: 130,
                end_time: 140,
            },
            I2cFrame::Data {
                value: 0x01,
                start_time: 140,
                end_time: 150,
            },
            I2cFrame::Data {
                value: 0x02,
                start_time: 150,
                end_time: 160,
            },
            I2cFrame::Data {
                value: 0x03,
                start_time: 160,
                end_time: 170,
            },
            I2cFrame::Data {
                value: 0x00,
                start_time: 170,
                end_time: 180,
            },
        ]
    }

    struct CollectorSink {
        received: Arc<Mutex<Vec<Annotation>>>,
        input_buffer: VecDeque<Annotation>,
    }

    impl ProcessNode for CollectorSink {
        fn name(&self) -> &str {
            "collector"
        }

        fn num_inputs(&self) -> usize {
            1
        }

        fn num_outputs(&self) -> usize {
            0
        }

        fn input_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
            use crate::runtime::ports::{PortDirection, PortSchema};
            vec![PortSchema::new::<Annotation>(
                "annotations",
                0,
                PortDirection::Input,
            )]
        }

        fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            let annotation = {
                let mut input = inputs[0]
                    .get::<Annotation>(&mut self.input_buffer)
                    .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;
                input.recv()?
            };
            self.received.lock().unwrap().push(annotation);
            Ok(1)
        }
    }

    #[test]
    fn test_replay_source_accessors() {
        let source = FrameReplaySource::new(sample_frames());
        assert_eq!(source.num_frames(), 11);
        assert_eq!(source.num_inputs(), 0);
        assert_eq!(source.num_outputs(), 1);
        assert_eq!(source.name(), "frame_replay_source");
        assert!(source.is_self_threading());
        assert!(!source.should_stop());
        assert_eq!(source.capture_span(), Some((0, 180)));
    }

    #[test]
    fn test_replay_source_empty_capture() {
        let source = FrameReplaySource::new(Vec::new());
        assert_eq!(source.num_frames(), 0);
        assert_eq!(source.capture_span(), None);
    }

    #[test]
    fn test_replay_source_builder_methods() {
        let source = FrameReplaySource::new(sample_frames()).with_name("custom_source");
        assert_eq!(source.name(), "custom_source");
    }

    #[test]
    fn test_end_to_end_classification() {
        let mut pipeline = Pipeline::new();

        let source = FrameReplaySource::new(sample_frames());
        let classifier =
            TransactionClassifier::new(ClassifierSettings::new(AnalyzerMode::Update));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectorSink {
            received: Arc::clone(&received),
            input_buffer: VecDeque::new(),
        };

        pipeline.add_process("source", source).unwrap();
        pipeline.add_process("classifier", classifier).unwrap();
        pipeline.add_process("sink", sink).unwrap();

        pipeline
            .connect("source", "frames", "classifier", "frames")
            .unwrap();
        pipeline
            .connect("classifier", "annotations", "sink", "annotations")
            .unwrap();

        let scheduler = pipeline.build().unwrap();
        scheduler.wait();

        let annotations = received.lock().unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].label, "UpdateResult: 0x31 = APP Reset");
        assert_eq!(annotations[1].label, "UpdateResult: 0x00 = PASS@Dia_16");
        assert_eq!(annotations[1].start_time, 170);
        assert_eq!(annotations[1].end_time, 180);
    }

    #[test]
    fn test_max_frames_limits_replay() {
        let mut pipeline = Pipeline::new();

        // Only the first transaction (3 frames) is replayed
        let source = FrameReplaySource::new(sample_frames()).with_max_frames(Some(3));
        let classifier =
            TransactionClassifier::new(ClassifierSettings::new(AnalyzerMode::Update));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectorSink {
            received: Arc::clone(&received),
            input_buffer: VecDeque::new(),
        };

        pipeline.add_process("source", source).unwrap();
        pipeline.add_process("classifier", classifier).unwrap();
        pipeline.add_process("sink", sink).unwrap();

        pipeline
            .connect("source", "frames", "classifier", "frames")
            .unwrap();
        pipeline
            .connect("classifier", "annotations", "sink", "annotations")
            .unwrap();

        let scheduler = pipeline.build().unwrap();
        scheduler.wait();

        let annotations = received.lock().unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].label, "UpdateResult: 0x31 = APP Reset");
    }
}
