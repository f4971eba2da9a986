//! I2C transaction classifier with streaming node-based API
//!
//! This library decodes pre-segmented I2C frames into display-controller
//! annotations, processing captures in real-time using a thread-per-node
//! graph architecture.
//!
//! # Architecture
//!
//! - **FrameReplaySource**: Streams captured I2C frames into the graph
//! - **TransactionClassifier**: Stateful decoder recognizing diagnostic
//!   readback and firmware-update transactions at device address 0x12
//! - **Streaming Nodes**: Thread-per-node execution with crossbeam channels
//! - **Scheduler**: Manages node lifecycle and parallel execution
//!
//! # Example
//!
//! ```no_run
//! use i2c_hla::{
//!     AnalyzerMode, ClassifierSettings, FrameReplaySource, Pipeline, TransactionClassifier,
//! };
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("source", FrameReplaySource::new(vec![]))?;
//! pipeline.add_process(
//!     "classifier",
//!     TransactionClassifier::new(ClassifierSettings::new(AnalyzerMode::Diagnosis)),
//! )?;
//! pipeline.connect("source", "frames", "classifier", "frames")?;
//! // ... connect a sink and run
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod nodes;
pub mod runtime;

// Re-export decoder data types
pub use nodes::decoders::{AnalyzerMode, Annotation, ClassifierSettings, Verdict};

// Re-export data types from runtime
pub use runtime::I2cFrame;

// Re-export streaming nodes
pub use nodes::FrameReplaySource;
pub use nodes::decoders::TransactionClassifier;

// Re-export streaming runtime components
pub use runtime::{
    ConnectionError, InputPort, OutputPort, Pipeline, PortDirection, PortSchema, ProcessNode,
    Scheduler, WorkError, WorkResult, register_type,
};
