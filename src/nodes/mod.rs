//! Process nodes for the streaming graph
//!
//! Sources feed captured data into the graph, decoders turn it into semantic
//! events. All nodes implement [`crate::runtime::ProcessNode`] and are wired
//! together through a [`crate::runtime::Pipeline`].

pub mod capture;
pub mod decoders;

pub use capture::FrameReplaySource;
pub use decoders::{
    AnalyzerMode, Annotation, ClassifierSettings, TransactionClassifier, Verdict,
};
