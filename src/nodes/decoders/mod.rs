//! Protocol decoders
//!
//! Decoders are `ProcessNode`s that consume lower-level streams and emit
//! higher-level semantic events.

pub mod transaction_classifier;
pub mod types;

pub use transaction_classifier::{ClassifierSettings, TransactionClassifier};
pub use types::{AnalyzerMode, Annotation, Verdict};
