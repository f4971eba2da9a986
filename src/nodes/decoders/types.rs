//! Common decoder types and enums

use std::fmt;

/// Operating mode of the analyzer, fixed per classifier instance.
///
/// Selects the label prefix on emitted annotations and gates firmware-update
/// command recognition: update opcodes are only classified in `Update` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerMode {
    /// Diagnostic readback analysis
    Diagnosis,
    /// Firmware-update command analysis
    Update,
    /// No mode-specific behavior
    Plain,
}

impl AnalyzerMode {
    /// Prefix prepended to every annotation label in this mode.
    pub fn label_prefix(self) -> &'static str {
        match self {
            AnalyzerMode::Diagnosis => "DiagResult:",
            AnalyzerMode::Update => "UpdateResult:",
            AnalyzerMode::Plain => "Result:",
        }
    }
}

/// PASS/FAIL classification of a diagnostic status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// A status byte of zero means the check passed.
    pub fn from_status_byte(value: u8) -> Self {
        if value == 0 { Verdict::Pass } else { Verdict::Fail }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// A decoded semantic event, covering the time span of the frame that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Timestamp in nanoseconds where the annotated frame begins
    pub start_time: u64,
    /// Timestamp in nanoseconds where the annotated frame ends
    pub end_time: u64,
    /// Mode-prefixed display text
    pub label: String,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}..{}] {}", self.start_time, self.end_time, self.label)
    }
}
