//! I2C transaction classifier for the display-controller protocol
//!
//! Consumes pre-segmented [`I2cFrame`]s and emits [`Annotation`]s for the two
//! higher-level conversations the controller speaks at address 0x12:
//!
//! - **Diagnostic readback**: a write selecting register 0x16 or 0x1C, then a
//!   multi-byte read whose status byte (offset 4 for 0x16, offset 3 for 0x1C)
//!   is judged PASS (zero) or FAIL (anything else).
//! - **Firmware update**: single write-phase opcodes looked up in a fixed
//!   command table, recognized only when the classifier runs in Update mode.
//!
//! The decoder is a flat state machine over a handful of flags and one byte
//! counter; all state is reset on every start condition so unrelated bus
//! traffic cannot leak into a classification.

use super::types::{AnalyzerMode, Annotation, Verdict};
use crate::runtime::I2cFrame;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use std::collections::VecDeque;
use tracing::{debug, info, trace};

/// Fixed 7-bit address of the display controller.
pub const DEVICE_ADDRESS: u8 = 0x12;

/// Register-select bytes for the two diagnostic readback sequences.
const DIAG_REG_16: u8 = 0x16;
const DIAG_REG_1C: u8 = 0x1C;

/// Position of the status byte within each diagnostic read, counted from the
/// first byte read back after register selection.
const DIAG_16_CHECK_OFFSET: u32 = 4;
const DIAG_1C_CHECK_OFFSET: u32 = 3;

/// Firmware-update opcodes recognized in the write phase (Update mode only).
const UPDATE_COMMANDS: &[(u8, &str)] = &[
    (0x05, "Display ID"),
    (0x31, "APP Reset"),
    (0x34, "APP Key Send"),
    (0x80, "BL Status"),
    (0x84, "BL Unlock"),
    (0x88, "BL Erase"),
    (0x8D, "BL Write Flash"),
];

fn update_command_name(value: u8) -> Option<&'static str> {
    UPDATE_COMMANDS
        .iter()
        .find(|(opcode, _)| *opcode == value)
        .map(|(_, name)| *name)
}

/// Host-facing settings for the classifier, fixed at construction.
///
/// `note` and `level` mirror two free-form entries in the host's settings
/// schema. They are accepted and logged for compatibility but never consulted
/// by the decoding logic.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub mode: AnalyzerMode,
    pub note: Option<String>,
    pub level: Option<u32>,
}

impl ClassifierSettings {
    pub fn new(mode: AnalyzerMode) -> Self {
        Self {
            mode,
            note: None,
            level: None,
        }
    }
}

/// Per-transaction decoder state. Reset wholesale on every start condition.
#[derive(Debug, Default)]
struct TransactionState {
    /// Address phase indicated host-to-device direction
    write_in_progress: bool,
    /// Active transaction addresses the display controller
    target_selected: bool,
    /// Read-back bytes counted since a diagnostic register was selected
    byte_position: u32,
    reg_16_active: bool,
    reg_1c_active: bool,
    /// One-shot: a verdict was just computed and must be emitted on this call
    pending_16: bool,
    pending_1c: bool,
    verdict_16: Option<Verdict>,
    verdict_1c: Option<Verdict>,
    /// Status bytes that produced the verdicts, used as label fallback when
    /// the emitting frame carries no data byte
    status_16: u8,
    status_1c: u8,
}

impl TransactionState {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stateful decoder turning an I2C frame stream into display-controller
/// annotations.
///
/// One instance per bus trace: processing a frame mutates state read by the
/// next call, so the classifier is strictly sequential.
///
/// As a [`ProcessNode`]: input `frames` ([`I2cFrame`]), output `annotations`
/// ([`Annotation`]).
pub struct TransactionClassifier {
    name: String,
    mode: AnalyzerMode,
    state: TransactionState,
    input_buffer: VecDeque<I2cFrame>,
}

impl TransactionClassifier {
    /// Create a classifier with the given host settings.
    pub fn new(settings: ClassifierSettings) -> Self {
        debug!(
            "Classifier settings: mode={:?} note={:?} level={:?}",
            settings.mode, settings.note, settings.level
        );
        Self {
            name: "transaction_classifier".to_string(),
            mode: settings.mode,
            state: TransactionState::default(),
            input_buffer: VecDeque::new(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The configured analyzer mode.
    pub fn mode(&self) -> AnalyzerMode {
        self.mode
    }

    /// Feed one frame to the state machine.
    ///
    /// Returns at most one annotation per call. Frames must arrive in bus
    /// order (Start, Address, Data*); a start condition may appear at any
    /// time and always resets the decoder.
    pub fn process(&mut self, frame: &I2cFrame) -> Option<Annotation> {
        let direct = match *frame {
            I2cFrame::Start { .. } => {
                trace!("start condition, resetting state");
                self.state.reset();
                None
            }
            I2cFrame::Address {
                address, is_read, ..
            } => {
                self.on_address(address, is_read);
                None
            }
            I2cFrame::Data {
                value,
                start_time,
                end_time,
            } => self.on_data(value, start_time, end_time),
        };

        // Verdict emission is checked after every frame and takes priority
        // over a same-call command match.
        self.take_pending(frame).or(direct)
    }

    fn on_address(&mut self, address: u8, is_read: bool) {
        let st = &mut self.state;
        st.target_selected = address == DEVICE_ADDRESS;
        if is_read {
            st.write_in_progress = false;
        } else {
            st.write_in_progress = true;
            if st.target_selected {
                // A fresh write to the device invalidates any stale
                // register selection.
                st.reg_16_active = false;
                st.reg_1c_active = false;
            }
        }
        trace!(
            "address 0x{:02X} {} (target={})",
            address,
            if is_read { "read" } else { "write" },
            st.target_selected
        );
    }

    fn on_data(&mut self, value: u8, start_time: u64, end_time: u64) -> Option<Annotation> {
        if self.state.write_in_progress {
            self.on_command_byte(value, start_time, end_time)
        } else {
            self.on_readback_byte(value);
            None
        }
    }

    /// Handle the single command/register-select byte of a write transaction.
    /// Only the first data byte of a write is interpreted this way.
    fn on_command_byte(&mut self, value: u8, start_time: u64, end_time: u64) -> Option<Annotation> {
        let st = &mut self.state;
        st.write_in_progress = false;

        if !st.target_selected {
            return None;
        }

        // Register-select rules are independent, not mutually exclusive.
        if value == DIAG_REG_16 {
            trace!("register 0x16 selected");
            st.reg_16_active = true;
        }
        if value == DIAG_REG_1C {
            trace!("register 0x1C selected");
            st.reg_1c_active = true;
        }

        if self.mode == AnalyzerMode::Update
            && let Some(name) = update_command_name(value)
        {
            info!("update command 0x{:02X} = {}", value, name);
            return Some(Annotation {
                start_time,
                end_time,
                label: format!("{} 0x{:02X} = {}", self.mode.label_prefix(), value, name),
            });
        }

        None
    }

    /// Handle a byte read back from the device during a diagnostic sequence.
    fn on_readback_byte(&mut self, value: u8) {
        let st = &mut self.state;
        if !st.target_selected {
            return;
        }

        if st.reg_16_active {
            st.byte_position += 1;
            if st.byte_position == DIAG_16_CHECK_OFFSET {
                let verdict = Verdict::from_status_byte(value);
                info!("diagnostic 0x16 check = {} (status 0x{:02X})", verdict, value);
                st.verdict_16 = Some(verdict);
                st.status_16 = value;
                st.pending_16 = true;
            }
        } else if st.reg_1c_active {
            st.byte_position += 1;
            if st.byte_position == DIAG_1C_CHECK_OFFSET {
                let verdict = Verdict::from_status_byte(value);
                info!("diagnostic 0x1C check = {} (status 0x{:02X})", verdict, value);
                st.verdict_1c = Some(verdict);
                st.status_1c = value;
                st.pending_1c = true;
            }
        }
    }

    /// Clear and emit a pending verdict, if one was armed. One-shot: two
    /// consecutive calls can never emit the same verdict.
    fn take_pending(&mut self, frame: &I2cFrame) -> Option<Annotation> {
        let st = &mut self.state;
        if st.pending_16 {
            st.pending_16 = false;
            let verdict = st.verdict_16?;
            let value = frame.data_value().unwrap_or(st.status_16);
            Some(Annotation {
                start_time: frame.start_time(),
                end_time: frame.end_time(),
                label: format!(
                    "{} 0x{:02X} = {}@Dia_16",
                    self.mode.label_prefix(),
                    value,
                    verdict
                ),
            })
        } else if st.pending_1c {
            st.pending_1c = false;
            let verdict = st.verdict_1c?;
            let value = frame.data_value().unwrap_or(st.status_1c);
            Some(Annotation {
                start_time: frame.start_time(),
                end_time: frame.end_time(),
                label: format!(
                    "{} 0x{:02X} = {}@Dia_1C",
                    self.mode.label_prefix(),
                    value,
                    verdict
                ),
            })
        } else {
            None
        }
    }
}

impl ProcessNode for TransactionClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
        use crate::runtime::ports::{PortDirection, PortSchema};
        vec![PortSchema::new::<I2cFrame>("frames", 0, PortDirection::Input)]
    }

    fn output_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
        use crate::runtime::ports::{PortDirection, PortSchema};
        vec![PortSchema::new::<Annotation>(
            "annotations",
            0,
            PortDirection::Output,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let output = outputs
            .first()
            .and_then(|port| port.get::<Annotation>())
            .ok_or_else(|| WorkError::NodeError("Missing annotations output".to_string()))?;

        let frame = {
            let mut input = inputs
                .first()
                .and_then(|port| port.get::<I2cFrame>(&mut self.input_buffer))
                .ok_or_else(|| WorkError::NodeError("Missing frames input".to_string()))?;
            input.recv()?
        };

        match self.process(&frame) {
            Some(annotation) => {
                output.send(annotation)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(t: u64) -> I2cFrame {
        I2cFrame::Start {
            start_time: t,
            end_time: t + 10,
        }
    }

    fn address(addr: u8, is_read: bool, t: u64) -> I2cFrame {
        I2cFrame::Address {
            address: addr,
            is_read,
            start_time: t,
            end_time: t + 10,
        }
    }

    fn data(value: u8, t: u64) -> I2cFrame {
        I2cFrame::Data {
            value,
            start_time: t,
            end_time: t + 10,
        }
    }

    fn classifier(mode: AnalyzerMode) -> TransactionClassifier {
        TransactionClassifier::new(ClassifierSettings::new(mode))
    }

    /// Drive the classifier through a write selecting the given register.
    fn select_register(c: &mut TransactionClassifier, register: u8) {
        assert!(c.process(&start(0)).is_none());
        assert!(c.process(&address(DEVICE_ADDRESS, false, 10)).is_none());
        assert!(c.process(&data(register, 20)).is_none());
        assert!(c.process(&address(DEVICE_ADDRESS, true, 30)).is_none());
    }

    #[test]
    fn start_resets_all_state() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x16);
        c.process(&data(0xAA, 40));

        c.process(&start(100));
        assert!(!c.state.write_in_progress);
        assert!(!c.state.target_selected);
        assert!(!c.state.reg_16_active);
        assert!(!c.state.reg_1c_active);
        assert_eq!(c.state.byte_position, 0);
        assert!(!c.state.pending_16);
        assert!(!c.state.pending_1c);
    }

    #[test]
    fn data_after_start_without_address_emits_nothing() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        assert!(c.process(&start(0)).is_none());
        for i in 0..8 {
            assert!(c.process(&data(0x00, 10 + i * 10)).is_none());
        }
    }

    #[test]
    fn address_phase_never_emits() {
        let mut c = classifier(AnalyzerMode::Update);
        assert!(c.process(&address(DEVICE_ADDRESS, false, 0)).is_none());
        assert!(c.process(&address(DEVICE_ADDRESS, true, 10)).is_none());
        assert!(c.process(&address(0x50, false, 20)).is_none());
    }

    #[test]
    fn update_command_round_trip() {
        let mut c = classifier(AnalyzerMode::Update);
        assert!(c.process(&start(0)).is_none());
        assert!(c.process(&address(DEVICE_ADDRESS, false, 100)).is_none());

        let annotation = c.process(&data(0x34, 200)).expect("command annotation");
        assert_eq!(annotation.label, "UpdateResult: 0x34 = APP Key Send");
        assert_eq!(annotation.start_time, 200);
        assert_eq!(annotation.end_time, 210);

        // Only the first write byte is the command byte
        assert!(!c.state.write_in_progress);
        assert!(c.process(&data(0x31, 300)).is_none());
    }

    #[test]
    fn all_update_commands_recognized() {
        let expected = [
            (0x05u8, "Display ID"),
            (0x31, "APP Reset"),
            (0x34, "APP Key Send"),
            (0x80, "BL Status"),
            (0x84, "BL Unlock"),
            (0x88, "BL Erase"),
            (0x8D, "BL Write Flash"),
        ];
        for (opcode, name) in expected {
            let mut c = classifier(AnalyzerMode::Update);
            c.process(&start(0));
            c.process(&address(DEVICE_ADDRESS, false, 10));
            let annotation = c.process(&data(opcode, 20)).expect("command annotation");
            assert_eq!(
                annotation.label,
                format!("UpdateResult: 0x{:02X} = {}", opcode, name)
            );
        }
    }

    #[test]
    fn unrecognized_command_byte_emits_nothing() {
        let mut c = classifier(AnalyzerMode::Update);
        c.process(&start(0));
        c.process(&address(DEVICE_ADDRESS, false, 10));
        assert!(c.process(&data(0x42, 20)).is_none());
    }

    #[test]
    fn update_commands_gated_by_mode() {
        for mode in [AnalyzerMode::Diagnosis, AnalyzerMode::Plain] {
            let mut c = classifier(mode);
            c.process(&start(0));
            c.process(&address(DEVICE_ADDRESS, false, 10));
            assert!(
                c.process(&data(0x34, 20)).is_none(),
                "mode {:?} must not classify update commands",
                mode
            );
        }
    }

    #[test]
    fn diag_16_pass_on_fourth_read_byte() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x16);

        assert!(c.process(&data(0x11, 40)).is_none());
        assert!(c.process(&data(0x22, 50)).is_none());
        assert!(c.process(&data(0x00, 60)).is_none());

        let annotation = c.process(&data(0x00, 70)).expect("verdict on 4th byte");
        assert_eq!(annotation.label, "DiagResult: 0x00 = PASS@Dia_16");
        assert_eq!(annotation.start_time, 70);
        assert_eq!(annotation.end_time, 80);
    }

    #[test]
    fn diag_16_fail_on_nonzero_status() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x16);

        c.process(&data(0x11, 40));
        c.process(&data(0x22, 50));
        c.process(&data(0x33, 60));

        let annotation = c.process(&data(0x07, 70)).expect("verdict on 4th byte");
        assert_eq!(annotation.label, "DiagResult: 0x07 = FAIL@Dia_16");
    }

    #[test]
    fn diag_1c_checks_third_read_byte() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x1C);

        assert!(c.process(&data(0x11, 40)).is_none());
        assert!(c.process(&data(0x22, 50)).is_none());

        let annotation = c.process(&data(0x00, 60)).expect("verdict on 3rd byte");
        assert_eq!(annotation.label, "DiagResult: 0x00 = PASS@Dia_1C");

        // Not the fourth
        assert!(c.process(&data(0x00, 70)).is_none());
    }

    #[test]
    fn verdict_emission_is_one_shot() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x16);

        c.process(&data(0x11, 40));
        c.process(&data(0x22, 50));
        c.process(&data(0x33, 60));
        assert!(c.process(&data(0x00, 70)).is_some());

        // Further read bytes never re-emit the verdict
        assert!(c.process(&data(0x00, 80)).is_none());
        assert!(c.process(&data(0x55, 90)).is_none());
    }

    #[test]
    fn foreign_address_never_arms_diagnostics() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        assert!(c.process(&start(0)).is_none());
        assert!(c.process(&address(0x99, false, 10)).is_none());
        assert!(c.process(&data(0x16, 20)).is_none());
        assert!(!c.state.reg_16_active);

        // Even a follow-up read from the target at matching byte positions
        // must stay silent.
        assert!(c.process(&address(DEVICE_ADDRESS, true, 30)).is_none());
        for i in 0..6 {
            assert!(c.process(&data(0x00, 40 + i * 10)).is_none());
        }
    }

    #[test]
    fn fresh_write_to_target_clears_stale_register_selection() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x16);

        // A new write address phase to the device drops the selection before
        // the next register byte arrives.
        assert!(c.process(&address(DEVICE_ADDRESS, false, 40)).is_none());
        assert!(!c.state.reg_16_active);

        // Selecting 0x1C now arms only the 0x1C sequence
        assert!(c.process(&data(0x1C, 50)).is_none());
        assert!(c.state.reg_1c_active);
        assert!(!c.state.reg_16_active);
    }

    #[test]
    fn register_selection_does_not_survive_a_new_transaction() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        select_register(&mut c, 0x16);

        // New transaction: state is gone, matching read positions are inert
        c.process(&start(100));
        c.process(&address(DEVICE_ADDRESS, true, 110));
        for i in 0..6 {
            assert!(c.process(&data(0x00, 120 + i * 10)).is_none());
        }
    }

    #[test]
    fn byte_position_only_counts_under_active_register() {
        let mut c = classifier(AnalyzerMode::Diagnosis);
        assert!(c.process(&start(0)).is_none());
        assert!(c.process(&address(DEVICE_ADDRESS, true, 10)).is_none());

        // No register selected: reads don't advance the counter
        c.process(&data(0x00, 20));
        c.process(&data(0x00, 30));
        assert_eq!(c.state.byte_position, 0);
    }

    #[test]
    fn diagnosis_prefix_applies_in_diagnosis_mode_only() {
        let mut c = classifier(AnalyzerMode::Plain);
        select_register(&mut c, 0x1C);
        c.process(&data(0x11, 40));
        c.process(&data(0x22, 50));
        let annotation = c.process(&data(0x09, 60)).expect("verdict");
        assert_eq!(annotation.label, "Result: 0x09 = FAIL@Dia_1C");
    }

    #[test]
    fn register_selection_also_works_in_update_mode() {
        // Register detection is not gated by mode, only command lookup is.
        let mut c = classifier(AnalyzerMode::Update);
        select_register(&mut c, 0x16);
        c.process(&data(0x11, 40));
        c.process(&data(0x22, 50));
        c.process(&data(0x33, 60));
        let annotation = c.process(&data(0x00, 70)).expect("verdict");
        assert_eq!(annotation.label, "UpdateResult: 0x00 = PASS@Dia_16");
    }
}
