//! Core stream type: pre-segmented I2C transaction frames
//!
//! Frames arrive already segmented by an upstream bus decoder: a start
//! condition, an address phase (device address plus direction), then data
//! bytes. This crate never touches the wire level; it only classifies the
//! frame sequence.

use std::fmt;

/// One frame of an already-segmented I2C transaction.
///
/// Timestamps are nanoseconds and monotonically non-decreasing within a
/// stream. A repeated start inside one bus transaction shows up as a new
/// `Address` frame without a preceding `Start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum I2cFrame {
    /// Start condition. Opens a transaction and invalidates all decoder state.
    Start { start_time: u64, end_time: u64 },
    /// Address phase: 7-bit target address plus read/write direction.
    Address {
        address: u8,
        is_read: bool,
        start_time: u64,
        end_time: u64,
    },
    /// A single data byte, in either direction.
    Data {
        value: u8,
        start_time: u64,
        end_time: u64,
    },
}

impl I2cFrame {
    /// Timestamp at which this frame begins.
    pub fn start_time(&self) -> u64 {
        match *self {
            I2cFrame::Start { start_time, .. }
            | I2cFrame::Address { start_time, .. }
            | I2cFrame::Data { start_time, .. } => start_time,
        }
    }

    /// Timestamp at which this frame ends.
    pub fn end_time(&self) -> u64 {
        match *self {
            I2cFrame::Start { end_time, .. }
            | I2cFrame::Address { end_time, .. }
            | I2cFrame::Data { end_time, .. } => end_time,
        }
    }

    /// The byte carried by a `Data` frame, if this is one.
    pub fn data_value(&self) -> Option<u8> {
        match *self {
            I2cFrame::Data { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for I2cFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            I2cFrame::Start { start_time, .. } => write!(f, "Start[t={}]", start_time),
            I2cFrame::Address {
                address,
                is_read,
                start_time,
                ..
            } => write!(
                f,
                "Address[0x{:02X} {} t={}]",
                address,
                if is_read { "R" } else { "W" },
                start_time
            ),
            I2cFrame::Data {
                value, start_time, ..
            } => write!(f, "Data[0x{:02X} t={}]", value, start_time),
        }
    }
}
