//! Channel receiver with a putback buffer and watchdog monitoring
//!
//! [`Receiver`] wraps a single `crossbeam_channel::Receiver<ChannelMessage<T>>`
//! with a putback buffer, providing `recv`, `peek`, `put_back`, and
//! `recv_timeout` operations. Transparently unwraps `ChannelMessage` and
//! caches end-of-stream state so subsequent calls return `Shutdown`.

use crossbeam_channel::Receiver as CrossbeamReceiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use super::errors::{WorkError, WorkResult};
use super::sender::ChannelMessage;
use super::watchdog::{OperationGuard, WatchdogHandle};

/// A single crossbeam receiver with a putback buffer.
///
/// The buffer is externally owned (passed as `&mut VecDeque<T>`) so it
/// persists across work() calls in the owning node's struct. The same goes
/// for the end-of-stream flag, which lives in the `InputPort`.
///
/// Transparently unwraps `ChannelMessage::Item(T)` and returns the value.
/// On `ChannelMessage::EndOfStream`, sets a persistent flag so all subsequent
/// `recv()`/`peek()` calls return `WorkError::Shutdown` immediately.
pub struct Receiver<'a, T> {
    receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
    buffer: &'a mut VecDeque<T>,
    watchdog_handle: Option<WatchdogHandle>,
    eos: &'a AtomicBool,
}

impl<'a, T> Receiver<'a, T> {
    /// Create a new receiver with watchdog monitoring.
    pub fn new(
        receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
        buffer: &'a mut VecDeque<T>,
        watchdog_handle: WatchdogHandle,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            buffer,
            watchdog_handle: Some(watchdog_handle),
            eos,
        }
    }

    /// Blocking receive. Returns from the putback buffer first, then falls
    /// through to the underlying channel.
    ///
    /// Returns `Err(WorkError::Shutdown)` if end-of-stream has been received
    /// (either now or in a previous call).
    pub fn recv(&mut self) -> WorkResult<T> {
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }

        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        match self.receiver.recv() {
            Ok(ChannelMessage::Item(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos.store(true, Ordering::Relaxed);
                tracing::debug!("Receiver::recv() - EndOfStream received");
                Err(WorkError::Shutdown)
            }
            Err(_) => {
                tracing::debug!("Receiver::recv() - channel disconnected, returning Shutdown");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Peek at the front item. If the buffer is empty, blocks on the channel
    /// to populate it.
    ///
    /// Returns `Err(WorkError::Shutdown)` if end-of-stream has been received.
    pub fn peek(&mut self) -> WorkResult<&T> {
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }

        if self.buffer.is_empty() {
            let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
            match self.receiver.recv() {
                Ok(ChannelMessage::Item(item)) => {
                    self.buffer.push_back(item);
                }
                Ok(ChannelMessage::EndOfStream) => {
                    self.eos.store(true, Ordering::Relaxed);
                    tracing::debug!("Receiver::peek() - EndOfStream received");
                    return Err(WorkError::Shutdown);
                }
                Err(_) => {
                    tracing::debug!("Receiver::peek() - channel disconnected, returning Shutdown");
                    return Err(WorkError::Shutdown);
                }
            }
        }
        self.buffer
            .front()
            .ok_or_else(|| WorkError::NodeError("peek buffer unexpectedly empty".to_string()))
    }

    /// Receive with a timeout. Returns from the putback buffer first
    /// (immediate), then tries the underlying channel with timeout.
    pub fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<T, crossbeam_channel::RecvTimeoutError> {
        if self.eos.load(Ordering::Relaxed) {
            return Err(crossbeam_channel::RecvTimeoutError::Disconnected);
        }

        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        match self.receiver.recv_timeout(timeout) {
            Ok(ChannelMessage::Item(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos.store(true, Ordering::Relaxed);
                Err(crossbeam_channel::RecvTimeoutError::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    /// Push an item back to the front of the buffer so the next `recv()`
    /// returns it.
    pub fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }

    /// Check if there are any buffered items.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }
}
