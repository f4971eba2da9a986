//! Thread-per-node scheduler for streaming graphs
//!
//! Spawns a dedicated thread for each node and manages their lifecycle.
//!
//! ## Threading Models
//!
//! The scheduler supports two threading models:
//!
//! 1. **Regular nodes**: the scheduler calls `work()` repeatedly in a loop.
//!    The node processes one batch of items per call and returns the count.
//!
//! 2. **Self-threading nodes**: the node manages its own worker threads
//!    internally. The scheduler calls `work()` once to start the node, then
//!    waits for `should_stop()` to signal completion. The node returns
//!    `is_self_threading() = true` to indicate this pattern.
//!
//! Example self-threading node: `FrameReplaySource` spawns one sender thread
//! per broadcast destination.

use super::node::ProcessNode;
use super::ports::{InputPort, OutputPort};
use super::watchdog::Watchdog;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use super::errors::WorkError;

/// Runtime scheduler that executes a streaming graph
pub struct Scheduler {
    threads: Vec<(String, JoinHandle<()>)>,
    stop_signal: Arc<AtomicBool>,
    completion_tx: StdSender<String>,
    completion_rx: Option<StdReceiver<String>>,
    watchdog: Watchdog,
    watchdog_handle: JoinHandle<()>,
}

impl Scheduler {
    /// Create a new scheduler with watchdog monitoring
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = channel();
        let watchdog = Watchdog::new();
        let watchdog_handle = watchdog.start_monitoring_thread();
        info!("Watchdog enabled - will report operations blocked >5 seconds");
        Self {
            threads: Vec::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
            completion_tx,
            completion_rx: Some(completion_rx),
            watchdog,
            watchdog_handle,
        }
    }

    /// Get a reference to the watchdog
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Start a process node in its own thread.
    /// Process nodes include sources (0 inputs), sinks (0 outputs), and
    /// transformers (N inputs, M outputs).
    pub fn start_process(
        &mut self,
        mut node: Box<dyn ProcessNode>,
        inputs: Vec<InputPort>,
        outputs: Vec<OutputPort>,
    ) {
        let stop_signal = Arc::clone(&self.stop_signal);
        let completion_tx = self.completion_tx.clone();
        let name = node.name().to_string();
        let thread_name = name.clone();

        debug!("Starting process node: {}", name);

        let handle = thread::spawn(move || {
            if node.is_self_threading() {
                // Self-threading node: call work() once to start internal threads
                if let Err(e) = node.work(&inputs, &outputs) {
                    error!("[{}] Failed to start self-threading node: {}", thread_name, e);
                } else {
                    // Wait for the node to signal completion
                    loop {
                        if stop_signal.load(Ordering::Relaxed) {
                            info!(
                                "[{}] Stop signal received, shutting down self-threading node",
                                thread_name
                            );
                            break;
                        }
                        if node.should_stop() {
                            info!("[{}] Self-threading node completed", thread_name);
                            break;
                        }
                        thread::sleep(std::time::Duration::from_millis(100));
                    }
                }

                // Drop outputs/inputs/node to trigger shutdown
                drop(outputs);
                drop(inputs);
                drop(node);
            } else {
                // Regular node: call work() repeatedly
                let mut items_produced = 0usize;

                loop {
                    if stop_signal.load(Ordering::Relaxed) || node.should_stop() {
                        break;
                    }

                    match node.work(&inputs, &outputs) {
                        Ok(n) => {
                            items_produced += n;
                        }
                        Err(WorkError::Shutdown) => {
                            debug!("[{}] Upstream closed, shutting down", thread_name);
                            break;
                        }
                        Err(e) => {
                            error!("[{}] Work error: {}", thread_name, e);
                            break;
                        }
                    }
                }

                info!("[{}] Shutdown. Produced {} items.", thread_name, items_produced);

                // Drop outputs/inputs/node to close channels
                drop(outputs);
                drop(inputs);
                drop(node);
            }

            // Notify scheduler that this thread is about to complete
            let _ = completion_tx.send(thread_name.clone());
        });

        self.threads.push((name, handle));
    }

    /// Signal all nodes to stop
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Wait for all node threads to complete.
    /// Uses a completion notification channel to join threads as they finish.
    pub fn wait(mut self) {
        let Some(completion_rx) = self.completion_rx.take() else {
            return;
        };

        // Drop the main completion sender so the channel closes when all
        // threads complete
        drop(self.completion_tx);

        let total_threads = self.threads.len();
        let mut completed = 0;

        info!("Waiting for {} threads to complete...", total_threads);

        let mut threads_by_name: HashMap<String, JoinHandle<()>> =
            self.threads.into_iter().collect();

        // Block on completion notifications - no busy-waiting
        while completed < total_threads {
            match completion_rx.recv() {
                Ok(thread_name) => {
                    completed += 1;
                    if let Some(handle) = threads_by_name.remove(&thread_name) {
                        match handle.join() {
                            Ok(_) => info!(
                                "[{}] Thread completed ({}/{})",
                                thread_name, completed, total_threads
                            ),
                            Err(e) => error!(
                                "[{}] Thread panicked ({}/{}): {:?}",
                                thread_name, completed, total_threads, e
                            ),
                        }
                    }
                }
                Err(_) => {
                    // Channel closed - all thread senders dropped
                    break;
                }
            }
        }

        info!("All {} threads completed", total_threads);

        self.watchdog.stop();
        let _ = self.watchdog_handle.join();
    }

    /// Get the number of running threads
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Get the names of all running threads
    pub fn thread_names(&self) -> Vec<String> {
        self.threads.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
