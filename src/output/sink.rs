// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::io::Write;
use std::sync::Mutex;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{FailureEvent, ResultEvent};
use crate::errors::OutputError;

/// Receives findings and failures as they are produced.
///
/// `write` is called synchronously from result callbacks, once per result,
/// possibly from many tasks at the same time.
pub trait OutputSink: Send + Sync {
    fn write(&self, event: &ResultEvent) -> Result<(), OutputError>;

    fn write_failure(&self, failure: &FailureEvent) -> Result<(), OutputError>;
}

/// Collects everything in memory. Used by tests and embedders that want a
/// scan's findings as a value.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<ResultEvent>>,
    failures: Mutex<Vec<FailureEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ResultEvent> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn failures(&self) -> Vec<FailureEvent> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl OutputSink for MemorySink {
    fn write(&self, event: &ResultEvent) -> Result<(), OutputError> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }

    fn write_failure(&self, failure: &FailureEvent) -> Result<(), OutputError> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(failure.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum SinkMessage {
    Result(Box<ResultEvent>),
    Failure(FailureEvent),
}

/// Forwards events over a bounded channel to a consumer task.
///
/// When the channel is full the writer waits for capacity on multi-threaded
/// runtimes. On a current-thread runtime waiting would deadlock the consumer,
/// so the write fails with [`OutputError::Full`] instead.
pub struct ChannelSink {
    sender: mpsc::Sender<SinkMessage>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    fn send(&self, message: SinkMessage) -> Result<(), OutputError> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(OutputError::Closed),
            Err(TrySendError::Full(message)) => match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| self.sender.blocking_send(message))
                        .map_err(|_| OutputError::Closed)
                }
                Ok(_) => Err(OutputError::Full),
                Err(_) => self
                    .sender
                    .blocking_send(message)
                    .map_err(|_| OutputError::Closed),
            },
        }
    }
}

impl OutputSink for ChannelSink {
    fn write(&self, event: &ResultEvent) -> Result<(), OutputError> {
        self.send(SinkMessage::Result(Box::new(event.clone())))
    }

    fn write_failure(&self, failure: &FailureEvent) -> Result<(), OutputError> {
        self.send(SinkMessage::Failure(failure.clone()))
    }
}

/// Writes one JSON document per line.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
    include_failures: bool,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn Write + Send>, include_failures: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            include_failures,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()), false)
    }

    fn write_line(&self, line: String) -> Result<(), OutputError> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl OutputSink for JsonLinesSink {
    fn write(&self, event: &ResultEvent) -> Result<(), OutputError> {
        self.write_line(serde_json::to_string(event)?)
    }

    fn write_failure(&self, failure: &FailureEvent) -> Result<(), OutputError> {
        if !self.include_failures {
            return Ok(());
        }
        self.write_line(serde_json::to_string(failure)?)
    }
}
