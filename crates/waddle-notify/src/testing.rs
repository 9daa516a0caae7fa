//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::WriteError;
use crate::registry::NotificationSink;

/// Sink that records every delivered message and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<String>>,
    fail: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every write hang for `delay` before completing.
    pub fn set_stall(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, message: &str) -> Result<(), WriteError> {
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(WriteError::transport("simulated write failure"));
        }
        self.delivered.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
