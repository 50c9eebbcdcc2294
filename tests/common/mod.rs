//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;
use tabula_export::{DownloadConfig, Error, OperationObserver, StateSnapshot};

/// Observer recording every hook invocation in order
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<&'static str>>,
    finals: Mutex<Vec<StateSnapshot>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.events().iter().filter(|e| **e == hook).count()
    }

    pub fn finals(&self) -> Vec<StateSnapshot> {
        self.finals.lock().unwrap().clone()
    }

    fn push(&self, hook: &'static str) {
        self.events.lock().unwrap().push(hook);
    }
}

impl<T> OperationObserver<T> for Recorder {
    fn on_start(&self) {
        self.push("start");
    }

    fn on_success(&self, _result: &T) {
        self.push("success");
    }

    fn on_error(&self, _error: &Error) {
        self.push("error");
    }

    fn on_finally(&self, snapshot: &StateSnapshot) {
        self.push("finally");
        self.finals.lock().unwrap().push(snapshot.clone());
    }
}

/// Download config with short delays so retry tests stay fast
pub fn fast_download_config(retries: u32) -> DownloadConfig {
    DownloadConfig {
        retries,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        ..DownloadConfig::default()
    }
}
