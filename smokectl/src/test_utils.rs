//! Shared helpers for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum_test::TestServer;

use crate::config::Config;
use crate::notifications::Notifier;
use crate::probes::SmokeRunner;
use crate::{AppState, build_router};

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        // The Prometheus recorder is process-global; tests opt in explicitly
        enable_metrics: false,
        ..Default::default()
    }
}

/// Notifier that records every message instead of delivering it.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}

pub fn create_test_state(config: Config, notifier: Arc<dyn Notifier>) -> AppState {
    let runner = SmokeRunner::new(config.smoke.clone(), notifier).expect("Failed to create runner");
    AppState::builder().config(config).runner(Arc::new(runner)).build()
}

pub fn create_test_app(notifier: Arc<RecordingNotifier>) -> TestServer {
    let state = create_test_state(create_test_config(), notifier);
    let router = build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
