// Shared Service Port
// Abstraction over the one heavyweight dependency every connector pipeline
// needs (a container daemon), started once and stopped once per batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::RegistryCredentials;

/// Shared service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Start failed: {0}")]
    StartFailed(String),

    #[error("Service not ready after {0}ms")]
    NotReady(u64),

    #[error("Stop failed: {0}")]
    StopFailed(String),

    #[error("Cannot open log output {path}: {message}")]
    LogOutput { path: PathBuf, message: String },
}

/// Where the service writes its low-level execution logs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogDestination {
    #[default]
    Stderr,
    File(PathBuf),
}

/// Options passed to `SharedService::start`
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub log_output: LogDestination,
    pub credentials: Option<RegistryCredentials>,
}

/// Read-only handle to a started service.
///
/// Tasks receive it behind an `Arc`; it exposes no way to stop the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    name: String,
    pid: Option<u32>,
    endpoint: Option<String>,
    started_at: DateTime<Utc>,
}

impl ServiceHandle {
    pub fn new(name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            pid: None,
            endpoint: None,
            started_at,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Shared Service trait
///
/// Implementations:
/// - ProcessService: spawns the daemon as a child process
/// - MockSharedService: counts lifecycle calls (tests)
#[async_trait]
pub trait SharedService: Send + Sync {
    /// Start the service and wait until it is ready
    ///
    /// # Errors
    /// - ServiceError::StartFailed if the service cannot be launched
    /// - ServiceError::NotReady if it never became ready
    /// - ServiceError::LogOutput if the log destination cannot be opened
    async fn start(&self, options: &ServiceOptions) -> Result<ServiceHandle, ServiceError>;

    /// Stop a service previously returned by `start`
    async fn stop(&self, handle: &ServiceHandle) -> Result<(), ServiceError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock shared service recording lifecycle calls
    #[derive(Default)]
    pub struct MockSharedService {
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        running: AtomicBool,
        fail_start: bool,
        fail_stop: bool,
        last_options: Mutex<Option<ServiceOptions>>,
    }

    impl MockSharedService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_start() -> Self {
            Self {
                fail_start: true,
                ..Self::default()
            }
        }

        pub fn failing_stop() -> Self {
            Self {
                fail_stop: true,
                ..Self::default()
            }
        }

        pub fn start_calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst)
        }

        pub fn stop_calls(&self) -> usize {
            self.stop_calls.load(Ordering::SeqCst)
        }

        pub fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        pub fn last_options(&self) -> Option<ServiceOptions> {
            self.last_options.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SharedService for MockSharedService {
        async fn start(&self, options: &ServiceOptions) -> Result<ServiceHandle, ServiceError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_options.lock().unwrap() = Some(options.clone());

            if self.fail_start {
                return Err(ServiceError::StartFailed("mock start failure".to_string()));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(ServiceHandle::new("mock-dockerd", Utc::now()).with_endpoint("tcp://mock:2375"))
        }

        async fn stop(&self, _handle: &ServiceHandle) -> Result<(), ServiceError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(ServiceError::StopFailed("mock stop failure".to_string()));
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }
}
