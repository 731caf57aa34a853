// Service Lifecycle Manager
// Brackets a batch with one start and one stop of the shared service

use crate::port::{ServiceError, ServiceHandle, ServiceOptions, SharedService};
use std::sync::Arc;
use tracing::{info, warn};

/// Starts the shared service for a batch
pub struct ServiceLifecycle {
    service: Arc<dyn SharedService>,
}

impl ServiceLifecycle {
    pub fn new(service: Arc<dyn SharedService>) -> Self {
        Self { service }
    }

    /// Start the service and wait for it to be ready.
    ///
    /// The returned guard must be consumed by `stop` or `detach`; both take
    /// it by value so a batch cannot stop the service twice.
    pub async fn start(&self, options: &ServiceOptions) -> Result<RunningService, ServiceError> {
        info!(
            log_output = ?options.log_output,
            with_credentials = options.credentials.is_some(),
            "Starting shared service"
        );
        let handle = self.service.start(options).await?;
        info!(service = %handle.name(), pid = ?handle.pid(), "Shared service started");

        Ok(RunningService {
            service: Arc::clone(&self.service),
            handle: Arc::new(handle),
            released: false,
        })
    }
}

/// A started shared service owned by one batch
pub struct RunningService {
    service: Arc<dyn SharedService>,
    handle: Arc<ServiceHandle>,
    released: bool,
}

impl RunningService {
    /// Read-only handle distributed to tasks
    pub fn handle(&self) -> Arc<ServiceHandle> {
        Arc::clone(&self.handle)
    }

    pub async fn stop(mut self) -> Result<(), ServiceError> {
        self.released = true;
        info!(service = %self.handle.name(), "Stopping shared service");
        let result = self.service.stop(&self.handle).await;
        match &result {
            Ok(()) => info!(service = %self.handle.name(), "Shared service stopped"),
            Err(e) => warn!(service = %self.handle.name(), error = %e, "Shared service stop failed"),
        }
        result
    }

    /// Leave the service running (kept for diagnostics after a failed batch)
    pub fn detach(mut self) -> Arc<ServiceHandle> {
        self.released = true;
        warn!(
            service = %self.handle.name(),
            pid = ?self.handle.pid(),
            "Leaving shared service running"
        );
        Arc::clone(&self.handle)
    }
}

impl Drop for RunningService {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                service = %self.handle.name(),
                "Shared service guard dropped without stop (batch future cancelled?)"
            );
        }
    }
}
