// Application Layer - Use Cases and Business Logic

pub mod batch;
pub mod classifier;
pub mod constants;
pub mod lifecycle;
pub mod limiter;
pub mod report;

// Re-exports
pub use batch::{BatchConfig, BatchRunner, ConnectorPipeline, TaskEnv};
pub use classifier::{classify, classify_all};
pub use lifecycle::{RunningService, ServiceLifecycle};
pub use limiter::{ConcurrencyConfig, ConcurrencyGate, ConcurrencyLimiter, GatePermit};
pub use report::ReportAggregator;
