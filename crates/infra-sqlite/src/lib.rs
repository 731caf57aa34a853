// Connectors CI Infrastructure - SQLite Adapter
// Implements: ReportStore

mod connection;
mod migration;
mod report_store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use report_store::SqliteReportStore;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
