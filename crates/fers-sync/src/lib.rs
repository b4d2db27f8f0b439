//! fers-sync: encrypted transfer and reconciliation between a working
//! directory and an object store

pub mod engine;
pub mod guard;
pub mod plan;
pub mod scan;

pub use engine::{ProgressFn, SyncEngine, SyncReport};
pub use guard::WorkingDirectory;
pub use plan::SyncPlan;
pub use scan::{FileWalker, ScanFilter};
