//! fers-storage: key/value object stores behind one async contract

pub mod fs;
pub mod health;
pub mod operator;
pub mod remote;
pub mod store;

pub use fs::FsStore;
pub use health::check_health;
pub use operator::{build_store, Credentials};
pub use remote::OpendalStore;
pub use store::ObjectStore;
