pub mod error;
pub mod snapshot;
pub mod stats;
