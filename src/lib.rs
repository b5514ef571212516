// Library crate exposing modules for the binary and integration tests

pub mod aggregator;
pub mod crawler;
pub mod error;
pub mod format;
pub mod options;
pub mod task;
pub mod watch;

pub use aggregator::{compute_size, SizeAggregator, SizeReport};
pub use error::TraversalError;
pub use options::{AggregatorOptions, LinkPolicy, UnreadablePolicy};
