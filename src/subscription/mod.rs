//! Aggregation of independent consumers' subscription intents.

pub mod merge;
pub mod registry;

pub use merge::{comment_threads, merge_intents};
pub use registry::{RegistryChange, SubscriptionRegistry, SubscriptionSnapshot};
