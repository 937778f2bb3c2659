//! Destination registry and filename-prefix routing
//!
//! - [`DestinationRegistry`] - named remote endpoints, loaded once per configuration
//! - [`PatternRouter`] - first-match prefix rules with an `all`/list default
//!
//! Both are immutable after construction and are shared read-only between
//! ingress sources and dispatch workers.

mod registry;
mod router;

pub use registry::{Destination, DestinationRegistry};
pub use router::PatternRouter;
