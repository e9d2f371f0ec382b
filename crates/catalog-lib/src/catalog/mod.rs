//! Instance-type catalog assembly and caching

mod cache;
mod provider;

#[cfg(test)]
mod tests;

pub use cache::TtlCache;
pub use provider::{InstanceTypeProvider, SkipReason};
