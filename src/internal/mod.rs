//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod sharded;
pub(crate) mod waits;

pub(crate) use circular::ResolutionPath;
pub(crate) use sharded::ShardedMap;
pub(crate) use waits::{WaitGraph, WaitGuard};
