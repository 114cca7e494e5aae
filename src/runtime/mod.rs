// Runtime half of the recompiler: the executable mapping and its W^X protocol, the block
// cache that fills it, the call view over a cached routine, and the dispatcher the
// renderer calls once per span.

//! Executable memory, block cache and span dispatch.

pub mod cache;
pub mod dispatch;
pub mod memory;
pub mod routine;

pub use cache::{BlockCache, CacheStats, SlotStatus};
pub use dispatch::{DispatchStats, Dispatcher};
pub use memory::{ActiveBackend, ExecutableRegion, NoToggle, ProtectionBackend, ToggleRestore, WritableScope};
pub use routine::{GeneratedRoutine, SpanFn};
