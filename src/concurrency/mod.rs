//! Concurrent primitives: bounded MPMC queue, keyed map, block free-list and
//! the scatter-gather I/O buffer built on top of it. See spec §4.1-§4.3.

pub mod buffer;
pub mod freelist;
pub mod map;
pub mod queue;

pub use buffer::{Block, BlockPool, Buffer, BLOCK_CAPACITY};
pub use freelist::Freelist;
pub use map::{ConcurrentMap, MapError};
pub use queue::{ConcurrentQueue, QueueError};
