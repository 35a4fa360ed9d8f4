//! Typed deterministic concurrency for workflow code
//!
//! Everything here runs inside an execution and takes the execution's
//! [`Context`]. Values crossing into the engine are encoded as payloads and
//! decoded on the way out; decode failures are returned, never zeroed.

mod channel;
mod context;
mod future;
mod select;

pub use channel::{Channel, ReceiveChannel, SendChannel};
pub use context::Context;
pub use future::{new_future, Future, FutureResolver};
pub use select::{select, SelectCase};
