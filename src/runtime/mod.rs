//! Single-writer async runtime and event stream APIs.

/// Per-listener fan-out of change events.
pub mod broadcaster;
/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
