//! Task lifecycle: one broadcast shutdown signal and a join barrier.

pub mod shutdown;
pub mod tasks;

pub use shutdown::ShutdownSignal;
pub use tasks::TaskGroup;
