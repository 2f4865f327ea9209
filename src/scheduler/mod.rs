pub mod controller;
mod loop_worker;

pub use controller::{FlushFn, FlushFuture, FlushReason, FlushScheduler};
