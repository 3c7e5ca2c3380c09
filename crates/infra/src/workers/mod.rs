//! Background workers consuming the movement bus.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
