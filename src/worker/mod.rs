//! Worker Factory & Registry (C3): provisions workers on a backend and
//! tracks their registration/assignment/release lifecycle.

pub mod factory;
pub mod registry;

pub use factory::{DockerWorkerFactory, WorkerFactory};
pub use registry::WorkerRegistry;
