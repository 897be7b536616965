//! Runtime adapters that drive admitted operations.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
