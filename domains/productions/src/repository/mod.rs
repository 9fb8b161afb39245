//! Persistence for the Productions domain
//!
//! A `ProjectStore` owns projects and their stage records. Writes always
//! carry the project and all five stages together so readers never observe
//! a stage status without its matching artifact or error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use tubeflow_common::Result;

use crate::domain::entities::{Project, ProjectSnapshot, StageRecord};

pub use memory::InMemoryProjectStore;
pub use postgres::PgProjectStore;

/// Durable storage of projects keyed by project id
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Load a project and its stage records
    async fn get(&self, id: Uuid) -> Result<Option<ProjectSnapshot>>;

    /// Atomically write a project together with its stage records
    async fn save(&self, project: &Project, stages: &[StageRecord]) -> Result<()>;

    /// Delete a project and its stage records; returns whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}
