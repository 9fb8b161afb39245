//! In-memory project store
//!
//! Backs tests and local runs. Each instance owns its own map; nothing is
//! shared between instances.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use tubeflow_common::Result;

use super::ProjectStore;
use crate::domain::entities::{Project, ProjectSnapshot, StageRecord};

#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<Uuid, ProjectSnapshot>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored projects
    pub async fn len(&self) -> usize {
        self.projects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.projects.read().await.is_empty()
    }

    /// Drop every stored project
    pub async fn clear(&self) {
        self.projects.write().await.clear();
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get(&self, id: Uuid) -> Result<Option<ProjectSnapshot>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn save(&self, project: &Project, stages: &[StageRecord]) -> Result<()> {
        let snapshot = ProjectSnapshot::from_parts(project.clone(), stages.to_vec())?;
        self.projects.write().await.insert(project.id, snapshot);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.projects.write().await.remove(&id).is_some())
    }
}
