//! Resource management

use crate::error::SimStageError;

use tokio::sync::{Semaphore, SemaphorePermit};

/// [crate::resource_manager::ResourceManager] provides a simple way to allocate various resources
/// to tasks. Resource management is performed using a Tokio Semaphore for each type of resource.
#[derive(Debug)]
pub struct ResourceManager {
    /// Optional semaphore for asset store connections.
    connections: Option<Semaphore>,

    /// Optional semaphore for blocking decode tasks.
    tasks: Option<Semaphore>,

    /// Optional semaphore for concurrent encoder processes.
    transcodes: Option<Semaphore>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(
        connection_limit: Option<usize>,
        task_limit: Option<usize>,
        transcode_limit: Option<usize>,
    ) -> Self {
        Self {
            connections: connection_limit.map(Semaphore::new),
            tasks: task_limit.map(Semaphore::new),
            transcodes: transcode_limit.map(Semaphore::new),
        }
    }

    /// Acquire an asset store connection resource.
    pub async fn connection(&self) -> Result<Option<SemaphorePermit>, SimStageError> {
        optional_acquire(&self.connections).await
    }

    /// Acquire a task resource.
    pub async fn task(&self) -> Result<Option<SemaphorePermit>, SimStageError> {
        optional_acquire(&self.tasks).await
    }

    /// Acquire an encoder process resource.
    pub async fn transcode(&self) -> Result<Option<SemaphorePermit>, SimStageError> {
        optional_acquire(&self.transcodes).await
    }
}

/// Acquire a permit on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Semaphore>,
) -> Result<Option<SemaphorePermit>, SimStageError> {
    if let Some(sem) = sem {
        sem.acquire()
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}
