//! Interface to the remote asset store holding simulation archives and frame sequences.

use crate::error::SimStageError;
use crate::models::{Folder, Item, ParentType};
use crate::resource_manager::ResourceManager;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Asset store trait.
///
/// Defines the interface for listing and downloading remote assets. Every call carries the
/// caller's token, so one store may serve many users.
///
/// # Methods
/// * `list_folders`: List child folders of a parent.
/// * `list_items`: List items in a folder.
/// * `download_item`: Download an item's content to local disk.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// List folders beneath a parent, optionally filtered by exact name.
    ///
    /// # Arguments
    ///
    /// * `token`: Caller's asset store token
    /// * `parent_id`: ID of the parent entity
    /// * `parent_type`: Kind of the parent entity
    /// * `name`: Optional exact folder name
    async fn list_folders(
        &self,
        token: &str,
        parent_id: &str,
        parent_type: ParentType,
        name: Option<&str>,
    ) -> Result<Vec<Folder>, SimStageError>;

    /// List items in a folder, optionally filtered by exact name.
    ///
    /// # Arguments
    ///
    /// * `token`: Caller's asset store token
    /// * `folder_id`: ID of the folder
    /// * `name`: Optional exact item name
    async fn list_items(
        &self,
        token: &str,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<Item>, SimStageError>;

    /// Download an item into a local directory.
    ///
    /// An item holding a single file of the same name is written to `dest/<name>`. Any other
    /// item is written as a directory `dest/<item name>/` containing all of its files. Returns
    /// the path written.
    ///
    /// # Arguments
    ///
    /// * `token`: Caller's asset store token
    /// * `item_id`: ID of the item
    /// * `dest`: Existing local directory
    /// * `resource_manager`: ResourceManager object
    async fn download_item(
        &self,
        token: &str,
        item_id: &str,
        dest: &Path,
        resource_manager: &ResourceManager,
    ) -> Result<PathBuf, SimStageError>;
}

/// Returns a remote entity name as a single path component.
///
/// Names are chosen by remote users, so anything that would escape the destination directory is
/// rejected.
pub fn local_name(name: &str) -> Result<&str, SimStageError> {
    let path = Path::new(name);
    match path.file_name() {
        Some(file_name) if file_name == path.as_os_str() && name != "." && name != ".." => Ok(name),
        _ => Err(SimStageError::BadRequest {
            reason: format!("remote name {:?} is not a valid file name", name),
        }),
    }
}
