//! Resolution of group timesteps to archive items.

use crate::asset_store::AssetStore;
use crate::error::SimStageError;
use crate::models::{timestep_item_name, Folder, Item, ParentType};

/// Name of the folder beneath a group that holds timestep archives
pub const TIMESTEPS_FOLDER: &str = "timesteps";

/// Find a group's timesteps folder.
///
/// # Arguments
///
/// * `store`: Asset store
/// * `token`: Caller's asset store token
/// * `group_id`: ID of the group folder
#[tracing::instrument(level = "DEBUG", skip(store, token))]
pub async fn timesteps_folder(
    store: &dyn AssetStore,
    token: &str,
    group_id: &str,
) -> Result<Folder, SimStageError> {
    store
        .list_folders(token, group_id, ParentType::Folder, Some(TIMESTEPS_FOLDER))
        .await?
        .into_iter()
        .find(|folder| folder.name == TIMESTEPS_FOLDER)
        .ok_or_else(|| {
            SimStageError::not_found(format!("{} folder of group {}", TIMESTEPS_FOLDER, group_id))
        })
}

/// Find the unique archive item holding a timestep of a group.
///
/// Fails with `NotFound` if no item matches, or `AmbiguousResult` if more than one does.
#[tracing::instrument(level = "DEBUG", skip(store, token))]
pub async fn locate_timestep_item(
    store: &dyn AssetStore,
    token: &str,
    group_id: &str,
    timestep: i64,
) -> Result<Item, SimStageError> {
    let folder = timesteps_folder(store, token, group_id).await?;
    let name = timestep_item_name(timestep);
    let mut items: Vec<Item> = store
        .list_items(token, &folder.id, Some(&name))
        .await?
        .into_iter()
        .filter(|item| item.name == name)
        .collect();
    match items.len() {
        0 => Err(SimStageError::not_found(format!(
            "timestep {} of group {}",
            timestep, group_id
        ))),
        1 => Ok(items.remove(0)),
        count => Err(SimStageError::AmbiguousResult { name, count }),
    }
}

/// Parse the timestep from an archive item name: the integer before the first `.`.
pub fn parse_timestep(name: &str) -> Result<i64, SimStageError> {
    let prefix = name.split('.').next().unwrap_or_default();
    prefix
        .parse()
        .map_err(|_| SimStageError::MalformedName {
            name: name.to_string(),
        })
}

/// List the timesteps of a group in ascending numeric order.
///
/// Any item whose name lacks an integer prefix fails the whole listing.
#[tracing::instrument(level = "DEBUG", skip(store, token))]
pub async fn list_timesteps(
    store: &dyn AssetStore,
    token: &str,
    group_id: &str,
) -> Result<Vec<i64>, SimStageError> {
    let folder = timesteps_folder(store, token, group_id).await?;
    let mut timesteps = store
        .list_items(token, &folder.id, None)
        .await?
        .iter()
        .map(|item| parse_timestep(&item.name))
        .collect::<Result<Vec<i64>, SimStageError>>()?;
    timesteps.sort_unstable();
    Ok(timesteps)
}
