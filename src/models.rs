//! Data types and associated functions and methods

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::Validate;

/// Kind of entity that owns a folder in the asset store
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParentType {
    Collection,
    Folder,
    User,
}

/// A folder in the asset store
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

/// An item in the asset store. Items hold one or more files.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "folderId", default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// A file belonging to an item
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ItemFile {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// Error body returned by the asset store
#[derive(Debug, Deserialize)]
pub struct RemoteError {
    pub message: String,
}

/// Health check response body
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct Health {
    pub status: String,
}

impl Health {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

/// Output format of the plot endpoint
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlotFormat {
    /// Nested JSON arrays
    Plotly,
    /// Not implemented: yields an empty body
    Vtk,
}

/// Query parameters of the plot endpoint
#[derive(Debug, Deserialize, Validate)]
pub struct PlotQuery {
    pub format: PlotFormat,
}

/// Query parameters of the movie endpoint
#[derive(Debug, Default, Deserialize, Validate)]
pub struct MovieQuery {
    /// Frames per second, overriding the configured default
    #[validate(range(min = 1, max = 120))]
    pub framerate: Option<u32>,
}

/// Path parameters identifying a group
#[derive(Debug, Deserialize)]
pub struct GroupPath {
    pub group_id: String,
}

/// Path parameters identifying one timestep of a group
#[derive(Debug, Deserialize)]
pub struct TimestepPath {
    pub group_id: String,
    pub timestep: i64,
}

/// Path parameters of the plot endpoint
#[derive(Debug, Deserialize)]
pub struct PlotPath {
    pub group_id: String,
    pub variable_id: String,
    pub timestep: i64,
}

/// Path parameters of the movie endpoint
#[derive(Debug, Deserialize)]
pub struct MoviePath {
    pub item_id: String,
}

/// Name of the archive item holding a timestep.
pub fn timestep_item_name(timestep: i64) -> String {
    format!("{}.tgz", timestep)
}
