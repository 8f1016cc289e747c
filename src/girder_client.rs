//! Girder REST API client.

use crate::asset_store::{local_name, AssetStore};
use crate::error::SimStageError;
use crate::metrics::ITEM_DOWNLOAD_BYTES;
use crate::models::{Folder, Item, ItemFile, ParentType, RemoteError};
use crate::resource_manager::ResourceManager;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Header carrying the caller's Girder token
static HEADER_GIRDER_TOKEN: &str = "Girder-Token";

/// HTTP client for a Girder server.
///
/// Implements [AssetStore] using the Girder REST API.
#[derive(Debug)]
pub struct GirderClient {
    reqwest_client: reqwest::Client,
    api_url: Url,
}

impl GirderClient {
    /// Create a new Girder client.
    ///
    /// # Arguments
    ///
    /// * `api_url`: Base URL of the REST API, e.g. `http://localhost:8080/api/v1/`
    pub fn new(api_url: &Url) -> Self {
        Self {
            reqwest_client: reqwest::Client::new(),
            api_url: api_url.clone(),
        }
    }

    /// Returns the URL of an API endpoint, percent-encoding each path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send an authenticated GET request and check the response status.
    async fn get(
        &self,
        token: &str,
        url: Url,
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<reqwest::Response, SimStageError> {
        let response = self
            .reqwest_client
            .get(url)
            .header(HEADER_GIRDER_TOKEN, token)
            .query(query)
            .send()
            .await?;
        check_status(response, resource).await
    }

    /// Send an authenticated GET request and deserialise the JSON response.
    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        segments: &[&str],
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<T, SimStageError> {
        let url = self.endpoint(segments);
        Ok(self.get(token, url, query, resource).await?.json().await?)
    }

    /// Stream one file to a local path.
    #[tracing::instrument(level = "DEBUG", skip(self, token, resource_manager))]
    async fn download_file(
        &self,
        token: &str,
        file: &ItemFile,
        path: &Path,
        resource_manager: &ResourceManager,
    ) -> Result<(), SimStageError> {
        // Acquire connection permit to be freed via drop when this function returns
        let _conn_permits = resource_manager.connection().await?;
        let resource = format!("file/{}", file.id);
        let url = self.endpoint(&["file", &file.id, "download"]);
        let mut response = self.get(token, url, &[], &resource).await?;
        let mut out = tokio::fs::File::create(path).await?;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            ITEM_DOWNLOAD_BYTES.inc_by(chunk.len() as u64);
        }
        out.flush().await?;
        Ok(())
    }
}

/// Map an unsuccessful response to an error.
async fn check_status(
    response: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, SimStageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let resource = resource.to_string();
    match status {
        reqwest::StatusCode::UNAUTHORIZED => Err(SimStageError::Unauthorised { resource }),
        reqwest::StatusCode::FORBIDDEN => Err(SimStageError::Forbidden { resource }),
        reqwest::StatusCode::NOT_FOUND => Err(SimStageError::not_found(resource)),
        _ => {
            let body = response.text().await.unwrap_or_default();
            // Girder reports errors as {"message": ..., "type": ...}.
            let message = serde_json::from_str::<RemoteError>(&body)
                .map(|error| error.message)
                .unwrap_or(body);
            Err(SimStageError::RemoteStore {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl AssetStore for GirderClient {
    #[tracing::instrument(level = "DEBUG", skip(self, token))]
    async fn list_folders(
        &self,
        token: &str,
        parent_id: &str,
        parent_type: ParentType,
        name: Option<&str>,
    ) -> Result<Vec<Folder>, SimStageError> {
        let parent_type = parent_type.to_string();
        let mut query = vec![
            ("parentType", parent_type.as_str()),
            ("parentId", parent_id),
            ("limit", "0"),
        ];
        if let Some(name) = name {
            query.push(("name", name));
        }
        let resource = format!("{}/{}", parent_type, parent_id);
        self.get_json(token, &["folder"], &query, &resource).await
    }

    #[tracing::instrument(level = "DEBUG", skip(self, token))]
    async fn list_items(
        &self,
        token: &str,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<Item>, SimStageError> {
        let mut query = vec![("folderId", folder_id), ("limit", "0")];
        if let Some(name) = name {
            query.push(("name", name));
        }
        let resource = format!("folder/{}", folder_id);
        self.get_json(token, &["item"], &query, &resource).await
    }

    #[tracing::instrument(level = "DEBUG", skip(self, token, resource_manager))]
    async fn download_item(
        &self,
        token: &str,
        item_id: &str,
        dest: &Path,
        resource_manager: &ResourceManager,
    ) -> Result<PathBuf, SimStageError> {
        let resource = format!("item/{}", item_id);
        let item: Item = self
            .get_json(token, &["item", item_id], &[], &resource)
            .await?;
        let files: Vec<ItemFile> = self
            .get_json(token, &["item", item_id, "files"], &[("limit", "0")], &resource)
            .await?;
        let item_name = local_name(&item.name)?;

        if let [file] = &files[..] {
            if file.name == item.name {
                let path = dest.join(item_name);
                self.download_file(token, file, &path, resource_manager)
                    .await?;
                return Ok(path);
            }
        }

        let dir = dest.join(item_name);
        tokio::fs::create_dir_all(&dir).await?;
        for file in &files {
            let path = dir.join(local_name(&file.name)?);
            self.download_file(token, file, &path, resource_manager)
                .await?;
        }
        Ok(dir)
    }
}
