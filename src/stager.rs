//! Staging of remote items into scratch space.

use crate::asset_store::AssetStore;
use crate::error::SimStageError;
use crate::metrics::ARCHIVE_MEMBERS_EXTRACTED;
use crate::resource_manager::ResourceManager;
use crate::scratch::ScratchDir;

use flate2::bufread::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// First two bytes of a gzip stream
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Download an item into a scratch directory, extracting it if it is a compressed tar archive.
///
/// Returns the root beneath which the staged files live: the scratch directory itself when the
/// item was a single file, or the item's directory when it held several files.
///
/// # Arguments
///
/// * `store`: Asset store
/// * `token`: Caller's asset store token
/// * `item_id`: ID of the item to stage
/// * `scratch`: Scratch directory owned by the request
/// * `resource_manager`: ResourceManager object
#[tracing::instrument(level = "DEBUG", skip(store, token, scratch, resource_manager))]
pub async fn stage(
    store: &dyn AssetStore,
    token: &str,
    item_id: &str,
    scratch: &ScratchDir,
    resource_manager: &ResourceManager,
) -> Result<PathBuf, SimStageError> {
    let downloaded = store
        .download_item(token, item_id, scratch.path(), resource_manager)
        .await?;
    if downloaded.is_dir() {
        return Ok(downloaded);
    }
    if is_archive(&downloaded)? {
        let into = scratch.path().to_owned();
        let members =
            tokio::task::spawn_blocking(move || extract(&downloaded, &into)).await??;
        tracing::debug!(members, "extracted archive");
        ARCHIVE_MEMBERS_EXTRACTED.inc_by(members);
    }
    Ok(scratch.path().to_owned())
}

/// Whether a downloaded file is a gzip-compressed archive, by name or by content.
fn is_archive(path: &Path) -> Result<bool, SimStageError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        return Ok(true);
    }
    let mut magic = [0; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Extract every member of a gzip-compressed tar archive, then remove the archive.
///
/// Returns the number of members extracted. Members that would land outside `into` are skipped.
pub fn extract(archive: &Path, into: &Path) -> Result<u64, SimStageError> {
    let corrupt = |source: std::io::Error| SimStageError::CorruptArchive {
        path: archive.display().to_string(),
        source,
    };
    let file = File::open(archive).map_err(corrupt)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut members = 0;
    for entry in tar.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if entry.unpack_in(into).map_err(corrupt)? {
            members += 1;
        } else {
            tracing::warn!(
                member = %entry.path().map(|p| p.display().to_string()).unwrap_or_default(),
                "skipped archive member outside extraction root"
            );
        }
    }
    std::fs::remove_file(archive)?;
    Ok(members)
}
