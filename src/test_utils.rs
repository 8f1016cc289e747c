//! Helpers shared by unit tests: an in-memory asset store, a container writer, archive builders
//! and stand-in encoder executables.

use crate::asset_store::{local_name, AssetStore};
use crate::error::SimStageError;
use crate::models::{Folder, Item, ParentType};
use crate::resource_manager::ResourceManager;

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Content of a mock item.
#[derive(Clone, Debug)]
enum Content {
    /// One file named like the item
    File(Vec<u8>),
    /// Several named files
    Files(Vec<(String, Vec<u8>)>),
}

/// An in-memory [AssetStore].
#[derive(Debug, Default)]
pub(crate) struct MockAssetStore {
    folders: Vec<(String, Folder)>,
    items: Vec<(String, Item)>,
    contents: HashMap<String, Content>,
    token: Option<String>,
}

impl MockAssetStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reject every request not carrying this token.
    pub(crate) fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub(crate) fn add_folder(&mut self, parent_id: &str, id: &str, name: &str) {
        self.folders.push((
            parent_id.to_string(),
            Folder {
                id: id.to_string(),
                name: name.to_string(),
            },
        ));
    }

    fn push_item(&mut self, folder_id: &str, id: &str, name: &str, content: Content) {
        self.items.push((
            folder_id.to_string(),
            Item {
                id: id.to_string(),
                name: name.to_string(),
                folder_id: Some(folder_id.to_string()),
            },
        ));
        self.contents.insert(id.to_string(), content);
    }

    /// Add an item holding one empty file.
    pub(crate) fn add_item(&mut self, folder_id: &str, id: &str, name: &str) {
        self.push_item(folder_id, id, name, Content::File(vec![]))
    }

    /// Add an item holding one file named like the item.
    pub(crate) fn add_item_file(&mut self, folder_id: &str, id: &str, name: &str, data: &[u8]) {
        self.push_item(folder_id, id, name, Content::File(data.to_vec()))
    }

    /// Add an item holding several files.
    pub(crate) fn add_item_files(
        &mut self,
        folder_id: &str,
        id: &str,
        name: &str,
        files: &[(&str, &[u8])],
    ) {
        let files = files
            .iter()
            .map(|(name, data)| (name.to_string(), data.to_vec()))
            .collect();
        self.push_item(folder_id, id, name, Content::Files(files))
    }

    fn check_token(&self, token: &str, resource: String) -> Result<(), SimStageError> {
        match &self.token {
            Some(expected) if expected != token => Err(SimStageError::Unauthorised { resource }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl AssetStore for MockAssetStore {
    async fn list_folders(
        &self,
        token: &str,
        parent_id: &str,
        _parent_type: ParentType,
        name: Option<&str>,
    ) -> Result<Vec<Folder>, SimStageError> {
        self.check_token(token, format!("folder/{}", parent_id))?;
        Ok(self
            .folders
            .iter()
            .filter(|(parent, folder)| {
                parent == parent_id && name.map(|name| name == folder.name).unwrap_or(true)
            })
            .map(|(_, folder)| folder.clone())
            .collect())
    }

    async fn list_items(
        &self,
        token: &str,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<Item>, SimStageError> {
        self.check_token(token, format!("folder/{}", folder_id))?;
        Ok(self
            .items
            .iter()
            .filter(|(folder, item)| {
                folder == folder_id && name.map(|name| name == item.name).unwrap_or(true)
            })
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn download_item(
        &self,
        token: &str,
        item_id: &str,
        dest: &Path,
        _resource_manager: &ResourceManager,
    ) -> Result<PathBuf, SimStageError> {
        let resource = format!("item/{}", item_id);
        self.check_token(token, resource.clone())?;
        let item = self
            .items
            .iter()
            .map(|(_, item)| item)
            .find(|item| item.id == item_id)
            .ok_or_else(|| SimStageError::not_found(resource))?;
        let name = local_name(&item.name)?;
        match &self.contents[item_id] {
            Content::File(data) => {
                let path = dest.join(name);
                std::fs::write(&path, data)?;
                Ok(path)
            }
            Content::Files(files) => {
                let dir = dest.join(name);
                std::fs::create_dir_all(&dir)?;
                for (file_name, data) in files {
                    std::fs::write(dir.join(file_name), data)?;
                }
                Ok(dir)
            }
        }
    }
}

/// Values of a variable to be written by [NcWriter].
#[derive(Clone, Debug)]
enum NcData {
    Byte(Vec<i8>),
    Char(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// A variable to be written by [NcWriter], its dimensions given by position.
#[derive(Clone, Debug)]
pub(crate) struct NcVar {
    name: String,
    dim_ids: Vec<usize>,
    data: NcData,
}

macro_rules! nc_var_constructor {
    ($fn:ident, $t:ty, $variant:ident) => {
        pub(crate) fn $fn(name: &str, dim_ids: &[usize], values: &[$t]) -> Self {
            Self {
                name: name.to_string(),
                dim_ids: dim_ids.to_vec(),
                data: NcData::$variant(values.to_vec()),
            }
        }
    };
}

impl NcVar {
    nc_var_constructor!(byte, i8, Byte);
    nc_var_constructor!(short, i16, Short);
    nc_var_constructor!(int, i32, Int);
    nc_var_constructor!(float, f32, Float);
    nc_var_constructor!(double, f64, Double);

    pub(crate) fn text(name: &str, dim_ids: &[usize], text: &str) -> Self {
        Self {
            name: name.to_string(),
            dim_ids: dim_ids.to_vec(),
            data: NcData::Char(text.as_bytes().to_vec()),
        }
    }
}

/// Writes NetCDF classic files for tests through [netcdf3::FileWriter].
#[derive(Clone, Debug)]
pub(crate) struct NcWriter {
    version: netcdf3::Version,
    numrecs: usize,
    dims: Vec<(String, usize)>,
    attributes: Vec<(String, String)>,
    vars: Vec<NcVar>,
}

impl NcWriter {
    /// CDF-1 writer
    pub(crate) fn new() -> Self {
        Self {
            version: netcdf3::Version::Classic,
            numrecs: 0,
            dims: vec![],
            attributes: vec![],
            vars: vec![],
        }
    }

    /// CDF-2 writer
    pub(crate) fn cdf2() -> Self {
        Self {
            version: netcdf3::Version::Offset64Bit,
            ..Self::new()
        }
    }

    /// Add a dimension. A length of zero declares the unlimited dimension.
    pub(crate) fn dimension(mut self, name: &str, length: usize) -> Self {
        self.dims.push((name.to_string(), length));
        self
    }

    pub(crate) fn attribute_text(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub(crate) fn records(mut self, numrecs: usize) -> Self {
        self.numrecs = numrecs;
        self
    }

    pub(crate) fn variable(mut self, var: NcVar) -> Self {
        self.vars.push(var);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut data_set = netcdf3::DataSet::new();
        for (name, len) in &self.dims {
            match len {
                0 => data_set.set_unlimited_dim(name.as_str(), self.numrecs),
                len => data_set.add_fixed_dim(name.as_str(), *len),
            }
            .unwrap();
        }
        for (name, value) in &self.attributes {
            data_set
                .add_global_attr_string(name.as_str(), value.as_str())
                .unwrap();
        }
        for var in &self.vars {
            let dims: Vec<&str> = var
                .dim_ids
                .iter()
                .map(|id| self.dims[*id].0.as_str())
                .collect();
            match var.data {
                NcData::Byte(_) => data_set.add_var_i8(&var.name, &dims[..]),
                NcData::Char(_) => data_set.add_var_u8(&var.name, &dims[..]),
                NcData::Short(_) => data_set.add_var_i16(&var.name, &dims[..]),
                NcData::Int(_) => data_set.add_var_i32(&var.name, &dims[..]),
                NcData::Float(_) => data_set.add_var_f32(&var.name, &dims[..]),
                NcData::Double(_) => data_set.add_var_f64(&var.name, &dims[..]),
            }
            .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.nc");
        let mut writer = netcdf3::FileWriter::open(&path).unwrap();
        writer.set_def(&data_set, self.version.clone(), 0).unwrap();
        for var in &self.vars {
            match &var.data {
                NcData::Byte(values) => writer.write_var_i8(&var.name, values),
                NcData::Char(values) => writer.write_var_u8(&var.name, values),
                NcData::Short(values) => writer.write_var_i16(&var.name, values),
                NcData::Int(values) => writer.write_var_i32(&var.name, values),
                NcData::Float(values) => writer.write_var_f32(&var.name, values),
                NcData::Double(values) => writer.write_var_f64(&var.name, values),
            }
            .unwrap();
        }
        writer.close().unwrap();
        std::fs::read(&path).unwrap()
    }
}

fn gz_builder() -> tar::Builder<GzEncoder<Vec<u8>>> {
    tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()))
}

fn gz_finish(builder: tar::Builder<GzEncoder<Vec<u8>>>) -> Vec<u8> {
    builder.into_inner().unwrap().finish().unwrap()
}

/// Build a gzip-compressed tar archive from (path, content) pairs.
pub(crate) fn tgz(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = gz_builder();
    for (path, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    gz_finish(builder)
}

/// Like [tgz], but writes member names verbatim, including unsafe ones.
pub(crate) fn tgz_raw(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = gz_builder();
    for (path, data) in members {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    gz_finish(builder)
}

/// A timestep archive holding one container with a 2x3 `psi_0` variable.
pub(crate) fn timestep_archive() -> Vec<u8> {
    let container = NcWriter::new()
        .dimension("nx", 3)
        .dimension("ny", 2)
        .variable(NcVar::double(
            "psi_0",
            &[1, 0],
            &[0.0, 0.5, 1.0, 1.5, 2.0, f64::NAN],
        ))
        .variable(NcVar::int("step", &[], &[11630]))
        .build();
    tgz(&[("diag1D.0.0001.nc", container.as_slice())])
}

/// Stand-in encoder executables, written together once for the whole test run.
struct Encoders {
    ok: PathBuf,
    fail: PathBuf,
    sleep: PathBuf,
}

fn encoders() -> &'static Encoders {
    use std::os::unix::fs::PermissionsExt;

    static ENCODERS: OnceLock<Encoders> = OnceLock::new();
    ENCODERS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap().into_path();
        let script = |name: &str, body: &str| {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };
        Encoders {
            ok: script("ffmpeg-ok", r#"for last; do :; done; echo "$@" > "$last""#),
            fail: script("ffmpeg-fail", "echo 'fake encoder failure' >&2; exit 1"),
            sleep: script("ffmpeg-sleep", "exec sleep 30"),
        }
    })
}

/// An encoder that writes its arguments to its last argument.
pub(crate) fn fake_ffmpeg() -> PathBuf {
    encoders().ok.clone()
}

/// An encoder that always fails.
pub(crate) fn failing_ffmpeg() -> PathBuf {
    encoders().fail.clone()
}

/// An encoder that never finishes.
pub(crate) fn sleeping_ffmpeg() -> PathBuf {
    encoders().sleep.clone()
}
