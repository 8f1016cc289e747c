//! Reader for scientific containers in the NetCDF classic binary format.
//!
//! Parsing is delegated to the [netcdf3] crate, which understands the classic (CDF-1) and 64-bit
//! offset (CDF-2) versions. Anything else, including the 64-bit data (CDF-5) version, fails with
//! [SimStageError::UnreadableContainer].
//!
//! A [Container] owns its open file. Dropping it closes the file.

use crate::error::SimStageError;

use netcdf3::{DataType, DataVector, FileReader};
use serde::Serialize;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use thiserror::Error;

/// Problems with the content of a container file.
#[derive(Debug, Error)]
pub enum FormatError {
    /// I/O error before the container could be parsed
    #[error("error reading file")]
    Io(#[source] std::io::Error),

    /// No file matched the container pattern
    #[error("no file matching {pattern} in staged archive")]
    Missing { pattern: String },

    /// A variable whose values are not numbers
    #[error("variable {name} has non-numeric type {dtype}")]
    NonNumeric { name: String, dtype: DType },

    /// The header could not be parsed
    #[error("not a NetCDF classic file: {0}")]
    Parse(String),

    /// The variable data could not be read
    #[error("failed to read variable {name}: {detail}")]
    Read { name: String, detail: String },

    /// The header declares more data than the file holds
    #[error("variable {name} is larger than the file")]
    TooLarge { name: String },
}

/// Element data types
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    /// [i8]
    Byte,
    /// Text, one byte per character
    Char,
    /// [i16]
    Short,
    /// [i32]
    Int,
    /// [f32]
    Float,
    /// [f64]
    Double,
}

impl DType {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::Byte | DType::Char => 1,
            DType::Short => 2,
            DType::Int | DType::Float => 4,
            DType::Double => 8,
        }
    }
}

impl From<DataType> for DType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::I8 => DType::Byte,
            DataType::U8 => DType::Char,
            DataType::I16 => DType::Short,
            DataType::I32 => DType::Int,
            DataType::F32 => DType::Float,
            DataType::F64 => DType::Double,
        }
    }
}

/// Decoded numeric values, in the container's native precision.
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// A variable read in full.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dtype: DType,
    /// Length of each dimension, outermost first. Empty for a scalar.
    pub shape: Vec<usize>,
    pub values: Values,
}

/// Summary of a variable, without its values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
}

/// Shape of a variable, with the unlimited dimension resolved to the record count.
fn shape(var: &netcdf3::Variable) -> Vec<usize> {
    var.get_dims().iter().map(|dim| dim.size()).collect()
}

/// An open container file.
pub struct Container {
    path: PathBuf,
    file_len: u64,
    reader: FileReader,
}

impl Container {
    /// Open a container read-only and parse its header.
    #[tracing::instrument(level = "DEBUG")]
    pub fn open(path: &Path) -> Result<Self, SimStageError> {
        let file_len = std::fs::metadata(path)
            .map_err(|err| SimStageError::unreadable(path, FormatError::Io(err)))?
            .len();
        let reader = FileReader::open(path).map_err(|err| {
            SimStageError::unreadable(path, FormatError::Parse(format!("{:?}", err)))
        })?;
        Ok(Self {
            path: path.to_owned(),
            file_len,
            reader,
        })
    }

    /// Summaries of all variables in the container, in header order.
    pub fn variables(&self) -> Vec<VariableInfo> {
        self.reader
            .data_set()
            .get_vars()
            .into_iter()
            .map(|var| VariableInfo {
                name: var.name().to_string(),
                dtype: var.data_type().into(),
                shape: shape(var),
            })
            .collect()
    }

    /// Read the full value of a named variable.
    #[tracing::instrument(level = "DEBUG", skip(self), fields(path = %self.path.display()))]
    pub fn read_variable(&mut self, name: &str) -> Result<Variable, SimStageError> {
        let (dtype, shape) = match self.reader.data_set().get_var(name) {
            Some(var) => (DType::from(var.data_type()), shape(var)),
            None => {
                return Err(SimStageError::VariableNotFound {
                    name: name.to_string(),
                })
            }
        };
        self.read(name, dtype, shape)
            .map_err(|err| SimStageError::unreadable(&self.path, err))
    }

    fn read(
        &mut self,
        name: &str,
        dtype: DType,
        shape: Vec<usize>,
    ) -> Result<Variable, FormatError> {
        if dtype == DType::Char {
            return Err(FormatError::NonNumeric {
                name: name.to_string(),
                dtype,
            });
        }

        // Bound the read by the file length before anything is allocated.
        let too_large = || FormatError::TooLarge {
            name: name.to_string(),
        };
        let bytes = shape
            .iter()
            .try_fold(dtype.size_of(), |acc, len| acc.checked_mul(*len))
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or_else(too_large)?;
        if bytes > self.file_len {
            return Err(too_large());
        }

        let data = self.reader.read_var(name).map_err(|err| FormatError::Read {
            name: name.to_string(),
            detail: format!("{:?}", err),
        })?;
        let values = match data {
            DataVector::I8(v) => Values::Byte(v),
            DataVector::U8(_) => {
                return Err(FormatError::NonNumeric {
                    name: name.to_string(),
                    dtype: DType::Char,
                })
            }
            DataVector::I16(v) => Values::Short(v),
            DataVector::I32(v) => Values::Int(v),
            DataVector::F32(v) => Values::Float(v),
            DataVector::F64(v) => Values::Double(v),
        };
        Ok(Variable {
            name: name.to_string(),
            dtype,
            shape,
            values,
        })
    }
}

/// Open a container, read one variable and close the container again.
///
/// # Arguments
///
/// * `path`: Path to the container file
/// * `name`: Name of the variable
pub fn read_variable(path: &Path, name: &str) -> Result<Variable, SimStageError> {
    Container::open(path)?.read_variable(name)
}

/// Find the container beneath an extraction root.
///
/// Returns the first regular file, in sorted path order, matching `pattern` relative to `root`.
pub fn find_container(root: &Path, pattern: &str) -> Result<PathBuf, SimStageError> {
    let full = Path::new(&glob::Pattern::escape(&root.to_string_lossy())).join(pattern);
    let mut matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    matches.sort();
    matches.into_iter().next().ok_or_else(|| {
        SimStageError::unreadable(
            root,
            FormatError::Missing {
                pattern: pattern.to_string(),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{NcVar, NcWriter};

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn psi_file() -> Vec<u8> {
        NcWriter::new()
            .dimension("nx", 3)
            .dimension("ny", 2)
            .attribute_text("title", "diag1D")
            .variable(NcVar::double("psi_0", &[1, 0], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
            .variable(NcVar::int("steps", &[0], &[7, 8, 9]))
            .build()
    }

    fn assert_unreadable(err: SimStageError) {
        assert!(
            matches!(err, SimStageError::UnreadableContainer { .. }),
            "unexpected error {}",
            err
        );
    }

    #[test]
    fn read_2d_double() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "diag.nc", &psi_file());
        let variable = read_variable(&path, "psi_0").unwrap();
        assert_eq!(vec![2, 3], variable.shape);
        assert_eq!(DType::Double, variable.dtype);
        assert_eq!(
            Values::Double(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            variable.values
        );
    }

    #[test]
    fn read_1d_int() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "diag.nc", &psi_file());
        let variable = read_variable(&path, "steps").unwrap();
        assert_eq!(vec![3], variable.shape);
        assert_eq!(Values::Int(vec![7, 8, 9]), variable.values);
    }

    #[test]
    fn read_scalar() {
        let bytes = NcWriter::new()
            .variable(NcVar::float("time", &[], &[0.5]))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "scalar.nc", &bytes);
        let variable = read_variable(&path, "time").unwrap();
        assert!(variable.shape.is_empty());
        assert_eq!(Values::Float(vec![0.5]), variable.values);
    }

    #[test]
    fn read_non_finite_passes_through() {
        let bytes = NcWriter::new()
            .dimension("n", 3)
            .variable(NcVar::double(
                "psi_0",
                &[0],
                &[f64::NAN, f64::INFINITY, f64::NEG_INFINITY],
            ))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "nan.nc", &bytes);
        match read_variable(&path, "psi_0").unwrap().values {
            Values::Double(values) => {
                assert!(values[0].is_nan());
                assert_eq!(f64::INFINITY, values[1]);
                assert_eq!(f64::NEG_INFINITY, values[2]);
            }
            values => panic!("unexpected values {:?}", values),
        }
    }

    #[test]
    fn read_record_variables() {
        let bytes = NcWriter::new()
            .dimension("time", 0)
            .dimension("n", 2)
            .records(3)
            .variable(NcVar::short("a", &[0, 1], &[1, 2, 3, 4, 5, 6]))
            .variable(NcVar::byte("b", &[0], &[-1, -2, -3]))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "rec.nc", &bytes);
        let mut container = Container::open(&path).unwrap();
        let a = container.read_variable("a").unwrap();
        assert_eq!(vec![3, 2], a.shape);
        assert_eq!(Values::Short(vec![1, 2, 3, 4, 5, 6]), a.values);
        let b = container.read_variable("b").unwrap();
        assert_eq!(vec![3], b.shape);
        assert_eq!(Values::Byte(vec![-1, -2, -3]), b.values);
    }

    #[test]
    fn read_cdf2_offsets() {
        let bytes = NcWriter::cdf2()
            .dimension("n", 2)
            .variable(NcVar::double("psi_0", &[0], &[0.25, -0.25]))
            .build();
        assert_eq!(2, bytes[3]);
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cdf2.nc", &bytes);
        assert_eq!(
            Values::Double(vec![0.25, -0.25]),
            read_variable(&path, "psi_0").unwrap().values
        );
    }

    #[test]
    fn variable_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "diag.nc", &psi_file());
        match read_variable(&path, "psi_1").unwrap_err() {
            SimStageError::VariableNotFound { name } => assert_eq!("psi_1", name),
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn char_variable_is_not_numeric() {
        let bytes = NcWriter::new()
            .dimension("len", 4)
            .variable(NcVar::text("label", &[0], "abcd"))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "text.nc", &bytes);
        match read_variable(&path, "label").unwrap_err() {
            SimStageError::UnreadableContainer {
                source: FormatError::NonNumeric { name, dtype },
                ..
            } => {
                assert_eq!("label", name);
                assert_eq!(DType::Char, dtype);
            }
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Container::open(&dir.path().join("absent.nc")).err().unwrap();
        assert!(matches!(
            err,
            SimStageError::UnreadableContainer {
                source: FormatError::Io(_),
                ..
            }
        ));
    }

    #[test]
    fn bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.nc", b"\x89HDF\r\n\x1a\n");
        let err = read_variable(&path, "psi_0").unwrap_err();
        assert!(matches!(
            err,
            SimStageError::UnreadableContainer {
                source: FormatError::Parse(_),
                ..
            }
        ));
    }

    #[test]
    fn unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "v3.nc", b"CDF\x03\0\0\0\0");
        assert_unreadable(read_variable(&path, "psi_0").unwrap_err());
    }

    #[test]
    fn oversized_cdf5_dimension_is_unreadable() {
        // CDF-5 header: unlimited dimension t, dimension x of u64::MAX, two byte record
        // variables over (t, x). Record sizes computed from it overflow.
        fn name(bytes: &mut Vec<u8>, name: &str) {
            bytes.extend_from_slice(&(name.len() as u64).to_be_bytes());
            bytes.extend_from_slice(name.as_bytes());
            bytes.resize(bytes.len() + (4 - name.len() % 4) % 4, 0);
        }
        fn absent(bytes: &mut Vec<u8>) {
            bytes.extend_from_slice(&0_u32.to_be_bytes());
            bytes.extend_from_slice(&0_u64.to_be_bytes());
        }

        let mut bytes = b"CDF\x05".to_vec();
        bytes.extend_from_slice(&1_u64.to_be_bytes());
        bytes.extend_from_slice(&0x0A_u32.to_be_bytes());
        bytes.extend_from_slice(&2_u64.to_be_bytes());
        name(&mut bytes, "t");
        bytes.extend_from_slice(&0_u64.to_be_bytes());
        name(&mut bytes, "x");
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        absent(&mut bytes);
        bytes.extend_from_slice(&0x0B_u32.to_be_bytes());
        bytes.extend_from_slice(&2_u64.to_be_bytes());
        for (var, begin) in [("a", 256_u64), ("b", 512)] {
            name(&mut bytes, var);
            bytes.extend_from_slice(&2_u64.to_be_bytes());
            bytes.extend_from_slice(&0_u64.to_be_bytes());
            bytes.extend_from_slice(&1_u64.to_be_bytes());
            absent(&mut bytes);
            bytes.extend_from_slice(&1_u32.to_be_bytes());
            bytes.extend_from_slice(&u64::MAX.to_be_bytes());
            bytes.extend_from_slice(&begin.to_be_bytes());
        }
        bytes.resize(1024, 0);

        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "huge.nc", &bytes);
        assert_unreadable(read_variable(&path, "a").unwrap_err());
    }

    #[test]
    fn truncated_header() {
        let bytes = psi_file();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "short.nc", &bytes[..20]);
        let err = Container::open(&path).err().unwrap();
        assert!(matches!(
            err,
            SimStageError::UnreadableContainer {
                source: FormatError::Parse(_),
                ..
            }
        ));
    }

    #[test]
    fn truncated_data() {
        let bytes = psi_file();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "short.nc", &bytes[..bytes.len() - 8]);
        assert_unreadable(read_variable(&path, "steps").unwrap_err());
    }

    #[test]
    fn list_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "diag.nc", &psi_file());
        let container = Container::open(&path).unwrap();
        assert_eq!(
            vec![
                VariableInfo {
                    name: "psi_0".to_string(),
                    dtype: DType::Double,
                    shape: vec![2, 3],
                },
                VariableInfo {
                    name: "steps".to_string(),
                    dtype: DType::Int,
                    shape: vec![3],
                },
            ],
            container.variables()
        );
    }

    #[test]
    fn list_record_variables() {
        let bytes = NcWriter::new()
            .dimension("time", 0)
            .records(2)
            .variable(NcVar::int("t", &[0], &[10, 20]))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "rec.nc", &bytes);
        let container = Container::open(&path).unwrap();
        assert_eq!(vec![2], container.variables()[0].shape);
    }

    #[test]
    fn find_container_sorted_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run")).unwrap();
        write(&dir.path().join("run"), "b.nc", b"");
        write(&dir.path().join("run"), "a.nc", b"");
        write(dir.path(), "notes.txt", b"");
        let found = find_container(dir.path(), "**/*.nc").unwrap();
        assert_eq!(dir.path().join("run").join("a.nc"), found);
    }

    #[test]
    fn find_container_none() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", b"");
        let err = find_container(dir.path(), "**/*.nc").unwrap_err();
        assert!(matches!(
            err,
            SimStageError::UnreadableContainer {
                source: FormatError::Missing { .. },
                ..
            }
        ));
    }
}
