//! File names for each producer's output stream.
//!
//! Defaults follow the names the Android app used on external storage; any
//! of them can be overridden with a `TAG=FILE` argument.

use crate::event::{ParseTagError, ProducerTag};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default file name for each tag, indexed like [`ProducerTag::ALL`].
pub const DEFAULT_FILE_NAMES: [&str; 3] = [
    "accelerometer_data.txt",
    "gyroscope_data.txt",
    "gps_data.txt",
];

/// Errors returned when parsing a file name override.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("invalid file override '{0}': expected format TAG=FILE")]
    MissingSeparator(String),
    #[error(transparent)]
    Tag(#[from] ParseTagError),
    #[error("invalid file name '{0}': must be a plain file name")]
    FileName(String),
    #[error("{0} and {1} both write to '{2}'")]
    SharedFile(ProducerTag, ProducerTag, String),
}

/// A parsed `TAG=FILE` override.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOverride {
    pub tag: ProducerTag,
    pub file_name: String,
}

/// Parse an override from a string in the format `TAG=FILE`.
///
/// # Example
/// ```
/// use sensor_logger::layout::parse_file_override;
/// use sensor_logger::ProducerTag;
///
/// let o = parse_file_override("gyroscope=gyro.log").unwrap();
/// assert_eq!(o.tag, ProducerTag::Gyroscope);
/// assert_eq!(o.file_name, "gyro.log");
/// ```
pub fn parse_file_override(src: &str) -> Result<FileOverride, LayoutError> {
    let (tag, file_name) = src
        .split_once('=')
        .ok_or_else(|| LayoutError::MissingSeparator(src.to_string()))?;
    let tag = tag.parse::<ProducerTag>()?;
    let file_name = file_name.trim();

    let is_plain = !file_name.is_empty()
        && file_name != "."
        && file_name != ".."
        && Path::new(file_name).file_name() == Some(OsStr::new(file_name));
    if !is_plain {
        return Err(LayoutError::FileName(file_name.to_string()));
    }

    Ok(FileOverride {
        tag,
        file_name: file_name.to_string(),
    })
}

/// Maps every producer tag to the file its stream appends to.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamLayout {
    file_names: [String; 3],
}

impl Default for StreamLayout {
    fn default() -> Self {
        Self {
            file_names: DEFAULT_FILE_NAMES.map(str::to_string),
        }
    }
}

impl StreamLayout {
    /// Default layout with `overrides` applied in order; later entries win.
    ///
    /// Fails if two tags would end up sharing one file, since each stream
    /// must own its file exclusively.
    pub fn with_overrides(overrides: &[FileOverride]) -> Result<Self, LayoutError> {
        let mut layout = Self::default();
        for o in overrides {
            layout.file_names[o.tag.index()] = o.file_name.clone();
        }

        for (i, a) in ProducerTag::ALL.iter().enumerate() {
            for b in &ProducerTag::ALL[i + 1..] {
                if layout.file_name(*a) == layout.file_name(*b) {
                    return Err(LayoutError::SharedFile(
                        *a,
                        *b,
                        layout.file_name(*a).to_string(),
                    ));
                }
            }
        }

        Ok(layout)
    }

    pub fn file_name(&self, tag: ProducerTag) -> &str {
        &self.file_names[tag.index()]
    }

    /// Full path of `tag`'s file inside `dir`.
    pub fn path_in(&self, dir: &Path, tag: ProducerTag) -> PathBuf {
        dir.join(self.file_name(tag))
    }
}
