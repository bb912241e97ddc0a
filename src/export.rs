//! Writes data source results to local files.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while exporting a result file.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The path has no file name component.
    #[error("output path {path} is missing a filename")]
    NoFileName {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The result could not be rendered as JSON.
    #[error("failed to render {path}: {message}")]
    Render {
        /// Target path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// File system access failed.
    #[error("failed to write {path}: {message}")]
    Io {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Expands a leading `~/` to `HOME`. Without `HOME` the path is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// # use converge::export::expand_tilde;
/// assert_eq!(expand_tilde("/tmp/out.json"), "/tmp/out.json");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    let Some(rest) = path.strip_prefix("~/") else {
        return path.to_owned();
    };
    std::env::var_os("HOME").map_or_else(
        || path.to_owned(),
        |home| format!("{}/{rest}", home.to_string_lossy()),
    )
}

/// Writes `value` as pretty-printed JSON to `path`, creating parent
/// directories as needed, and returns the path written.
///
/// # Errors
///
/// Returns [`ExportError`] when the value cannot be rendered or the file
/// cannot be written.
pub fn write_json<T: Serialize + ?Sized>(
    path: &str,
    value: &T,
) -> Result<Utf8PathBuf, ExportError> {
    let path = Utf8PathBuf::from(expand_tilde(path));
    let file_name = path.file_name().ok_or_else(|| ExportError::NoFileName {
        path: path.clone(),
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    let mut rendered = serde_json::to_string_pretty(value).map_err(|err| ExportError::Render {
        path: path.clone(),
        message: err.to_string(),
    })?;
    rendered.push('\n');

    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| ExportError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ExportError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;
    dir.write(file_name, rendered).map_err(|err| ExportError::Io {
        path: path.clone(),
        message: err.to_string(),
    })?;
    Ok(path)
}
