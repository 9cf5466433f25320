//! File copies and moves that preserve modification times
//!
//! A move is a single rename when source and destination share a
//! filesystem. Across filesystems it falls back to copying into a sibling
//! temporary file, flushing it, renaming it over the destination and only
//! then removing the source.

use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{OperationStep, RecoveryError, Result};

/// How a move was carried out
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveMethod {
    Rename,
    CopyThenRemove,
}

/// Move `source` onto `destination`, replacing it
pub async fn move_file(source: &Path, destination: &Path) -> Result<MoveMethod> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(MoveMethod::Rename),
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                source = %source.display(),
                destination = %destination.display(),
                "Rename crosses filesystems, copying instead"
            );
            copy_then_remove(source, destination).await?;
            Ok(MoveMethod::CopyThenRemove)
        }
        Err(e) => Err(RecoveryError::from_io(source, e)),
    }
}

/// Copy `source` over `destination`, carrying the modification time along
///
/// Returns the number of bytes copied.
pub async fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    let bytes = fs::copy(source, destination)
        .await
        .map_err(|e| RecoveryError::from_io(source, e))?;
    preserve_mtime(source, destination).await;
    Ok(bytes)
}

async fn copy_then_remove(source: &Path, destination: &Path) -> Result<()> {
    let expected = fs::metadata(source)
        .await
        .map_err(|e| RecoveryError::from_io(source, e))?
        .len();

    let staging = staging_path(destination);
    if let Err(e) = stage_copy(source, &staging, expected).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&staging, destination).await {
        let _ = fs::remove_file(&staging).await;
        return Err(RecoveryError::from_io(destination, e));
    }

    fs::remove_file(source).await.map_err(|e| {
        RecoveryError::partial_failure(
            source,
            OperationStep::CopySource,
            OperationStep::RemoveSource,
            e.to_string(),
        )
    })
}

async fn stage_copy(source: &Path, staging: &Path, expected: u64) -> Result<()> {
    let copied = fs::copy(source, staging)
        .await
        .map_err(|e| RecoveryError::from_io(source, e))?;

    let file = fs::OpenOptions::new()
        .write(true)
        .open(staging)
        .await
        .map_err(|e| RecoveryError::from_io(staging, e))?;
    file.sync_all().await.map_err(|e| RecoveryError::from_io(staging, e))?;

    if copied != expected {
        return Err(RecoveryError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "copied {} of {} bytes from '{}'",
                copied,
                expected,
                source.display()
            ),
        )));
    }

    preserve_mtime(source, staging).await;
    Ok(())
}

/// Sibling of `destination` used while a cross-device copy is in flight
fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.recovery-tmp", name))
}

async fn preserve_mtime(source: &Path, destination: &Path) {
    let metadata = match fs::metadata(source).await {
        Ok(metadata) => metadata,
        Err(_) => return,
    };
    let mtime = FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_mtime(destination, mtime) {
        tracing::warn!(path = %destination.display(), error = %e, "Failed to preserve modification time");
    }
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(windows)]
fn is_cross_device(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}
