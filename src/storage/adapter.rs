//! File system adapter for metric files
//!
//! Thin async wrappers over `tokio::fs`. No file handle outlives a call:
//! every append opens the file, writes one line and closes it again, so
//! concurrent writers only rely on the OS append guarantee for single
//! writes.

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::storage::error::StorageResult;

/// Line separator used in metric files
pub const LINE_SEPARATOR: char = '\n';

/// Check whether a file or directory exists
///
/// Only a missing target is `false`; other probe failures (permission
/// denied, a parent that is not a directory) are returned as errors.
pub async fn target_exists(path: impl AsRef<Path>) -> StorageResult<bool> {
    Ok(fs::try_exists(path.as_ref()).await?)
}

/// Create a directory and all of its parents; no-op if it already exists
pub async fn ensure_directory(path: impl AsRef<Path>) -> StorageResult<()> {
    fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

/// Append one line to a file, creating the file if needed
pub async fn append_line(path: impl AsRef<Path>, line: &str) -> StorageResult<()> {
    let mut entry = String::with_capacity(line.len() + 1);
    entry.push_str(line);
    entry.push(LINE_SEPARATOR);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .await?;

    // Single write so the whole line lands in one append
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;

    Ok(())
}

/// Read a whole file and split it into raw lines
///
/// Lines are decoded independently and lossily: invalid UTF-8 in one line
/// becomes U+FFFD there and leaves every other line intact.
pub async fn read_lines(path: impl AsRef<Path>) -> StorageResult<Vec<String>> {
    let content = fs::read(path.as_ref()).await?;

    Ok(content
        .split(|&b| b == LINE_SEPARATOR as u8)
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect())
}

/// Read the raw lines of the regular files in a directory
///
/// Files are visited in name order. Subdirectories (such as the default
/// archive directory) are skipped, and so are files without `extension`
/// when one is given.
pub async fn read_directory_lines(
    dir: impl AsRef<Path>,
    extension: Option<&str>,
) -> StorageResult<Vec<String>> {
    let mut lines = Vec::new();

    for path in list_files(dir.as_ref(), extension).await? {
        lines.extend(read_lines(&path).await?);
    }

    Ok(lines)
}

/// List regular files in a directory, sorted by name
///
/// When `extension` is given only files with that extension are returned.
pub async fn list_files(dir: &Path, extension: Option<&str>) -> StorageResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let path = entry.path();
        let matches = extension
            .map(|ext| path.extension().map(|e| e == ext).unwrap_or(false))
            .unwrap_or(true);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Move a file into the archive directory under a timestamped name
///
/// Returns the new location, or `None` when there was nothing to move.
/// An existing archive file is never overwritten; a counter is appended
/// instead.
pub async fn move_to_archive(
    archive_dir: impl AsRef<Path>,
    file_path: impl AsRef<Path>,
    archived_at: DateTime<Utc>,
) -> StorageResult<Option<PathBuf>> {
    let archive_dir = archive_dir.as_ref();
    let file_path = file_path.as_ref();

    if !target_exists(file_path).await? {
        return Ok(None);
    }

    ensure_directory(archive_dir).await?;

    let suffix = archive_suffix(archived_at);
    let mut destination = archive_dir.join(archive_file_name(file_path, &suffix));
    let mut attempt = 1;
    while target_exists(&destination).await? {
        let suffix = format!("{}-{}", archive_suffix(archived_at), attempt);
        destination = archive_dir.join(archive_file_name(file_path, &suffix));
        attempt += 1;
    }

    fs::rename(file_path, &destination).await?;

    Ok(Some(destination))
}

/// ISO-8601 timestamp made safe for file names (`:` and `.` become `_`)
pub fn archive_suffix(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(&[':', '.'][..], "_")
}

/// `<stem>-<suffix>.<ext>` for the given file
fn archive_file_name(file_path: &Path, suffix: &str) -> String {
    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match file_path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}-{}", stem, suffix),
    }
}
