//! File and directory copying for COPY rows.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use same_file::is_same_file;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ScriptError;

/// Copy `source` to `destination`.
///
/// - A directory is copied recursively into `destination` (created if
///   missing, merged if it exists). Symlinks inside the tree are recreated,
///   not followed.
/// - A file (or a symlink to one) is copied with its contents; if
///   `destination` is an existing directory the file keeps its name inside it.
///
/// Nothing is written when the checks on the two paths fail.
pub fn copy_path(source: &Path, destination: &Path) -> Result<(), ScriptError> {
    let source_meta = fs::symlink_metadata(source).map_err(|_| ScriptError::SourceMissing {
        path: source.to_path_buf(),
    })?;
    // A dangling symlink has nothing to copy.
    if source_meta.file_type().is_symlink() && !source.exists() {
        return Err(ScriptError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    if source.is_dir() {
        if destination.is_file() {
            return Err(ScriptError::DirectoryOntoFile {
                source_path: source.to_path_buf(),
                destination: destination.to_path_buf(),
            });
        }
        ensure_distinct(source, destination)?;
        ensure_not_nested(source, destination)?;
        copy_dir(source, destination)
    } else {
        let target = if destination.is_dir() {
            match source.file_name() {
                Some(name) => destination.join(name),
                None => destination.to_path_buf(),
            }
        } else {
            destination.to_path_buf()
        };
        ensure_distinct(source, &target)?;
        debug!(source = %source.display(), destination = %target.display(), "copy file");
        fs::copy(source, &target)
            .map(|_| ())
            .map_err(|err| copy_io(source, &target, err))
    }
}

fn copy_io(source: &Path, destination: &Path, err: io::Error) -> ScriptError {
    ScriptError::CopyIo {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        err,
    }
}

/// Fail with `SameFile` when both paths name one filesystem entry.
///
/// Compared by file identity, so hard links and symlinks count as the same
/// entry.
fn ensure_distinct(source: &Path, destination: &Path) -> Result<(), ScriptError> {
    if !destination.exists() {
        return Ok(());
    }
    let same =
        is_same_file(source, destination).map_err(|err| copy_io(source, destination, err))?;
    if same {
        return Err(ScriptError::SameFile {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Refuse to copy a directory into its own subtree.
fn ensure_not_nested(source: &Path, destination: &Path) -> Result<(), ScriptError> {
    let source_abs =
        fs::canonicalize(source).map_err(|err| copy_io(source, destination, err))?;
    let destination_abs = absolute_lexical(destination).map_err(|err| copy_io(source, destination, err))?;
    if destination_abs.starts_with(&source_abs) {
        return Err(copy_io(
            source,
            destination,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination is inside the source directory",
            ),
        ));
    }
    Ok(())
}

/// Absolute form of a path that may not exist yet: canonicalize the deepest
/// existing ancestor and append the rest.
fn absolute_lexical(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let base = if existing.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        fs::canonicalize(existing)?
    };
    Ok(tail.into_iter().rev().fold(base, |acc, name| acc.join(name)))
}

fn copy_dir(source: &Path, destination: &Path) -> Result<(), ScriptError> {
    debug!(source = %source.display(), destination = %destination.display(), "copy directory");
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|err| copy_io(source, destination, io::Error::other(err)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| copy_io(source, destination, io::Error::other(err)))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        let result = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };
        result.map_err(|err| copy_io(entry.path(), &target, err))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    let points_to = fs::read_link(link)?;
    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(points_to, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    fs::copy(link, target).map(|_| ())
}
