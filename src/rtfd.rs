//! RTFD bundles: a directory holding `TXT.rtf` plus the files it refers to.

use crate::pasteboard::{BundleEntry, EntryContents, RtfdDocument};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path};

/// Name of the text body inside a bundle
pub const TEXT_ENTRY: &str = "TXT.rtf";

/// Write `document` as a bundle at `path`, keeping every entry name as is.
///
/// The bundle is assembled in a sibling temporary directory and renamed into
/// place, so a failed write leaves nothing at `path`. An existing bundle is
/// never replaced.
pub fn write_bundle(path: &Path, document: &RtfdDocument) -> Result<()> {
    if path.exists() {
        bail!("{:?} already exists", path);
    }
    if !document
        .entries
        .iter()
        .any(|entry| entry.name == TEXT_ENTRY && matches!(entry.contents, EntryContents::File(_)))
    {
        bail!("Rich text has no {} body", TEXT_ENTRY);
    }

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut builder = tempfile::Builder::new();
    builder.prefix(".pdc-rtfd");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o755));
    }
    let staging = builder
        .tempdir_in(parent)
        .with_context(|| format!("Failed to create staging directory in {:?}", parent))?;

    write_entries(staging.path(), &document.entries)?;

    fs::rename(staging.path(), path)
        .with_context(|| format!("Failed to move bundle into place at {:?}", path))?;
    Ok(())
}

fn write_entries(dir: &Path, entries: &[BundleEntry]) -> Result<()> {
    for entry in entries {
        if !is_plain_name(&entry.name) {
            bail!("Invalid bundle entry name {:?}", entry.name);
        }
        let target = dir.join(&entry.name);
        match &entry.contents {
            EntryContents::File(contents) => fs::write(&target, contents)
                .with_context(|| format!("Failed to write bundle entry {}", entry.name))?,
            EntryContents::Directory(children) => {
                fs::create_dir(&target)
                    .with_context(|| format!("Failed to create bundle entry {}", entry.name))?;
                write_entries(&target, children)?;
            }
        }
    }
    Ok(())
}

/// A single path component that stays inside the bundle
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Read a bundle back, entries sorted by name at every level
#[cfg(test)]
pub fn read_bundle(path: &Path) -> Result<RtfdDocument> {
    Ok(RtfdDocument {
        entries: read_entries(path)?,
    })
}

#[cfg(test)]
fn read_entries(dir: &Path) -> Result<Vec<BundleEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            entries.push(BundleEntry::directory(name, read_entries(&entry.path())?));
        } else {
            entries.push(BundleEntry::file(name, fs::read(entry.path())?));
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
