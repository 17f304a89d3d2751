// Zip bundles and safe relative paths

use crate::error::CacdError;
use anyhow::{Context, Result};
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// One file inside a bundle, addressed by a `/`-separated relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub path: String,
    pub data: Vec<u8>,
}

impl BundleEntry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Write entries into a deflated zip, in the order given
pub fn write_zip<I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = BundleEntry>,
{
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options: zip::write::SimpleFileOptions = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for entry in entries {
            zip.start_file(entry.path.as_str(), options)
                .with_context(|| format!("Failed to add {} to archive", entry.path))?;
            zip.write_all(&entry.data)
                .with_context(|| format!("Failed to write {} to archive", entry.path))?;
        }
        zip.finish().context("Failed to finalize archive")?;
    }
    Ok(buf)
}

/// Read every file entry of a zip.
///
/// Directory entries are skipped. An entry whose name would escape the
/// extraction root is rejected.
pub fn read_zip(bytes: &[u8]) -> Result<Vec<BundleEntry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CacdError::invalid(format!("not a zip archive: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| CacdError::invalid(format!("unreadable archive entry: {}", e)))?;
        if file.is_dir() {
            continue;
        }

        let path = file
            .enclosed_name()
            .ok_or_else(|| CacdError::invalid(format!("unsafe archive entry: {}", file.name())))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .with_context(|| format!("Failed to read archive entry {}", file.name()))?;
        entries.push(BundleEntry::new(to_slash_path(&path), data));
    }
    Ok(entries)
}

/// Every file under `root` whose relative path passes `include`, sorted by path
pub fn collect_files(root: &Path, include: impl Fn(&Path) -> bool) -> Result<Vec<BundleEntry>> {
    let mut entries = Vec::new();
    if !root.exists() {
        return Ok(entries);
    }

    for item in WalkDir::new(root).sort_by_file_name() {
        let item = item.context("Failed to walk directory")?;
        if !item.file_type().is_file() {
            continue;
        }
        let relative = item
            .path()
            .strip_prefix(root)
            .context("Walked outside of root")?;
        if !include(relative) {
            continue;
        }
        let data = std::fs::read(item.path())
            .with_context(|| format!("Failed to read {}", item.path().display()))?;
        entries.push(BundleEntry::new(to_slash_path(relative), data));
    }
    Ok(entries)
}

/// Zip a directory tree with paths relative to `root`
pub fn zip_directory(root: &Path, include: impl Fn(&Path) -> bool) -> Result<Vec<u8>> {
    write_zip(collect_files(root, include)?)
}

/// Write entries below `dest`, creating parent directories; returns written paths
pub fn extract_entries(entries: &[BundleEntry], dest: &Path) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(entries.len());
    for entry in entries {
        let target = dest.join(safe_relative_path(&entry.path)?);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, &entry.data)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        written.push(entry.path.clone());
    }
    Ok(written)
}

/// Check a relative path has only normal components
pub fn safe_relative_path(path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !safe {
        return Err(CacdError::invalid(format!("unsafe path: {}", path)).into());
    }
    Ok(candidate.to_path_buf())
}

/// Check a name is a single path component
pub fn safe_name(name: &str) -> Result<&str> {
    let safe = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if !safe {
        return Err(CacdError::invalid(format!("invalid name: {}", name)).into());
    }
    Ok(name)
}

pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_zip_round_trip_keeps_order_and_content() {
        let bytes = write_zip(vec![
            BundleEntry::new("b.json", "[]"),
            BundleEntry::new("nested/a.md", "# a"),
        ])
        .unwrap();

        let entries = read_zip(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "b.json");
        assert_eq!(entries[1], BundleEntry::new("nested/a.md", "# a"));
    }

    #[test]
    fn test_read_zip_rejects_garbage() {
        let err = read_zip(b"definitely not a zip").unwrap_err();
        assert!(matches!(
            crate::error::find_cacd_error(&err),
            Some(CacdError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_read_zip_rejects_traversal() {
        let bytes = write_zip(vec![BundleEntry::new("../evil.txt", "x")]).unwrap();
        assert!(read_zip(&bytes).is_err());
    }

    #[test]
    fn test_zip_directory_uses_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.md"), "top").unwrap();
        std::fs::write(dir.path().join("sub/inner.mdc"), "inner").unwrap();

        let only_mdc = zip_directory(dir.path(), |p| {
            p.extension().is_some_and(|ext| ext == "mdc")
        })
        .unwrap();
        let entries = read_zip(&only_mdc).unwrap();
        assert_eq!(entries, vec![BundleEntry::new("sub/inner.mdc", "inner")]);

        let out = TempDir::new().unwrap();
        let written = extract_entries(&entries, out.path()).unwrap();
        assert_eq!(written, vec!["sub/inner.mdc".to_string()]);
        assert_eq!(
            std::fs::read_to_string(out.path().join("sub/inner.mdc")).unwrap(),
            "inner"
        );
    }

    #[test]
    fn test_safe_names() {
        assert!(safe_name("notes.md").is_ok());
        assert!(safe_name("../etc").is_err());
        assert!(safe_name("a/b").is_err());
        assert!(safe_name("").is_err());
        assert!(safe_relative_path("a/b.mdc").is_ok());
        assert!(safe_relative_path("/abs").is_err());
        assert!(safe_relative_path("a/../../b").is_err());
    }
}
