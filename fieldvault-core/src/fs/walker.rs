//! Asset tree traversal.
//!
//! Asset roots are laid out as `<root>/<record-id>/<file>`, with thumbnails
//! under `<record-id>/thumbnails/`. Results are sorted by relative path so
//! archives and manifests come out in a stable order.

use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory name marking thumbnail files.
pub const THUMBNAIL_DIR: &str = "thumbnails";

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub follow_links: bool,

    /// Skip anything under a `thumbnails` directory
    pub include_thumbnails: bool,

    /// Files with exactly one of these names are skipped
    pub exclude_names: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            include_thumbnails: true,
            exclude_names: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
        }
    }
}

impl WalkOptions {
    pub fn thumbnails(mut self, include: bool) -> Self {
        self.include_thumbnails = include;
        self
    }
}

/// A file discovered under an asset root.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFile {
    pub path: PathBuf,

    /// `/`-separated path from the root, used as the archive entry name
    pub relative_path: String,

    /// First path component; empty for files placed directly at the root
    pub record_id: String,

    pub file_name: String,

    pub size: u64,

    pub is_thumbnail: bool,
}

impl AssetFile {
    /// Returns None for entries that resolve to directories or dangle.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let raw_metadata = entry.metadata()?;

        let size = if raw_metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved.len(),
                _ => return Ok(None),
            }
        } else {
            raw_metadata.len()
        };

        let relative = path.strip_prefix(root).unwrap_or(&path);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let record_id = if parts.len() > 1 {
            parts[0].clone()
        } else {
            String::new()
        };

        Ok(Some(Self {
            relative_path: parts.join("/"),
            record_id,
            file_name: entry.file_name().to_string_lossy().into_owned(),
            size,
            is_thumbnail: is_thumbnail_path(relative),
            path,
        }))
    }
}

/// True when any component of `relative` is the thumbnail directory.
pub fn is_thumbnail_path(relative: &Path) -> bool {
    relative
        .parent()
        .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == THUMBNAIL_DIR))
}

/// Collect every file under `root`, sorted by relative path.
pub fn walk_assets(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<AssetFile>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() || should_exclude(&entry, &options.exclude_names) {
            continue;
        }

        if let Some(file) = AssetFile::from_entry(&entry, root)? {
            if file.is_thumbnail && !options.include_thumbnails {
                continue;
            }
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Total size of all regular files under `root`.
pub fn total_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn should_exclude(entry: &DirEntry, names: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    names.iter().any(|n| file_name == n.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout(root: &Path) -> std::io::Result<()> {
        fs::create_dir_all(root.join("report-2/thumbnails"))?;
        fs::create_dir_all(root.join("report-1"))?;
        fs::write(root.join("report-2/b.jpg"), b"bbbb")?;
        fs::write(root.join("report-2/thumbnails/b.jpg"), b"t")?;
        fs::write(root.join("report-1/a.jpg"), b"aa")?;
        fs::write(root.join("loose.png"), b"x")?;
        fs::write(root.join(".DS_Store"), b"junk")?;
        Ok(())
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(walk_assets(temp_dir.path(), &WalkOptions::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_sorted_with_record_ids() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        layout(temp_dir.path())?;

        let files = walk_assets(temp_dir.path(), &WalkOptions::default())?;
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["loose.png", "report-1/a.jpg", "report-2/b.jpg", "report-2/thumbnails/b.jpg"]
        );
        assert_eq!(files[0].record_id, "");
        assert_eq!(files[1].record_id, "report-1");
        assert_eq!(files[1].size, 2);
        assert!(files[3].is_thumbnail);
        assert_eq!(files[3].record_id, "report-2");
        Ok(())
    }

    #[test]
    fn test_thumbnails_can_be_excluded() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        layout(temp_dir.path())?;

        let files = walk_assets(temp_dir.path(), &WalkOptions::default().thumbnails(false))?;
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| !f.is_thumbnail));
        Ok(())
    }

    #[test]
    fn test_total_size() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        layout(temp_dir.path())?;
        assert_eq!(total_size(temp_dir.path())?, 4 + 1 + 2 + 1 + 4);
        Ok(())
    }

    #[test]
    fn test_excludes_match_whole_names_only() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("report-1");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("pump.part2.jpg"), b"p")?;
        fs::write(dir.join("valve.parts.png"), b"v")?;
        fs::write(dir.join("x.DS_Store.jpg"), b"d")?;
        fs::write(dir.join(".DS_Store"), b"junk")?;

        let files = walk_assets(temp_dir.path(), &WalkOptions::default())?;
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["pump.part2.jpg", "valve.parts.png", "x.DS_Store.jpg"]);
        Ok(())
    }

    #[test]
    fn test_is_thumbnail_path() {
        assert!(is_thumbnail_path(Path::new("r/thumbnails/a.jpg")));
        assert!(!is_thumbnail_path(Path::new("r/a.jpg")));
        assert!(!is_thumbnail_path(Path::new("thumbnails")));
    }
}
