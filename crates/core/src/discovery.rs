//! Filesystem discovery of convertible assets.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::converter::AssetKind;

/// A source file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
}

/// Expands files and directories into the assets they contain.
///
/// Directories are walked recursively in file-name order. Files outside the
/// extension allowlist are skipped, as are duplicates (compared by canonical
/// path). Paths that do not exist are logged and ignored.
pub fn discover_assets<P: AsRef<Path>>(paths: &[P]) -> Vec<DiscoveredAsset> {
    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Input path does not exist: {:?}", path);
            continue;
        }

        if path.is_dir() {
            debug!("Scanning directory: {:?}", path);
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_dir() {
                    continue;
                }
                push_asset(entry.path(), &mut seen, &mut assets);
            }
        } else {
            push_asset(path, &mut seen, &mut assets);
        }
    }

    info!("Discovered {} assets", assets.len());
    assets
}

fn push_asset(path: &Path, seen: &mut HashSet<PathBuf>, assets: &mut Vec<DiscoveredAsset>) {
    let Some(kind) = AssetKind::from_path(path) else {
        debug!("Skipping unsupported file: {:?}", path);
        return;
    };

    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(key) {
        debug!("Skipping duplicate: {:?}", path);
        return;
    }

    assets.push(DiscoveredAsset {
        path: path.to_path_buf(),
        kind,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_directory_walk_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.PNG");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "sub/logo.svg");

        let assets = discover_assets(&[dir.path()]);
        let names: Vec<_> = assets
            .iter()
            .map(|a| a.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("a.mp4"),
                PathBuf::from("b.PNG"),
                PathBuf::from("sub/logo.svg"),
            ]
        );
        assert_eq!(assets[0].kind, AssetKind::Video);
        assert_eq!(assets[1].kind, AssetKind::Image);
        assert_eq!(assets[2].kind, AssetKind::Vector);
    }

    #[test]
    fn test_duplicates_suppressed() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "hero.png");

        let assets = discover_assets(&[dir.path().to_path_buf(), file.clone(), file]);
        assert_eq!(assets.len(), 1);
    }

    #[test]
    fn test_missing_and_unsupported_inputs() {
        let dir = TempDir::new().unwrap();
        let text = touch(dir.path(), "readme.md");

        let assets = discover_assets(&[dir.path().join("missing.png"), text]);
        assert!(assets.is_empty());
    }
}
