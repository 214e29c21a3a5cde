//! Source units and the trees they are loaded from

use globset::{Glob, GlobSet, GlobSetBuilder};
use gridline_core::{ConfigError, GridlineError, Result};
use gridline_policy::ScanSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use walkdir::WalkDir;

/// One file of the scan target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Path relative to the scan root, `/`-separated
    pub path: String,
    pub content: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A file that matched the scan globs but could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableFile {
    pub path: String,
    pub reason: String,
}

/// Everything one pass reads from a tree
#[derive(Debug, Clone, Default)]
pub struct LoadedTree {
    /// Sorted by path
    pub units: Vec<SourceUnit>,
    pub unreadable: Vec<UnreadableFile>,
}

/// Where source units come from and where rewritten content goes
pub trait SourceTree: Send + Sync {
    /// Read every unit of the target. Called fresh at the start of each pass.
    fn load(&self) -> Result<LoadedTree>;

    /// Replace the content of an existing unit
    fn write(&self, path: &str, content: &str) -> Result<()>;
}

/// A directory on disk filtered by include/exclude globs
pub struct FsTree {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    /// Directories pruned without descending (`**/node_modules/**` → `**/node_modules`)
    prune: GlobSet,
}

impl FsTree {
    pub fn new(root: impl Into<PathBuf>, settings: &ScanSettings) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(GridlineError::ScanRootNotFound(root.display().to_string()));
        }

        let include = build_globset(&settings.include)?;
        let exclude = build_globset(&settings.exclude)?;
        let prune_patterns: Vec<String> = settings
            .exclude
            .iter()
            .filter_map(|p| p.strip_suffix("/**").map(|s| s.to_string()))
            .filter(|p| !p.is_empty())
            .collect();
        let prune = build_globset(&prune_patterns)?;

        Ok(Self {
            root,
            include,
            exclude,
            prune,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a root-relative path is one the tree scans
    fn is_scanned(&self, relative: &Path) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Map a rewriter path to a scanned file that really lives under the root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rejected = || GridlineError::RewriterPathRejected(path.to_string());

        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes || !self.is_scanned(relative) {
            return Err(rejected());
        }
        let full = self.root.join(relative);
        if !full.is_file() {
            return Err(rejected());
        }

        // Symlinks must not lead out of the root
        let root = fs::canonicalize(&self.root)?;
        let target = fs::canonicalize(&full).map_err(|_| rejected())?;
        if !target.starts_with(&root) {
            return Err(rejected());
        }
        Ok(target)
    }
}

impl SourceTree for FsTree {
    fn load(&self) -> Result<LoadedTree> {
        let mut loaded = LoadedTree::default();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                !self.prune.is_match(relative)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .and_then(|p| p.strip_prefix(&self.root).ok())
                        .map(relative_string)
                        .unwrap_or_default();
                    tracing::warn!(path = %path, error = %e, "skipping unreadable entry");
                    loaded.unreadable.push(UnreadableFile {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if !self.is_scanned(relative) {
                continue;
            }

            let path = relative_string(relative);
            match fs::read(entry.path()) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes).into_owned();
                    loaded.units.push(SourceUnit { path, content });
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping unreadable file");
                    loaded.unreadable.push(UnreadableFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        loaded.units.sort_by(|a, b| a.path.cmp(&b.path));
        loaded.unreadable.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(
            root = %self.root.display(),
            units = loaded.units.len(),
            unreadable = loaded.unreadable.len(),
            "loaded source tree"
        );
        Ok(loaded)
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::write(&full, content)?;
        tracing::debug!(path = %path, bytes = content.len(), "wrote rewritten unit");
        Ok(())
    }
}

/// An in-memory tree, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryTree {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files().insert(path.into(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files().get(path).cloned()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SourceTree for MemoryTree {
    fn load(&self) -> Result<LoadedTree> {
        let units = self
            .files()
            .iter()
            .map(|(path, content)| SourceUnit::new(path.clone(), content.clone()))
            .collect();
        Ok(LoadedTree {
            units,
            unreadable: Vec::new(),
        })
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let mut files = self.files();
        match files.get_mut(path) {
            Some(existing) => {
                *existing = content.to_string();
                Ok(())
            }
            None => Err(GridlineError::RewriterPathRejected(path.to_string())),
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        GridlineError::Config(ConfigError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })
    })
}

fn relative_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsTree::new(dir.path().join("nope"), &ScanSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, GridlineError::ScanRootNotFound(_)));
    }

    #[test]
    fn test_invalid_glob_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ScanSettings {
            include: vec!["src/[".to_string()],
            exclude: Vec::new(),
        };
        let err = FsTree::new(dir.path(), &settings).err().unwrap();
        assert!(matches!(
            err,
            GridlineError::Config(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_load_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/b.tsx", "b");
        write_file(dir.path(), "src/a.tsx", "a");
        write_file(dir.path(), "styles/app.css", "c");
        write_file(dir.path(), "README.md", "skip");
        write_file(dir.path(), "node_modules/pkg/index.tsx", "skip");

        let tree = FsTree::new(dir.path(), &ScanSettings::default()).unwrap();
        let loaded = tree.load().unwrap();
        let paths: Vec<&str> = loaded.units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.tsx", "src/b.tsx", "styles/app.css"]);
        assert!(loaded.unreadable.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.tsx"), [b'<', b'p', 0xff, b'>']).unwrap();
        let tree = FsTree::new(dir.path(), &ScanSettings::default()).unwrap();
        let loaded = tree.load().unwrap();
        assert_eq!(loaded.units.len(), 1);
        assert!(loaded.units[0].content.starts_with("<p"));
    }

    #[test]
    fn test_write_existing_unit() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.tsx", "old");
        let tree = FsTree::new(dir.path(), &ScanSettings::default()).unwrap();
        tree.write("src/a.tsx", "new").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("src/a.tsx")).unwrap(), "new");
    }

    #[test]
    fn test_write_rejects_escaping_and_unknown_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.tsx", "old");
        write_file(dir.path(), "gridline.toml", "policy");
        write_file(dir.path(), ".git/config", "git");
        write_file(dir.path(), "node_modules/pkg/index.tsx", "vendored");
        let tree = FsTree::new(dir.path(), &ScanSettings::default()).unwrap();
        for path in [
            "../a.tsx",
            "/etc/passwd",
            "src/new.tsx",
            "",
            "gridline.toml",
            ".git/config",
            "node_modules/pkg/index.tsx",
        ] {
            let err = tree.write(path, "x").unwrap_err();
            assert!(matches!(err, GridlineError::RewriterPathRejected(_)), "{}", path);
        }
        assert_eq!(fs::read_to_string(dir.path().join("gridline.toml")).unwrap(), "policy");
        assert_eq!(
            fs::read_to_string(dir.path().join("node_modules/pkg/index.tsx")).unwrap(),
            "vendored"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_write_rejects_symlink_out_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write_file(outside.path(), "secret.tsx", "secret");
        fs::create_dir_all(dir.path().join("src")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.tsx"),
            dir.path().join("src/link.tsx"),
        )
        .unwrap();

        let tree = FsTree::new(dir.path(), &ScanSettings::default()).unwrap();
        let err = tree.write("src/link.tsx", "x").unwrap_err();
        assert!(matches!(err, GridlineError::RewriterPathRejected(_)));
        assert_eq!(fs::read_to_string(outside.path().join("secret.tsx")).unwrap(), "secret");
    }

    #[test]
    fn test_memory_tree() {
        let tree = MemoryTree::new()
            .with_file("b.tsx", "b")
            .with_file("a.tsx", "a");
        let loaded = tree.load().unwrap();
        assert_eq!(loaded.units[0].path, "a.tsx");

        tree.write("a.tsx", "changed").unwrap();
        assert_eq!(tree.get("a.tsx").as_deref(), Some("changed"));
        assert!(tree.write("c.tsx", "x").is_err());
    }
}
