//! Finding files in a decompiled tree.
//!
//! Multi-module and multi-architecture layouts carry several copies of the
//! same file name at different depths, so every query yields all matches.
//! Directory entries are visited in file-name order, which keeps the result
//! sequence stable for a given tree.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

/// A query over a directory tree.
///
/// # Examples
///
/// ```no_run
///  use pairip_patcher::locator::Locator;
///
///  for p in Locator::new("merged_app_decompile_xml").file_name("VMRunner.smali").parent_named("pairip").files() {
///      println!("{}", p.display());
///  }
/// ```
#[derive(Debug, Clone)]
pub struct Locator {
    root: PathBuf,
    file_name: Option<String>,
    parent_name: Option<String>,
    segments: Option<Vec<String>>,
}

impl Locator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Locator {
            root: root.into(),
            file_name: None,
            parent_name: None,
            segments: None,
        }
    }

    /// Only files with exactly this name.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Only files whose immediate parent directory has this name.
    pub fn parent_named(mut self, name: impl Into<String>) -> Self {
        self.parent_name = Some(name.into());
        self
    }

    /// Only files below a run of directories such as `res/xml`, matched on
    /// whole path components relative to the root.
    pub fn path_contains(mut self, segment: &str) -> Self {
        let parts: Vec<String> = segment
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.segments = Some(parts);
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        if let Some(name) = &self.file_name {
            if path.file_name().map_or(true, |n| n.to_string_lossy() != name.as_str()) {
                return false;
            }
        }
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if let Some(name) = &self.parent_name {
            if parent.file_name().map_or(true, |n| n.to_string_lossy() != name.as_str()) {
                return false;
            }
        }
        if let Some(segments) = &self.segments {
            let relative = parent.strip_prefix(&self.root).unwrap_or(parent);
            let components: Vec<Cow<str>> = relative.iter().map(|c| c.to_string_lossy()).collect();
            if segments.is_empty() || segments.len() > components.len() {
                return segments.is_empty();
            }
            let found = components
                .windows(segments.len())
                .any(|w| w.iter().zip(segments).all(|(c, s)| c == s));
            if !found {
                return false;
            }
        }
        true
    }

    /// Lazily walks the tree and yields every matching regular file.
    pub fn files(self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    debug!("skipping unreadable entry: {err}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(move |e| self.accepts(e.path()))
            .map(|e| e.into_path())
    }

    /// Directories holding a file named `sentinel` that also satisfy the
    /// other predicates.
    pub fn dirs_containing(self, sentinel: &str) -> impl Iterator<Item = PathBuf> {
        self.file_name(sentinel)
            .files()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "x").unwrap();
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "smali/com/pairip/VMRunner.smali");
        touch(dir.path(), "smali_classes2/com/pairip/VMRunner.smali");
        touch(dir.path(), "smali/com/other/VMRunner.smali");
        touch(dir.path(), "resources/package_1/res/xml/file_paths.xml");
        touch(dir.path(), "resources/package_2/res/values/file_paths.xml");
        touch(dir.path(), "root/lib/arm64-v8a/libpairipcore.so");
        touch(dir.path(), "root/lib/x86/libpairipcore.so");
        touch(dir.path(), "root/lib/x86/libother.so");
        dir
    }

    #[test]
    fn name_and_parent() {
        let dir = tree();
        let found: Vec<PathBuf> = Locator::new(dir.path())
            .file_name("VMRunner.smali")
            .parent_named("pairip")
            .files()
            .collect();
        assert_eq!(
            found,
            vec![
                dir.path().join("smali/com/pairip/VMRunner.smali"),
                dir.path().join("smali_classes2/com/pairip/VMRunner.smali"),
            ]
        );
    }

    #[test]
    fn segment_predicate() {
        let dir = tree();
        let found: Vec<PathBuf> = Locator::new(dir.path())
            .file_name("file_paths.xml")
            .path_contains("res/xml")
            .files()
            .collect();
        assert_eq!(found, vec![dir.path().join("resources/package_1/res/xml/file_paths.xml")]);
    }

    #[test]
    fn sentinel_dirs_are_deterministic() {
        let dir = tree();
        let first: Vec<PathBuf> = Locator::new(dir.path().join("root/lib"))
            .dirs_containing("libpairipcore.so")
            .collect();
        let second: Vec<PathBuf> = Locator::new(dir.path().join("root/lib"))
            .dirs_containing("libpairipcore.so")
            .collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![dir.path().join("root/lib/arm64-v8a"), dir.path().join("root/lib/x86")]
        );
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Locator::new(dir.path().join("nope")).files().count(), 0);
    }
}
