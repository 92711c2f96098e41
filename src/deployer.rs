//! Copying replacement native libraries into every architecture slot.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::error::{PatchError, PatchResult};

/// A single (library, directory) copy that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    pub library: String,
    pub directory: PathBuf,
    pub reason: String,
}

/// Folded result of one deployment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    /// Architecture label of every directory visited, e.g. `arm64-v8a`
    pub architectures: Vec<String>,
    pub copied: usize,
    pub failures: Vec<CopyFailure>,
}

impl DeployReport {
    pub fn is_empty(&self) -> bool {
        self.architectures.is_empty()
    }
}

/// Copies a fixed set of library files into architecture directories.
#[derive(Debug, Clone)]
pub struct LibraryDeployer {
    sources: Vec<PathBuf>,
}

impl LibraryDeployer {
    /// Fails before anything is copied if any source file is missing.
    pub fn new<I, P>(sources: I) -> PatchResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources: Vec<PathBuf> = sources.into_iter().map(Into::into).collect();
        let missing: Vec<String> = sources
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| library_name(p))
            .collect();
        if !missing.is_empty() {
            return Err(PatchError::MissingLibraries(missing));
        }
        Ok(LibraryDeployer { sources })
    }

    /// Copies every source into every directory, overwriting same-named files.
    ///
    /// Each copy is independent: a failure is recorded and the remaining
    /// copies still run.
    pub fn deploy<I>(&self, directories: I) -> DeployReport
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut report = DeployReport::default();
        for dir in directories {
            let arch = library_name(&dir);
            for src in &self.sources {
                match copy_into(src, &dir) {
                    Ok(_) => {
                        info!("Copied {} to {} architecture", library_name(src), arch);
                        report.copied += 1;
                    }
                    Err(e) => {
                        warn!("Failed to copy {} to {}: {}", library_name(src), dir.display(), e);
                        report.failures.push(CopyFailure {
                            library: library_name(src),
                            directory: dir.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            report.architectures.push(arch);
        }

        if report.is_empty() {
            warn!("No architecture library directories found");
        } else {
            info!(
                "Libraries copied to {} architecture(s): {}",
                report.architectures.len(),
                report.architectures.join(", ")
            );
        }
        report
    }
}

fn copy_into(src: &Path, dir: &Path) -> std::io::Result<u64> {
    let name = src
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "source has no file name"))?;
    fs::copy(src, dir.join(name))
}

fn library_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sources_are_fatal_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("liba.so");
        fs::write(&present, "a").unwrap();
        let err = LibraryDeployer::new([present, dir.path().join("libb.so")]).unwrap_err();
        match err {
            PatchError::MissingLibraries(names) => assert_eq!(names, vec!["libb.so".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failures_do_not_block_other_copies() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("liba.so");
        fs::write(&src, "new").unwrap();
        let good = dir.path().join("lib/x86");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("liba.so"), "old").unwrap();
        let gone = dir.path().join("lib/mips");

        let deployer = LibraryDeployer::new([&src]).unwrap();
        let report = deployer.deploy(vec![gone.clone(), good.clone()]);

        assert_eq!(report.copied, 1);
        assert_eq!(report.architectures, vec!["mips".to_string(), "x86".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].directory, gone);
        assert_eq!(fs::read_to_string(good.join("liba.so")).unwrap(), "new");
    }

    #[test]
    fn zero_directories_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("liba.so");
        fs::write(&src, "a").unwrap();
        let report = LibraryDeployer::new([src]).unwrap().deploy(Vec::new());
        assert!(report.is_empty());
        assert!(report.failures.is_empty());
    }
}
