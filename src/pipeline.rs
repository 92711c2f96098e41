//! The end-to-end repackaging pipeline.
//!
//! Stages run strictly in order. Every stage that produces something checks
//! the artifact on disk before the next one starts; a missing artifact aborts
//! the run and leaves the work directory as it is for inspection. Only a
//! completed run cleans up after itself.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::android::archive::extract_entry;
use crate::deployer::LibraryDeployer;
use crate::error::{PatchError, PipelineError, PipelineResult};
use crate::pairip::{DecompiledTree, FIREBASE_STUB};
use crate::report::PatchReport;
use crate::toolchain::Toolchain;

pub const BASE_APK: &str = "base.apk";
pub const MERGED_APK: &str = "merged_app.apk";
pub const DECOMPILED_DIR: &str = "merged_app_decompile_xml";
pub const UNSIGNED_APK: &str = "out.apk";
/// Signer outputs, most preferred first.
pub const SIGNED_VARIANTS: [&str; 4] = [
    "out-aligned-signed.apk",
    "out-signed.apk",
    "out-debugSigned.apk",
    "out-aligned-debugSigned.apk",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    StageLibrary,
    Clean,
    Merge,
    Decompile,
    PatchManifest,
    PatchBytecode,
    DeployLibraries,
    PatchFilePaths,
    Rebuild,
    Sign,
    Collect,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::Extract,
        Stage::StageLibrary,
        Stage::Clean,
        Stage::Merge,
        Stage::Decompile,
        Stage::PatchManifest,
        Stage::PatchBytecode,
        Stage::DeployLibraries,
        Stage::PatchFilePaths,
        Stage::Rebuild,
        Stage::Sign,
        Stage::Collect,
        Stage::Cleanup,
    ];

    /// One-based position in [`Stage::ALL`].
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Extract => "Extracting base.apk",
            Stage::StageLibrary => "Staging libFirebaseCppApp.so",
            Stage::Clean => "Removing leftovers from previous runs",
            Stage::Merge => "Merging split packages",
            Stage::Decompile => "Decompiling merged package",
            Stage::PatchManifest => "Patching AndroidManifest.xml",
            Stage::PatchBytecode => "Patching smali files",
            Stage::DeployLibraries => "Copying native libraries",
            Stage::PatchFilePaths => "Patching file_paths.xml",
            Stage::Rebuild => "Rebuilding package",
            Stage::Sign => "Signing package",
            Stage::Collect => "Collecting output",
            Stage::Cleanup => "Cleaning up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}/{}: {}", self.number(), Stage::ALL.len(), self.title())
    }
}

/// File layout of one run. Every intermediate lives next to the input.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub dir: PathBuf,
    pub input: PathBuf,
}

impl Workspace {
    pub fn for_input(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let dir = match input.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Workspace { dir, input }
    }

    pub fn base_apk(&self) -> PathBuf {
        self.dir.join(BASE_APK)
    }

    pub fn firebase_stub(&self) -> PathBuf {
        self.dir.join(FIREBASE_STUB)
    }

    pub fn merged(&self) -> PathBuf {
        self.dir.join(MERGED_APK)
    }

    pub fn decompiled(&self) -> PathBuf {
        self.dir.join(DECOMPILED_DIR)
    }

    pub fn unsigned(&self) -> PathBuf {
        self.dir.join(UNSIGNED_APK)
    }

    pub fn signed_variants(&self) -> impl Iterator<Item = PathBuf> + '_ {
        SIGNED_VARIANTS.iter().map(move |n| self.dir.join(n))
    }

    /// `<stem>-patched.apk` next to the input.
    pub fn output(&self) -> PathBuf {
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());
        self.dir.join(format!("{stem}-patched.apk"))
    }

    fn intermediates(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.base_apk(), self.firebase_stub(), self.merged(), self.unsigned()];
        paths.extend(self.signed_variants());
        paths
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub output: PathBuf,
    pub size: u64,
    pub signed: bool,
    pub elapsed: Duration,
    pub report: PatchReport,
}

pub struct Pipeline<T: Toolchain> {
    tools: T,
    workspace: Workspace,
    replacement_library: PathBuf,
}

impl<T: Toolchain> Pipeline<T> {
    pub fn new(workspace: Workspace, replacement_library: impl Into<PathBuf>, tools: T) -> Self {
        Pipeline {
            tools,
            workspace,
            replacement_library: replacement_library.into(),
        }
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Checks everything a run depends on before any file is touched.
    pub fn preflight(&self) -> PipelineResult<()> {
        if !self.workspace.input.is_file() {
            return Err(PipelineError::MissingInput(self.workspace.input.clone()));
        }
        self.tools.check()?;
        if !self.replacement_library.is_file() {
            return Err(PatchError::MissingLibraries(vec![self.replacement_library.display().to_string()]).into());
        }
        Ok(())
    }

    pub fn run(&self) -> PipelineResult<PipelineOutcome> {
        let started = Instant::now();
        self.preflight()?;

        let ws = &self.workspace;
        let mut report = PatchReport::default();
        let is_bundle = ws
            .input
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("apks"));
        if !is_bundle {
            report.warn(format!("{} does not have an .apks extension", ws.input.display()));
        }

        begin(Stage::Extract);
        let base = extract_entry(&ws.input, BASE_APK, &ws.dir)?;
        require_file(Stage::Extract, &base)?;

        begin(Stage::StageLibrary);
        let stub = ws.firebase_stub();
        fs::copy(&base, &stub).map_err(|source| PipelineError::Io {
            path: stub.clone(),
            source,
        })?;
        require_file(Stage::StageLibrary, &stub)?;

        begin(Stage::Clean);
        for stale in [ws.merged(), ws.decompiled(), ws.unsigned()]
            .into_iter()
            .chain(ws.signed_variants())
        {
            remove_path(&stale)?;
        }

        begin(Stage::Merge);
        self.tools.merge(&ws.input, &ws.merged())?;
        require_file(Stage::Merge, &ws.merged())?;

        begin(Stage::Decompile);
        self.tools.decompile(&ws.merged(), &ws.decompiled())?;
        require_dir(Stage::Decompile, &ws.decompiled())?;
        let tree = DecompiledTree::new(ws.decompiled());

        begin(Stage::PatchManifest);
        tree.patch_manifest(&mut report)?;

        begin(Stage::PatchBytecode);
        tree.patch_bytecode(&mut report)?;

        begin(Stage::DeployLibraries);
        let deployer = LibraryDeployer::new([self.replacement_library.clone(), stub])?;
        tree.deploy_libraries(&deployer, &mut report);

        begin(Stage::PatchFilePaths);
        tree.patch_file_paths(&mut report)?;

        begin(Stage::Rebuild);
        self.tools.rebuild(&ws.decompiled(), &ws.unsigned())?;
        require_file(Stage::Rebuild, &ws.unsigned())?;

        begin(Stage::Sign);
        let (deliverable, signed) = self.sign(&mut report);

        begin(Stage::Collect);
        let output = ws.output();
        fs::copy(&deliverable, &output).map_err(|source| PipelineError::Io {
            path: output.clone(),
            source,
        })?;
        let size = require_file(Stage::Collect, &output)?;

        begin(Stage::Cleanup);
        self.cleanup(&mut report);

        Ok(PipelineOutcome {
            output,
            size,
            signed,
            elapsed: started.elapsed(),
            report,
        })
    }

    /// The signed package if the signer left one, else the unsigned build.
    fn sign(&self, report: &mut PatchReport) -> (PathBuf, bool) {
        let unsigned = self.workspace.unsigned();
        let signer_ok = match self.tools.sign(&unsigned) {
            Ok(()) => true,
            Err(e) => {
                report.warn(format!("Signing failed: {e}"));
                false
            }
        };
        if let Some(signed) = self.workspace.signed_variants().find(|p| non_empty_file(p)) {
            info!("Signed package: {}", signed.display());
            return (signed, true);
        }
        if signer_ok {
            report.warn("Signer produced no signed package");
        }
        report.warn(format!("Using unsigned {}", unsigned.display()));
        (unsigned, false)
    }

    /// Removes every intermediate and Java scratch file. Failures only warn.
    fn cleanup(&self, report: &mut PatchReport) {
        let ws = &self.workspace;
        let keep = [ws.input.clone(), ws.output(), self.replacement_library.clone()];
        let mut doomed = ws.intermediates();
        doomed.push(ws.decompiled());

        match fs::read_dir(&ws.dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
                    if is_scratch(&name, is_dir) {
                        doomed.push(entry.path());
                    }
                }
            }
            Err(e) => report.warn(format!("Cannot list {}: {e}", ws.dir.display())),
        }

        doomed.retain(|p| !keep.iter().any(|k| same_file(k, p)));
        for path in doomed {
            if let Err(e) = remove_path(&path) {
                report.warn(format!("Cleanup: {e}"));
            }
        }
    }
}

/// Java scratch output: `tmp-*` directories and files ending in `.tmp` or
/// `.tmp<digits>`.
fn is_scratch(name: &str, is_dir: bool) -> bool {
    if is_dir {
        return name.starts_with("tmp-");
    }
    match name.rfind(".tmp") {
        Some(i) => name[i + 4..].bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn begin(stage: Stage) {
    info!("{stage}");
}

fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path).map_or(false, |m| m.is_file() && m.len() > 0)
}

/// Size of `path`, which must be a non-empty file.
fn require_file(stage: Stage, path: &Path) -> PipelineResult<u64> {
    match fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(m.len()),
        _ => Err(PipelineError::MissingArtifact {
            stage: stage.title().to_string(),
            path: path.to_path_buf(),
        }),
    }
}

fn require_dir(stage: Stage, path: &Path) -> PipelineResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::MissingArtifact {
            stage: stage.title().to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Deletes a file or directory tree; absent paths are fine.
fn remove_path(path: &Path) -> PipelineResult<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return Ok(()),
    };
    result.map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("removed {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_headers() {
        assert_eq!(Stage::Extract.to_string(), "Step 1/13: Extracting base.apk");
        assert_eq!(Stage::Cleanup.number(), Stage::ALL.len());
        for (i, s) in Stage::ALL.iter().enumerate() {
            assert_eq!(s.number(), i + 1);
        }
    }

    #[test]
    fn workspace_layout() {
        let ws = Workspace::for_input("game.apks");
        assert_eq!(ws.dir, PathBuf::from("."));
        assert_eq!(ws.output(), PathBuf::from("./game-patched.apk"));

        let ws = Workspace::for_input("/w/My App.apks");
        assert_eq!(ws.output(), PathBuf::from("/w/My App-patched.apk"));
        assert_eq!(ws.signed_variants().next(), Some(PathBuf::from("/w/out-aligned-signed.apk")));
    }

    #[test]
    fn scratch_names() {
        assert!(is_scratch("APKEditor.tmp", false));
        assert!(is_scratch("res.tmp4242", false));
        assert!(is_scratch("tmp-9f2c", true));
        assert!(!is_scratch("game.tmp.apks", false));
        assert!(!is_scratch("game.tmp-patched.apk", false));
        assert!(!is_scratch("tmp-notes.txt", false));
        assert!(!is_scratch("data.tmpl", false));
    }

    #[test]
    fn artifact_checks() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.apk");
        fs::write(&empty, "").unwrap();
        assert!(matches!(
            require_file(Stage::Rebuild, &empty),
            Err(PipelineError::MissingArtifact { .. })
        ));
        fs::write(&empty, "x").unwrap();
        assert_eq!(require_file(Stage::Rebuild, &empty).unwrap(), 1);
        assert!(require_dir(Stage::Decompile, &dir.path().join("nope")).is_err());
        remove_path(&dir.path().join("nope")).unwrap();
    }
}
