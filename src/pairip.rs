//! PairIP targets and the patch steps over a decompiled tree.
//!
//! The decompiler lays a package out as `AndroidManifest.xml`, `smali*/`
//! class trees, `resources/<module>/res/...` and `root/lib/<arch>/`. Every
//! step here locates its targets afresh, applies one rule per file and folds
//! the outcomes into the [`PatchReport`].

use std::path::PathBuf;

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::deployer::LibraryDeployer;
use crate::error::PatchResult;
use crate::inserter::MethodInserter;
use crate::locator::Locator;
use crate::report::{PatchReport, RuleSummary};
use crate::rewriter::{MethodBody, MethodRewriter};
use crate::rules::{apply_rule, ContentRule, PatchOutcome};
use crate::xml::{RemoveElements, ReplaceElements};

/// Present in every architecture directory the protection ships for.
pub const SENTINEL_LIBRARY: &str = "libpairipcore.so";
/// User-supplied loader that stands in for the protected core.
pub const REPLACEMENT_CORE: &str = "libpairipcorex.so";
/// Copy of the original base package, loaded by the replacement core.
pub const FIREBASE_STUB: &str = "libFirebaseCppApp.so";

pub const PAIRIP_DIR: &str = "pairip";
pub const VM_RUNNER_FILE: &str = "VMRunner.smali";
pub const SIGNATURE_CHECK_FILE: &str = "SignatureCheck.smali";
pub const SIGNATURE_CHECK_METHOD: &str = "verifyIntegrity(Landroid/content/Context;)V";

pub const MANIFEST_FILE: &str = "AndroidManifest.xml";
pub const FILE_PATHS_FILE: &str = "file_paths.xml";

pub const LICENSE_COMPONENTS: &[(&str, &str)] = &[
    ("activity", "com.pairip.licensecheck.LicenseActivity"),
    ("provider", "com.pairip.licensecheck.LicenseContentProvider"),
];

pub const SAFE_PICTURES_PATH: &str = r#"<external-files-path name="my_images" path="Pictures/" />"#;

// Loads the replacement core ahead of the original one.
const VM_RUNNER_CLINIT: &[&str] = &[
    ".method static constructor <clinit>()V",
    "    .registers 1",
    "",
    "    .line 30",
    "    const-string v0, \"pairipcorex\"",
    "    invoke-static {v0}, Ljava/lang/System;->loadLibrary(Ljava/lang/String;)V",
    "",
    "    const-string v0, \"pairipcore\"",
    "    invoke-static {v0}, Ljava/lang/System;->loadLibrary(Ljava/lang/String;)V",
    "",
    "    return-void",
    ".end method",
];

static PICTURES_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^Android/data/[^/]+/files/Pictures/?$").expect("Invalid pictures path regex")
});

pub fn vm_runner_rewriter() -> PatchResult<MethodRewriter> {
    Ok(MethodRewriter::new(MethodBody::new(VM_RUNNER_CLINIT.iter().copied())?))
}

pub fn signature_check_inserter() -> PatchResult<MethodInserter> {
    Ok(MethodInserter::return_void(SIGNATURE_CHECK_METHOD.parse()?))
}

pub fn license_rule() -> RemoveElements {
    RemoveElements::new(LICENSE_COMPONENTS.iter().copied())
}

pub fn file_paths_rule() -> ReplaceElements {
    ReplaceElements::new("external-path", "path", PICTURES_PATH.clone(), SAFE_PICTURES_PATH)
}

/// A decompiled package directory.
#[derive(Debug, Clone)]
pub struct DecompiledTree {
    root: PathBuf,
}

impl DecompiledTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DecompiledTree { root: root.into() }
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn lib_root(&self) -> PathBuf {
        self.root.join("root").join("lib")
    }

    pub fn resources(&self) -> PathBuf {
        self.root.join("resources")
    }

    /// Drops the license check components from the manifest.
    pub fn patch_manifest(&self, report: &mut PatchReport) -> PatchResult<()> {
        let manifest = self.manifest();
        if !manifest.is_file() {
            report.warn(format!("{MANIFEST_FILE} not found"));
            return Ok(());
        }
        let outcome = apply_rule(&manifest, &license_rule())?;
        report.manifest.record(outcome);
        match outcome {
            PatchOutcome::Changed(n) => info!("Removed {n} license check entries"),
            _ => report.warn("No license check entries found in manifest"),
        }
        Ok(())
    }

    /// Neutralizes the VM loader and the signature check in every class tree.
    pub fn patch_bytecode(&self, report: &mut PatchReport) -> PatchResult<()> {
        let rewriter = vm_runner_rewriter()?;
        let inserter = signature_check_inserter()?;
        let targets: [(&str, &dyn ContentRule); 2] =
            [(VM_RUNNER_FILE, &rewriter), (SIGNATURE_CHECK_FILE, &inserter)];

        for (file, rule) in targets {
            let files = Locator::new(&self.root)
                .file_name(file)
                .parent_named(PAIRIP_DIR)
                .files();
            let summary = patch_each(files, rule, report)?;
            if summary.files_scanned == 0 {
                report.warn(format!("{file} not found"));
            } else if !summary.applied() {
                report.warn(format!("{file} found but {} not patched", rule.describe()));
            }
            *report.method(&rule.describe()) = summary;
        }
        Ok(())
    }

    /// Copies the replacement libraries next to every sentinel library.
    pub fn deploy_libraries(&self, deployer: &LibraryDeployer, report: &mut PatchReport) {
        let dirs = Locator::new(self.lib_root()).dirs_containing(SENTINEL_LIBRARY);
        let deployed = deployer.deploy(dirs);
        if deployed.is_empty() {
            report.warn(format!("No library directories found containing {SENTINEL_LIBRARY}"));
        }
        for f in &deployed.failures {
            report.warn(format!(
                "Failed to copy {} into {}: {}",
                f.library,
                f.directory.display(),
                f.reason
            ));
        }
        report.libraries = deployed;
    }

    /// Points shared picture paths at app-private external storage.
    pub fn patch_file_paths(&self, report: &mut PatchReport) -> PatchResult<()> {
        let files = Locator::new(self.resources())
            .file_name(FILE_PATHS_FILE)
            .path_contains("res/xml")
            .files();
        let summary = patch_each(files, &file_paths_rule(), report)?;
        if summary.files_changed > 0 {
            info!("Patched {} {FILE_PATHS_FILE} file(s)", summary.files_changed);
        } else if !summary.applied() {
            report.warn("No matching <external-path> entries found");
        }
        report.file_paths = summary;
        Ok(())
    }
}

/// Applies `rule` to each file, turning degraded failures into warnings.
fn patch_each<I>(files: I, rule: &dyn ContentRule, report: &mut PatchReport) -> PatchResult<RuleSummary>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut summary = RuleSummary::default();
    for path in files {
        let name = path.display().to_string();
        match apply_rule(&path, rule) {
            Ok(outcome) => {
                match outcome {
                    PatchOutcome::Changed(_) => info!("Patched {name}"),
                    PatchOutcome::Unchanged => info!("{name} already patched"),
                    PatchOutcome::NotApplicable => {
                        report.warn(format!("{name}: nothing matched {}", rule.describe()))
                    }
                }
                summary.record(outcome);
            }
            Err(e) if e.is_degraded() => {
                summary.files_scanned += 1;
                report.warn(format!("{name}: {e}"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_rules_build() {
        assert_eq!(vm_runner_rewriter().unwrap().target().to_string(), "<clinit>()V");
        assert_eq!(signature_check_inserter().unwrap().target().to_string(), SIGNATURE_CHECK_METHOD);
    }

    #[test]
    fn pictures_pattern() {
        assert!(PICTURES_PATH.is_match("Android/data/com.example.app/files/Pictures"));
        assert!(PICTURES_PATH.is_match("android/data/com.example.app/files/pictures/"));
        assert!(!PICTURES_PATH.is_match("Android/data/com.example.app/files/Movies"));
        assert!(!PICTURES_PATH.is_match("Android/data/a/b/files/Pictures"));
    }
}
