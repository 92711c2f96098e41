//! Pipeline configuration.

use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::pairip::REPLACEMENT_CORE;

pub const DEFAULT_APK_EDITOR: &str = "APKEditor-1.4.3.jar";
pub const DEFAULT_SIGNER: &str = "uber-apk-signer.jar";
pub const DEFAULT_JAVA: &str = "java";
pub const DEFAULT_JAVA_HEAP: &str = "2g";

/// Where the external tools live and how they are launched.
///
/// Relative paths are taken against the work directory, which is the
/// directory holding the input bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub java: PathBuf,
    pub apk_editor_jar: PathBuf,
    pub signer_jar: PathBuf,
    /// Passed as `-Xmx<heap>` to every Java child
    pub java_heap: String,
    pub replacement_library: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            java: PathBuf::from(DEFAULT_JAVA),
            apk_editor_jar: PathBuf::from(DEFAULT_APK_EDITOR),
            signer_jar: PathBuf::from(DEFAULT_SIGNER),
            java_heap: DEFAULT_JAVA_HEAP.to_string(),
            replacement_library: PathBuf::from(REPLACEMENT_CORE),
        }
    }
}

impl PipelineConfig {
    /// Anchors the jar and library paths at `work_dir`.
    ///
    /// The Java binary is left alone so that a bare `java` still goes
    /// through `PATH`.
    pub fn resolve(mut self, work_dir: &Path) -> Self {
        for p in [&mut self.apk_editor_jar, &mut self.signer_jar, &mut self.replacement_library] {
            if p.is_relative() {
                *p = work_dir.join(&*p);
            }
        }
        self
    }

    /// Value for `_JAVA_OPTIONS`, or `None` when the caller already set one.
    pub fn java_options(&self) -> Option<String> {
        if env::var_os("_JAVA_OPTIONS").is_some() {
            None
        } else {
            Some(format!("-Xmx{}", self.java_heap))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_absolute_and_bare_java() {
        let cfg = PipelineConfig {
            signer_jar: PathBuf::from("/opt/tools/signer.jar"),
            ..Default::default()
        }
        .resolve(Path::new("/work"));
        assert_eq!(cfg.java, PathBuf::from("java"));
        assert_eq!(cfg.apk_editor_jar, PathBuf::from("/work/APKEditor-1.4.3.jar"));
        assert_eq!(cfg.signer_jar, PathBuf::from("/opt/tools/signer.jar"));
        assert_eq!(cfg.replacement_library, PathBuf::from("/work/libpairipcorex.so"));
    }

    #[test]
    fn serializes_for_debug_logging() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["java_heap"], "2g");
        assert_eq!(json["apk_editor_jar"], "APKEditor-1.4.3.jar");
    }
}
