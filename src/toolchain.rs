//! External repackaging tools.
//!
//! Merging, decoding, rebuilding and signing are delegated to Java tools run
//! as child processes. Each call blocks until the child exits and is judged
//! by its exit status; the pipeline then checks the artifact on disk.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

/// The collaborators the pipeline drives.
pub trait Toolchain {
    /// Verifies that every tool can be launched.
    fn check(&self) -> PipelineResult<()>;

    /// Merges a split bundle into a single package.
    fn merge(&self, input: &Path, output: &Path) -> PipelineResult<()>;

    /// Decodes a package into an editable directory tree.
    fn decompile(&self, package: &Path, output_dir: &Path) -> PipelineResult<()>;

    fn rebuild(&self, source_dir: &Path, output: &Path) -> PipelineResult<()>;

    /// Signs `package`, writing signed variants next to it.
    fn sign(&self, package: &Path) -> PipelineResult<()>;
}

/// APKEditor and uber-apk-signer launched through `java -jar`.
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    config: PipelineConfig,
    work_dir: PathBuf,
}

impl JavaToolchain {
    pub fn new(config: PipelineConfig, work_dir: impl Into<PathBuf>) -> Self {
        JavaToolchain {
            config,
            work_dir: work_dir.into(),
        }
    }

    fn java(&self) -> Command {
        let mut cmd = Command::new(&self.config.java);
        cmd.current_dir(&self.work_dir);
        if let Some(opts) = self.config.java_options() {
            cmd.env("_JAVA_OPTIONS", opts);
        }
        cmd
    }

    fn run_jar<I, S>(&self, tool: &str, jar: &Path, args: I) -> PipelineResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.java();
        cmd.arg("-jar").arg(jar).args(args);
        execute_command(tool, &mut cmd)
    }

    fn apk_editor<I, S>(&self, args: I) -> PipelineResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_jar("APKEditor", &self.config.apk_editor_jar, args)
    }
}

impl Toolchain for JavaToolchain {
    fn check(&self) -> PipelineResult<()> {
        for jar in [&self.config.apk_editor_jar, &self.config.signer_jar] {
            if !jar.is_file() {
                return Err(PipelineError::MissingTool {
                    name: jar.display().to_string(),
                    reason: "file not found".to_string(),
                });
            }
        }

        let mut cmd = self.java();
        cmd.arg("-version");
        execute_command("java", &mut cmd).map_err(|e| PipelineError::MissingTool {
            name: self.config.java.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn merge(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        self.apk_editor([
            OsStr::new("m"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-o"),
            output.as_os_str(),
            OsStr::new("-extractNativeLibs"),
            OsStr::new("true"),
        ])?;
        Ok(())
    }

    fn decompile(&self, package: &Path, output_dir: &Path) -> PipelineResult<()> {
        self.apk_editor([
            OsStr::new("d"),
            OsStr::new("-i"),
            package.as_os_str(),
            OsStr::new("-o"),
            output_dir.as_os_str(),
        ])?;
        Ok(())
    }

    fn rebuild(&self, source_dir: &Path, output: &Path) -> PipelineResult<()> {
        self.apk_editor([
            OsStr::new("b"),
            OsStr::new("-i"),
            source_dir.as_os_str(),
            OsStr::new("-o"),
            output.as_os_str(),
        ])?;
        Ok(())
    }

    fn sign(&self, package: &Path) -> PipelineResult<()> {
        self.run_jar(
            "uber-apk-signer",
            &self.config.signer_jar,
            [OsStr::new("-a"), package.as_os_str()],
        )?;
        Ok(())
    }
}

/// Runs `cmd` to completion, returning its stdout on a zero exit status.
pub fn execute_command(tool: &str, cmd: &mut Command) -> PipelineResult<String> {
    debug!("running {cmd:?}");
    let output = cmd.output().map_err(|source| PipelineError::Launch {
        tool: tool.to_string(),
        source,
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        if !stdout.trim().is_empty() {
            debug!("{tool}: {}", stdout.trim_end());
        }
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
        Err(PipelineError::ToolFailed {
            tool: tool.to_string(),
            status: output.status,
            stderr: stderr.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_jar_is_reported_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let tools = JavaToolchain::new(PipelineConfig::default().resolve(dir.path()), dir.path());
        match tools.check() {
            Err(PipelineError::MissingTool { name, .. }) => assert!(name.ends_with("APKEditor-1.4.3.jar")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unlaunchable_binary() {
        let mut cmd = Command::new("/nonexistent/definitely-not-java");
        assert!(matches!(
            execute_command("java", &mut cmd),
            Err(PipelineError::Launch { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_carries_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        match execute_command("sh", &mut cmd) {
            Err(PipelineError::ToolFailed { stderr, status, .. }) => {
                assert_eq!(stderr, "boom");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
