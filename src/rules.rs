//! The common contract shared by every patch rule.
//!
//! A rule is a pure function from file content to rewritten content plus
//! counts. Applying a rule to its own output must give back the same text,
//! so a file that is already patched is reported as [`PatchOutcome::Unchanged`]
//! or [`PatchOutcome::NotApplicable`] and never rewritten twice.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{PatchError, PatchResult};

/// What a rule did to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum PatchOutcome {
    /// The rule's pattern never matched.
    NotApplicable,
    /// The pattern matched but the content is already in patched form.
    Unchanged,
    /// This many distinct occurrences were rewritten.
    Changed(usize),
}

impl PatchOutcome {
    pub fn matched(&self) -> bool {
        !matches!(self, PatchOutcome::NotApplicable)
    }

    pub fn changed(&self) -> usize {
        match self {
            PatchOutcome::Changed(n) => *n,
            _ => 0,
        }
    }
}

/// Output of a single rule application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub content: String,
    pub matched: usize,
    pub changed: usize,
}

impl Rewrite {
    /// Content left as it was.
    pub fn untouched(content: &str, matched: usize) -> Self {
        Rewrite {
            content: content.to_string(),
            matched,
            changed: 0,
        }
    }

    pub fn outcome(&self) -> PatchOutcome {
        if self.matched == 0 {
            PatchOutcome::NotApplicable
        } else if self.changed == 0 {
            PatchOutcome::Unchanged
        } else {
            PatchOutcome::Changed(self.changed)
        }
    }
}

pub trait ContentRule {
    /// Short label used in logs and in the patch report.
    fn describe(&self) -> String;

    fn apply(&self, content: &str) -> PatchResult<Rewrite>;
}

/// Applies `rules` in order to one file and commits the result once.
///
/// The file is only written when at least one rule changed something, and the
/// write replaces the file in a single rename so readers never observe a
/// partially written file.
pub fn apply_to_file(path: &Path, rules: &[&dyn ContentRule]) -> PatchResult<Vec<PatchOutcome>> {
    let original = fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut content = original.clone();
    let mut outcomes = Vec::with_capacity(rules.len());
    for rule in rules {
        let rewrite = rule.apply(&content)?;
        let outcome = rewrite.outcome();
        debug!("{} on {}: {:?}", rule.describe(), path.display(), outcome);
        outcomes.push(outcome);
        content = rewrite.content;
    }

    if content != original {
        commit(path, &content)?;
    }
    Ok(outcomes)
}

/// Single-rule convenience wrapper over [`apply_to_file`].
pub fn apply_rule(path: &Path, rule: &dyn ContentRule) -> PatchResult<PatchOutcome> {
    let outcomes = apply_to_file(path, &[rule])?;
    Ok(outcomes[0])
}

fn commit(path: &Path, content: &str) -> PatchResult<()> {
    let write_err = |source: std::io::Error| PatchError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    if let Ok(meta) = fs::metadata(path) {
        let _ = fs::set_permissions(tmp.path(), meta.permissions());
    }
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
