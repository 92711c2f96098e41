//! Aggregated patch results for the final summary.

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::deployer::DeployReport;
use crate::rules::PatchOutcome;

/// File-level counts for one rule category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub files_scanned: usize,
    pub files_matched: usize,
    pub files_changed: usize,
    /// Distinct elements or regions rewritten across all files
    pub occurrences: usize,
}

impl RuleSummary {
    pub fn record(&mut self, outcome: PatchOutcome) {
        self.files_scanned += 1;
        if outcome.matched() {
            self.files_matched += 1;
        }
        if let PatchOutcome::Changed(n) = outcome {
            self.files_changed += 1;
            self.occurrences += n;
        }
    }

    /// At least one scanned file matched the rule.
    pub fn applied(&self) -> bool {
        self.files_matched > 0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    /// Manifest component entries removed
    pub manifest: RuleSummary,
    /// Method regions patched, keyed by rule description
    pub methods: BTreeMap<String, RuleSummary>,
    pub libraries: DeployReport,
    /// External path entries rewritten
    pub file_paths: RuleSummary,
    pub warnings: Vec<String>,
}

impl PatchReport {
    /// Logs a degraded condition and keeps it for the summary.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    pub fn method(&mut self, rule: &str) -> &mut RuleSummary {
        self.methods.entry(rule.to_string()).or_default()
    }

    /// At least one bytecode rule found its method.
    pub fn bytecode_patched(&self) -> bool {
        self.methods.values().any(RuleSummary::applied)
    }

    /// No warnings and no failed library copies.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty() && self.libraries.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts() {
        let mut s = RuleSummary::default();
        s.record(PatchOutcome::NotApplicable);
        s.record(PatchOutcome::Unchanged);
        s.record(PatchOutcome::Changed(3));
        assert_eq!(
            s,
            RuleSummary {
                files_scanned: 3,
                files_matched: 2,
                files_changed: 1,
                occurrences: 3
            }
        );
        assert!(s.applied());
    }

    #[test]
    fn completeness() {
        let mut r = PatchReport::default();
        assert!(r.is_complete());
        assert!(!r.bytecode_patched());
        r.method("guard x()V").record(PatchOutcome::Unchanged);
        assert!(r.bytecode_patched());
        r.warn("something missing");
        assert!(!r.is_complete());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["warnings"][0], "something missing");
        assert_eq!(json["methods"]["guard x()V"]["files_matched"], 1);
    }
}
