//! Human readable report
//!
//! JSON and YAML are produced by serializing the [DiagnosticsReport] directly.
use crate::engine::DiagnosticsReport;
use std::fmt::Write;

/// One line per violation followed by a summary
///
/// With `verbose` every suppressed finding is listed too, including the scope of the
/// suppression that matched and its reason.
pub fn text(report: &DiagnosticsReport, verbose: bool) -> String {
    let mut out = String::new();

    for violation in &report.violations {
        // writing into a String can not fail
        let _ = writeln!(
            out,
            "{}[{}] {} ({}): {}",
            violation.severity,
            violation.rule_id,
            violation.path,
            violation.resource_type,
            violation.message
        );
    }

    if verbose {
        for entry in &report.suppressions {
            let _ = writeln!(
                out,
                "suppressed[{}] {} ({}): {}",
                entry.rule_id, entry.path, entry.scope, entry.reason
            );
        }
    }

    if !out.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "{} error(s), {} warning(s), {} suppressed",
        report.errors().count(),
        report.warnings().count(),
        report.suppressed_count
    );
    let _ = writeln!(
        out,
        "result: {}",
        if report.passed { "passed" } else { "failed" }
    );

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{Severity, Violation};
    use crate::suppression::{Scope, SuppressionMatch};
    use pretty_assertions::assert_eq;

    fn report() -> DiagnosticsReport {
        DiagnosticsReport {
            violations: vec![Violation {
                rule_id: "missing-documentation-tag".to_string(),
                path: "/root/child".to_string(),
                resource_type: "storage-bucket".to_string(),
                severity: Severity::Warning,
                message: "missing required tag \"Purpose\"".to_string(),
            }],
            suppressed_count: 1,
            passed: true,
            suppressions: vec![SuppressionMatch {
                rule_id: "encryption-at-rest-missing".to_string(),
                path: "/root/child".to_string(),
                scope: Scope::Global,
                reason: "sandbox account".to_string(),
            }],
        }
    }

    #[test]
    fn quiet() {
        assert_eq!(
            text(&report(), false),
            "warning[missing-documentation-tag] /root/child (storage-bucket): missing required tag \"Purpose\"\n\
             \n\
             0 error(s), 1 warning(s), 1 suppressed\n\
             result: passed\n"
        );
    }

    #[test]
    fn verbose_lists_suppressions() {
        let rendered = text(&report(), true);
        assert!(rendered.contains(
            "suppressed[encryption-at-rest-missing] /root/child (global): sandbox account\n"
        ));
    }

    #[test]
    fn empty_report() {
        let report = DiagnosticsReport {
            violations: vec![],
            suppressed_count: 0,
            passed: true,
            suppressions: vec![],
        };
        assert_eq!(
            text(&report, true),
            "0 error(s), 0 warning(s), 0 suppressed\nresult: passed\n"
        );
    }
}
