//! Caret-delimited legacy report parsing.
//!
//! Several chart RPCs predate the VPR XML format and return line-oriented
//! `^`-delimited text. Fields sit at fixed positions; lines with fewer
//! than the expected minimum are skipped, never fatal.
//!
//! # Lab interim report
//!
//! The lab report interleaves panel headers and result lines:
//!
//! ```text
//! 7029;2990314.08;2^CHEM 7^SERUM^2990314.0800
//! ^GLUCOSE^105^mg/dL^H^65 - 99
//! ^SODIUM^138^meq/L^^136 - 145
//! 7030;2990315.09;2^CBC^BLOOD^2990315.0900
//! ^WBC^5.2^K/cmm^^4.5 - 10.4
//! ```
//!
//! A header line has a non-empty first field (the panel's lab id); result
//! lines leave the first field empty and belong to the panel above them.

use tracing::trace;

use crate::fileman::fileman_to_iso;

/// Minimum fields in a panel header line.
const PANEL_MIN_FIELDS: usize = 3;

/// Minimum fields in a result line.
const RESULT_MIN_FIELDS: usize = 3;

/// One lab panel (ordered set of results collected together).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabPanel {
    /// Lab id, used to fetch detail for this panel.
    pub id: String,
    /// Panel name, e.g. "CHEM 7".
    pub name: String,
    /// Specimen, e.g. "SERUM".
    pub specimen: String,
    /// Collection timestamp as an ISO string, when derivable.
    pub collected: Option<String>,
    /// Individual test results.
    pub results: Vec<LabResult>,
}

/// One test result within a panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabResult {
    pub test: String,
    pub value: String,
    pub units: String,
    /// Abnormality flag ("H", "L", "H*", ...), empty when normal.
    pub flag: String,
    /// Reference range text.
    pub reference: String,
}

/// Split a caret-delimited line, requiring a minimum field count.
///
/// Returns `None` for short lines so callers skip them instead of
/// indexing past the end.
pub fn split_caret_line(line: &str, min_fields: usize) -> Option<Vec<&str>> {
    let fields: Vec<&str> = line.split('^').collect();
    if fields.len() < min_fields {
        return None;
    }
    Some(fields)
}

/// Parse a lab interim report into panels.
pub fn parse_lab_panels(report: &str) -> Vec<LabPanel> {
    let mut panels: Vec<LabPanel> = Vec::new();

    for line in report.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(fields) = split_caret_line(line, 2) else {
            trace!(line, "skipping short lab line");
            continue;
        };

        if fields[0].is_empty() {
            // Result line; ignore results arriving before any header.
            let Some(panel) = panels.last_mut() else { continue };
            if fields.len() < RESULT_MIN_FIELDS + 1 {
                continue;
            }
            panel.results.push(LabResult {
                test: fields[1].to_string(),
                value: fields[2].to_string(),
                units: fields.get(3).unwrap_or(&"").to_string(),
                flag: fields.get(4).unwrap_or(&"").to_string(),
                reference: fields.get(5).unwrap_or(&"").to_string(),
            });
        } else {
            if fields.len() < PANEL_MIN_FIELDS {
                continue;
            }
            panels.push(LabPanel {
                id: fields[0].to_string(),
                name: fields[1].to_string(),
                specimen: fields.get(2).unwrap_or(&"").to_string(),
                collected: fields.get(3).and_then(|raw| fileman_to_iso(raw)),
                results: Vec::new(),
            });
        }
    }

    panels
}

/// Extract one panel from a report by lab id.
///
/// The id is matched against the first `;`-piece of the header id as well
/// as the whole field, since detail requests often carry the bare
/// accession number.
pub fn parse_lab_panel_detail(report: &str, lab_id: &str) -> Option<LabPanel> {
    parse_lab_panels(report)
        .into_iter()
        .find(|panel| panel.id == lab_id || panel.id.split(';').next() == Some(lab_id))
}

/// Parse legacy caret-delimited problem-list lines.
///
/// Each line is `ien^description^status^onsetDate`; short lines are
/// skipped.
pub fn parse_problem_lines(text: &str) -> Vec<(String, String, String)> {
    text.lines()
        .filter_map(|line| split_caret_line(line, 3))
        .map(|fields| {
            (
                fields[0].to_string(),
                fields[1].to_string(),
                fields[2].to_string(),
            )
        })
        .collect()
}
