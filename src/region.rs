//! Locating method regions inside a disassembly file.
//!
//! A region is found with a two-state scanner over the file's lines rather
//! than a pattern spanning the whole method, since method bodies contain
//! arbitrary nested directives. Lines keep their terminators so a file can be
//! reassembled byte for byte.

use crate::error::{PatchError, PatchResult};
use crate::smali_parse::{is_method_end, is_method_start, parse_method_header};
use crate::types::MethodIdentity;

/// Inclusive line range from a `.method` line to its `.end method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRegion {
    pub start: usize,
    pub end: usize,
}

impl MethodRegion {
    /// Lines strictly between the two markers.
    pub fn body(&self) -> std::ops::Range<usize> {
        self.start + 1..self.end
    }
}

enum ScanState {
    Outside,
    Inside { start: usize },
}

/// Splits text into lines, each keeping its own terminator.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// The terminator the file predominantly uses.
pub fn line_terminator(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

pub fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(|c| c == '\n' || c == '\r')
}

/// Finds every region declaring `target`.
///
/// Returns an error if a matching declaration is not closed by `.end method`
/// before another `.method` line or the end of input.
pub fn find_regions(lines: &[&str], target: &MethodIdentity) -> PatchResult<Vec<MethodRegion>> {
    let mut regions = Vec::new();
    let mut state = ScanState::Outside;

    for (i, line) in lines.iter().enumerate() {
        state = match state {
            ScanState::Outside => {
                if is_method_start(line) && declares(line, target) {
                    ScanState::Inside { start: i }
                } else {
                    ScanState::Outside
                }
            }
            ScanState::Inside { start } => {
                if is_method_end(line) {
                    regions.push(MethodRegion { start, end: i });
                    ScanState::Outside
                } else if is_method_start(line) {
                    return Err(malformed(target, start));
                } else {
                    ScanState::Inside { start }
                }
            }
        };
    }

    if let ScanState::Inside { start } = state {
        return Err(malformed(target, start));
    }
    Ok(regions)
}

fn declares(line: &str, target: &MethodIdentity) -> bool {
    match parse_method_header(strip_terminator(line)) {
        Ok((_, header)) => target.matches(&header),
        Err(_) => false,
    }
}

fn malformed(target: &MethodIdentity, start: usize) -> PatchError {
    PatchError::MalformedRegion {
        method: target.to_string(),
        line: start + 1,
    }
}
