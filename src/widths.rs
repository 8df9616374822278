//! # Width Tables
//!
//! CID fonts carry a `/W` array keyed by CID; runs of consecutive CIDs
//! share one `first [w0 w1 ...]` entry. Simple fonts carry a flat
//! `/Widths` array covering `FirstChar..=LastChar`.
//!
//! Widths are in thousandths of an em. By default they are truncated to
//! integers; a configured precision rounds to that many decimals instead.

use std::fmt::Write as FmtWrite;

/// A run of consecutive glyph ids with one width each.
#[derive(Debug, Clone, PartialEq)]
pub struct WidthRun {
    pub first: u16,
    pub last: u16,
    pub widths: Vec<f64>,
}

/// Scale a font-unit advance to thousandths of an em.
pub fn to_thousandths(advance: u16, units_per_em: u16) -> f64 {
    advance as f64 * 1000.0 / units_per_em.max(1) as f64
}

/// Render a width using the configured precision.
pub fn format_width(width: f64, precision: Option<u8>) -> String {
    match precision {
        None => (width.trunc() as i64).to_string(),
        Some(digits) => format!("{:.*}", digits as usize, width),
    }
}

/// Group (gid, width) pairs into contiguous runs. Input must be sorted by
/// gid; repeated gids keep their first width.
pub fn width_runs(pairs: &[(u16, f64)]) -> Vec<WidthRun> {
    let mut runs: Vec<WidthRun> = Vec::new();
    for &(gid, width) in pairs {
        if let Some(run) = runs.last_mut() {
            if gid == run.last {
                continue;
            }
            if run.last.checked_add(1) == Some(gid) {
                run.last = gid;
                run.widths.push(width);
                continue;
            }
        }
        runs.push(WidthRun {
            first: gid,
            last: gid,
            widths: vec![width],
        });
    }
    runs
}

/// Build the `/W` array for a CIDFont.
pub fn cid_width_array(runs: &[WidthRun], precision: Option<u8>) -> String {
    let mut result = String::from("[");
    for run in runs {
        let widths: Vec<String> = run.widths.iter().map(|&w| format_width(w, precision)).collect();
        let _ = write!(result, " {} [{}]", run.first, widths.join(" "));
    }
    result.push_str(" ]");
    result
}

/// `/FirstChar`, `/LastChar` and `/Widths` of a simple font.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleWidths {
    pub first_char: u8,
    pub last_char: u8,
    pub widths: Vec<f64>,
}

impl SimpleWidths {
    /// Lay out (code, width) pairs over the span of assigned codes; codes
    /// nothing is assigned to get width 0.
    pub fn from_codes(pairs: &[(u8, f64)]) -> Option<Self> {
        let first_char = pairs.iter().map(|&(code, _)| code).min()?;
        let last_char = pairs.iter().map(|&(code, _)| code).max()?;
        let mut widths = vec![0.0; (last_char - first_char) as usize + 1];
        for &(code, width) in pairs {
            widths[(code - first_char) as usize] = width;
        }
        Some(Self {
            first_char,
            last_char,
            widths,
        })
    }

    pub fn to_pdf_array(&self, precision: Option<u8>) -> String {
        let widths: Vec<String> = self.widths.iter().map(|&w| format_width(w, precision)).collect();
        format!("[{}]", widths.join(" "))
    }
}
