//! `ReportKey` — wire form for scheduled-task parameters referencing a
//! downstream report: `REPORT_CODE:STAT[:DS1[:DS2]]` (spec §3, §6).

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::KeyParseError;

const KEY_PART_ENCODE_SET: &AsciiSet = &CONTROLS.add(b':').add(b'%');

/// A report key: a three-letter report code, a statistic tag, and zero, one,
/// or two data-source qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    report_code: String,
    stat: String,
    data_sources: Vec<String>,
}

impl ReportKey {
    /// Build a report key. `report_code` must be exactly three letters.
    pub fn new(
        report_code: impl Into<String>,
        stat: impl Into<String>,
        data_sources: Vec<String>,
    ) -> Result<Self, KeyParseError> {
        let report_code = report_code.into();
        if report_code.len() != 3 || !report_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(KeyParseError::EmptyPart(report_code));
        }
        if data_sources.len() > 2 {
            return Err(KeyParseError::BadReportKeyArity(format!(
                "{}:{}:{}",
                report_code,
                stat.into(),
                data_sources.join(":")
            )));
        }
        Ok(Self {
            report_code,
            stat: stat.into(),
            data_sources,
        })
    }

    pub fn report_code(&self) -> &str {
        &self.report_code
    }

    pub fn stat(&self) -> &str {
        &self.stat
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    /// Parse `REPORT_CODE:STAT[:DS1[:DS2]]`. Rejects anything not 2-4
    /// colon-separated tokens, percent-decoding each data-source part.
    pub fn parse(s: &str) -> Result<Self, KeyParseError> {
        let tokens: Vec<&str> = s.split(':').collect();
        if tokens.len() < 2 || tokens.len() > 4 {
            return Err(KeyParseError::BadReportKeyArity(s.to_string()));
        }
        let report_code = tokens[0];
        if report_code.len() != 3 || !report_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(KeyParseError::EmptyPart(s.to_string()));
        }
        let stat = tokens[1];
        if stat.is_empty() {
            return Err(KeyParseError::EmptyPart(s.to_string()));
        }
        let data_sources = tokens[2..]
            .iter()
            .map(|p| percent_decode_str(p).decode_utf8_lossy().into_owned())
            .collect();
        Ok(Self {
            report_code: report_code.to_string(),
            stat: stat.to_string(),
            data_sources,
        })
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.report_code, self.stat)?;
        for ds in &self.data_sources {
            write!(f, ":{}", utf8_percent_encode(ds, KEY_PART_ENCODE_SET))?;
        }
        Ok(())
    }
}
