//! Assembly Extractor
//!
//! Slices the printed machine code for one method out of a child's stdout.
//! The engine prints a compilation record that starts with a header line,
//! contains an entry-point label and is followed by metadata tables:
//!
//! ```text
//! ... noise ...
//! Compiled method (c2) ... sum_scalar ...
//!   [Entry Point]
//!   <machine code>            <- extracted
//! ImmutableOopMap ...
//! ```

use crate::config::MarkerConfig;
use std::fmt;
use thiserror::Error;

/// Which of the three markers is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Start of an optimized compilation record
    Compilation,
    /// Method entry point
    Entry,
    /// Start of trailing metadata
    Metadata,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::Compilation => write!(f, "compilation"),
            MarkerKind::Entry => write!(f, "entry point"),
            MarkerKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// A required marker was not found
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} marker {marker:?} not found")]
pub struct ExtractError {
    /// Marker role
    pub kind: MarkerKind,
    /// Marker text that was searched for
    pub marker: String,
}

/// The three sentinel strings framing a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    /// Start of an optimized compilation record
    pub compilation: String,
    /// Method entry point; the section starts right after it
    pub entry: String,
    /// Start of trailing metadata; the section ends right before it
    pub metadata: String,
}

impl Markers {
    /// Markers from explicit strings
    pub fn new(
        compilation: impl Into<String>,
        entry: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            compilation: compilation.into(),
            entry: entry.into(),
            metadata: metadata.into(),
        }
    }

    fn get(&self, kind: MarkerKind) -> &str {
        match kind {
            MarkerKind::Compilation => &self.compilation,
            MarkerKind::Entry => &self.entry,
            MarkerKind::Metadata => &self.metadata,
        }
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::from(&MarkerConfig::default())
    }
}

impl From<&MarkerConfig> for Markers {
    fn from(config: &MarkerConfig) -> Self {
        Self::new(&config.compilation, &config.entry, &config.metadata)
    }
}

/// Machine-code section borrowed from the captured stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedSection<'a> {
    text: &'a str,
}

impl<'a> ExtractedSection<'a> {
    /// Section text
    pub fn as_str(&self) -> &'a str {
        self.text
    }
}

/// Extract the section between the entry marker and the metadata marker.
///
/// The first compilation record wins. A missing metadata marker means the
/// section runs to the end of `text`.
pub fn extract<'a>(
    text: &'a str,
    markers: &Markers,
) -> Result<ExtractedSection<'a>, ExtractError> {
    let record = find(text, 0, markers, MarkerKind::Compilation)?;
    let entry = find(text, record, markers, MarkerKind::Entry)?;
    let start = entry + markers.entry.len();

    let end = text[start..]
        .find(markers.get(MarkerKind::Metadata))
        .map_or(text.len(), |offset| start + offset);

    Ok(ExtractedSection {
        text: &text[start..end],
    })
}

/// Byte offset of `kind`'s marker at or after `from`
fn find(
    text: &str,
    from: usize,
    markers: &Markers,
    kind: MarkerKind,
) -> Result<usize, ExtractError> {
    let marker = markers.get(kind);
    text[from..]
        .find(marker)
        .map(|offset| from + offset)
        .ok_or_else(|| ExtractError {
            kind,
            marker: marker.to_string(),
        })
}
