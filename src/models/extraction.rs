//! Full-text extraction results.

use serde::{Deserialize, Serialize};

use super::ContentFingerprint;

/// Label given to text that precedes the first recognised heading
pub const PREAMBLE_LABEL: &str = "preamble";

/// A detected logical section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    pub body: String,
}

impl Section {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
        }
    }

    pub fn is_preamble(&self) -> bool {
        self.label == PREAMBLE_LABEL
    }
}

/// Statistics recorded for a successful extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub word_count: usize,
    pub section_count: usize,
    pub backend: String,
}

/// Outcome of extracting one artifact
///
/// Produced once per fingerprint and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    artifact: ContentFingerprint,
    text: String,
    sections: Vec<Section>,
    word_count: usize,
    backend: Option<String>,
    success: bool,
    failure_reason: Option<String>,
}

impl ExtractionResult {
    /// Successful extraction
    pub fn success(
        artifact: ContentFingerprint,
        text: String,
        sections: Vec<Section>,
        backend: impl Into<String>,
    ) -> Self {
        let word_count = text.split_whitespace().count();
        Self {
            artifact,
            text,
            sections,
            word_count,
            backend: Some(backend.into()),
            success: true,
            failure_reason: None,
        }
    }

    /// Every backend failed
    pub fn failure(artifact: ContentFingerprint, reason: impl Into<String>) -> Self {
        Self {
            artifact,
            text: String::new(),
            sections: Vec::new(),
            word_count: 0,
            backend: None,
            success: false,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn artifact(&self) -> &ContentFingerprint {
        &self.artifact
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_labels(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Backend that produced the text
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Statistics, present only for successful extractions
    pub fn stats(&self) -> Option<ExtractionStats> {
        let backend = self.backend.clone()?;
        self.success.then(|| ExtractionStats {
            word_count: self.word_count,
            section_count: self.sections.len(),
            backend,
        })
    }
}
