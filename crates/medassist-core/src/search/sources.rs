//! Source records shown to the user, and their conversion from index hits

use crate::error::{MedAssistError, Result};
use crate::index::{DoctorRecord, ScoredPoint};
use crate::llm::ToolKind;
use serde::{Deserialize, Serialize};

/// Maximum characters of article content shown in a preview
pub const PREVIEW_CHARS: usize = 200;

/// A knowledge-base article (chunks already merged)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub title: String,
    pub content_preview: String,
    pub source_link: String,
    pub relevance_score: f64,
}

/// A doctor matched by the doctor search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorItem {
    pub doctor_name: String,
    pub specialization: String,
    pub description: String,
    pub availability_status: String,
    pub appointment_link: String,
    pub relevance_score: f64,
}

/// Either kind of source, discriminated when the hit is converted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRecord {
    Knowledge(KnowledgeItem),
    Doctor(DoctorItem),
}

impl SourceRecord {
    pub fn title(&self) -> &str {
        match self {
            SourceRecord::Knowledge(item) => &item.title,
            SourceRecord::Doctor(item) => &item.doctor_name,
        }
    }

    pub fn relevance_score(&self) -> f64 {
        match self {
            SourceRecord::Knowledge(item) => item.relevance_score,
            SourceRecord::Doctor(item) => item.relevance_score,
        }
    }
}

/// Result of executing one retrieval tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub kind: ToolKind,
    pub records: Vec<SourceRecord>,
    /// Compact text handed back to the model
    pub combined_text: String,
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One stored chunk of a knowledge article
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct KnowledgeChunk {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source_link: String,
    #[serde(default)]
    pub chunk_index: usize,
}

impl KnowledgeChunk {
    pub fn from_hit(hit: &ScoredPoint) -> Result<Self> {
        serde_json::from_value(hit.payload.clone()).map_err(|e| {
            MedAssistError::Index(format!("point {} is not a knowledge chunk: {}", hit.id, e))
        })
    }
}

pub(crate) fn doctor_from_hit(hit: &ScoredPoint) -> Result<DoctorRecord> {
    serde_json::from_value(hit.payload.clone())
        .map_err(|e| MedAssistError::Index(format!("point {} is not a doctor: {}", hit.id, e)))
}

/// Availability flag as displayed
pub fn availability_status(available: bool) -> &'static str {
    if available {
        "Available"
    } else {
        "Not Available"
    }
}

/// Cut to [`PREVIEW_CHARS`] characters, adding an ellipsis when cut
pub fn content_preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_string(),
    }
}

/// Round to `decimals` places and clamp to `[0, 1]`
pub fn relevance(score: f32, decimals: Option<u32>) -> f64 {
    let score = f64::from(score).clamp(0.0, 1.0);
    match decimals {
        Some(d) => {
            let factor = 10f64.powi(d as i32);
            (score * factor).round() / factor
        }
        None => score,
    }
}

pub(crate) fn knowledge_block(title: &str, content: &str, source_link: &str) -> String {
    format!(
        "Title: {}\nContent: {}\nSource: {}\n",
        title, content, source_link
    )
}

pub(crate) fn doctor_block(doctor: &DoctorRecord) -> String {
    format!(
        "Name: {}\nSpecialization: {}\nDescription: {}\nAvailability: {}\nAppointment: {}\n",
        doctor.doctor_name,
        doctor.doctor_field,
        doctor.doctor_description,
        availability_status(doctor.availability),
        doctor.appointment_link
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short"), "short");

        let exact = "a".repeat(PREVIEW_CHARS);
        assert_eq!(content_preview(&exact), exact);

        let long = "é".repeat(PREVIEW_CHARS + 5);
        let preview = content_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_relevance_rounding() {
        assert_eq!(relevance(0.83456, Some(3)), 0.835);
        assert_eq!(relevance(1.2, Some(3)), 1.0);
        assert_eq!(relevance(-0.1, None), 0.0);
        assert!((relevance(0.8345678, None) - 0.8345678).abs() < 1e-6);
    }

    #[test]
    fn test_source_record_is_tagged() {
        let record = SourceRecord::Doctor(DoctorItem {
            doctor_name: "Dr Hoh Hon Bing".into(),
            specialization: "Ophthalmology".into(),
            description: "Eyes".into(),
            availability_status: availability_status(true).into(),
            appointment_link: "https://example.com".into(),
            relevance_score: 0.7,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "doctor");
        assert_eq!(value["availability_status"], "Available");
        assert_eq!(record.title(), "Dr Hoh Hon Bing");
    }

    #[test]
    fn test_blocks() {
        assert_eq!(
            knowledge_block("Diabetes Overview", "Diabetes is a condition...", "https://example.com/diabetes"),
            "Title: Diabetes Overview\nContent: Diabetes is a condition...\nSource: https://example.com/diabetes\n"
        );
        let doctor = DoctorRecord {
            doctor_name: "Dr A".into(),
            doctor_field: "Endocrinology".into(),
            doctor_description: "Diabetes care".into(),
            availability: false,
            appointment_link: "l".into(),
        };
        assert!(doctor_block(&doctor).contains("Availability: Not Available\n"));
    }
}
