//! Retrieval over the knowledge and doctor collections
//!
//! Provides:
//! - Knowledge-base search with chunk regrouping by title
//! - Doctor search with availability mapping
//! - Typed source records for display and compact text for the model

mod retrieval;
mod sources;

pub use retrieval::RetrievalService;
pub use sources::{
    availability_status, content_preview, relevance, DoctorItem, KnowledgeItem, SearchOutcome,
    SourceRecord, PREVIEW_CHARS,
};
