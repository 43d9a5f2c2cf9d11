//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use medassist_core::chat::CurrentSources;
use medassist_core::index::IngestReport;
use medassist_core::{DoctorItem, KnowledgeItem};

pub fn format_knowledge(items: &[KnowledgeItem], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(items),
        OutputFormat::Cli => terminal::format_knowledge(items),
    }
}

pub fn format_doctors(items: &[DoctorItem], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(items),
        OutputFormat::Cli => terminal::format_doctors(items),
    }
}

pub fn format_report(report: &IngestReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(report),
        OutputFormat::Cli => terminal::format_report(report),
    }
}

pub fn format_sources(sources: &CurrentSources, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(sources),
        OutputFormat::Cli => terminal::format_sources(sources),
    }
}
