//! Terminal output formatter

use medassist_core::chat::CurrentSources;
use medassist_core::index::IngestReport;
use medassist_core::{DoctorItem, KnowledgeItem};

fn score_pct(score: f64) -> u32 {
    (score * 100.0).round() as u32
}

pub fn format_knowledge(items: &[KnowledgeItem]) -> String {
    if items.is_empty() {
        return "No relevant articles found.\n".to_string();
    }

    let mut output = String::new();
    for item in items {
        output.push_str(&format!("{:>3}% {}\n", score_pct(item.relevance_score), item.title));
        output.push_str(&format!("     {}\n", item.content_preview));
        if !item.source_link.is_empty() {
            output.push_str(&format!("     {}\n", item.source_link));
        }
    }
    output
}

pub fn format_doctors(items: &[DoctorItem]) -> String {
    if items.is_empty() {
        return "No matching doctors found.\n".to_string();
    }

    let mut output = String::new();
    for item in items {
        output.push_str(&format!(
            "{:>3}% {} ({}) [{}]\n",
            score_pct(item.relevance_score),
            item.doctor_name,
            item.specialization,
            item.availability_status
        ));
        output.push_str(&format!("     {}\n", item.appointment_link));
    }
    output
}

pub fn format_report(report: &IngestReport) -> String {
    let mut output = format!(
        "Ingested {} documents as {} points into {}\n",
        report.documents, report.points, report.collection
    );
    if report.created_collection {
        output.push_str("  Created collection\n");
    }
    if report.skipped > 0 {
        output.push_str(&format!("  Skipped {} incomplete records\n", report.skipped));
    }
    output
}

pub fn format_sources(sources: &CurrentSources) -> String {
    if sources.is_empty() {
        return "No sources yet.\n".to_string();
    }

    let mut output = String::new();
    if !sources.knowledge_base.is_empty() {
        output.push_str("Sources:\n");
        output.push_str(&format_knowledge(&sources.knowledge_base));
    }
    if !sources.doctors.is_empty() {
        output.push_str("Doctors:\n");
        output.push_str(&format_doctors(&sources.doctors));
    }
    output
}
