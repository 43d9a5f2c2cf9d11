//! Knowledge-base and doctor search over the vector index

use super::sources::{
    availability_status, content_preview, doctor_block, doctor_from_hit, knowledge_block,
    relevance, DoctorItem, KnowledgeChunk, KnowledgeItem, SearchOutcome, SourceRecord,
};
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::llm::{Embedder, ToolCall, ToolKind};
use std::sync::Arc;

/// Embeds queries and turns index hits into source records
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

struct MergedArticle {
    title: String,
    source_link: String,
    chunks: Vec<(usize, String)>,
    scores: Vec<f32>,
}

impl MergedArticle {
    fn average_score(&self) -> f32 {
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }

    fn content(&self) -> String {
        let mut chunks = self.chunks.clone();
        chunks.sort_by_key(|(index, _)| *index);
        chunks.dedup_by_key(|(index, _)| *index);
        chunks
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Search health articles.
    ///
    /// Chunks of the same article are merged into one item whose score is the
    /// mean of its matching chunk scores. Returns the items with the text
    /// block for the model; both are empty when nothing clears the threshold.
    pub async fn search_knowledge_base(&self, query: &str) -> Result<(Vec<KnowledgeItem>, String)> {
        let vector = self.embedder.embed(query).await?;

        // Over-fetch so that merging chunks still leaves `limit` articles
        let fetch_limit = self.config.knowledge_limit.saturating_mul(3);
        let hits = self
            .index
            .query(
                &self.config.knowledge_collection,
                &vector,
                fetch_limit,
                Some(self.config.knowledge_threshold),
            )
            .await?;
        tracing::debug!("Knowledge search '{}': {} chunk hits", query, hits.len());

        let mut merged: Vec<MergedArticle> = Vec::new();
        for hit in &hits {
            let chunk = match KnowledgeChunk::from_hit(hit) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!("Ignoring hit: {}", e);
                    continue;
                }
            };
            match merged.iter_mut().find(|a| a.title == chunk.title) {
                Some(article) => {
                    article.chunks.push((chunk.chunk_index, chunk.content));
                    article.scores.push(hit.score);
                }
                None => merged.push(MergedArticle {
                    title: chunk.title,
                    source_link: chunk.source_link,
                    chunks: vec![(chunk.chunk_index, chunk.content)],
                    scores: vec![hit.score],
                }),
            }
        }

        merged.sort_by(|a, b| {
            b.average_score()
                .partial_cmp(&a.average_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(self.config.knowledge_limit);

        let mut items = Vec::with_capacity(merged.len());
        let mut blocks = Vec::with_capacity(merged.len());
        for article in merged {
            let content = article.content();
            blocks.push(knowledge_block(&article.title, &content, &article.source_link));
            items.push(KnowledgeItem {
                content_preview: content_preview(&content),
                relevance_score: relevance(article.average_score(), self.config.score_decimals),
                title: article.title,
                source_link: article.source_link,
            });
        }

        Ok((items, blocks.join("\n")))
    }

    /// Search the doctor roster
    pub async fn search_doctors(&self, query: &str) -> Result<(Vec<DoctorItem>, String)> {
        let vector = self.embedder.embed(query).await?;
        let hits = self
            .index
            .query(
                &self.config.doctor_collection,
                &vector,
                self.config.doctor_limit,
                Some(self.config.doctor_threshold),
            )
            .await?;
        tracing::debug!("Doctor search '{}': {} hits", query, hits.len());

        let mut items = Vec::with_capacity(hits.len());
        let mut blocks = Vec::with_capacity(hits.len());
        for hit in &hits {
            let doctor = match doctor_from_hit(hit) {
                Ok(doctor) => doctor,
                Err(e) => {
                    tracing::warn!("Ignoring hit: {}", e);
                    continue;
                }
            };
            blocks.push(doctor_block(&doctor));
            items.push(DoctorItem {
                availability_status: availability_status(doctor.availability).to_string(),
                relevance_score: relevance(hit.score, self.config.score_decimals),
                doctor_name: doctor.doctor_name,
                specialization: doctor.doctor_field,
                description: doctor.doctor_description,
                appointment_link: doctor.appointment_link,
            });
        }

        Ok((items, blocks.join("\n")))
    }

    /// Run the search a validated tool call asks for
    pub async fn execute(&self, call: &ToolCall) -> Result<SearchOutcome> {
        match call.kind {
            ToolKind::SearchKnowledgeBase => {
                let (items, combined_text) = self.search_knowledge_base(&call.query).await?;
                Ok(SearchOutcome {
                    kind: call.kind,
                    records: items.into_iter().map(SourceRecord::Knowledge).collect(),
                    combined_text,
                })
            }
            ToolKind::SearchDoctors => {
                let (items, combined_text) = self.search_doctors(&call.query).await?;
                Ok(SearchOutcome {
                    kind: call.kind,
                    records: items.into_iter().map(SourceRecord::Doctor).collect(),
                    combined_text,
                })
            }
        }
    }
}
