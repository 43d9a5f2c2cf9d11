//! Ingestion of knowledge articles and doctor records into the vector index

use super::{chunk_by_tokens, point_id, Distance, Point, VectorIndex};
use crate::error::{MedAssistError, Result};
use crate::llm::Embedder;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A health article before chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source_link: String,
}

/// A doctor as stored in the doctor collection. Field names are the payload keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub doctor_name: String,
    pub doctor_field: String,
    pub doctor_description: String,
    pub availability: bool,
    pub appointment_link: String,
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub documents: usize,
    pub points: usize,
    pub skipped: usize,
    pub created_collection: bool,
}

/// Embed and store articles, one point per chunk.
///
/// Each chunk is embedded as `Title: …\nContent: …` and carries
/// `chunk_index`/`total_chunks` so retrieval can merge chunks back by title.
pub async fn ingest_articles(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    collection: &str,
    articles: &[KnowledgeArticle],
    chunk_tokens: usize,
) -> Result<IngestReport> {
    let created = index
        .ensure_collection(collection, embedder.dimensions(), Distance::Cosine)
        .await?;

    let mut report = IngestReport {
        collection: collection.to_string(),
        created_collection: created,
        ..Default::default()
    };

    for article in articles {
        let chunks = chunk_by_tokens(&article.content, chunk_tokens);
        if article.title.trim().is_empty() || chunks.is_empty() {
            tracing::warn!("Skipping article without title or content: {:?}", article.title);
            report.skipped += 1;
            continue;
        }

        let texts: Vec<String> = chunks
            .iter()
            .map(|chunk| format!("Title: {}\nContent: {}", article.title, chunk))
            .collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let total_chunks = chunks.len();
        let points: Vec<Point> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (content, vector))| Point {
                id: point_id(collection, &article.title, chunk_index),
                vector,
                payload: json!({
                    "title": article.title,
                    "content": content,
                    "source_link": article.source_link,
                    "chunk_index": chunk_index,
                    "total_chunks": total_chunks,
                }),
            })
            .collect();

        // A shorter revision must not leave earlier trailing chunks behind
        if !created {
            index.delete_by_payload(collection, "title", &article.title).await?;
        }
        report.points += index.upsert(collection, points).await?;
        report.documents += 1;
        tracing::debug!("Ingested '{}' as {} chunks", article.title, total_chunks);
    }

    tracing::info!(
        "Ingested {} articles ({} points, {} skipped) into {}",
        report.documents,
        report.points,
        report.skipped,
        collection
    );
    Ok(report)
}

/// Embed each doctor's description and store one point per doctor
pub async fn ingest_doctors(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    collection: &str,
    doctors: &[DoctorRecord],
) -> Result<IngestReport> {
    let created = index
        .ensure_collection(collection, embedder.dimensions(), Distance::Cosine)
        .await?;

    let (valid, invalid): (Vec<&DoctorRecord>, Vec<&DoctorRecord>) = doctors
        .iter()
        .partition(|d| !d.doctor_name.trim().is_empty() && !d.doctor_description.trim().is_empty());
    for doctor in &invalid {
        tracing::warn!("Skipping doctor record without name or description: {:?}", doctor.doctor_name);
    }

    let mut report = IngestReport {
        collection: collection.to_string(),
        created_collection: created,
        skipped: invalid.len(),
        ..Default::default()
    };
    if valid.is_empty() {
        return Ok(report);
    }

    let texts: Vec<String> = valid.iter().map(|d| d.doctor_description.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;

    let points = valid
        .iter()
        .zip(vectors)
        .map(|(doctor, vector)| {
            Ok(Point {
                id: point_id(collection, &doctor.doctor_name, 0),
                vector,
                payload: serde_json::to_value(doctor)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    report.points = index.upsert(collection, points).await?;
    report.documents = valid.len();
    tracing::info!("Ingested {} doctors into {}", report.documents, collection);
    Ok(report)
}

/// Parse a JSON array of doctor records
pub fn load_doctor_records(json: &str) -> Result<Vec<DoctorRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Demo roster used to seed the doctor collection
pub fn demo_doctors() -> Vec<DoctorRecord> {
    vec![
        DoctorRecord {
            doctor_name: "Dr Hoh Hon Bing".to_string(),
            doctor_field: "Ophthalmology".to_string(),
            doctor_description: "Dr Hoh Hon Bing is an Ophthalmologist, who is trained to diagnose and treat all eye and visual problems including vision services (glasses and contacts) and provide treatment and prevention of medical disorders of the eye including surgery.".to_string(),
            availability: true,
            appointment_link: "https://www.pantai.com.my/kuala-lumpur/appointment/hoh-hon-bing".to_string(),
        },
        DoctorRecord {
            doctor_name: "Dr Azlina Firzah".to_string(),
            doctor_field: "Breast and Endocrinology".to_string(),
            doctor_description: "Dr Azlina Firzah is Breast Surgeon who specializes in cases related to breast cancer.".to_string(),
            availability: true,
            appointment_link: "https://www.pantai.com.my/kuala-lumpur/ms/appointment/azlina-firzah-bt-abd-aziz".to_string(),
        },
        DoctorRecord {
            doctor_name: "Dr Vijay Ananda Paramasvaran".to_string(),
            doctor_field: "Endocrinology".to_string(),
            doctor_description: "Dr Vijay Ananda Paramasvaran specializes in diabetics diagnosis and treatment.".to_string(),
            availability: false,
            appointment_link: "https://www.pantai.com.my/kuala-lumpur/appointment/vijay-ananda-paramasvaran".to_string(),
        },
    ]
}

/// Read articles from an RSS feed converted to JSON (`rss.channel.item[]`).
///
/// Titles and `encoded` bodies may be strings, `{"__cdata": …}` objects or
/// lists (first element wins). HTML is reduced to text. Items without a
/// title or body are skipped.
pub fn load_rss_articles(json: &str) -> Result<Vec<KnowledgeArticle>> {
    let root: Value = serde_json::from_str(json)?;
    let items = &root["rss"]["channel"]["item"];

    let items: Vec<&Value> = match items {
        Value::Array(list) => list.iter().collect(),
        Value::Object(_) => vec![items],
        Value::Null => {
            return Err(MedAssistError::InvalidInput(
                "feed has no rss.channel.item entries".to_string(),
            ))
        }
        _ => Vec::new(),
    };

    let mut articles = Vec::new();
    for item in items {
        if !item.is_object() {
            continue;
        }
        let title = text_field(&item["title"]).map(|t| clean_html(&t));
        let body = text_field(&item["encoded"])
            .or_else(|| text_field(&item["description"]))
            .map(|b| clean_html(&b));

        match (title, body) {
            (Some(title), Some(content)) if !title.is_empty() && !content.is_empty() => {
                articles.push(KnowledgeArticle {
                    title,
                    content,
                    source_link: text_field(&item["link"]).unwrap_or_default().trim().to_string(),
                });
            }
            _ => tracing::debug!("Skipping feed item without title or body"),
        }
    }

    tracing::info!("Loaded {} articles from feed", articles.len());
    Ok(articles)
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("__cdata").and_then(text_field),
        Value::Array(list) => list.first().and_then(text_field),
        _ => None,
    }
}

lazy_static! {
    static ref BLOCK_RE: Regex = Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap();
    static ref BREAK_RE: Regex = Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6])\s*/?>").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref ENTITY_RE: Regex = Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
    static ref BLANK_LINES_RE: Regex = Regex::new(r"\n\s*\n+").unwrap();
}

/// Strip tags, decode entities and squeeze blank lines
pub fn clean_html(html: &str) -> String {
    let text = BLOCK_RE.replace_all(html, "");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = ENTITY_RE.replace_all(&text, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn decode_entity(entity: &str) -> Option<String> {
    let decoded = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '-',
        "mdash" => '-',
        "rsquo" | "lsquo" => '\'',
        "rdquo" | "ldquo" => '"',
        "hellip" => return Some("...".to_string()),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some(decoded.to_string())
}
