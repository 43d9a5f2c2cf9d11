//! Integration tests for ingestion and retrieval
//!
//! Tests:
//! 1. Idempotent collection creation
//! 2. Threshold exclusion
//! 3. Chunk regrouping by title with averaged scores
//! 4. Re-ingesting a shorter article replaces all of its chunks
//! 5. Feed import through to search
//! 6. Doctor search formatting

mod common;

use common::*;
use medassist_core::index::{
    demo_doctors, ingest_articles, ingest_doctors, load_rss_articles, KnowledgeArticle,
};
use medassist_core::{
    Distance, Embedder, RetrievalConfig, RetrievalService, SqliteIndex, ToolCall, ToolKind,
    VectorIndex,
};
use std::sync::Arc;

fn config(knowledge_threshold: f32) -> RetrievalConfig {
    RetrievalConfig {
        knowledge_collection: "kb_test".to_string(),
        doctor_collection: "doctors_test".to_string(),
        knowledge_threshold,
        ..RetrievalConfig::default()
    }
}

fn chunk_embedder() -> TableEmbedder {
    TableEmbedder::new(&[
        ("query-x", [1.0, 0.0, 0.0]),
        ("alpha", [1.0, 0.0, 0.0]),
        ("beta", [0.8, 0.6, 0.0]),
        ("gamma", [0.6, 0.8, 0.0]),
        ("hydration", [0.0, 1.0, 0.0]),
        ("sleep", [0.7, 0.7, 0.0]),
    ])
}

fn long_article() -> KnowledgeArticle {
    KnowledgeArticle {
        title: "Long Article".to_string(),
        content: "alpha one two. beta three four. gamma five six.".to_string(),
        source_link: "https://example.com/long".to_string(),
    }
}

async fn service_with(
    articles: &[KnowledgeArticle],
    config: RetrievalConfig,
) -> (RetrievalService, Arc<SqliteIndex>) {
    let embedder = Arc::new(chunk_embedder());
    let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
    ingest_articles(
        embedder.as_ref(),
        index.as_ref(),
        &config.knowledge_collection,
        articles,
        3,
    )
    .await
    .unwrap();
    let service = RetrievalService::new(embedder, index.clone(), config);
    (service, index)
}

#[tokio::test]
async fn test_ensure_collection_twice() {
    let index = SqliteIndex::open_in_memory().unwrap();
    assert!(index.ensure_collection("kb", 3, Distance::Cosine).await.unwrap());
    assert!(!index.ensure_collection("kb", 3, Distance::Cosine).await.unwrap());
    assert!(index.collection_exists("kb").await.unwrap());
    assert_eq!(index.count("kb").await.unwrap(), 0);
}

#[tokio::test]
async fn test_chunks_merge_into_one_item() {
    let (service, index) = service_with(&[long_article()], config(0.5)).await;
    assert_eq!(index.count("kb_test").await.unwrap(), 3);

    let (items, combined) = service.search_knowledge_base("query-x").await.unwrap();
    assert_eq!(items.len(), 1);

    let item = &items[0];
    assert_eq!(item.title, "Long Article");
    assert!((item.relevance_score - 0.8).abs() < 1e-3);
    assert_eq!(item.content_preview, "alpha one two. beta three four. gamma five six.");
    assert_eq!(
        combined,
        "Title: Long Article\nContent: alpha one two. beta three four. gamma five six.\nSource: https://example.com/long\n"
    );
}

#[tokio::test]
async fn test_only_matching_chunks_are_averaged() {
    let (service, _) = service_with(&[long_article()], config(0.7)).await;

    let (items, _) = service.search_knowledge_base("query-x").await.unwrap();
    assert_eq!(items.len(), 1);
    // alpha (1.0) and beta (0.8) clear the threshold, gamma (0.6) does not
    assert!((items[0].relevance_score - 0.9).abs() < 1e-3);
    assert_eq!(items[0].content_preview, "alpha one two. beta three four.");
}

#[tokio::test]
async fn test_threshold_excludes_everything() {
    let (service, _) = service_with(&[long_article()], config(0.6)).await;

    let (items, combined) = service.search_knowledge_base("nothing matches").await.unwrap();
    assert!(items.is_empty());
    assert!(combined.is_empty());
}

#[tokio::test]
async fn test_results_ordered_and_limited() {
    let articles = vec![
        long_article(),
        KnowledgeArticle {
            title: "Sleep Basics".to_string(),
            content: "sleep seven hours".to_string(),
            source_link: "https://example.com/sleep".to_string(),
        },
        KnowledgeArticle {
            title: "Hydration".to_string(),
            content: "hydration matters".to_string(),
            source_link: "https://example.com/water".to_string(),
        },
    ];
    let config = RetrievalConfig {
        knowledge_limit: 2,
        ..config(0.0)
    };
    let (service, _) = service_with(&articles, config).await;

    let (items, combined) = service.search_knowledge_base("query-x").await.unwrap();
    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Long Article", "Sleep Basics"]);
    assert!(items[0].relevance_score >= items[1].relevance_score);
    assert_eq!(combined.matches("Title: ").count(), 2);
    assert!(combined.contains("\n\nTitle: Sleep Basics"));
}

#[tokio::test]
async fn test_reingest_overwrites() {
    let (service, index) = service_with(&[long_article()], config(0.5)).await;
    ingest_articles(
        service.embedder().as_ref(),
        index.as_ref(),
        "kb_test",
        &[long_article()],
        3,
    )
    .await
    .unwrap();
    assert_eq!(index.count("kb_test").await.unwrap(), 3);
}

#[tokio::test]
async fn test_reingest_shorter_article_drops_old_chunks() {
    let (service, index) = service_with(&[long_article()], config(0.5)).await;
    assert_eq!(index.count("kb_test").await.unwrap(), 3);

    let revised = KnowledgeArticle {
        content: "alpha revised.".to_string(),
        ..long_article()
    };
    ingest_articles(
        service.embedder().as_ref(),
        index.as_ref(),
        "kb_test",
        &[revised],
        3,
    )
    .await
    .unwrap();
    assert_eq!(index.count("kb_test").await.unwrap(), 1);

    let (items, combined) = service.search_knowledge_base("query-x").await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content_preview, "alpha revised.");
    assert!(!combined.contains("beta"));
    assert!(!combined.contains("gamma"));
}

#[tokio::test]
async fn test_unrounded_scores() {
    let config = RetrievalConfig {
        score_decimals: None,
        ..config(0.5)
    };
    let (service, _) = service_with(&[long_article()], config).await;
    let (items, _) = service.search_knowledge_base("query-x").await.unwrap();
    let expected = (1.0f64 + 0.8 + 0.6) / 3.0;
    assert!((items[0].relevance_score - expected).abs() < 1e-4);
}

#[tokio::test]
async fn test_feed_import_end_to_end() {
    let feed = r#"{"rss":{"channel":{"item":[
        {"title":"Hydration","link":"https://example.com/water",
         "encoded":{"__cdata":"<p>Good <b>hydration</b> keeps you well.</p>"}}
    ]}}}"#;
    let articles = load_rss_articles(feed).unwrap();
    let (service, _) = service_with(&articles, config(0.5)).await;

    let call = ToolCall {
        id: "call_1".to_string(),
        kind: ToolKind::SearchKnowledgeBase,
        query: "hydration tips".to_string(),
    };
    let outcome = service.execute(&call).await.unwrap();
    assert_eq!(outcome.kind, ToolKind::SearchKnowledgeBase);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].title(), "Hydration");
    assert!(outcome.combined_text.contains("Content: Good hydration keeps you well."));
}

#[tokio::test]
async fn test_doctor_search() {
    let embedder = Arc::new(TableEmbedder::new(&embedder_rules()));
    let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
    let config = config(0.6);

    let report = ingest_doctors(
        embedder.as_ref(),
        index.as_ref(),
        &config.doctor_collection,
        &demo_doctors(),
    )
    .await
    .unwrap();
    assert_eq!(report.points, 3);
    assert!(report.created_collection);

    let service = RetrievalService::new(embedder.clone(), index, config);
    let (doctors, combined) = service.search_doctors("diabetes doctor").await.unwrap();

    assert_eq!(doctors.len(), 1);
    let doctor = &doctors[0];
    assert_eq!(doctor.doctor_name, "Dr Vijay Ananda Paramasvaran");
    assert_eq!(doctor.specialization, "Endocrinology");
    assert_eq!(doctor.availability_status, "Not Available");
    assert_eq!(
        doctor.appointment_link,
        "https://www.pantai.com.my/kuala-lumpur/appointment/vijay-ananda-paramasvaran"
    );
    assert!(doctor.relevance_score > 0.9 && doctor.relevance_score <= 1.0);
    assert!(combined.starts_with("Name: Dr Vijay Ananda Paramasvaran\nSpecialization: Endocrinology\n"));
    assert_eq!(embedder.dimensions(), 3);
}

#[tokio::test]
async fn test_missing_collection_surfaces_error() {
    let service = RetrievalService::new(
        Arc::new(chunk_embedder()),
        Arc::new(SqliteIndex::open_in_memory().unwrap()),
        config(0.5),
    );
    let err = service.search_knowledge_base("query-x").await.unwrap_err();
    assert!(err.is_index_error());
}
