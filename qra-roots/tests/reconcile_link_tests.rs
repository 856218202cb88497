//! Integration tests for the reconciliation and reference-linking passes

mod helpers;

use helpers::{create_test_db, seed_tokens};
use qra_common::db::TokenStatus;
use qra_roots::db::{roots, tokens, TokenUpdate};
use qra_roots::discrepancy::DiscrepancyChecker;
use qra_roots::reconcile::reconcile;
use qra_roots::reference_linker;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

async fn set_sources(pool: &SqlitePool, id: i64, sources: &str) {
    sqlx::query("UPDATE tokens SET root_sources = ? WHERE id = ?")
        .bind(sources)
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

fn update(id: i64, root: &str, status: TokenStatus) -> TokenUpdate {
    TokenUpdate {
        id,
        root: root.to_string(),
        root_sources: BTreeMap::from([("mock".to_string(), root.to_string())]),
        status,
    }
}

#[tokio::test]
async fn test_reconcile_classifies_and_fills_missing() {
    let (_dir, pool) = create_test_db().await.unwrap();
    assert_eq!(seed_tokens(&pool, "1|1|كتاب يكتب قول علم مجهول").await, 5);

    set_sources(&pool, 1, r#"{"a":"كتب","b":"كتب"}"#).await;
    set_sources(&pool, 2, r#"{"a":"كتب","b":"كتت"}"#).await;
    set_sources(&pool, 3, r#"{"a":"قول","b":"قيل","c":"قلل"}"#).await;
    tokens::apply_root_updates(&pool, &[update(4, "علم", TokenStatus::Verified)], 1000)
        .await
        .unwrap();

    let report = reconcile(&pool, &DiscrepancyChecker::default(), 1000).await.unwrap();

    assert_eq!(report.statistics.total, 4);
    assert_eq!(report.statistics.verified, 2);
    assert_eq!(report.statistics.discrepancy, 1);
    assert_eq!(report.statistics.manual_review, 1);
    assert_eq!(report.tokens_updated, 3);

    let unanimous = tokens::load_token(&pool, 1).await.unwrap().unwrap();
    assert_eq!(unanimous.status, TokenStatus::Verified);
    assert_eq!(unanimous.root.as_deref(), Some("كتب"));

    let split = tokens::load_token(&pool, 2).await.unwrap().unwrap();
    assert_eq!(split.status, TokenStatus::Discrepancy);
    assert_eq!(split.root.as_deref(), Some("كتب"));

    let scattered = tokens::load_token(&pool, 3).await.unwrap().unwrap();
    assert_eq!(scattered.status, TokenStatus::ManualReview);

    // No sources at all: left alone
    let untouched = tokens::load_token(&pool, 5).await.unwrap().unwrap();
    assert_eq!(untouched.status, TokenStatus::Missing);
    assert!(untouched.root.is_none());

    // Second pass finds nothing left to write
    let again = reconcile(&pool, &DiscrepancyChecker::default(), 1000).await.unwrap();
    assert_eq!(again.tokens_updated, 0);
    assert_eq!(again.statistics, report.statistics);
}

#[tokio::test]
async fn test_reconcile_min_sources_threshold() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_tokens(&pool, "1|1|كتاب").await;
    set_sources(&pool, 1, r#"{"a":"كتب","b":"كتب"}"#).await;

    let strict = DiscrepancyChecker::new(3);
    let report = reconcile(&pool, &strict, 1000).await.unwrap();

    // Unanimous below the minimum still verifies
    assert_eq!(report.statistics.verified, 1);
    assert_eq!(tokens::load_token(&pool, 1).await.unwrap().unwrap().status, TokenStatus::Verified);
}

#[tokio::test]
async fn test_link_compresses_large_root_groups() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let content: String = (1..=501).map(|verse| format!("1|{}|كتاب\n", verse)).collect();
    assert_eq!(seed_tokens(&pool, &content).await, 501);
    seed_tokens(&pool, "2|1|علم قلم").await;

    let mut updates: Vec<TokenUpdate> = (1..=501).map(|id| update(id, "كتب", TokenStatus::Verified)).collect();
    updates.push(update(502, "علم", TokenStatus::Verified));
    updates.push(update(503, "علم", TokenStatus::Verified));
    tokens::apply_root_updates(&pool, &updates, 1000).await.unwrap();

    let report = reference_linker::persist(&pool, 100, 1000).await.unwrap();
    assert_eq!(report.statistics.total_roots, 2);
    assert_eq!(report.statistics.total_tokens, 503);
    assert_eq!(report.statistics.max_tokens_per_root, 501);
    assert_eq!(report.tokens_linked, 503);
    assert_eq!(report.roots_written, 2);

    let first = tokens::load_token(&pool, 1).await.unwrap().unwrap();
    let refs = first.references.unwrap();
    assert_eq!(refs.len(), 100);
    assert_eq!(refs.first(), Some(&2));
    assert_eq!(refs.last(), Some(&501));
    assert!(!refs.contains(&1));

    let small = tokens::load_token(&pool, 502).await.unwrap().unwrap();
    assert_eq!(small.references, Some(vec![503]));

    assert_eq!(roots::count_roots(&pool).await.unwrap(), 2);
    let entry = roots::load_root(&pool, "كتب").await.unwrap().unwrap();
    assert_eq!(entry.token_count, 501);
    assert_eq!(entry.tokens.len(), 501);

    // Rebuilding replaces rather than duplicates
    reference_linker::persist(&pool, 100, 1000).await.unwrap();
    assert_eq!(roots::count_roots(&pool).await.unwrap(), 2);
}
