//! Index lifecycle E2E tests.
//!
//! Covers the alias swap onto a rebuilt index, its preconditions, stale
//! index cleanup and repeated full rebuilds.

use pretty_assertions::assert_eq;

use e2e_tests::{create_pages, TestHarness, ALIAS};
use nodeindex_indexing::{rebuild_index, IndexingError, NoOpProgressCallback, RebuildConfig};
use nodeindex_search::{
    AliasAction, IndexLifecycleManager, LifecycleState, MockSearchEngine, RecordedRequest,
    SearchError,
};

fn alias_requests(harness: &TestHarness) -> Vec<Vec<AliasAction>> {
    harness
        .engine
        .requests()
        .into_iter()
        .filter_map(|request| match request {
            RecordedRequest::UpdateAliases { actions } => Some(actions),
            _ => None,
        })
        .collect()
}

fn count_actions(actions: &[AliasAction]) -> (usize, usize) {
    let adds = actions.iter().filter(|a| a.is_add()).count();
    (actions.len() - adds, adds)
}

/// One remove for the old index and one add for the new one; repeating only adds.
#[tokio::test]
async fn test_swap_then_repeat() {
    let harness = TestHarness::new().with_engine(
        MockSearchEngine::new()
            .with_alias(ALIAS, "acme-old")
            .with_index("acme-new"),
    );
    let manager = IndexLifecycleManager::new(harness.search_engine(), ALIAS);

    manager.update_alias("new").await.unwrap();
    manager.update_alias("new").await.unwrap();

    let requests = alias_requests(&harness);
    assert_eq!(requests.len(), 2);
    assert_eq!(count_actions(&requests[0]), (1, 1));
    assert_eq!(requests[0][0].index(), "acme-old");
    assert_eq!(requests[0][1].index(), "acme-new");
    assert_eq!(count_actions(&requests[1]), (0, 1));
    assert_eq!(harness.engine.aliased(ALIAS), vec!["acme-new".to_string()]);
}

/// An empty postfix names the bare alias and is refused without side effects.
#[tokio::test]
async fn test_empty_postfix_is_refused() {
    let harness = TestHarness::new().with_engine(MockSearchEngine::new().with_alias(ALIAS, "acme-1"));
    let manager = IndexLifecycleManager::new(harness.search_engine(), ALIAS);

    let err = manager.update_alias("").await.unwrap_err();
    assert!(matches!(err, SearchError::Precondition(_)));
    assert!(alias_requests(&harness).is_empty());
    assert_eq!(harness.engine.aliased(ALIAS), vec!["acme-1".to_string()]);
}

/// Only unreferenced `acme-*` indices are removed.
#[tokio::test]
async fn test_cleanup_spares_live_and_foreign_indices() {
    let harness = TestHarness::new().with_engine(
        MockSearchEngine::new()
            .with_index("acme-1")
            .with_index("acme-2")
            .with_alias(ALIAS, "acme-3")
            .with_index("B-1"),
    );
    let manager = IndexLifecycleManager::new(harness.search_engine(), ALIAS);

    let mut removed = manager.remove_old_indices().await.unwrap();
    removed.sort();
    assert_eq!(removed, vec!["acme-1".to_string(), "acme-2".to_string()]);
    assert_eq!(
        harness.engine.indices(),
        vec!["B-1".to_string(), "acme-3".to_string()]
    );

    assert!(manager.remove_old_indices().await.unwrap().is_empty());
    assert_eq!(manager.status().await.unwrap().state(), LifecycleState::Clean);
}

/// Two rebuilds in a row: each swaps the alias and reclaims the previous index.
#[tokio::test]
async fn test_repeated_rebuilds() {
    let harness = TestHarness::new();
    let pages = create_pages(4);

    let first = rebuild_index(
        harness.search_engine(),
        ALIAS,
        &pages,
        &harness.settings.indexing,
        &RebuildConfig::default().with_postfix("1"),
        &NoOpProgressCallback,
    )
    .await
    .unwrap();
    assert_eq!(first.index_name, "acme-1");
    assert!(first.alias_update.unwrap().removed.is_empty());
    assert!(first.removed_indices.is_empty());

    let second = rebuild_index(
        harness.search_engine(),
        ALIAS,
        &pages[..2],
        &harness.settings.indexing,
        &RebuildConfig::default().with_postfix("2"),
        &NoOpProgressCallback,
    )
    .await
    .unwrap();
    assert_eq!(second.removed_indices, vec!["acme-1".to_string()]);
    assert_eq!(harness.engine.indices(), vec!["acme-2".to_string()]);
    assert_eq!(harness.engine.document_count(ALIAS), 2);
}

/// A rebuild abandoned before the swap leaves a stale candidate that the next cleanup reclaims.
#[tokio::test]
async fn test_abandoned_candidate_is_reclaimed() {
    let harness = TestHarness::new().with_engine(MockSearchEngine::new().with_alias(ALIAS, "acme-1"));

    let abandoned = rebuild_index(
        harness.search_engine(),
        ALIAS,
        &create_pages(2),
        &harness.settings.indexing,
        &RebuildConfig::default()
            .with_postfix("2")
            .with_update_alias(false),
        &NoOpProgressCallback,
    )
    .await
    .unwrap();
    assert_eq!(abandoned.index_name, "acme-2");

    let manager = IndexLifecycleManager::new(harness.search_engine(), ALIAS);
    let status = manager.status().await.unwrap();
    assert_eq!(status.state(), LifecycleState::StaleIndicesPending);
    assert_eq!(status.stale, vec!["acme-2".to_string()]);

    assert_eq!(
        manager.remove_old_indices().await.unwrap(),
        vec!["acme-2".to_string()]
    );
    assert_eq!(harness.engine.aliased(ALIAS), vec!["acme-1".to_string()]);
}

/// A concrete index carrying the alias name blocks the rebuild before any alias change.
#[tokio::test]
async fn test_concrete_index_named_like_alias() {
    let harness = TestHarness::new().with_engine(MockSearchEngine::new().with_index(ALIAS));

    let err = rebuild_index(
        harness.search_engine(),
        ALIAS,
        &create_pages(1),
        &harness.settings.indexing,
        &RebuildConfig::default().with_postfix("1"),
        &NoOpProgressCallback,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        IndexingError::Search(SearchError::Precondition(_))
    ));
    assert!(alias_requests(&harness).is_empty());
}
