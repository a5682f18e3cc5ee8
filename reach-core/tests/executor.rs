mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{item_url, test_config, FakePage, SubmitMode};
use reach_core::browser::{BrowserResult, PageHandle};
use reach_core::engage::executor::SubmitTarget;
use reach_core::engage::{
    ActionExecutor, ActionKind, EngageError, EngageResult, ItemId, MemoryActionCache,
    NavigationState, PriorActionCache, Strategy, StrategyOutcome,
};

fn item(key: &str) -> ItemId {
    ItemId::parse(&item_url(key)).unwrap()
}

fn executor(cache: Arc<dyn PriorActionCache>) -> ActionExecutor {
    ActionExecutor::new(test_config(), "tester", cache)
}

struct BrokenCache;

#[async_trait]
impl PriorActionCache for BrokenCache {
    async fn has_prior_action(&self, _account: &str, _item: &ItemId) -> EngageResult<bool> {
        Err(EngageError::Cache("database is locked".into()))
    }

    async fn record_action(&self, _account: &str, _item: &ItemId, _text: &str) -> EngageResult<()> {
        Err(EngageError::Cache("database is locked".into()))
    }
}

struct CountingSubmit(Arc<AtomicUsize>);

#[async_trait]
impl Strategy<SubmitTarget> for CountingSubmit {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn attempt(
        &self,
        _page: &dyn PageHandle,
        _target: &SubmitTarget,
    ) -> BrowserResult<StrategyOutcome> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(StrategyOutcome::NotApplicable("counting only".into()))
    }
}

#[tokio::test]
async fn favorite_twice_mutates_at_most_once() {
    let config = test_config();
    let page = FakePage::new(&config);
    let mut executor = executor(Arc::new(MemoryActionCache::new()));
    let target = item("a");

    let mut nav = NavigationState::default();
    let first = executor.favorite(&page, &target, &mut nav).await.unwrap();
    let mut nav = NavigationState::default();
    let second = executor.favorite(&page, &target, &mut nav).await.unwrap();

    assert!(first.success());
    assert_eq!(first.strategy, Some("primary-endpoint"));
    assert!(second.success());
    assert_eq!(page.state().favorite_mutations(), 1);
    assert!(executor.is_known_favorite(&target));
    assert_eq!(executor.metrics().favorites_verified, 1);
}

#[tokio::test]
async fn already_favorited_item_is_left_alone() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().favorited.insert(item_url("a"));
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let outcome = executor.favorite(&page, &item("a"), &mut nav).await.unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.strategy, Some("already-set"));
    assert_eq!(page.state().favorite_mutations(), 0);
}

#[tokio::test]
async fn rejected_endpoints_fall_back_to_control_click() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().endpoint_ok = false;
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let outcome = executor.favorite(&page, &item("a"), &mut nav).await.unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.strategy, Some("control-click"));
    let state = page.state();
    assert_eq!(state.endpoint_calls, 2);
    assert_eq!(state.favorite_clicks, 1);
}

#[tokio::test]
async fn unverifiable_favorite_is_a_failure_not_an_error() {
    let config = test_config();
    let page = FakePage::new(&config);
    {
        let mut state = page.state();
        state.endpoint_ok = false;
        state.favorite_control = false;
    }
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let outcome = executor.favorite(&page, &item("a"), &mut nav).await.unwrap();
    assert_eq!(outcome.action, ActionKind::Favorite);
    assert_eq!(outcome.failure_reason(), Some("favorite could not be verified"));
    assert!(!executor.is_known_favorite(&item("a")));
}

#[tokio::test]
async fn reply_with_prior_action_is_skipped_without_touching_the_page() {
    let config = test_config();
    let page = FakePage::new(&config);
    let cache = Arc::new(MemoryActionCache::with_entries("tester", [item("a")]));
    let mut executor = executor(cache);

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Lovely!", &mut nav)
        .await
        .unwrap();
    assert_eq!(outcome.skipped_reason(), Some("already replied"));
    let state = page.state();
    assert!(state.navigations.is_empty());
    assert!(state.typed.is_empty());
    assert!(state.replies.is_empty());
}

#[tokio::test]
async fn reply_is_posted_verified_and_recorded() {
    let config = test_config();
    let page = FakePage::new(&config);
    let cache = Arc::new(MemoryActionCache::new());
    let mut executor = executor(cache.clone());

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "  Lovely light!  ", &mut nav)
        .await
        .unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.strategy, Some("submit-control"));
    assert_eq!(
        page.state().replies,
        vec![(item_url("a"), "Lovely light!".to_string())]
    );
    assert!(cache.has_prior_action("tester", &item("a")).await.unwrap());
    assert_eq!(executor.metrics().replies_posted, 1);
}

#[tokio::test]
async fn favorite_then_reply_share_one_navigation() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().endpoint_ok = false;
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let target = item("a");
    executor.favorite(&page, &target, &mut nav).await.unwrap();
    executor.reply(&page, &target, "Nice", &mut nav).await.unwrap();
    assert_eq!(page.state().navigations, vec![item_url("a")]);
}

#[tokio::test]
async fn mangled_input_is_cleared_and_retyped_once() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().drop_first_typing = true;
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Great composition", &mut nav)
        .await
        .unwrap();
    assert!(outcome.success());
    let state = page.state();
    assert_eq!(state.typed.len(), 2);
    assert_eq!(state.replies[0].1, "Great composition");
}

#[tokio::test]
async fn submit_falls_through_to_later_strategies() {
    for (mode, expected) in [
        (SubmitMode::AriaControl, "aria-control"),
        (SubmitMode::TextMatch, "text-match"),
        (SubmitMode::Proximity, "proximity"),
        (SubmitMode::EnterKey, "enter-key"),
    ] {
        let config = test_config();
        let page = FakePage::new(&config);
        page.state().submit_mode = mode;
        let mut executor = executor(Arc::new(MemoryActionCache::new()));

        let mut nav = NavigationState::default();
        let outcome = executor
            .reply(&page, &item("a"), "Nice one", &mut nav)
            .await
            .unwrap();
        assert!(outcome.success(), "{mode:?}");
        assert_eq!(outcome.strategy, Some(expected));
        assert_eq!(page.state().replies.len(), 1);
    }
}

#[tokio::test]
async fn unconfirmed_reply_fails_verification_and_is_not_recorded() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().submit_mode = SubmitMode::Broken;
    let cache = Arc::new(MemoryActionCache::new());
    let mut executor = executor(cache.clone());

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Nice one", &mut nav)
        .await
        .unwrap();
    assert_eq!(outcome.failure_reason(), Some("reply verification failed"));
    assert!(!cache.has_prior_action("tester", &item("a")).await.unwrap());
    assert_eq!(executor.metrics().verification_failures, 1);
}

#[tokio::test]
async fn no_applicable_submit_strategy_fails_the_reply() {
    let config = test_config();
    let page = FakePage::new(&config);
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut executor = executor(Arc::new(MemoryActionCache::new()))
        .with_submit_strategies(vec![Box::new(CountingSubmit(attempts.clone()))]);

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Nice one", &mut nav)
        .await
        .unwrap();
    assert_eq!(outcome.failure_reason(), Some("submit control not found"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn input_is_searched_again_after_one_scroll() {
    let config = test_config();
    let page = FakePage::new(&config);
    {
        let mut state = page.state();
        state.reply_input = false;
        state.reply_input_after_scroll = true;
    }
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Nice one", &mut nav)
        .await
        .unwrap();
    assert!(outcome.success());
}

#[tokio::test]
async fn missing_input_fails_the_reply() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().reply_input = false;
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Nice one", &mut nav)
        .await
        .unwrap();
    assert_eq!(outcome.failure_reason(), Some("reply input not found"));
    assert!(page.state().typed.is_empty());
}

#[tokio::test]
async fn unreadable_cache_fails_the_item_instead_of_replying() {
    let config = test_config();
    let page = FakePage::new(&config);
    let mut executor = executor(Arc::new(BrokenCache));

    let mut nav = NavigationState::default();
    let outcome = executor
        .reply(&page, &item("a"), "Nice one", &mut nav)
        .await
        .unwrap();
    assert!(outcome
        .failure_reason()
        .unwrap()
        .contains("prior-action lookup failed"));
    assert!(page.state().navigations.is_empty());
}

#[tokio::test]
async fn item_navigation_failure_surfaces_as_error() {
    let config = test_config();
    let page = FakePage::new(&config);
    page.state().fail_navigation.insert(item_url("a"));
    let mut executor = executor(Arc::new(MemoryActionCache::new()));

    let mut nav = NavigationState::default();
    let err = executor
        .favorite(&page, &item("a"), &mut nav)
        .await
        .unwrap_err();
    assert!(matches!(err, EngageError::Navigation { .. }));
    assert!(!err.is_fatal());
    assert_eq!(page.state().navigations.len(), 2);
}
