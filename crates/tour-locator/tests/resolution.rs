use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use tour_dom::{DomPort, ElementSpec, MemoryDom, SearchScope};
use tour_editor_state::{Block, EditorStore, InMemoryEditorStore};
use tour_locator::{capture, LocatorError, LocatorResolver, RecoveryHook};
use tourguide_core_types::{
    Locator, LocatorType, PlaybackConfig, PlaybackSession, Target, TargetConstraints,
};

struct Harness {
    dom: Arc<MemoryDom>,
    store: Arc<InMemoryEditorStore>,
    session: PlaybackSession,
    resolver: LocatorResolver,
}

fn harness(store: InMemoryEditorStore, dom: Arc<MemoryDom>) -> Harness {
    let store = Arc::new(store);
    let session = PlaybackSession::new();
    let resolver = LocatorResolver::new(
        dom.clone(),
        store.clone(),
        session.clone(),
        Arc::new(PlaybackConfig::default()),
    );
    Harness {
        dom,
        store,
        session,
        resolver,
    }
}

fn plain(dom: MemoryDom) -> Harness {
    harness(InMemoryEditorStore::new(), Arc::new(dom))
}

#[tokio::test]
async fn test_id_locator_finds_publish_button() {
    let dom = MemoryDom::new();
    let body = dom.body(SearchScope::Main);
    let button = dom.append(
        body,
        &ElementSpec::new("button")
            .attr("data-testid", "publish-btn")
            .text("Publish"),
    );
    let h = plain(dom);

    let target = Target::new(vec![Locator::new(LocatorType::TestId, "publish-btn", 100)]);
    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(resolution.element, button);
    assert_eq!(resolution.used_locator.kind, LocatorType::TestId);
}

#[tokio::test]
async fn unique_test_id_beats_ambiguous_css() {
    let dom = MemoryDom::new();
    let body = dom.body(SearchScope::Main);
    dom.append(body, &ElementSpec::new("button").class("components-button"));
    let wanted = dom.append(
        body,
        &ElementSpec::new("button")
            .class("components-button")
            .attr("data-testid", "save"),
    );
    dom.append(body, &ElementSpec::new("button").class("components-button"));
    let h = plain(dom);

    let target = Target::new(vec![
        Locator::new(LocatorType::Css, ".components-button", 60),
        Locator::new(LocatorType::TestId, "save", 100),
    ]);
    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(resolution.element, wanted);
    assert_eq!(resolution.used_locator.kind, LocatorType::TestId);
    assert_eq!(resolution.candidates, 1);
}

#[tokio::test]
async fn single_match_short_circuits_lower_locators() {
    let dom = MemoryDom::new();
    let body = dom.body(SearchScope::Main);
    let first = dom.append(body, &ElementSpec::new("a").attr("href", "#").class("one"));
    dom.append(body, &ElementSpec::new("a").attr("href", "#").id("two"));
    let h = plain(dom);

    // The lower locator would match a higher-scoring element; it must never run.
    let target = Target::new(vec![
        Locator::new(LocatorType::Css, ".one", 90),
        Locator::new(LocatorType::Css, "a", 80),
    ]);
    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(resolution.element, first);
    assert_eq!(resolution.used_locator.value, ".one");
}

#[tokio::test]
async fn captured_target_resolves_back_to_same_element() {
    let dom = MemoryDom::new();
    let body = dom.body(SearchScope::Main);
    dom.append(
        body,
        &ElementSpec::new("header").class("edit-post-header").children([
            ElementSpec::new("button").attr("aria-label", "Toggle block inserter"),
            ElementSpec::new("button").attr("aria-label", "Undo"),
            ElementSpec::new("button").attr("aria-label", "Redo"),
        ]),
    );
    let undo = dom.find(SearchScope::Main, "[aria-label=\"Undo\"]").unwrap();
    let h = plain(dom);

    let target = capture(h.dom.as_ref(), undo);
    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(resolution.element, undo);
}

#[tokio::test]
async fn capture_then_resolve_inside_editor_frame() {
    let dom = Arc::new(MemoryDom::new());
    let store = InMemoryEditorStore::with_dom(dom.clone()).with_blocks(vec![
        Block::new("p1", "core/paragraph"),
        Block::new("p2", "core/paragraph"),
    ]);
    let h = harness(store, dom);

    let wrapper = h.store.dom_element("p2").unwrap();
    let editable = h.dom.query_within(wrapper, "[contenteditable]").unwrap()[0];
    let target = capture(h.dom.as_ref(), editable);
    assert_eq!(target.constraints.in_editor_iframe, Some(true));

    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(resolution.element, editable);
    assert_eq!(resolution.scope, SearchScope::EditorFrame);
}

#[tokio::test]
async fn block_locators_follow_editor_state() {
    let dom = Arc::new(MemoryDom::new());
    let store = InMemoryEditorStore::with_dom(dom.clone()).with_blocks(vec![
        Block::new("h1", "core/heading"),
        Block::new("img", "core/image"),
    ]);
    let h = harness(store, dom);

    let target = Target::new(vec![Locator::new(LocatorType::WpBlock, "type:core/image", 90)]);
    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(Some(resolution.element), h.store.dom_element("img"));

    let inserted = h
        .store
        .insert_block("core/paragraph", json!({}))
        .await
        .unwrap();
    h.session.enter_step(0);
    h.session.record_insert("intro", &inserted.client_id);
    let target = Target::new(vec![Locator::new(LocatorType::WpBlock, "inserted:intro", 90)]);
    let resolution = h.resolver.resolve(&target).await.unwrap();
    assert_eq!(Some(resolution.element), h.store.dom_element(&inserted.client_id));
}

#[tokio::test]
async fn scope_to_selected_block_restricts_candidates() {
    let dom = Arc::new(MemoryDom::new());
    let store = InMemoryEditorStore::with_dom(dom.clone()).with_blocks(vec![
        Block::new("a", "core/paragraph"),
        Block::new("b", "core/paragraph"),
    ]);
    let h = harness(store, dom);
    h.store.select_block("b").await.unwrap();

    let target = Target::new(vec![Locator::new(LocatorType::Css, "[contenteditable]", 60)])
        .with_constraints(TargetConstraints {
            in_editor_iframe: Some(true),
            scope_to_selected_block: Some(true),
            ..TargetConstraints::default()
        });
    let resolution = h.resolver.resolve(&target).await.unwrap();
    let selected = h.store.dom_element("b").unwrap();
    assert_eq!(h.dom.parent(resolution.element), Some(selected));
}

struct InsertOnRecover {
    dom: Arc<MemoryDom>,
    calls: AtomicUsize,
}

#[async_trait]
impl RecoveryHook for InsertOnRecover {
    async fn recover(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.dom.body(SearchScope::Main);
        self.dom
            .append(body, &ElementSpec::new("div").attr("role", "dialog").attr("aria-label", "Welcome"));
    }
}

#[tokio::test]
async fn recovery_retries_once_and_marks_result() {
    let dom = Arc::new(MemoryDom::new());
    let h = harness(InMemoryEditorStore::new(), dom.clone());
    let hook = InsertOnRecover {
        dom: dom.clone(),
        calls: AtomicUsize::new(0),
    };

    let target = Target::new(vec![Locator::new(LocatorType::Role, "dialog:Welcome", 80)]);
    let resolution = h
        .resolver
        .resolve_with_recovery(&target, Some(&hook))
        .await
        .unwrap();
    assert!(resolution.recovered);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);

    let missing = Target::new(vec![Locator::new(LocatorType::Css, ".never", 80)]);
    let err = h
        .resolver
        .resolve_with_recovery(&missing, Some(&hook))
        .await
        .unwrap_err();
    assert_eq!(err, LocatorError::NoMatch);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 2);

    let err = h.resolver.resolve_with_recovery(&missing, None).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(hook.calls.load(Ordering::SeqCst), 2);
}
