use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tour_dom::{ComputedStyle, DomPort, ElementSpec, MemoryDom, SearchScope};
use tour_editor_state::{Block, EditorStore, InMemoryEditorStore};
use tour_preconditions::PreconditionEngine;
use tourguide_core_types::{PlaybackConfig, PlaybackSession, Precondition, PreconditionKind};

struct Harness {
    dom: Arc<MemoryDom>,
    store: Arc<InMemoryEditorStore>,
    session: PlaybackSession,
    engine: PreconditionEngine,
}

fn harness_with(blocks: Vec<Block>) -> Harness {
    let dom = Arc::new(MemoryDom::new());
    let store = Arc::new(InMemoryEditorStore::with_dom(dom.clone()).with_blocks(blocks));
    let session = PlaybackSession::new();
    let engine = PreconditionEngine::new(
        dom.clone(),
        store.clone(),
        session.clone(),
        Arc::new(PlaybackConfig::default()),
    );
    Harness {
        dom,
        store,
        session,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(Vec::new())
}

fn pre(kind: PreconditionKind, params: serde_json::Value) -> Precondition {
    Precondition::new(kind, params)
}

fn insert(name: &str, marker: &str) -> Precondition {
    pre(
        PreconditionKind::InsertBlock,
        json!({ "blockName": name, "markerId": marker }),
    )
}

#[tokio::test(start_paused = true)]
async fn unknown_type_fails_alone() {
    let h = harness();
    let batch = h
        .engine
        .apply_all(&[
            pre(PreconditionKind::EnsureSidebarOpen, json!(null)),
            Precondition {
                kind: "unknownType".to_string(),
                params: json!(null),
            },
        ])
        .await;

    assert!(!batch.success);
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].kind, "unknownType");
    assert!(batch.results[0].success);
    assert!(h.store.is_sidebar_open().await.unwrap());
    assert_eq!(
        h.store.active_sidebar().await.unwrap().as_deref(),
        Some("edit-post/document")
    );
}

#[tokio::test(start_paused = true)]
async fn second_call_does_not_mutate() {
    let h = harness_with(vec![Block::new("p1", "core/paragraph")]);
    let cases = [
        pre(PreconditionKind::EnsureSidebarOpen, json!(null)),
        pre(PreconditionKind::SelectSidebarTab, json!({ "tab": "block" })),
        pre(PreconditionKind::EnsureSidebarClosed, json!(null)),
        pre(PreconditionKind::OpenInserter, json!(null)),
        pre(PreconditionKind::CloseInserter, json!(null)),
        pre(PreconditionKind::SelectBlock, json!({ "clientId": "p1" })),
    ];

    for precondition in &cases {
        assert!(h.engine.apply(precondition).await.success, "{}", precondition.kind);
        let after_first = h.store.mutation_count();
        assert!(h.engine.apply(precondition).await.success, "{}", precondition.kind);
        assert_eq!(h.store.mutation_count(), after_first, "{}", precondition.kind);
    }
    assert!(!h.store.is_sidebar_open().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn ensure_sidebar_open_switches_panel_when_named() {
    let h = harness();
    h.store.open_sidebar("edit-post/document").await.unwrap();

    let result = h
        .engine
        .apply(&pre(
            PreconditionKind::EnsureSidebarOpen,
            json!({ "sidebar": "block" }),
        ))
        .await;
    assert!(result.success);
    assert_eq!(
        h.store.active_sidebar().await.unwrap().as_deref(),
        Some("edit-post/block")
    );
}

#[tokio::test(start_paused = true)]
async fn sidebar_tab_falls_back_to_clicking_the_tab() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let tab = h.dom.append(
        body,
        &ElementSpec::new("button")
            .attr("role", "tab")
            .attr("data-tab-id", "edit-post/block")
            .text("Block"),
    );
    h.dom.on_click(tab, move |dom| dom.set_attribute(tab, "aria-selected", "true"));
    h.store.set_unavailable(true);

    let result = h
        .engine
        .apply(&pre(PreconditionKind::SelectSidebarTab, json!({ "tab": "block" })))
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(h.dom.attribute(tab, "aria-selected").as_deref(), Some("true"));
}

#[tokio::test(start_paused = true)]
async fn missing_parameter_is_reported() {
    let h = harness();
    let result = h
        .engine
        .apply(&pre(PreconditionKind::SelectSidebarTab, json!({})))
        .await;
    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("selectSidebarTab requires the 'tab' parameter")
    );
}

#[tokio::test(start_paused = true)]
async fn ensure_editor_waits_for_ready() {
    let h = harness();
    h.store.set_ready(false);
    let store = h.store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        store.set_ready(true);
    });

    let start = Instant::now();
    let result = h
        .engine
        .apply(&pre(PreconditionKind::EnsureEditor, json!(null)))
        .await;
    assert!(result.success);
    assert!(start.elapsed() < Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn ensure_editor_times_out_within_bound() {
    let h = harness();
    h.store.set_ready(false);

    let start = Instant::now();
    let result = h
        .engine
        .apply(&pre(PreconditionKind::EnsureEditor, json!(null)))
        .await;
    assert!(!result.success);
    assert_eq!(start.elapsed(), Duration::from_millis(2000));
    assert!(result.error.unwrap().starts_with("Timed out after 2000ms"));
}

#[tokio::test(start_paused = true)]
async fn focus_and_scroll_by_selector() {
    let h = harness_with(vec![
        Block::new("p1", "core/paragraph"),
        Block::new("p2", "core/paragraph"),
    ]);
    let wrapper = h.store.dom_element("p2").unwrap();
    let editable = h.dom.query_within(wrapper, "[contenteditable]").unwrap()[0];

    let focus = pre(
        PreconditionKind::FocusElement,
        json!({ "selector": "[data-block=\"p2\"] [contenteditable]" }),
    );
    let result = h.engine.apply(&focus).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.element, Some(editable));
    assert_eq!(h.dom.active_element(SearchScope::EditorFrame), Some(editable));
    assert_eq!(h.dom.caret(), Some(editable));
    assert!(h.engine.apply(&focus).await.success);

    let result = h
        .engine
        .apply(&pre(
            PreconditionKind::ScrollIntoView,
            json!({ "selector": "#block-p2" }),
        ))
        .await;
    assert!(result.success);
    assert_eq!(result.element, Some(wrapper));
}

#[tokio::test(start_paused = true)]
async fn focus_on_missing_element_fails_after_timeout() {
    let h = harness();
    let start = Instant::now();
    let result = h
        .engine
        .apply(&pre(
            PreconditionKind::FocusElement,
            json!({ "selector": ".does-not-exist" }),
        ))
        .await;
    assert!(!result.success);
    assert_eq!(start.elapsed(), Duration::from_millis(2000));

    let invalid = h
        .engine
        .apply(&pre(PreconditionKind::FocusElement, json!({ "selector": "div[" })))
        .await;
    assert!(!invalid.success);
}

#[tokio::test(start_paused = true)]
async fn modal_opens_and_closes_once() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let trigger = h.dom.append(body, &ElementSpec::new("button").class("open-prefs"));
    let modal = h.dom.append(
        body,
        &ElementSpec::new("div")
            .class("components-modal__frame")
            .attr("role", "dialog")
            .hidden()
            .child(ElementSpec::new("button").attr("aria-label", "Close")),
    );
    let close = h.dom.query_within(modal, "button").unwrap()[0];
    h.dom
        .on_click(trigger, move |dom| dom.set_style(modal, ComputedStyle::default()));
    h.dom
        .on_click(close, move |dom| dom.set_style(modal, ComputedStyle::hidden()));

    let open = pre(
        PreconditionKind::OpenModal,
        json!({ "trigger": ".open-prefs", "modal": ".components-modal__frame" }),
    );
    let result = h.engine.apply(&open).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.element, Some(modal));

    // Already open: the trigger is not clicked again.
    let mut clicks = h.dom.subscribe();
    assert!(h.engine.apply(&open).await.success);
    assert!(clicks.try_recv().is_err());

    let close_modal = pre(
        PreconditionKind::CloseModal,
        json!({ "modal": ".components-modal__frame" }),
    );
    assert!(h.engine.apply(&close_modal).await.success);
    assert!(!tour_dom::is_visible(h.dom.as_ref(), modal));
    assert!(h.engine.apply(&close_modal).await.success);
}

#[tokio::test(start_paused = true)]
async fn insert_block_is_not_duplicated() {
    let h = harness();
    h.session.enter_step(0);

    let first = h.engine.apply(&insert("core/paragraph", "m1")).await;
    assert!(first.success, "{:?}", first.error);
    let mutations = h.store.mutation_count();

    let again = h.engine.apply(&insert("core/paragraph", "m1")).await;
    assert_eq!(again.element, first.element);
    assert_eq!(again.block_id, first.block_id);
    assert_eq!(h.store.mutation_count(), mutations);

    h.session.enter_step(1);
    h.session.enter_step(0);
    let back = h.engine.apply(&insert("core/paragraph", "m1")).await;
    assert_eq!(back.element, first.element);
    assert_eq!(h.store.block_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn insert_block_focuses_new_block() {
    let h = harness();
    h.session.enter_step(0);
    let result = h.engine.apply(&insert("core/heading", "title")).await;
    let id = result.block_id.unwrap();

    let wrapper = h.store.dom_element(&id).unwrap();
    assert_eq!(result.element, Some(wrapper));
    assert_eq!(h.store.selected_block_id().await.unwrap().as_deref(), Some(id.as_str()));
    let editable = h.dom.query_within(wrapper, "[contenteditable]").unwrap()[0];
    assert_eq!(h.dom.caret(), Some(editable));
    assert_eq!(h.session.global_marker("title").as_deref(), Some(id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn markers_never_share_blocks() {
    let h = harness();
    h.session.enter_step(0);
    let a = h.engine.apply(&insert("core/paragraph", "a")).await;
    let b = h.engine.apply(&insert("core/paragraph", "b")).await;
    assert_ne!(a.block_id, b.block_id);

    let a_again = h.engine.apply(&insert("core/paragraph", "a")).await;
    assert_eq!(a_again.block_id, a.block_id);
    assert_eq!(h.store.block_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn later_step_reuses_block_through_global_marker() {
    let h = harness();
    h.session.enter_step(0);
    let first = h.engine.apply(&insert("core/paragraph", "intro")).await;

    h.session.enter_step(3);
    let later = h.engine.apply(&insert("core/paragraph", "intro")).await;
    assert_eq!(later.block_id, first.block_id);
    assert_eq!(h.session.step_marker(3, "intro"), first.block_id);
    assert_eq!(h.store.block_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn existing_blocks_are_adopted_by_type() {
    let h = harness_with(vec![
        Block::new("img", "core/image"),
        Block::new("p0", "core/paragraph"),
    ]);
    h.session.enter_step(0);

    let image = h.engine.apply(&insert("core/image", "pic")).await;
    assert_eq!(image.block_id.as_deref(), Some("img"));

    // Heading requested, trailing paragraph is text-like: adopted.
    let heading = h.engine.apply(&insert("core/heading", "title")).await;
    assert_eq!(heading.block_id.as_deref(), Some("p0"));
    assert_eq!(h.store.block_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn text_blocks_never_adopt_media() {
    let h = harness_with(vec![Block::new("img", "core/image")]);
    h.session.enter_step(0);

    let paragraph = h.engine.apply(&insert("core/paragraph", "p")).await;
    assert!(paragraph.success);
    assert_ne!(paragraph.block_id.as_deref(), Some("img"));
    assert_eq!(h.store.block_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn removed_block_is_recreated() {
    let h = harness();
    h.session.enter_step(0);
    let first = h.engine.apply(&insert("core/paragraph", "m")).await;
    let first_id = first.block_id.clone().unwrap();
    h.store.remove_block(&first_id);

    let second = h.engine.apply(&insert("core/paragraph", "m")).await;
    assert!(second.success);
    assert_ne!(second.block_id, first.block_id);
    assert_eq!(h.session.current_step_marker("m"), second.block_id);
}

#[tokio::test(start_paused = true)]
async fn select_block_accepts_selector_expressions() {
    let h = harness_with(vec![
        Block::new("h1", "core/heading"),
        Block::new("img", "core/image"),
    ]);
    let result = h
        .engine
        .apply(&pre(
            PreconditionKind::SelectBlock,
            json!({ "clientId": "type:core/image" }),
        ))
        .await;
    assert!(result.success);
    assert_eq!(result.block_id.as_deref(), Some("img"));
    assert_eq!(h.store.selected_block_id().await.unwrap().as_deref(), Some("img"));

    let missing = h
        .engine
        .apply(&pre(PreconditionKind::SelectBlock, json!({ "clientId": "ghost" })))
        .await;
    assert!(!missing.success);
}

#[tokio::test(start_paused = true)]
async fn cancelled_batch_stops_before_inserting() {
    let h = harness();
    h.store.set_ready(false);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let batch = h
        .engine
        .apply_all_until(
            &[
                pre(PreconditionKind::EnsureEditor, json!(null)),
                insert("core/paragraph", "m1"),
            ],
            &cancel,
        )
        .await;

    assert!(batch.cancelled);
    assert!(!batch.success);
    assert!(batch.results.is_empty());
    assert!(start.elapsed() < Duration::from_millis(2000));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.block_count(), 0);
    assert_eq!(h.session.inserted_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn session_cleared_mid_batch_blocks_later_inserts() {
    let h = harness();
    h.store.set_ready(false);
    let session = h.session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        session.clear();
    });

    let batch = h
        .engine
        .apply_all(&[
            pre(PreconditionKind::EnsureEditor, json!(null)),
            insert("core/paragraph", "m1"),
        ])
        .await;

    assert!(!batch.cancelled);
    assert_eq!(batch.failed.len(), 2);
    assert_eq!(
        batch.failed[1].error.as_deref(),
        Some("Precondition run cancelled")
    );
    assert_eq!(h.store.block_count(), 0);
    assert_eq!(h.session.global_marker("m1"), None);
}
