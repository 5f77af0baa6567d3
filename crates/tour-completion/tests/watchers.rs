use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, Instant};

use tour_completion::{CompletionError, CompletionOutcome, CompletionWatcher};
use tour_dom::{DomPort, ElementSpec, MemoryDom, SearchScope};
use tour_editor_state::{Block, EditorStore, InMemoryEditorStore};
use tourguide_core_types::{Completion, CompletionType, PlaybackConfig, PlaybackSession};

struct Harness {
    dom: Arc<MemoryDom>,
    store: Arc<InMemoryEditorStore>,
    session: PlaybackSession,
    watcher: CompletionWatcher,
}

fn harness() -> Harness {
    let dom = Arc::new(MemoryDom::new());
    let store = Arc::new(InMemoryEditorStore::with_dom(dom.clone()));
    let session = PlaybackSession::new();
    let watcher = CompletionWatcher::new(
        dom.clone(),
        store.clone(),
        session.clone(),
        Arc::new(PlaybackConfig::default()),
    );
    Harness {
        dom,
        store,
        session,
        watcher,
    }
}

#[tokio::test(start_paused = true)]
async fn manual_resolves_only_on_confirm() {
    let h = harness();
    let watch = h.watcher.watch(&Completion::manual(), None).unwrap();
    let control = watch.control();
    let waiting = tokio::spawn(watch.wait());

    sleep(Duration::from_secs(30)).await;
    assert!(!waiting.is_finished());

    assert!(control.confirm());
    let outcome = waiting.await.unwrap();
    assert_eq!(outcome, CompletionOutcome::satisfied("manual"));
    assert_eq!(outcome.event.as_deref(), Some("manual"));
}

#[tokio::test(start_paused = true)]
async fn manual_cancelled_first_reports_cancelled() {
    let h = harness();
    let watch = h.watcher.watch(&Completion::manual(), None).unwrap();
    watch.cancel();
    let outcome = watch.wait().await;
    assert!(!outcome.success);
    assert!(outcome.cancelled);
    assert!(!outcome.timed_out);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_settling_changes_nothing() {
    let h = harness();
    let watch = h.watcher.watch(&Completion::manual(), None).unwrap();
    let control = watch.control();
    control.confirm();
    let waiting = tokio::spawn(watch.wait());
    let outcome = waiting.await.unwrap();

    control.cancel();
    control.cancel();
    assert!(outcome.success);
    assert!(control.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn timeout_is_bounded() {
    let h = harness();
    let start = Instant::now();
    let watch = h
        .watcher
        .watch(&Completion::manual().with_timeout(750), None)
        .unwrap();
    let outcome = watch.wait().await;
    assert_eq!(outcome, CompletionOutcome::timed_out());
    assert_eq!(start.elapsed(), Duration::from_millis(750));
}

#[tokio::test(start_paused = true)]
async fn click_target_ignores_clicks_during_grace() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let button = h.dom.append(
        body,
        &ElementSpec::new("button").child(ElementSpec::new("span").text("Publish")),
    );
    let label = h.dom.query_within(button, "span").unwrap()[0];
    let completion = Completion::new(CompletionType::ClickTarget).with_timeout(2000);

    let watch = h.watcher.watch(&completion, Some(button)).unwrap();
    let waiting = tokio::spawn(watch.wait());
    h.dom.click(button).unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    sleep(Duration::from_millis(250)).await;
    h.dom.click(label).unwrap();
    let outcome = waiting.await.unwrap();
    assert_eq!(outcome, CompletionOutcome::satisfied("click"));
}

#[tokio::test(start_paused = true)]
async fn click_elsewhere_does_not_complete() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let target = h.dom.append(body, &ElementSpec::new("button").text("Save"));
    let other = h.dom.append(body, &ElementSpec::new("button").text("Cancel"));

    let watch = h
        .watcher
        .watch(
            &Completion::new(CompletionType::ClickTarget).with_timeout(1000),
            Some(target),
        )
        .unwrap();
    sleep(Duration::from_millis(400)).await;
    h.dom.click(other).unwrap();
    assert!(watch.wait().await.timed_out);
}

#[tokio::test(start_paused = true)]
async fn value_change_against_snapshot_and_expected() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let field = h.dom.append(body, &ElementSpec::new("input").value("Draft"));
    let toggle = h
        .dom
        .append(body, &ElementSpec::new("input").attr("type", "checkbox"));

    let changed = h
        .watcher
        .watch(&Completion::new(CompletionType::DomValueChanged), Some(toggle))
        .unwrap();
    h.dom.click(toggle).unwrap();
    assert!(changed.wait().await.success);

    let expected = Completion::new(CompletionType::DomValueChanged)
        .with_params(json!({ "expected": "My first post" }))
        .with_timeout(3000);
    let watch = h.watcher.watch(&expected, Some(field)).unwrap();
    let waiting = tokio::spawn(watch.wait());
    h.dom.set_value(field, "My first");
    sleep(Duration::from_millis(200)).await;
    assert!(!waiting.is_finished());
    h.dom.set_value(field, "My first post");
    assert_eq!(
        waiting.await.unwrap(),
        CompletionOutcome::satisfied("valueChanged")
    );
}

#[tokio::test(start_paused = true)]
async fn named_attribute_is_watched() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let panel = h
        .dom
        .append(body, &ElementSpec::new("div").attr("aria-expanded", "false"));
    let completion = Completion::new(CompletionType::DomValueChanged)
        .with_params(json!({ "attribute": "aria-expanded", "expected": "true" }));

    let watch = h.watcher.watch(&completion, Some(panel)).unwrap();
    h.dom.set_attribute(panel, "aria-expanded", "true");
    assert!(watch.wait().await.success);
}

#[tokio::test(start_paused = true)]
async fn wp_data_checks_immediately_then_on_changes() {
    let h = harness();
    let count_is = |n: u64| {
        Completion::new(CompletionType::WpData).with_params(json!({
            "store": "core/block-editor",
            "selector": "getBlockCount",
            "operator": "equals",
            "expected": n,
        }))
    };

    let already = h.watcher.watch(&count_is(0), None).unwrap();
    assert!(already.wait().await.success);

    let watch = h.watcher.watch(&count_is(1), None).unwrap();
    h.store
        .insert_block("core/paragraph", json!({}))
        .await
        .unwrap();
    assert_eq!(watch.wait().await, CompletionOutcome::satisfied("wpData"));
}

#[tokio::test(start_paused = true)]
async fn wp_data_query_errors_mean_not_yet() {
    let h = harness();
    let completion = Completion::new(CompletionType::WpData)
        .with_params(json!({ "selector": "getSelectedBlockClientId", "operator": "truthy" }))
        .with_timeout(1000);
    h.store.set_unavailable(true);
    let watch = h.watcher.watch(&completion, None).unwrap();
    assert!(watch.wait().await.timed_out);
}

#[tokio::test(start_paused = true)]
async fn element_appear_wants_a_new_element() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    h.dom
        .append(body, &ElementSpec::new("div").class("components-snackbar"));
    let completion = Completion::new(CompletionType::ElementAppear)
        .with_params(json!({ "selector": ".components-snackbar" }))
        .with_timeout(2000);

    let watch = h.watcher.watch(&completion, None).unwrap();
    let waiting = tokio::spawn(watch.wait());
    sleep(Duration::from_millis(300)).await;
    assert!(!waiting.is_finished());

    let fresh = h
        .dom
        .append(body, &ElementSpec::new("div").class("components-snackbar"));
    assert!(waiting.await.unwrap().success);
    assert_eq!(h.session.last_appeared(), Some(format!("node:{}", fresh.0)));
}

#[tokio::test(start_paused = true)]
async fn element_appear_records_block_identity() {
    let h = harness();
    h.store
        .insert_block("core/paragraph", json!({}))
        .await
        .unwrap();
    let completion = Completion::new(CompletionType::ElementAppear)
        .with_params(json!({ "selector": "[data-block]" }))
        .with_timeout(2000);

    let watch = h.watcher.watch(&completion, None).unwrap();
    let image = h.store.insert_block("core/image", json!({})).await.unwrap();
    assert!(watch.wait().await.success);
    assert_eq!(
        h.session.last_appeared(),
        Some(format!("block:{}", image.client_id))
    );
}

#[tokio::test(start_paused = true)]
async fn element_disappear_polls_until_gone() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let notice = h.dom.append(body, &ElementSpec::new("div").class("welcome-guide"));
    let completion = Completion::new(CompletionType::ElementDisappear)
        .with_params(json!({ "selector": ".welcome-guide" }))
        .with_timeout(2000);

    let watch = h.watcher.watch(&completion, None).unwrap();
    let waiting = tokio::spawn(watch.wait());
    sleep(Duration::from_millis(450)).await;
    h.dom.remove(notice);
    assert_eq!(
        waiting.await.unwrap(),
        CompletionOutcome::satisfied("elementDisappear")
    );
}

#[tokio::test(start_paused = true)]
async fn custom_event_respects_target() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let panel = h.dom.append(body, &ElementSpec::new("div").class("tour-panel"));
    let other = h.dom.append(body, &ElementSpec::new("div").class("elsewhere"));

    let anywhere = Completion::new(CompletionType::CustomEvent)
        .with_params(json!({ "eventName": "tour:ready" }));
    let watch = h.watcher.watch(&anywhere, None).unwrap();
    h.dom.dispatch_custom("tour:ready", None);
    assert_eq!(watch.wait().await, CompletionOutcome::satisfied("tour:ready"));

    let scoped = Completion::new(CompletionType::CustomEvent)
        .with_params(json!({ "eventName": "tour:ready", "target": ".tour-panel" }))
        .with_timeout(1000);
    let watch = h.watcher.watch(&scoped, None).unwrap();
    h.dom.dispatch_custom("tour:ready", Some(other));
    h.dom.dispatch_custom("tour:other", Some(panel));
    h.dom.dispatch_custom("tour:ready", Some(panel));
    assert!(watch.wait().await.success);
}

#[tokio::test(start_paused = true)]
async fn unknown_rule_is_manual_and_targets_are_required() {
    let h = harness();
    let unknown: Completion = serde_json::from_value(json!({ "type": "shake" })).unwrap();
    let watch = h.watcher.watch(&unknown, None).unwrap();
    assert!(watch.control().accepts_confirm());
    watch.confirm();
    assert!(watch.wait().await.success);

    let err = h
        .watcher
        .watch(&Completion::new(CompletionType::DomValueChanged), None)
        .err();
    assert_eq!(err, Some(CompletionError::MissingTarget("domValueChanged")));
}

#[tokio::test(start_paused = true)]
async fn dropping_a_watch_cancels_it() {
    let h = harness();
    let body = h.dom.body(SearchScope::Main);
    let button = h.dom.append(body, &ElementSpec::new("button"));
    let watch = h
        .watcher
        .watch(&Completion::new(CompletionType::ClickTarget), Some(button))
        .unwrap();
    let control = watch.control();
    assert!(!control.accepts_confirm());
    assert!(!control.confirm());
    drop(watch);
    assert!(control.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn seeded_blocks_are_not_new() {
    let dom = Arc::new(MemoryDom::new());
    let store = Arc::new(
        InMemoryEditorStore::with_dom(dom.clone()).with_blocks(vec![Block::new("img", "core/image")]),
    );
    let watcher = CompletionWatcher::new(
        dom.clone(),
        store.clone(),
        PlaybackSession::new(),
        Arc::new(PlaybackConfig::default()),
    );
    let completion = Completion::new(CompletionType::ElementAppear)
        .with_params(json!({ "selector": "[data-type=\"core/image\"]" }))
        .with_timeout(500);
    let watch = watcher.watch(&completion, None).unwrap();
    assert!(watch.wait().await.timed_out);
    assert_eq!(store.block_count(), 1);
}
