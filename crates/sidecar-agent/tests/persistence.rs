//! Tests for directive persistence under competing page scripts.
//!
//! Core guarantees:
//! - A rewritten element gets its experiment content back.
//! - Re-application converges: once the content is ours, mutations stop.
//! - Dropped style declarations are appended again, never duplicated.
//! - Competing rewrites of one element settle on the later directive.

use pretty_assertions::assert_eq;
use serde_json::json;
use sidecar_dom::Document;
use sidecar_test_utils::{settle_watches, Harness, HarnessBuilder, SnapshotBuilder};

const PAGE: &str = r#"<div id="hero"><h1 id="title">Welcome</h1><p id="lede">Hello</p></div>"#;

async fn harness(directives: serde_json::Value) -> Harness {
    let snapshot = SnapshotBuilder::new()
        .experiment(json!({"id": "hero"}), directives)
        .build();
    let h = HarnessBuilder::new(PAGE).snapshot(snapshot).build();
    h.agent.setup().await;
    settle_watches().await;
    h
}

/// Tenet: content rewritten by the page is re-applied.
#[tokio::test]
async fn rewritten_content_is_restored() {
    let h = harness(json!([
        {"actionType": "content-change", "queryPath": "#title", "value": "Try it free"}
    ]))
    .await;
    assert_eq!(h.inner_html_of("title"), "Try it free");

    let title = h.document.element_by_id("title").unwrap();
    h.document.set_inner_html(title, "Welcome back").unwrap();
    settle_watches().await;

    assert_eq!(h.inner_html_of("title"), "Try it free");
}

/// Tenet: re-application stops once the page holds the experiment's value.
#[tokio::test]
async fn reapplication_converges() {
    let h = harness(json!([
        {"actionType": "content-change", "queryPath": "#title", "value": "Try it free"},
        {"actionType": "style-change", "queryPath": "#lede", "value": "color: green"}
    ]))
    .await;

    let lede = h.document.element_by_id("lede").unwrap();
    h.document.set_inner_html(lede, "Rendered by the page").unwrap();
    settle_watches().await;
    let settled = h.document.mutation_count();

    settle_watches().await;
    assert_eq!(h.document.mutation_count(), settled);
    assert_eq!(h.inner_html_of("title"), "Try it free");
    assert_eq!(h.attribute_of("lede", "style").as_deref(), Some("color: green"));
}

/// Tenet: a style declaration removed by the page comes back once.
#[tokio::test]
async fn removed_style_is_appended_again() {
    let h = harness(json!([
        {"actionType": "style-change", "queryPath": "#lede", "value": "font-size: 2em"}
    ]))
    .await;

    let lede = h.document.element_by_id("lede").unwrap();
    h.document.set_attribute(lede, "style", "margin: 0").unwrap();
    settle_watches().await;

    assert_eq!(
        h.attribute_of("lede", "style").as_deref(),
        Some("margin: 0; font-size: 2em")
    );
}

/// Tenet: a reorder survives the page moving the element back.
#[tokio::test]
async fn reorder_is_restored() {
    let h = harness(json!([
        {
            "actionType": "reorder-element",
            "queryPath": "#lede",
            "anchorQueryPath": "#title",
            "operator": "before"
        }
    ]))
    .await;
    let hero = h.document.element_by_id("hero").unwrap();
    assert!(h.document.inner_html(hero).unwrap().starts_with(r#"<p id="lede">"#));

    let title = h.document.element_by_id("title").unwrap();
    h.document.insert_before(hero, title, h.document.first_child(hero)).unwrap();
    settle_watches().await;

    assert!(h.document.inner_html(hero).unwrap().starts_with(r#"<p id="lede">"#));
}

/// Tenet: every persisted directive keeps a live watch.
#[tokio::test]
async fn watches_stay_registered() {
    let h = harness(json!([
        {"actionType": "content-change", "queryPath": "#title", "value": "A"},
        {"actionType": "style-change", "queryPath": "#lede", "value": "color: blue"},
        {"actionType": "inject-style", "value": "h1 { margin: 0 }"}
    ]))
    .await;
    assert_eq!(h.agent.interpreter().watch_count(), 2);
    assert!(h.document.observer_count() >= 2);
}

/// Tenet: when two experiments rewrite one element, the later one wins and
/// the page stops changing.
#[tokio::test]
async fn competing_experiments_settle_on_the_later_value() {
    let snapshot = SnapshotBuilder::new()
        .experiment(
            json!({"id": "first"}),
            json!([{"actionType": "content-change", "queryPath": "#title", "value": "A"}]),
        )
        .experiment(
            json!({"id": "second"}),
            json!([{"actionType": "content-change", "queryPath": "#title", "value": "B"}]),
        )
        .build();
    let h = HarnessBuilder::new(PAGE).snapshot(snapshot).build();
    h.agent.setup().await;
    settle_watches().await;

    assert_eq!(h.inner_html_of("title"), "B");
    assert_eq!(h.agent.interpreter().watch_count(), 1);

    let settled = h.document.mutation_count();
    settle_watches().await;
    assert_eq!(h.document.mutation_count(), settled);

    let title = h.document.element_by_id("title").unwrap();
    h.document.set_inner_html(title, "Welcome back").unwrap();
    settle_watches().await;
    assert_eq!(h.inner_html_of("title"), "B");
}
