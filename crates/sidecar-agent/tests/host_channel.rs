//! Tests for directives pushed by host page code after setup.

use pretty_assertions::assert_eq;
use sidecar_core::Directive;
use sidecar_dom::Document;
use sidecar_test_utils::{HarnessBuilder, SnapshotBuilder};
use std::sync::Arc;

/// Tenet: script injection is accepted and acknowledged as handled.
#[tokio::test]
async fn script_injection_is_accepted() {
    let h = HarnessBuilder::new(r#"<h1 id="title">Welcome</h1>"#)
        .snapshot(SnapshotBuilder::new().build())
        .build();
    h.agent.setup().await;

    let (channel, receiver) = h.agent.open_host_channel();
    assert_eq!(channel.name(), "sidecar_client-test");
    let agent = Arc::clone(&h.agent);
    let server = tokio::spawn(async move { agent.serve_host_events(receiver).await });

    let handled = channel
        .send(Directive::InjectScript {
            value: "track()".to_string(),
        })
        .await;
    assert!(handled);
    let head = h.document.head().unwrap();
    assert!(h.document.inner_html(head).unwrap().ends_with("<script>track()</script>"));

    drop(channel);
    server.await.unwrap();
}

/// Tenet: anything but script injection is rejected and leaves the page alone.
#[tokio::test]
async fn dom_directives_are_rejected() {
    let h = HarnessBuilder::new(r#"<h1 id="title">Welcome</h1>"#)
        .snapshot(SnapshotBuilder::new().build())
        .build();
    h.agent.setup().await;

    let (channel, receiver) = h.agent.open_host_channel();
    let agent = Arc::clone(&h.agent);
    tokio::spawn(async move { agent.serve_host_events(receiver).await });

    let handled = channel
        .send(Directive::ContentChange {
            query_path: "#title".to_string(),
            value: "Hijacked".to_string(),
        })
        .await;
    assert!(!handled);
    assert_eq!(h.inner_html_of("title"), "Welcome");

    let redirected = channel
        .send(Directive::RedirectPage {
            value: "/elsewhere".to_string(),
        })
        .await;
    assert!(!redirected);
    assert!(h.page.navigations().is_empty());
}

/// Tenet: without a listening agent, sends resolve to not handled.
#[tokio::test]
async fn send_without_agent_is_not_handled() {
    let h = HarnessBuilder::new("").build();
    let (channel, receiver) = h.agent.open_host_channel();
    drop(receiver);

    assert!(
        !channel
            .send(Directive::InjectScript {
                value: "x()".to_string()
            })
            .await
    );
}
