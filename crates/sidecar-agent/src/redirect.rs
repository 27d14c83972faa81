//! Redirect sequence
//!
//! Navigating away aborts in-flight requests on some engines, so queued
//! analytics are flushed first. Query parameters of the current page carry
//! over to the destination unless the destination sets them itself.

use crate::queue::EventQueue;
use crate::readiness::ClientReadiness;
use sidecar_core::{merge_query_params, HostPage};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// What a redirect did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Navigated to the contained URL
    Navigated(String),
    /// Destination equals the current location
    SameLocation,
}

/// Whether navigation on this user agent cancels pending sends
///
/// True for iOS devices and desktop Safari. Chromium based browsers on
/// macOS also advertise `Safari` and are excluded.
#[must_use]
pub fn navigation_aborts_sends(user_agent: &str) -> bool {
    const IOS: [&str; 3] = ["iPhone", "iPad", "iPod"];
    const NOT_SAFARI: [&str; 5] = ["Chrome", "Chromium", "CriOS", "Android", "Edg"];

    if IOS.iter().any(|d| user_agent.contains(d)) {
        return true;
    }
    user_agent.contains("Safari")
        && user_agent.contains("Macintosh")
        && !NOT_SAFARI.iter().any(|b| user_agent.contains(b))
}

/// Performs page redirects on behalf of directives and host code
pub struct Redirector {
    page: Arc<dyn HostPage>,
    queue: Arc<EventQueue>,
    readiness: ClientReadiness,
}

impl fmt::Debug for Redirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redirector")
            .field("queue", &self.queue)
            .field("readiness", &self.readiness.state())
            .finish_non_exhaustive()
    }
}

impl Redirector {
    /// Redirector navigating `page` and flushing `queue` once `readiness` is ready
    #[must_use]
    pub fn new(page: Arc<dyn HostPage>, queue: Arc<EventQueue>, readiness: ClientReadiness) -> Self {
        Self {
            page,
            queue,
            readiness,
        }
    }

    /// Navigate to `raw`, resolved against the current location
    pub async fn redirect(&self, raw: &str) -> RedirectOutcome {
        let href = self.page.href();
        let resolved = Url::parse(&href).and_then(|current| {
            let destination = current.join(raw)?;
            Ok((current, destination))
        });

        let target = match resolved {
            Ok((current, destination)) => {
                if destination == current {
                    tracing::debug!(url = %destination, "redirect to current location ignored");
                    return RedirectOutcome::SameLocation;
                }
                let merged = merge_query_params(&destination, &current);
                if merged == current {
                    tracing::debug!(url = %merged, "redirect to current location ignored");
                    return RedirectOutcome::SameLocation;
                }
                merged.to_string()
            }
            Err(e) => {
                tracing::warn!(destination = raw, error = %e, "could not build redirect url; using it verbatim");
                raw.to_string()
            }
        };

        self.flush_before_navigation().await;
        tracing::info!(url = %target, "redirecting");
        self.page.navigate(&target);
        RedirectOutcome::Navigated(target)
    }

    async fn flush_before_navigation(&self) {
        if !self.readiness.is_ready() {
            tracing::warn!(
                pending = self.queue.pending_len(),
                "redirecting before the client is ready; queued events stay queued"
            );
            return;
        }

        if navigation_aborts_sends(&self.page.user_agent()) {
            if let Err(e) = self.queue.flush().await {
                tracing::warn!(error = %e, "flush before redirect failed");
            }
        } else {
            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move {
                if let Err(e) = queue.flush().await {
                    tracing::warn!(error = %e, "flush before redirect failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MemoryHostPage, TracingSink};
    use sidecar_core::{EventSink, QueuedEvent};

    const DESKTOP_SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 \
        (KHTML, like Gecko) Version/17.4 Safari/605.1.15";
    const DESKTOP_CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    const IPHONE_CHROME: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/124.0 Mobile/15E148 Safari/604.1";
    const ANDROID: &str = "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/124.0 Mobile Safari/537.36";
    const MAC_EDGE: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/124.0 Safari/537.36 Edg/124.0";

    #[test]
    fn user_agent_classification() {
        assert!(navigation_aborts_sends(DESKTOP_SAFARI));
        assert!(navigation_aborts_sends(IPHONE_CHROME));
        assert!(!navigation_aborts_sends(DESKTOP_CHROME));
        assert!(!navigation_aborts_sends(ANDROID));
        assert!(!navigation_aborts_sends(MAC_EDGE));
        assert!(!navigation_aborts_sends("curl/8.0"));
    }

    #[tokio::test]
    async fn flush_follows_client_readiness() {
        let page = Arc::new(
            MemoryHostPage::new("https://shop.example/a").with_user_agent(DESKTOP_SAFARI),
        );
        let sink = Arc::new(TracingSink::new());
        let queue = Arc::new(EventQueue::new(Arc::clone(&sink) as Arc<dyn EventSink>));
        let readiness = ClientReadiness::new();
        let redirector = Redirector::new(
            Arc::clone(&page) as Arc<dyn HostPage>,
            Arc::clone(&queue),
            readiness.clone(),
        );

        queue.log_event(QueuedEvent::new("E1"));
        redirector.redirect("/b").await;
        assert_eq!(queue.pending_len(), 1);
        assert!(sink.sent().is_empty());

        readiness.mark_ready();
        queue.follow(&readiness).await;
        redirector.redirect("/c").await;
        assert_eq!(sink.sent().len(), 1);
        assert_eq!(page.navigations().len(), 2);
    }
}
