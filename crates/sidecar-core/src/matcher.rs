//! Experiment matcher
//!
//! Decides which experiments apply to a (normalized) page URL. Matching is
//! pure and uncached; regex filters are compiled on every call.
//!
//! Regex filters use the `regex` crate, which guarantees linear-time matching
//! and has no look-around or backreferences. Filters relying on those fail to
//! compile, are logged, and never match.

use crate::types::{ExperimentDescriptor, FilterType};
use crate::url::url_path;
use regex::Regex;

/// Whether `descriptor` applies to `url`
#[must_use]
pub fn matches(descriptor: &ExperimentDescriptor, url: &str) -> bool {
    let mut filters = descriptor.filters.iter();
    match descriptor.effective_filter_type() {
        FilterType::Unknown => {
            tracing::debug!(experiment = %descriptor.id, "unknown filter type never matches");
            false
        }
        FilterType::All => true,
        _ if descriptor.filters.is_empty() => true,
        FilterType::Contains => filters.any(|f| url.contains(f.as_str())),
        FilterType::Equals => filters.any(|f| f == url),
        FilterType::Path => {
            let path = url_path(url);
            filters.any(|f| *f == path)
        }
        FilterType::Regex => filters.any(|f| match Regex::new(f) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                tracing::debug!(
                    experiment = %descriptor.id,
                    filter = %f,
                    error = %e,
                    "invalid regex filter"
                );
                false
            }
        }),
    }
}

/// Descriptors applying to `url`, in their original order
#[must_use]
pub fn matching_experiments<'a>(
    descriptors: &'a [ExperimentDescriptor],
    url: &str,
) -> Vec<&'a ExperimentDescriptor> {
    let matched: Vec<_> = descriptors.iter().filter(|d| matches(d, url)).collect();
    tracing::debug!(
        url,
        candidates = descriptors.len(),
        matched = matched.len(),
        "matched experiments"
    );
    matched
}

/// Matching descriptors that take part in automatic runs
#[must_use]
pub fn auto_run_experiments<'a>(
    descriptors: &'a [ExperimentDescriptor],
    url: &str,
) -> Vec<&'a ExperimentDescriptor> {
    matching_experiments(descriptors, url)
        .into_iter()
        .filter(|d| !d.disable_auto_run)
        .collect()
}
