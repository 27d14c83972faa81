//! Core types for the sidecar
//!
//! Defines the data consumed from the remote configuration:
//! - Experiment descriptors and their URL filters
//! - Directives (one closed variant per action)
//! - Queued analytics events
//! - The end user the provider evaluates

use crate::error::DecodeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// URL matching strategy of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Matches every page
    All,
    /// URL contains any filter
    Contains,
    /// URL equals any filter
    Equals,
    /// Any filter, as a regular expression, matches the URL
    ///
    /// Patterns use the `regex` crate syntax: no look-around and no
    /// backreferences. A pattern using them fails to compile and never
    /// matches.
    Regex,
    /// URL path equals any filter
    Path,
    /// Anything else the remote config sends; never matches
    #[serde(other)]
    Unknown,
}

/// Experiment as listed in the sidecar dynamic config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDescriptor {
    /// Experiment id, unique within one fetch
    pub id: String,
    /// Matching strategy; `None` means the legacy regex filter list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<FilterType>,
    /// Filter values, interpreted per `filter_type`
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<String>,
    /// Script injected before the experiment's directives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerun_script: Option<String>,
    /// Skip during automatic runs; still available on demand
    #[serde(default, deserialize_with = "null_as_default")]
    pub disable_auto_run: bool,
}

impl ExperimentDescriptor {
    /// Create descriptor matching every page
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filter_type: Some(FilterType::All),
            filters: Vec::new(),
            prerun_script: None,
            disable_auto_run: false,
        }
    }

    /// With filter type and values
    #[inline]
    #[must_use]
    pub fn with_filters<I, S>(mut self, filter_type: FilterType, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_type = Some(filter_type);
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// With prerun script
    #[inline]
    #[must_use]
    pub fn with_prerun_script(mut self, script: impl Into<String>) -> Self {
        self.prerun_script = Some(script.into());
        self
    }

    /// Excluded from automatic runs
    #[inline]
    #[must_use]
    pub fn manual_only(mut self) -> Self {
        self.disable_auto_run = true;
        self
    }

    /// Filter type after applying the legacy default
    #[inline]
    #[must_use]
    pub fn effective_filter_type(&self) -> FilterType {
        self.filter_type.unwrap_or(FilterType::Regex)
    }

    /// Decode a raw descriptor list entry by entry
    ///
    /// Malformed entries are logged and skipped; the rest keep their order.
    #[must_use]
    pub fn decode_list(entries: Vec<Value>) -> Vec<Self> {
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match serde_json::from_value(raw) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed experiment descriptor");
                    None
                }
            })
            .collect()
    }
}

/// Placement of a reordered element relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderOperator {
    /// Immediately before the anchor
    Before,
    /// Immediately after the anchor
    After,
    /// First child of the anchor
    First,
    /// Last child of the anchor
    Last,
}

/// A single declarative instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "kebab-case")]
pub enum Directive {
    /// Replace the inner markup of the target
    #[serde(rename_all = "camelCase")]
    ContentChange {
        /// Target selector
        query_path: String,
        /// New markup
        #[serde(default)]
        value: String,
    },
    /// Append to the target's inline style
    #[serde(rename_all = "camelCase")]
    StyleChange {
        /// Target selector
        query_path: String,
        /// Style fragment
        #[serde(default)]
        value: String,
    },
    /// Swap the target image source
    #[serde(rename_all = "camelCase")]
    ImageChange {
        /// Target selector
        query_path: String,
        /// New `src`
        #[serde(default)]
        value: String,
    },
    /// Move the target relative to an anchor
    #[serde(rename_all = "camelCase")]
    ReorderElement {
        /// Element to move
        query_path: String,
        /// Reference element
        anchor_query_path: String,
        /// Placement
        operator: ReorderOperator,
    },
    /// Append a `<script>` to the head
    InjectScript {
        /// Script body
        #[serde(default)]
        value: String,
    },
    /// Append a `<style>` to the head
    InjectStyle {
        /// Stylesheet body
        #[serde(default)]
        value: String,
    },
    /// Navigate elsewhere
    RedirectPage {
        /// Destination URL, absolute or relative to the current page
        #[serde(default)]
        value: String,
    },
}

impl Directive {
    /// Wire name of the action
    #[inline]
    #[must_use]
    pub fn action_type(&self) -> &'static str {
        match self {
            Directive::ContentChange { .. } => "content-change",
            Directive::StyleChange { .. } => "style-change",
            Directive::ImageChange { .. } => "image-change",
            Directive::ReorderElement { .. } => "reorder-element",
            Directive::InjectScript { .. } => "inject-script",
            Directive::InjectStyle { .. } => "inject-style",
            Directive::RedirectPage { .. } => "redirect-page",
        }
    }

    /// Whether the directive touches existing elements
    #[inline]
    #[must_use]
    pub fn requires_dom(&self) -> bool {
        matches!(
            self,
            Directive::ContentChange { .. }
                | Directive::StyleChange { .. }
                | Directive::ImageChange { .. }
                | Directive::ReorderElement { .. }
        )
    }

    /// Target selector, when the directive has one
    #[inline]
    #[must_use]
    pub fn query_path(&self) -> Option<&str> {
        match self {
            Directive::ContentChange { query_path, .. }
            | Directive::StyleChange { query_path, .. }
            | Directive::ImageChange { query_path, .. }
            | Directive::ReorderElement { query_path, .. } => Some(query_path),
            Directive::InjectScript { .. }
            | Directive::InjectStyle { .. }
            | Directive::RedirectPage { .. } => None,
        }
    }

    /// Decode one entry of a directive list
    ///
    /// # Errors
    /// `DecodeError` when the entry does not match any directive shape
    pub fn decode(index: usize, value: &Value) -> Result<Self, DecodeError> {
        Directive::deserialize(value).map_err(|e| DecodeError {
            index,
            message: e.to_string(),
        })
    }

    /// Decode a directive list entry by entry
    ///
    /// A non-array value decodes to an empty list.
    #[must_use]
    pub fn decode_list(value: &Value) -> Vec<Result<Self, DecodeError>> {
        value
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| Self::decode(i, entry))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Analytics event buffered until the client is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEvent {
    /// Event name
    pub event_name: String,
    /// Event value (string, number, or null)
    #[serde(default)]
    pub value: Value,
    /// Free-form string metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl QueuedEvent {
    /// Create event with no value or metadata
    #[inline]
    #[must_use]
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            value: Value::Null,
            metadata: BTreeMap::new(),
        }
    }

    /// With value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    /// With metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// User the remote provider evaluates experiments for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndUser {
    /// Primary identity
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Secondary identities (always contains `stableID`)
    #[serde(rename = "customIDs", default)]
    pub custom_ids: BTreeMap<String, String>,
    /// Page attributes used for targeting
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl EndUser {
    /// Stable id, when present
    #[inline]
    #[must_use]
    pub fn stable_id(&self) -> Option<&str> {
        self.custom_ids.get("stableID").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use pretty_assertions::assert_eq;

    #[test]
    fn malformed_descriptor_entries_are_skipped() {
        let decoded = ExperimentDescriptor::decode_list(vec![
            json!({"id": "first", "filterType": "contains", "filters": ["/a"]}),
            json!({"filters": ["/missing-id"]}),
            json!("not an object"),
            json!({"id": "last"}),
        ]);
        let ids: Vec<_> = decoded.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "last"]);
        assert_eq!(decoded[0].filter_type, Some(FilterType::Contains));
    }

    #[test]
    fn descriptor_defaults_to_regex_filters() {
        let d: ExperimentDescriptor =
            serde_json::from_value(json!({"id": "exp", "filters": ["/pricing"]})).unwrap();
        assert_eq!(d.filter_type, None);
        assert_eq!(d.effective_filter_type(), FilterType::Regex);
        assert!(!d.disable_auto_run);
    }

    #[test]
    fn descriptor_tolerates_nulls_and_unknown_types() {
        let d: ExperimentDescriptor = serde_json::from_value(json!({
            "id": "exp",
            "filterType": "glob",
            "filters": null,
            "disableAutoRun": null,
            "prerunScript": "window.x = 1;"
        }))
        .unwrap();
        assert_eq!(d.effective_filter_type(), FilterType::Unknown);
        assert!(d.filters.is_empty());
        assert_eq!(d.prerun_script.as_deref(), Some("window.x = 1;"));
    }

    #[test]
    fn directive_wire_format() {
        let d: Directive = serde_json::from_value(json!({
            "actionType": "reorder-element",
            "queryPath": "#cta",
            "anchorQueryPath": "#hero",
            "operator": "first"
        }))
        .unwrap();
        assert_eq!(
            d,
            Directive::ReorderElement {
                query_path: "#cta".to_string(),
                anchor_query_path: "#hero".to_string(),
                operator: ReorderOperator::First,
            }
        );
        assert_eq!(d.action_type(), "reorder-element");
        assert!(d.requires_dom());
        assert_eq!(d.query_path(), Some("#cta"));
    }

    #[test]
    fn inject_directives_need_no_dom() {
        let d: Directive =
            serde_json::from_value(json!({"actionType": "inject-style", "value": "a{}"})).unwrap();
        assert!(!d.requires_dom());
        assert_eq!(d.query_path(), None);
    }

    #[test]
    fn decode_list_isolates_bad_entries() {
        let list = json!([
            {"actionType": "content-change", "queryPath": "h1", "value": "Hi"},
            {"actionType": "explode"},
            {"actionType": "inject-script", "value": "go()"}
        ]);
        let decoded = Directive::decode_list(&list);
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_ok());
        assert_eq!(decoded[1].as_ref().unwrap_err().index, 1);
        assert!(decoded[2].is_ok());
    }

    #[test]
    fn decode_list_of_non_array_is_empty() {
        assert!(Directive::decode_list(&json!({"not": "a list"})).is_empty());
    }

    #[test]
    fn queued_event_builder() {
        let e = QueuedEvent::new("purchase")
            .with_value(9.99)
            .with_metadata("sku", "A1");
        assert_eq!(e.value, json!(9.99));
        assert_eq!(e.metadata.get("sku").map(String::as_str), Some("A1"));
    }

    #[test]
    fn end_user_serializes_with_wire_names() {
        let mut user = EndUser {
            user_id: "u1".to_string(),
            custom_ids: BTreeMap::new(),
            custom: BTreeMap::new(),
        };
        user.custom_ids.insert("stableID".to_string(), "s1".to_string());
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["userID"], "u1");
        assert_eq!(value["customIDs"]["stableID"], "s1");
        assert_eq!(user.stable_id(), Some("s1"));
    }
}
