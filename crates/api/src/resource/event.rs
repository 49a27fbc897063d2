//! Event cells, list assembly, and the warning correlation used by
//! workload summaries.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kanso_core::{DataCell, PropertyName, PropertyValue, ResourceKind};
use kanso_fetch::{list_namespaced, spawn_fetch, NamespaceQuery};
use kanso_metrics::Metric;
use kanso_select::{select, ListQuery};
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{absorb, ApiResult};
use crate::{object_meta_view, ListMeta, ObjectMetaView, TypeMetaView};

use super::{meta_property, render_time, text_or_missing, time_or_missing};

pub struct EventCell(pub Event);

impl DataCell for EventCell {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        if let Some(value) = meta_property(&self.0.metadata, name) {
            return value;
        }
        let event = &self.0;
        match name {
            PropertyName::Reason => text_or_missing(event.reason.as_deref()),
            PropertyName::Message => text_or_missing(event.message.as_deref()),
            PropertyName::Type => text_or_missing(event.type_.as_deref()),
            PropertyName::Count => event
                .count
                .map(|c| PropertyValue::count(i64::from(c)))
                .unwrap_or(PropertyValue::Missing),
            PropertyName::FirstSeen => time_or_missing(event.first_timestamp.as_ref()),
            PropertyName::LastSeen => time_or_missing(event.last_timestamp.as_ref()),
            _ => PropertyValue::Missing,
        }
    }
}

/// UI-ready event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub object_meta: ObjectMetaView,
    pub type_meta: TypeMetaView,
    pub message: String,
    pub reason: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub count: i64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

pub fn event_view(event: &Event) -> EventView {
    EventView {
        object_meta: object_meta_view(&event.metadata),
        type_meta: TypeMetaView::new(ResourceKind::Event),
        message: event.message.clone().unwrap_or_default(),
        reason: event.reason.clone().unwrap_or_default(),
        type_: event.type_.clone().unwrap_or_default(),
        count: event.count.map(i64::from).unwrap_or(0),
        first_seen: event.first_timestamp.as_ref().map(render_time),
        last_seen: event.last_timestamp.as_ref().map(render_time),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    pub list_meta: ListMeta,
    pub events: Vec<EventView>,
    pub cumulative_metrics: Vec<Metric>,
    pub errors: Vec<String>,
}

/// The kubelet leaves `type` empty on some events. Type them so the UI
/// can rely on the field: failure reasons become warnings, the rest are
/// normal.
pub fn fill_event_type(events: &mut [Event]) {
    for event in events.iter_mut() {
        if event.type_.as_deref().map_or(true, str::is_empty) {
            let failed = event
                .reason
                .as_deref()
                .is_some_and(|r| r.to_ascii_lowercase().contains("failed"));
            event.type_ = Some(if failed { "Warning" } else { "Normal" }.to_string());
        }
    }
}

/// Warning-type events whose involved object is `(kind, meta)`. Uids are
/// compared only when both sides carry one, so correlation still works on
/// partial references.
pub fn warnings_for(events: &[Event], kind: ResourceKind, meta: &ObjectMeta) -> Vec<EventView> {
    events
        .iter()
        .filter(|e| e.type_.as_deref() == Some("Warning"))
        .filter(|e| references(&e.involved_object, kind, meta))
        .map(event_view)
        .collect()
}

fn references(involved: &ObjectReference, kind: ResourceKind, meta: &ObjectMeta) -> bool {
    let kind_match = involved
        .kind
        .as_deref()
        .is_some_and(|k| k.eq_ignore_ascii_case(kind.as_str()));
    let name_match = involved.name.as_deref() == meta.name.as_deref();
    let ns_match = involved.namespace.as_deref() == meta.namespace.as_deref();
    let uid_match = match (involved.uid.as_deref(), meta.uid.as_deref()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    kind_match && name_match && ns_match && uid_match
}

/// Unwrap a delivered event list and type it for correlation.
pub(crate) fn events_with_types(events: Option<Arc<Vec<Event>>>) -> Vec<Event> {
    let mut events = events.map(|a| (*a).clone()).unwrap_or_default();
    fill_event_type(&mut events);
    events
}

/// Pure assembly over an already-fetched collection.
pub fn build_event_list(mut events: Vec<Event>, query: &ListQuery, errors: Vec<String>) -> EventList {
    fill_event_type(&mut events);
    let cells: Vec<EventCell> = events.into_iter().map(EventCell).collect();
    let (page, total) = select(cells, query);
    EventList {
        list_meta: ListMeta { total_items: total },
        events: page.iter().map(|c| event_view(&c.0)).collect(),
        cumulative_metrics: Vec::new(),
        errors,
    }
}

/// Fetch and assemble the event list for the selected namespaces.
pub async fn event_list(
    client: Client,
    ns: &NamespaceQuery,
    query: &ListQuery,
) -> ApiResult<EventList> {
    let mut handle = spawn_fetch({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Event>(client, &ns).await }
    });

    let mut errors = Vec::new();
    let events = handle.list().await;
    absorb(handle.error().await, &mut errors)?;
    let events = events.map(|a| (*a).clone()).unwrap_or_default();
    Ok(build_event_list(events, query, errors))
}

// ---- tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(reason: &str, type_: Option<&str>, kind: &str, name: &str) -> Event {
        serde_json::from_value(json!({
            "metadata": { "name": format!("{name}.ev"), "namespace": "prod" },
            "involvedObject": { "kind": kind, "name": name, "namespace": "prod" },
            "reason": reason,
            "type": type_,
        }))
        .unwrap()
    }

    #[test]
    fn untyped_failures_become_warnings() {
        let mut events = vec![
            event("FailedScheduling", None, "Pod", "web-0"),
            event("Pulled", None, "Pod", "web-0"),
            event("BackOff", Some("Warning"), "Pod", "web-0"),
        ];
        fill_event_type(&mut events);
        let types: Vec<_> = events.iter().map(|e| e.type_.as_deref().unwrap()).collect();
        assert_eq!(types, ["Warning", "Normal", "Warning"]);
    }

    #[test]
    fn warnings_correlate_by_reference() {
        let mut events = vec![
            event("FailedMount", None, "Pod", "web-0"),
            event("FailedCreate", None, "ReplicaSet", "web-0"),
            event("FailedMount", None, "Pod", "db-0"),
            event("Started", Some("Normal"), "Pod", "web-0"),
        ];
        fill_event_type(&mut events);

        let meta = ObjectMeta {
            name: Some("web-0".into()),
            namespace: Some("prod".into()),
            ..ObjectMeta::default()
        };
        let warnings = warnings_for(&events, ResourceKind::Pod, &meta);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].reason, "FailedMount");
    }

    #[test]
    fn uid_mismatch_breaks_correlation() {
        let mut stale = event("FailedMount", None, "Pod", "web-0");
        stale.involved_object.uid = Some("11111111-1111-1111-1111-111111111111".into());
        fill_event_type(std::slice::from_mut(&mut stale));

        let meta = ObjectMeta {
            name: Some("web-0".into()),
            namespace: Some("prod".into()),
            uid: Some("22222222-2222-2222-2222-222222222222".into()),
            ..ObjectMeta::default()
        };
        assert!(warnings_for(&[stale], ResourceKind::Pod, &meta).is_empty());
    }
}
