//! Per-kind cell adapters and list assembly.
//!
//! Each module wraps one upstream kind in a cell type exposing named
//! properties, then builds the UI-ready list view from an already-fetched
//! collection (`build_*`) or end to end from the cluster (`*_list`).

pub mod deployment;
pub mod event;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod raw;
pub mod workloads;

use chrono::SecondsFormat;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kanso_core::{parse_uid, PropertyName, PropertyValue, ResourceKind, ResourceSelector};

/// Properties every kind answers from object metadata. `None` means the
/// property is kind-specific and the caller should keep matching.
pub(crate) fn meta_property(meta: &ObjectMeta, name: &PropertyName) -> Option<PropertyValue> {
    match name {
        PropertyName::Name => Some(PropertyValue::text(meta.name.clone().unwrap_or_default())),
        PropertyName::Namespace => Some(match &meta.namespace {
            Some(ns) => PropertyValue::text(ns.clone()),
            None => PropertyValue::Missing,
        }),
        PropertyName::CreationTimestamp => Some(
            meta.creation_timestamp
                .as_ref()
                .map(|t| PropertyValue::timestamp(t.0))
                .unwrap_or(PropertyValue::Missing),
        ),
        _ => None,
    }
}

pub(crate) fn text_or_missing(value: Option<&str>) -> PropertyValue {
    match value {
        Some(s) if !s.is_empty() => PropertyValue::text(s),
        _ => PropertyValue::Missing,
    }
}

pub(crate) fn time_or_missing(time: Option<&Time>) -> PropertyValue {
    time.map(|t| PropertyValue::timestamp(t.0))
        .unwrap_or(PropertyValue::Missing)
}

pub(crate) fn render_time(time: &Time) -> String {
    time.0.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn selector_for(kind: ResourceKind, meta: &ObjectMeta) -> ResourceSelector {
    ResourceSelector {
        kind,
        namespace: meta.namespace.clone().unwrap_or_default(),
        name: meta.name.clone().unwrap_or_default(),
        uid: meta.uid.as_deref().and_then(|u| parse_uid(u).ok()),
    }
}
