//! Pod cells, display status, and list assembly with usage metrics.

use k8s_openapi::api::core::v1::{Event, Pod};
use kanso_core::{DataCell, MetricCell, PropertyName, PropertyValue, ResourceKind, ResourceSelector};
use kanso_fetch::{list_namespaced, spawn_fetch, NamespaceQuery};
use kanso_metrics::{Metric, MetricClient};
use kanso_select::{select_with_metrics, ListQuery};
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{absorb, ApiResult};
use crate::{object_meta_view, ListMeta, ObjectMetaView, TypeMetaView};

use super::event::{events_with_types, warnings_for, EventView};
use super::{meta_property, selector_for, text_or_missing};

pub struct PodCell(pub Pod);

impl DataCell for PodCell {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        if let Some(value) = meta_property(&self.0.metadata, name) {
            return value;
        }
        match name {
            PropertyName::Status => PropertyValue::text(status_phrase(&self.0)),
            PropertyName::NodeName => {
                text_or_missing(self.0.spec.as_ref().and_then(|s| s.node_name.as_deref()))
            }
            _ => PropertyValue::Missing,
        }
    }
}

impl MetricCell for PodCell {
    fn resource_selector(&self) -> ResourceSelector {
        selector_for(ResourceKind::Pod, &self.0.metadata)
    }
}

/// Display status the way the console shows it: deletion wins, then an
/// explicit status reason, then the first waiting container reason, then
/// the phase.
pub fn status_phrase(pod: &Pod) -> String {
    if pod.metadata.deletion_timestamp.is_some() {
        return "Terminating".to_string();
    }
    let status = pod.status.as_ref();
    if let Some(reason) = status.and_then(|s| s.reason.as_deref()).filter(|r| !r.is_empty()) {
        return reason.to_string();
    }
    let waiting = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|cs| {
            cs.iter()
                .find_map(|c| c.state.as_ref()?.waiting.as_ref()?.reason.clone())
        });
    if let Some(reason) = waiting.filter(|r| !r.is_empty()) {
        return reason;
    }
    status
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn restart_count(pod: &Pod) -> i64 {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|cs| cs.iter().map(|c| i64::from(c.restart_count)).sum())
        .unwrap_or(0)
}

/// UI-ready pod row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodView {
    pub object_meta: ObjectMetaView,
    pub type_meta: TypeMetaView,
    pub status: String,
    pub restart_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub warnings: Vec<EventView>,
}

pub fn pod_view(pod: &Pod, events: &[Event]) -> PodView {
    PodView {
        object_meta: object_meta_view(&pod.metadata),
        type_meta: TypeMetaView::new(ResourceKind::Pod),
        status: status_phrase(pod),
        restart_count: restart_count(pod),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        warnings: warnings_for(events, ResourceKind::Pod, &pod.metadata),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodList {
    pub list_meta: ListMeta,
    pub pods: Vec<PodView>,
    pub cumulative_metrics: Vec<Metric>,
    pub errors: Vec<String>,
}

/// Pure assembly over already-fetched collections. Usage failures degrade
/// to an empty cumulative array, never to an error.
pub async fn build_pod_list(
    pods: Vec<Pod>,
    events: &[Event],
    query: &ListQuery,
    metric_client: &dyn MetricClient,
    errors: Vec<String>,
) -> PodList {
    let cells: Vec<PodCell> = pods.into_iter().map(PodCell).collect();
    let (page, total, pending) = select_with_metrics(cells, query, metric_client);
    let cumulative_metrics = match pending.get().await {
        Ok(metrics) => metrics,
        Err(e) => {
            warn!(error = %e, "pod usage unavailable, omitting cumulative metrics");
            Vec::new()
        }
    };
    PodList {
        list_meta: ListMeta { total_items: total },
        pods: page.iter().map(|c| pod_view(&c.0, events)).collect(),
        cumulative_metrics,
        errors,
    }
}

/// Fetch and assemble: pods plus the events that decorate them, usage for
/// the returned page only.
pub async fn pod_list(
    client: Client,
    ns: &NamespaceQuery,
    query: &ListQuery,
    metric_client: &dyn MetricClient,
) -> ApiResult<PodList> {
    let mut pods_handle = spawn_fetch({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Pod>(client, &ns).await }
    });
    let mut events_handle = spawn_fetch({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Event>(client, &ns).await }
    });

    let mut errors = Vec::new();
    let pods = pods_handle.list().await;
    absorb(pods_handle.error().await, &mut errors)?;
    let events = events_handle.list().await;
    absorb(events_handle.error().await, &mut errors)?;

    let pods = pods.map(|a| (*a).clone()).unwrap_or_default();
    let events = events_with_types(events);
    Ok(build_pod_list(pods, &events, query, metric_client, errors).await)
}

// ---- tests ----
