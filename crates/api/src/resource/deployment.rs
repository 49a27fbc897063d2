//! Deployment cells, pod-count rollups, and list assembly.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Pod};
use kanso_core::{DataCell, PropertyName, PropertyValue, ResourceKind};
use kanso_fetch::{list_namespaced, spawn_fetch, NamespaceQuery};
use kanso_metrics::Metric;
use kanso_select::{select, ListQuery};
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{absorb, ApiResult};
use crate::{object_meta_view, ListMeta, ObjectMetaView, TypeMetaView};

use super::event::{events_with_types, warnings_for, EventView};
use super::meta_property;

pub struct DeploymentCell(pub Deployment);

impl DataCell for DeploymentCell {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        meta_property(&self.0.metadata, name).unwrap_or(PropertyValue::Missing)
    }
}

/// Pod counts for one deployment, matched by label selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub current: i32,
    pub desired: i32,
    pub running: i32,
}

pub fn pod_info(deployment: &Deployment, pods: &[Pod]) -> PodInfo {
    let current = deployment.status.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    let running = pods
        .iter()
        .filter(|p| selected_by(deployment, p) && is_running(p))
        .count() as i32;
    PodInfo { current, desired, running }
}

/// `matchLabels` subset semantics. Expression selectors are not consulted,
/// so a deployment using only `matchExpressions` rolls up zero pods.
fn selected_by(deployment: &Deployment, pod: &Pod) -> bool {
    let Some(match_labels) = deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.as_ref())
    else {
        return false;
    };
    if match_labels.is_empty() || deployment.metadata.namespace != pod.metadata.namespace {
        return false;
    }
    let Some(labels) = pod.metadata.labels.as_ref() else {
        return false;
    };
    match_labels.iter().all(|(k, v)| labels.get(k) == Some(v))
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

/// UI-ready deployment row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub object_meta: ObjectMetaView,
    pub type_meta: TypeMetaView,
    pub pods: PodInfo,
    pub warnings: Vec<EventView>,
}

pub fn deployment_view(deployment: &Deployment, pods: &[Pod], events: &[Event]) -> DeploymentView {
    DeploymentView {
        object_meta: object_meta_view(&deployment.metadata),
        type_meta: TypeMetaView::new(ResourceKind::Deployment),
        pods: pod_info(deployment, pods),
        warnings: warnings_for(events, ResourceKind::Deployment, &deployment.metadata),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentList {
    pub list_meta: ListMeta,
    pub deployments: Vec<DeploymentView>,
    pub cumulative_metrics: Vec<Metric>,
    pub errors: Vec<String>,
}

/// Pure assembly over already-fetched collections.
pub fn build_deployment_list(
    deployments: Vec<Deployment>,
    pods: &[Pod],
    events: &[Event],
    query: &ListQuery,
    errors: Vec<String>,
) -> DeploymentList {
    let cells: Vec<DeploymentCell> = deployments.into_iter().map(DeploymentCell).collect();
    let (page, total) = select(cells, query);
    DeploymentList {
        list_meta: ListMeta { total_items: total },
        deployments: page
            .iter()
            .map(|c| deployment_view(&c.0, pods, events))
            .collect(),
        cumulative_metrics: Vec::new(),
        errors,
    }
}

/// Fetch and assemble: deployments, the pods they select, and their
/// warning events.
pub async fn deployment_list(
    client: Client,
    ns: &NamespaceQuery,
    query: &ListQuery,
) -> ApiResult<DeploymentList> {
    let mut deployments_handle = spawn_fetch({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Deployment>(client, &ns).await }
    });
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
    let deployments = deployments_handle.list().await;
    absorb(deployments_handle.error().await, &mut errors)?;
    let pods = pods_handle.list().await;
    absorb(pods_handle.error().await, &mut errors)?;
    let events = events_handle.list().await;
    absorb(events_handle.error().await, &mut errors)?;

    let deployments = deployments.map(|a| (*a).clone()).unwrap_or_default();
    let pods = pods.map(|a| (*a).clone()).unwrap_or_default();
    let events = events_with_types(events);
    Ok(build_deployment_list(deployments, &pods, &events, query, errors))
}

// ---- tests ----
