//! The workloads overview: pod and deployment lists assembled from shared
//! fetches.
//!
//! Pods and events each feed both sub-lists, so they are fetched once and
//! fanned out to two consumers. Each sub-list degrades independently and
//! keeps its own errors array.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Pod};
use kanso_fetch::{fan_out, list_namespaced, spawn_fetch, NamespaceQuery};
use kanso_metrics::MetricClient;
use kanso_select::ListQuery;
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{absorb, ApiResult};

use super::deployment::{build_deployment_list, DeploymentList};
use super::event::events_with_types;
use super::pod::{build_pod_list, PodList};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workloads {
    pub pods: PodList,
    pub deployments: DeploymentList,
}

/// Fetch and assemble the overview. The same query drives both sub-lists.
pub async fn workloads(
    client: Client,
    ns: &NamespaceQuery,
    query: &ListQuery,
    metric_client: &dyn MetricClient,
) -> ApiResult<Workloads> {
    let [mut pods_for_list, mut pods_for_rollup] = fan_out({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Pod>(client, &ns).await }
    });
    let [mut events_for_pods, mut events_for_deployments] = fan_out({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Event>(client, &ns).await }
    });
    let mut deployments_handle = spawn_fetch({
        let client = client.clone();
        let ns = ns.clone();
        async move { list_namespaced::<Deployment>(client, &ns).await }
    });

    let mut pod_errors = Vec::new();
    let pods = pods_for_list.list().await;
    absorb(pods_for_list.error().await, &mut pod_errors)?;
    let events = events_for_pods.list().await;
    absorb(events_for_pods.error().await, &mut pod_errors)?;
    let pods_view = build_pod_list(
        pods.map(|a| (*a).clone()).unwrap_or_default(),
        &events_with_types(events),
        query,
        metric_client,
        pod_errors,
    )
    .await;

    let mut deployment_errors = Vec::new();
    let deployments = deployments_handle.list().await;
    absorb(deployments_handle.error().await, &mut deployment_errors)?;
    let pods = pods_for_rollup.list().await;
    absorb(pods_for_rollup.error().await, &mut deployment_errors)?;
    let events = events_for_deployments.list().await;
    absorb(events_for_deployments.error().await, &mut deployment_errors)?;
    let deployments_view = build_deployment_list(
        deployments.map(|a| (*a).clone()).unwrap_or_default(),
        pods.as_deref().map(Vec::as_slice).unwrap_or(&[]),
        &events_with_types(events),
        query,
        deployment_errors,
    );

    Ok(Workloads {
        pods: pods_view,
        deployments: deployments_view,
    })
}
