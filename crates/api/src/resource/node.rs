//! Node cells and list assembly with usage metrics.

use k8s_openapi::api::core::v1::Node;
use kanso_core::{DataCell, MetricCell, PropertyName, PropertyValue, ResourceKind, ResourceSelector};
use kanso_fetch::{list_cluster, spawn_fetch};
use kanso_metrics::{Metric, MetricClient};
use kanso_select::{select_with_metrics, ListQuery};
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{absorb, ApiResult};
use crate::{object_meta_view, ListMeta, ObjectMetaView, TypeMetaView};

use super::{meta_property, selector_for};

pub struct NodeCell(pub Node);

impl DataCell for NodeCell {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        if let Some(value) = meta_property(&self.0.metadata, name) {
            return value;
        }
        match name {
            PropertyName::Status => PropertyValue::text(ready_phrase(&self.0)),
            // Sorting nodes "by capacity" means memory: the interesting
            // axis when packing workloads.
            PropertyName::Capacity => capacity_quantity(&self.0, "memory"),
            _ => PropertyValue::Missing,
        }
    }
}

impl MetricCell for NodeCell {
    fn resource_selector(&self) -> ResourceSelector {
        selector_for(ResourceKind::Node, &self.0.metadata)
    }
}

fn ready_phrase(node: &Node) -> String {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.type_ == "Ready"));
    match ready.map(|c| c.status.as_str()) {
        Some("True") => "Ready".to_string(),
        Some("False") => "NotReady".to_string(),
        _ => "Unknown".to_string(),
    }
}

fn capacity_quantity(node: &Node, resource: &str) -> PropertyValue {
    node.status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get(resource))
        .map(|q| PropertyValue::quantity(q.0.as_str()))
        .unwrap_or(PropertyValue::Missing)
}

fn capacity_raw(node: &Node, resource: &str) -> Option<String> {
    node.status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get(resource))
        .map(|q| q.0.clone())
}

/// UI-ready node row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub object_meta: ObjectMetaView,
    pub type_meta: TypeMetaView,
    pub ready: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_capacity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_capacity: Option<String>,
}

pub fn node_view(node: &Node) -> NodeView {
    NodeView {
        object_meta: object_meta_view(&node.metadata),
        type_meta: TypeMetaView::new(ResourceKind::Node),
        ready: ready_phrase(node),
        kubelet_version: node
            .status
            .as_ref()
            .and_then(|s| s.node_info.as_ref())
            .map(|i| i.kubelet_version.clone()),
        cpu_capacity: capacity_raw(node, "cpu"),
        memory_capacity: capacity_raw(node, "memory"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeList {
    pub list_meta: ListMeta,
    pub nodes: Vec<NodeView>,
    pub cumulative_metrics: Vec<Metric>,
    pub errors: Vec<String>,
}

/// Pure assembly over an already-fetched collection.
pub async fn build_node_list(
    nodes: Vec<Node>,
    query: &ListQuery,
    metric_client: &dyn MetricClient,
    errors: Vec<String>,
) -> NodeList {
    let cells: Vec<NodeCell> = nodes.into_iter().map(NodeCell).collect();
    let (page, total, pending) = select_with_metrics(cells, query, metric_client);
    let cumulative_metrics = match pending.get().await {
        Ok(metrics) => metrics,
        Err(e) => {
            warn!(error = %e, "node usage unavailable, omitting cumulative metrics");
            Vec::new()
        }
    };
    NodeList {
        list_meta: ListMeta { total_items: total },
        nodes: page.iter().map(|c| node_view(&c.0)).collect(),
        cumulative_metrics,
        errors,
    }
}

/// Fetch and assemble the cluster node list.
pub async fn node_list(
    client: Client,
    query: &ListQuery,
    metric_client: &dyn MetricClient,
) -> ApiResult<NodeList> {
    let mut handle = spawn_fetch({
        let client = client.clone();
        async move { list_cluster::<Node>(client).await }
    });

    let mut errors = Vec::new();
    let nodes = handle.list().await;
    absorb(handle.error().await, &mut errors)?;
    let nodes = nodes.map(|a| (*a).clone()).unwrap_or_default();
    Ok(build_node_list(nodes, query, metric_client, errors).await)
}

// ---- tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use kanso_core::DataCell;
    use serde_json::json;

    fn node(name: &str, ready: &str, memory: &str) -> Node {
        serde_json::from_value(json!({
            "metadata": { "name": name },
            "status": {
                "conditions": [
                    { "type": "DiskPressure", "status": "False" },
                    { "type": "Ready", "status": ready },
                ],
                "capacity": { "cpu": "8", "memory": memory },
            },
        }))
        .unwrap()
    }

    #[test]
    fn ready_condition_drives_status() {
        assert_eq!(ready_phrase(&node("a", "True", "1Gi")), "Ready");
        assert_eq!(ready_phrase(&node("b", "False", "1Gi")), "NotReady");
        assert_eq!(ready_phrase(&Node::default()), "Unknown");
    }

    #[test]
    fn capacity_sorts_by_magnitude() {
        let small = NodeCell(node("small", "True", "2Gi"));
        let big = NodeCell(node("big", "True", "10Gi"));
        let prop = kanso_core::PropertyName::Capacity;
        assert_eq!(
            small.property(&prop).cmp_value(&big.property(&prop)),
            std::cmp::Ordering::Less
        );
    }
}
