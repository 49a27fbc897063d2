//! Namespace cells and list assembly.

use k8s_openapi::api::core::v1::Namespace;
use kanso_core::{DataCell, PropertyName, PropertyValue, ResourceKind};
use kanso_fetch::{list_cluster, spawn_fetch};
use kanso_metrics::Metric;
use kanso_select::{select, ListQuery};
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{absorb, ApiResult};
use crate::{object_meta_view, ListMeta, ObjectMetaView, TypeMetaView};

use super::{meta_property, text_or_missing};

pub struct NamespaceCell(pub Namespace);

impl DataCell for NamespaceCell {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        if let Some(value) = meta_property(&self.0.metadata, name) {
            return value;
        }
        match name {
            PropertyName::Status => text_or_missing(
                self.0.status.as_ref().and_then(|s| s.phase.as_deref()),
            ),
            _ => PropertyValue::Missing,
        }
    }
}

/// UI-ready namespace row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceView {
    pub object_meta: ObjectMetaView,
    pub type_meta: TypeMetaView,
    pub phase: String,
}

pub fn namespace_view(namespace: &Namespace) -> NamespaceView {
    NamespaceView {
        object_meta: object_meta_view(&namespace.metadata),
        type_meta: TypeMetaView::new(ResourceKind::Namespace),
        phase: namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceList {
    pub list_meta: ListMeta,
    pub namespaces: Vec<NamespaceView>,
    pub cumulative_metrics: Vec<Metric>,
    pub errors: Vec<String>,
}

/// Pure assembly over an already-fetched collection.
pub fn build_namespace_list(
    namespaces: Vec<Namespace>,
    query: &ListQuery,
    errors: Vec<String>,
) -> NamespaceList {
    let cells: Vec<NamespaceCell> = namespaces.into_iter().map(NamespaceCell).collect();
    let (page, total) = select(cells, query);
    NamespaceList {
        list_meta: ListMeta { total_items: total },
        namespaces: page.iter().map(|c| namespace_view(&c.0)).collect(),
        cumulative_metrics: Vec::new(),
        errors,
    }
}

/// Fetch and assemble the cluster namespace list.
pub async fn namespace_list(client: Client, query: &ListQuery) -> ApiResult<NamespaceList> {
    let mut handle = spawn_fetch({
        let client = client.clone();
        async move { list_cluster::<Namespace>(client).await }
    });

    let mut errors = Vec::new();
    let namespaces = handle.list().await;
    absorb(handle.error().await, &mut errors)?;
    let namespaces = namespaces.map(|a| (*a).clone()).unwrap_or_default();
    Ok(build_namespace_list(namespaces, query, errors))
}
