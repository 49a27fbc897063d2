//! Metadata-only listing for kinds without a typed adapter.
//!
//! Services, config maps, and anything else in the registry still get
//! filtering, sorting, and paging over their common metadata.

use kanso_core::{DataCell, PropertyName, PropertyValue, ResourceKind};
use kanso_fetch::{list_dynamic, spawn_fetch, KindRegistry, NamespaceQuery};
use kanso_metrics::Metric;
use kanso_select::{select, ListQuery};
use kube::core::DynamicObject;
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{absorb, ApiResult};
use crate::{object_meta_view, ListMeta, ObjectMetaView, TypeMetaView};

use super::meta_property;

pub struct RawCell(pub DynamicObject);

impl DataCell for RawCell {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        meta_property(&self.0.metadata, name).unwrap_or(PropertyValue::Missing)
    }
}

/// UI-ready generic row: metadata only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawView {
    pub object_meta: ObjectMetaView,
    pub type_meta: TypeMetaView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawList {
    pub list_meta: ListMeta,
    pub items: Vec<RawView>,
    pub cumulative_metrics: Vec<Metric>,
    pub errors: Vec<String>,
}

/// Pure assembly over an already-fetched collection.
pub fn build_raw_list(
    objects: Vec<DynamicObject>,
    kind: ResourceKind,
    query: &ListQuery,
    errors: Vec<String>,
) -> RawList {
    let cells: Vec<RawCell> = objects.into_iter().map(RawCell).collect();
    let (page, total) = select(cells, query);
    RawList {
        list_meta: ListMeta { total_items: total },
        items: page
            .iter()
            .map(|c| RawView {
                object_meta: object_meta_view(&c.0.metadata),
                type_meta: TypeMetaView::new(kind),
            })
            .collect(),
        cumulative_metrics: Vec::new(),
        errors,
    }
}

/// Fetch through the registry and assemble.
pub async fn raw_list(
    client: Client,
    registry: &KindRegistry,
    kind: ResourceKind,
    ns: &NamespaceQuery,
    query: &ListQuery,
) -> ApiResult<RawList> {
    let mut handle = spawn_fetch({
        let client = client.clone();
        let registry = registry.clone();
        let ns = ns.clone();
        async move { list_dynamic(client, &registry, kind, &ns).await }
    });

    let mut errors = Vec::new();
    let objects = handle.list().await;
    absorb(handle.error().await, &mut errors)?;
    let objects = objects.map(|a| (*a).clone()).unwrap_or_default();
    Ok(build_raw_list(objects, kind, query, errors))
}
