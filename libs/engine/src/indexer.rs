//! Live-State Indexer (§4.C): list orchestrator objects scoped to the project selector and
//! index them by the identity the reconciliation engine diffs against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use fleetctl_k8s_util::labels::{self, NAME_LABEL};
use fleetctl_k8s_util::{OrchestratorClient, Result};

use k8s_openapi::api::core::v1::{Namespace, ReplicationController, Service};

/// One live object plus a mark used by the reconcile pass to drive garbage collection. Wrapped
/// in an `AtomicBool` rather than behind the whole map's lock: each app worker only ever marks
/// its own key, so there is no real contention to serialize.
pub struct IndexedObject<T> {
    pub value: T,
    processed: AtomicBool,
}

impl<T> IndexedObject<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            processed: AtomicBool::new(false),
        }
    }

    pub fn mark_processed(&self) {
        self.processed.store(true, Ordering::SeqCst);
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::SeqCst)
    }
}

pub type Index<T> = HashMap<String, IndexedObject<T>>;

fn identity_from_label_or_name(meta: &kube::api::ObjectMeta) -> String {
    meta.labels
        .as_ref()
        .and_then(|l| l.get(NAME_LABEL))
        .cloned()
        .unwrap_or_else(|| meta.name.clone().unwrap_or_default())
}

/// Index live namespaces owned by `project` by their cluster name.
pub async fn index_namespaces<O: OrchestratorClient>(
    client: &O,
    project: &str,
) -> Result<Index<Namespace>> {
    let selector = labels::project_selector(project);
    let items = client.list_namespaces(&selector).await?;
    Ok(items
        .into_iter()
        .map(|ns| {
            let name = ns.metadata.name.clone().unwrap_or_default();
            (name, IndexedObject::new(ns))
        })
        .collect())
}

/// Index live services in `namespace` owned by `project`, by object name.
pub async fn index_services<O: OrchestratorClient>(
    client: &O,
    namespace: &str,
    project: &str,
) -> Result<Index<Service>> {
    let selector = labels::project_selector(project);
    let items = client.list_services(namespace, &selector).await?;
    Ok(items
        .into_iter()
        .map(|svc| {
            let name = svc.metadata.name.clone().unwrap_or_default();
            (name, IndexedObject::new(svc))
        })
        .collect())
}

/// Index live replication controllers in `namespace` owned by `project`, by the
/// `controller/name` label when present, falling back to the object name.
pub async fn index_replication_controllers<O: OrchestratorClient>(
    client: &O,
    namespace: &str,
    project: &str,
) -> Result<Index<ReplicationController>> {
    let selector = labels::project_selector(project);
    let items = client
        .list_replication_controllers(namespace, &selector)
        .await?;
    Ok(items
        .into_iter()
        .map(|rc| {
            let identity = identity_from_label_or_name(&rc.metadata);
            (identity, IndexedObject::new(rc))
        })
        .collect())
}
