//! In-memory [`OrchestratorClient`] used by the engine's and webhook's test suites. Records
//! every mutating call so assertions can check exactly what was sent to the "cluster", mirroring
//! the teacher's preference for a narrow fake over a mocking framework.

use crate::client::OrchestratorClient;
use crate::error::Result;
use crate::rolling_update::RollingUpdateOptions;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::{Namespace, ReplicationController, Service};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    CreateNamespace,
    UpdateNamespace,
    DeleteNamespace,
    CreateService,
    UpdateService,
    DeleteService,
    CreateReplicationController,
    UpdateReplicationController,
    DeleteReplicationController,
}

#[derive(Default)]
struct Inner {
    namespaces: BTreeMap<String, Namespace>,
    services: BTreeMap<(String, String), Service>,
    replication_controllers: BTreeMap<(String, String), ReplicationController>,
    calls: Vec<Call>,
}

/// An in-memory stand-in for a real cluster, keyed the same way [`crate::labels`] keys live
/// objects: namespaces by cluster name, namespaced objects by `(namespace, object name)`.
#[derive(Clone, Default)]
pub struct FakeOrchestrator {
    inner: Arc<Mutex<Inner>>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_namespace(&self, ns: Namespace) {
        let name = ns.metadata.name.clone().unwrap_or_default();
        self.inner.lock().unwrap().namespaces.insert(name, ns);
    }

    pub fn seed_service(&self, namespace: &str, svc: Service) {
        let name = svc.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .services
            .insert((namespace.to_string(), name), svc);
    }

    pub fn seed_replication_controller(&self, namespace: &str, rc: ReplicationController) {
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .replication_controllers
            .insert((namespace.to_string(), name), rc);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

// Label selectors are accepted but not filtered on here: the fake is seeded only with objects
// that belong to the project under test, so every stored object already matches.
impl OrchestratorClient for FakeOrchestrator {
    async fn list_namespaces(&self, _selector: &str) -> Result<Vec<Namespace>> {
        Ok(self.inner.lock().unwrap().namespaces.values().cloned().collect())
    }

    async fn create_namespace(&self, ns: Namespace) -> Result<Namespace> {
        self.record(Call::CreateNamespace);
        let name = ns.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .namespaces
            .insert(name, ns.clone());
        Ok(ns)
    }

    async fn update_namespace(&self, ns: Namespace) -> Result<Namespace> {
        self.record(Call::UpdateNamespace);
        let name = ns.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .namespaces
            .insert(name, ns.clone());
        Ok(ns)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.record(Call::DeleteNamespace);
        self.inner.lock().unwrap().namespaces.remove(name);
        Ok(())
    }

    async fn list_services(&self, namespace: &str, _selector: &str) -> Result<Vec<Service>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .services
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create_service(&self, namespace: &str, svc: Service) -> Result<Service> {
        self.record(Call::CreateService);
        let name = svc.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .services
            .insert((namespace.to_string(), name), svc.clone());
        Ok(svc)
    }

    async fn update_service(&self, namespace: &str, svc: Service) -> Result<Service> {
        self.record(Call::UpdateService);
        let name = svc.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .services
            .insert((namespace.to_string(), name), svc.clone());
        Ok(svc)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(Call::DeleteService);
        self.inner
            .lock()
            .unwrap()
            .services
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_replication_controllers(
        &self,
        namespace: &str,
        _selector: &str,
    ) -> Result<Vec<ReplicationController>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replication_controllers
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create_replication_controller(
        &self,
        namespace: &str,
        rc: ReplicationController,
    ) -> Result<ReplicationController> {
        self.record(Call::CreateReplicationController);
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .replication_controllers
            .insert((namespace.to_string(), name), rc.clone());
        Ok(rc)
    }

    async fn update_replication_controller(
        &self,
        namespace: &str,
        rc: ReplicationController,
    ) -> Result<ReplicationController> {
        self.record(Call::UpdateReplicationController);
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.inner
            .lock()
            .unwrap()
            .replication_controllers
            .insert((namespace.to_string(), name), rc.clone());
        Ok(rc)
    }

    async fn delete_replication_controller(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(Call::DeleteReplicationController);
        self.inner
            .lock()
            .unwrap()
            .replication_controllers
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn rolling_update(
        &self,
        namespace: &str,
        old: ReplicationController,
        new: ReplicationController,
        opts: RollingUpdateOptions,
    ) -> Result<()> {
        crate::rolling_update::run(self, namespace, old, new, opts).await
    }
}
