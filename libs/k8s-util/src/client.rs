use crate::error::{Error, Result};
use crate::rolling_update::RollingUpdateOptions;

use k8s_openapi::api::core::v1::{Namespace, ReplicationController, Service};
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams};

/// The orchestrator primitives the reconciliation engine needs (§6 / §4.H). Kept narrow and
/// generic rather than `dyn`-dispatched, matching the teacher's habit of threading a concrete
/// client type through reconcile code rather than reaching for trait objects.
#[allow(async_fn_in_trait)]
pub trait OrchestratorClient: Clone + Send + Sync + 'static {
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>>;
    async fn create_namespace(&self, ns: Namespace) -> Result<Namespace>;
    async fn update_namespace(&self, ns: Namespace) -> Result<Namespace>;
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>>;
    async fn create_service(&self, namespace: &str, svc: Service) -> Result<Service>;
    async fn update_service(&self, namespace: &str, svc: Service) -> Result<Service>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list_replication_controllers(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ReplicationController>>;
    async fn create_replication_controller(
        &self,
        namespace: &str,
        rc: ReplicationController,
    ) -> Result<ReplicationController>;
    async fn update_replication_controller(
        &self,
        namespace: &str,
        rc: ReplicationController,
    ) -> Result<ReplicationController>;
    async fn delete_replication_controller(&self, namespace: &str, name: &str) -> Result<()>;

    /// Replace `old` with `new` within `namespace`, scaling the new controller up and the old
    /// one down in unit steps until `new` matches its desired replica count and `old` is gone.
    async fn rolling_update(
        &self,
        namespace: &str,
        old: ReplicationController,
        new: ReplicationController,
        opts: RollingUpdateOptions,
    ) -> Result<()>;
}

/// `kube`-backed implementation of [`OrchestratorClient`].
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn replication_controllers(&self, namespace: &str) -> Api<ReplicationController> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl OrchestratorClient for KubeOrchestrator {
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>> {
        let params = ListParams::default().labels(selector);
        self.namespaces()
            .list(&params)
            .await
            .map(|l| l.items)
            .map_err(|e| Error::ListFailed("Namespace", Box::new(e)))
    }

    async fn create_namespace(&self, ns: Namespace) -> Result<Namespace> {
        let name = ns.metadata.name.clone().unwrap_or_default();
        self.namespaces()
            .create(&Default::default(), &ns)
            .await
            .map_err(|e| Error::CreateFailed("Namespace", name, Box::new(e)))
    }

    async fn update_namespace(&self, ns: Namespace) -> Result<Namespace> {
        let name = ns.metadata.name.clone().unwrap_or_default();
        self.namespaces()
            .replace(&name, &Default::default(), &ns)
            .await
            .map_err(|e| Error::UpdateFailed("Namespace", name, Box::new(e)))
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::DeleteFailed("Namespace", name.to_string(), Box::new(e)))?;
        Ok(())
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        let params = ListParams::default().labels(selector);
        self.services(namespace)
            .list(&params)
            .await
            .map(|l| l.items)
            .map_err(|e| Error::ListFailed("Service", Box::new(e)))
    }

    async fn create_service(&self, namespace: &str, svc: Service) -> Result<Service> {
        let name = svc.metadata.name.clone().unwrap_or_default();
        self.services(namespace)
            .create(&Default::default(), &svc)
            .await
            .map_err(|e| Error::CreateFailed("Service", name, Box::new(e)))
    }

    async fn update_service(&self, namespace: &str, svc: Service) -> Result<Service> {
        let name = svc.metadata.name.clone().unwrap_or_default();
        self.services(namespace)
            .replace(&name, &Default::default(), &svc)
            .await
            .map_err(|e| Error::UpdateFailed("Service", name, Box::new(e)))
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::DeleteFailed("Service", name.to_string(), Box::new(e)))?;
        Ok(())
    }

    async fn list_replication_controllers(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ReplicationController>> {
        let params = ListParams::default().labels(selector);
        self.replication_controllers(namespace)
            .list(&params)
            .await
            .map(|l| l.items)
            .map_err(|e| Error::ListFailed("ReplicationController", Box::new(e)))
    }

    async fn create_replication_controller(
        &self,
        namespace: &str,
        rc: ReplicationController,
    ) -> Result<ReplicationController> {
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.replication_controllers(namespace)
            .create(&Default::default(), &rc)
            .await
            .map_err(|e| Error::CreateFailed("ReplicationController", name, Box::new(e)))
    }

    async fn update_replication_controller(
        &self,
        namespace: &str,
        rc: ReplicationController,
    ) -> Result<ReplicationController> {
        let name = rc.metadata.name.clone().unwrap_or_default();
        self.replication_controllers(namespace)
            .replace(&name, &Default::default(), &rc)
            .await
            .map_err(|e| Error::UpdateFailed("ReplicationController", name, Box::new(e)))
    }

    async fn delete_replication_controller(&self, namespace: &str, name: &str) -> Result<()> {
        self.replication_controllers(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| {
                Error::DeleteFailed("ReplicationController", name.to_string(), Box::new(e))
            })?;
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
