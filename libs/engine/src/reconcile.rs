//! Reconciliation Engine (§4.D): diff a configuration snapshot against live cluster state and
//! drive it towards the desired shape with create/update/rolling-update/delete calls.

use crate::error::Error;
use crate::indexer::{self, Index};
use crate::log::BufferLogger;
use crate::model::{Application, Config, Namespace, Tags, Template};
use crate::render::{self, RenderedObject};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fleetctl_k8s_util::labels;
use fleetctl_k8s_util::rolling_update::RollingUpdateOptions;
use fleetctl_k8s_util::OrchestratorClient;

use k8s_openapi::api::core::v1::{Namespace as KubeNamespace, ReplicationController, Service};
use tokio::task::JoinSet;

/// Run one full reconcile pass of `snapshot` against the cluster reachable through `client`,
/// recording every step in `logger`. Returns the pass's terminal error, if any step failed; the
/// pass always runs to completion regardless (per-item errors do not abort the whole pass,
/// except where a namespace's own app pass is aborted — see module docs on missing references).
pub async fn run<O: OrchestratorClient>(
    client: O,
    snapshot: Config,
    logger: Arc<BufferLogger>,
) -> Option<Error> {
    let project = snapshot.project.clone();
    let mut terminal: Option<Error> = None;

    let live_namespaces = match indexer::index_namespaces(&client, &project).await {
        Ok(index) => index,
        Err(e) => {
            logger.error_with(
                format!("failed to list namespaces: {e}"),
                BTreeMap::new(),
            );
            return Some(e.into());
        }
    };

    let groups_by_name: HashMap<&str, _> = snapshot
        .groups
        .iter()
        .map(|g| (g.name.as_str(), g))
        .collect();
    let applications_by_name: HashMap<&str, &Application> = snapshot
        .applications
        .iter()
        .map(|a| (a.name.as_str(), a))
        .collect();
    let templates_by_name: Arc<HashMap<String, Template>> = Arc::new(
        snapshot
            .templates
            .iter()
            .map(|t| (t.name.clone(), t.clone()))
            .collect(),
    );

    for ns in &snapshot.namespaces {
        let cluster_name = ns.cluster_name(&project);
        let upsert_result = upsert_namespace(&client, &project, ns, &cluster_name, &live_namespaces).await;

        match upsert_result {
            Ok(()) => {
                if let Some(entry) = live_namespaces.get(&cluster_name) {
                    entry.mark_processed();
                }
            }
            Err(e) => {
                logger.error_with(
                    format!("namespace {cluster_name} upsert failed: {e}"),
                    fields([("namespace", cluster_name.as_str())]),
                );
                terminal = Some(e);
                continue;
            }
        }

        if let Err(e) = reconcile_namespace_apps(
            &client,
            &project,
            ns,
            &cluster_name,
            &groups_by_name,
            &applications_by_name,
            &templates_by_name,
            &logger,
        )
        .await
        {
            logger.error_with(
                format!("application pass for namespace {cluster_name} aborted: {e}"),
                fields([("namespace", cluster_name.as_str())]),
            );
            terminal = Some(e);
        }
    }

    for (name, entry) in live_namespaces.iter() {
        if entry.is_processed() {
            continue;
        }
        // the orchestrator sometimes needs a second delete call to actually remove a
        // namespace; issuing it twice here is deliberate, not a bug.
        for _ in 0..2 {
            if let Err(e) = client.delete_namespace(name).await {
                logger.error_with(
                    format!("failed to delete stale namespace {name}: {e}"),
                    BTreeMap::new(),
                );
                terminal = Some(e.into());
            }
        }
    }

    terminal
}

async fn upsert_namespace<O: OrchestratorClient>(
    client: &O,
    project: &str,
    ns: &Namespace,
    cluster_name: &str,
    live: &Index<KubeNamespace>,
) -> Result<(), Error> {
    let identity = labels::namespace_identity_labels(project);

    if let Some(entry) = live.get(cluster_name) {
        let mut object = KubeNamespace {
            metadata: entry.value.metadata.clone(),
            ..Default::default()
        };
        let mut existing = object.metadata.labels.take().unwrap_or_default();
        labels::apply_identity_labels(&mut existing, identity);
        object.metadata.labels = Some(existing);
        client.update_namespace(object).await?;
    } else {
        let mut object = KubeNamespace::default();
        object.metadata.name = Some(cluster_name.to_string());
        object.metadata.labels = Some(identity);
        client.create_namespace(object).await?;
    }
    Ok(())
}

async fn reconcile_namespace_apps<O: OrchestratorClient>(
    client: &O,
    project: &str,
    ns: &Namespace,
    cluster_name: &str,
    groups_by_name: &HashMap<&str, &crate::model::ApplicationGroup>,
    applications_by_name: &HashMap<&str, &Application>,
    templates_by_name: &Arc<HashMap<String, Template>>,
    logger: &Arc<BufferLogger>,
) -> Result<(), Error> {
    let group = groups_by_name.get(ns.application_group.as_str()).copied().ok_or_else(|| {
        logger.error_with(
            "application group not found".to_string(),
            fields([("namespace", cluster_name), ("group", ns.application_group.as_str())]),
        );
        Error::Missing("application group", ns.application_group.clone(), cluster_name.to_string())
    })?;

    let mut apps = Vec::with_capacity(group.applications.len());
    for app_name in &group.applications {
        let app = applications_by_name.get(app_name.as_str()).ok_or_else(|| {
            logger.error_with(
                "application not found".to_string(),
                fields([("namespace", cluster_name), ("application", app_name.as_str())]),
            );
            Error::Missing("application", app_name.clone(), cluster_name.to_string())
        })?;
        apps.push((*app).clone());
    }

    let live_services = Arc::new(indexer::index_services(client, cluster_name, project).await?);
    let live_rcs =
        Arc::new(indexer::index_replication_controllers(client, cluster_name, project).await?);

    let mut tasks: JoinSet<Result<(), Error>> = JoinSet::new();
    for app in apps {
        let params = compose_tags(ns, group, &app);
        let client = client.clone();
        let project = project.to_string();
        let namespace = cluster_name.to_string();
        let templates = Arc::clone(templates_by_name);
        let services = Arc::clone(&live_services);
        let rcs = Arc::clone(&live_rcs);
        let logger = Arc::clone(logger);
        tasks.spawn(async move {
            reconcile_application(
                &client, &project, &namespace, &app, &params, &templates, &services, &rcs, &logger,
            )
            .await
        });
    }

    let mut last_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => last_error = Some(e),
            Err(join_err) => {
                logger.error_with(
                    format!("application worker panicked: {join_err}"),
                    BTreeMap::new(),
                );
            }
        }
    }

    garbage_collect(client, cluster_name, &live_services, &live_rcs, logger).await;

    if let Some(e) = last_error {
        return Err(e);
    }
    Ok(())
}

fn compose_tags(
    ns: &Namespace,
    group: &crate::model::ApplicationGroup,
    app: &Application,
) -> Tags {
    let mut params = Tags::new();
    params.extend(ns.tags.clone());
    params.extend(group.tags.clone());
    params.extend(app.tags.clone());
    params
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_application<O: OrchestratorClient>(
    client: &O,
    project: &str,
    namespace: &str,
    app: &Application,
    params: &Tags,
    templates: &HashMap<String, Template>,
    live_services: &Index<Service>,
    live_rcs: &Index<ReplicationController>,
    logger: &BufferLogger,
) -> Result<(), Error> {
    let (service_result, rc_result) = tokio::join!(
        reconcile_service(client, project, namespace, app, params, templates, live_services),
        reconcile_replication_controller(
            client, project, namespace, app, params, templates, live_rcs
        ),
    );

    let mut last_error = None;
    if let Err(e) = service_result {
        logger.error_with(
            format!("service for application {} failed: {e}", app.name),
            fields([("application", app.name.as_str())]),
        );
        last_error = Some(e);
    }
    if let Err(e) = rc_result {
        logger.error_with(
            format!(
                "replication controller for application {} failed: {e}",
                app.name
            ),
            fields([("application", app.name.as_str())]),
        );
        last_error = Some(e);
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn reconcile_service<O: OrchestratorClient>(
    client: &O,
    project: &str,
    namespace: &str,
    app: &Application,
    params: &Tags,
    templates: &HashMap<String, Template>,
    live: &Index<Service>,
) -> Result<(), Error> {
    if app.service.is_empty() {
        return Ok(());
    }
    let template = templates
        .get(&app.service)
        .ok_or_else(|| Error::Missing("template", app.service.clone(), app.name.clone()))?;

    let rendered = render::render(template, params)?;
    let mut svc = match rendered {
        RenderedObject::Service(svc) => svc,
        other => {
            return Err(Error::ManifestDecode(
                app.service.clone(),
                format!("expected Service, template produced {}", other.kind()),
            ))
        }
    };

    let mut identity = svc.metadata.labels.take().unwrap_or_default();
    labels::apply_identity_labels(&mut identity, labels::identity_labels(project, &app.name));
    svc.metadata.labels = Some(identity);
    svc.metadata.name = Some(app.name.clone());

    if let Some(entry) = live.get(&app.name) {
        let wants_fresh_ip = svc
            .spec
            .as_ref()
            .and_then(|s| s.cluster_ip.as_deref())
            .unwrap_or_default()
            .is_empty();
        if wants_fresh_ip {
            if let Some(existing_spec) = entry.value.spec.as_ref() {
                if let Some(spec) = svc.spec.as_mut() {
                    spec.cluster_ip = existing_spec.cluster_ip.clone();
                }
            }
            svc.metadata.resource_version = entry.value.metadata.resource_version.clone();
        }
        client.update_service(namespace, svc).await?;
        entry.mark_processed();
    } else {
        client.create_service(namespace, svc).await?;
    }
    Ok(())
}

async fn reconcile_replication_controller<O: OrchestratorClient>(
    client: &O,
    project: &str,
    namespace: &str,
    app: &Application,
    params: &Tags,
    templates: &HashMap<String, Template>,
    live: &Index<ReplicationController>,
) -> Result<(), Error> {
    if app.replication_controller.is_empty() {
        return Ok(());
    }
    let template = templates.get(&app.replication_controller).ok_or_else(|| {
        Error::Missing("template", app.replication_controller.clone(), app.name.clone())
    })?;

    let rendered = render::render(template, params)?;
    let mut rc = match rendered {
        RenderedObject::ReplicationController(rc) => rc,
        other => {
            return Err(Error::ManifestDecode(
                app.replication_controller.clone(),
                format!("expected ReplicationController, template produced {}", other.kind()),
            ))
        }
    };

    let mut identity = rc.metadata.labels.take().unwrap_or_default();
    labels::apply_identity_labels(&mut identity, labels::identity_labels(project, &app.name));
    rc.metadata.labels = Some(identity);

    if let Some(entry) = live.get(&app.name) {
        let live_name = entry.value.metadata.name.clone().unwrap_or_default();
        let rendered_name = rc.metadata.name.clone().unwrap_or_default();

        if rendered_name != live_name {
            client
                .rolling_update(
                    namespace,
                    entry.value.clone(),
                    rc,
                    RollingUpdateOptions::SPEC_DEFAULT,
                )
                .await?;
        } else {
            let desired_replicas = rc.spec.as_ref().and_then(|s| s.replicas);
            let mut updated = entry.value.clone();
            if let Some(spec) = updated.spec.as_mut() {
                spec.replicas = desired_replicas;
            }
            client.update_replication_controller(namespace, updated).await?;
        }
        entry.mark_processed();
    } else {
        client.create_replication_controller(namespace, rc).await?;
    }
    Ok(())
}

async fn garbage_collect<O: OrchestratorClient>(
    client: &O,
    namespace: &str,
    live_services: &Index<Service>,
    live_rcs: &Index<ReplicationController>,
    logger: &BufferLogger,
) {
    for (name, entry) in live_services.iter() {
        if entry.is_processed() {
            continue;
        }
        if let Err(e) = client.delete_service(namespace, name).await {
            logger.error_with(
                format!("failed to delete stale service {name}: {e}"),
                fields([("namespace", namespace)]),
            );
        }
    }

    for (name, entry) in live_rcs.iter() {
        if entry.is_processed() {
            continue;
        }
        let mut scaled_down = entry.value.clone();
        if let Some(spec) = scaled_down.spec.as_mut() {
            spec.replicas = Some(0);
        }
        if let Err(e) = client
            .update_replication_controller(namespace, scaled_down)
            .await
        {
            logger.error_with(
                format!("failed to scale down stale replication controller {name}: {e}"),
                fields([("namespace", namespace)]),
            );
            continue;
        }
        if let Err(e) = client.delete_replication_controller(namespace, name).await {
            logger.error_with(
                format!("failed to delete stale replication controller {name}: {e}"),
                fields([("namespace", namespace)]),
            );
        }
    }
}

fn fields<'a>(pairs: impl IntoIterator<Item = (&'static str, &'a str)>) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Application, ApplicationGroup};
    use fleetctl_k8s_util::fake::{Call, FakeOrchestrator};

    fn service_template() -> Template {
        Template {
            name: "svc".to_string(),
            content: "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{.name}}\nspec:\n  ports:\n    - port: 80\n".to_string(),
        }
    }

    fn rc_template() -> Template {
        Template {
            name: "rc".to_string(),
            content: "apiVersion: v1\nkind: ReplicationController\nmetadata:\n  name: {{.name}}\nspec:\n  replicas: {{.replicas}}\n".to_string(),
        }
    }

    fn base_config() -> Config {
        Config {
            project: "acme".to_string(),
            applications: vec![Application {
                name: "front".to_string(),
                replication_controller: "rc".to_string(),
                service: "svc".to_string(),
                tags: [("name".to_string(), "front".to_string()), ("replicas".to_string(), "2".to_string())]
                    .into_iter()
                    .collect(),
            }],
            groups: vec![ApplicationGroup {
                name: "web".to_string(),
                applications: vec!["front".to_string()],
                tags: Tags::new(),
            }],
            namespaces: vec![Namespace {
                name: "prod".to_string(),
                application_group: "web".to_string(),
                tags: Tags::new(),
            }],
            templates: vec![service_template(), rc_template()],
        }
    }

    #[tokio::test]
    async fn first_pass_creates_everything() {
        let fake = FakeOrchestrator::new();
        let logger = Arc::new(BufferLogger::new());
        let terminal = run(fake.clone(), base_config(), logger).await;

        assert!(terminal.is_none());
        assert_eq!(fake.call_count(Call::CreateNamespace), 1);
        assert_eq!(fake.call_count(Call::CreateService), 1);
        assert_eq!(fake.call_count(Call::CreateReplicationController), 1);
    }

    #[tokio::test]
    async fn second_pass_with_no_edits_is_a_pure_update_not_recreate() {
        let fake = FakeOrchestrator::new();
        let logger = Arc::new(BufferLogger::new());
        run(fake.clone(), base_config(), Arc::clone(&logger)).await;
        run(fake.clone(), base_config(), logger).await;

        assert_eq!(fake.call_count(Call::CreateNamespace), 1);
        assert_eq!(fake.call_count(Call::CreateService), 1);
        assert_eq!(fake.call_count(Call::CreateReplicationController), 1);
        assert_eq!(fake.call_count(Call::UpdateNamespace), 1);
        assert_eq!(fake.call_count(Call::UpdateService), 1);
    }

    #[tokio::test]
    async fn missing_application_group_is_logged_and_skips_app_pass() {
        let fake = FakeOrchestrator::new();
        let mut config = base_config();
        config.namespaces[0].application_group = "does-not-exist".to_string();
        let logger = Arc::new(BufferLogger::new());
        let terminal = run(fake.clone(), config, logger.clone()).await;

        assert!(terminal.is_some());
        assert_eq!(fake.call_count(Call::CreateService), 0);
        assert!(logger
            .errors()
            .iter()
            .any(|e| e.msg.contains("application group not found")));
    }
}
