//! End-to-end scenarios against an in-memory cluster, one `#[tokio::test]` per scenario.

use std::sync::Arc;
use std::time::Duration;

use fleetctl_engine::controller::{DeploymentController, State};
use fleetctl_engine::model::{Application, ApplicationGroup, Config, Namespace, Tags, Template};
use fleetctl_engine::store::Store;
use fleetctl_k8s_util::fake::{Call, FakeOrchestrator};

fn service_template() -> Template {
    Template {
        name: "web-svc".to_string(),
        content: "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{.name}}\nspec:\n  ports:\n    - port: 80\n".to_string(),
    }
}

fn rc_template(version: &str) -> Template {
    Template {
        name: format!("web-rc-{version}"),
        content: format!(
            "apiVersion: v1\nkind: ReplicationController\nmetadata:\n  name: front-{version}\nspec:\n  replicas: {{{{.replicas}}}}\n"
        ),
    }
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn base_config() -> Config {
    Config {
        project: "acme".to_string(),
        applications: vec![Application {
            name: "front".to_string(),
            replication_controller: String::new(),
            service: "web-svc".to_string(),
            tags: tags(&[("name", "front")]),
        }],
        groups: vec![ApplicationGroup {
            name: "g".to_string(),
            applications: vec!["front".to_string()],
            tags: Tags::new(),
        }],
        namespaces: vec![Namespace {
            name: "prod".to_string(),
            application_group: "g".to_string(),
            tags: Tags::new(),
        }],
        templates: vec![service_template()],
    }
}

async fn wait_for_ready<O: fleetctl_k8s_util::OrchestratorClient>(controller: &DeploymentController<O>) {
    // Rolling updates pace their steps at `RollingUpdateOptions::SPEC_DEFAULT.update_interval`
    // (1s), so S4 alone needs several seconds of real wall-clock time to converge.
    for _ in 0..500 {
        if controller.status().state == State::Ready {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("controller did not return to Ready in time");
}

fn controller_over(
    config: Config,
) -> (DeploymentController<FakeOrchestrator>, Arc<Store>, FakeOrchestrator, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let store = Arc::new(Store::new(config));
    let fake = FakeOrchestrator::new();
    let controller = DeploymentController::new(fake.clone(), Arc::clone(&store), path);
    (controller, store, fake, dir)
}

/// S1: fresh deployment creates the namespace and the application's service with identity
/// labels, and the deploy status is ready with no errors.
#[tokio::test]
async fn s1_fresh_deployment() {
    let (controller, _store, fake, _dir) = controller_over(base_config());

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;

    let status = controller.status();
    assert_eq!(status.state, State::Ready);
    assert!(status.terminal_error.is_none());
    assert!(status.errors.is_empty());

    let namespaces = fake.list_namespaces("").await.unwrap();
    assert_eq!(namespaces.len(), 1);
    let ns = &namespaces[0];
    assert_eq!(ns.metadata.name.as_deref(), Some("acme-prod"));
    let labels = ns.metadata.labels.as_ref().unwrap();
    assert_eq!(labels.get("controller/project").map(String::as_str), Some("acme"));
    assert_eq!(labels.get("controller/enable").map(String::as_str), Some("true"));

    let services = fake.list_services("acme-prod", "").await.unwrap();
    assert_eq!(services.len(), 1);
    let svc = &services[0];
    assert_eq!(svc.metadata.name.as_deref(), Some("front"));
    let svc_labels = svc.metadata.labels.as_ref().unwrap();
    assert_eq!(svc_labels.get("controller/name").map(String::as_str), Some("front"));
    assert_eq!(
        svc.spec.as_ref().unwrap().ports.as_ref().unwrap()[0].port,
        80
    );
}

/// S2: redeploying with no edits performs zero creates on the second pass.
#[tokio::test]
async fn s2_idempotent_redeploy() {
    let (controller, _store, fake, _dir) = controller_over(base_config());

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;
    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;

    assert_eq!(fake.call_count(Call::CreateNamespace), 1);
    assert_eq!(fake.call_count(Call::CreateService), 1);
    assert_eq!(fake.call_count(Call::UpdateNamespace), 1);
    assert_eq!(fake.call_count(Call::UpdateService), 1);

    assert_eq!(fake.list_namespaces("").await.unwrap().len(), 1);
    assert_eq!(fake.list_services("acme-prod", "").await.unwrap().len(), 1);
}

/// S3: removing an application from its group deletes its service but leaves the namespace.
#[tokio::test]
async fn s3_garbage_collection() {
    let (controller, store, fake, _dir) = controller_over(base_config());

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;
    assert_eq!(fake.list_services("acme-prod", "").await.unwrap().len(), 1);

    store
        .update(
            "g",
            fleetctl_engine::store::Entity::Group(ApplicationGroup {
                name: "g".to_string(),
                applications: Vec::new(),
                tags: Tags::new(),
            }),
        )
        .await
        .unwrap();

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;

    assert_eq!(fake.call_count(Call::DeleteService), 1);
    assert!(fake.list_services("acme-prod", "").await.unwrap().is_empty());
    assert_eq!(fake.list_namespaces("").await.unwrap().len(), 1);
}

/// S4: changing an application's replication-controller template name triggers a rolling
/// update that leaves only the new RC behind, still carrying the application's identity label.
#[tokio::test]
async fn s4_rolling_update() {
    let mut config = base_config();
    config.applications[0].replication_controller = "web-rc-v1".to_string();
    // A non-zero replica count so the second deploy's rolling update actually steps through its
    // scale-up/scale-down loop instead of converging trivially.
    config.applications[0].tags = tags(&[("name", "front"), ("replicas", "1")]);
    config.templates.push(rc_template("v1"));

    let (controller, store, fake, _dir) = controller_over(config);

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;

    let rcs = fake.list_replication_controllers("acme-prod", "").await.unwrap();
    assert_eq!(rcs.len(), 1);
    assert_eq!(rcs[0].metadata.name.as_deref(), Some("front-v1"));
    assert_eq!(rcs[0].spec.as_ref().unwrap().replicas, Some(1));

    let mut updated = store.get(fleetctl_engine::model::EntityKind::Application, "front").await.unwrap();
    if let fleetctl_engine::store::Entity::Application(ref mut app) = updated {
        app.replication_controller = "web-rc-v2".to_string();
    }
    store.update("front", updated).await.unwrap();
    store
        .create(fleetctl_engine::store::Entity::Template(rc_template("v2")))
        .await
        .unwrap();

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;

    let rcs = fake.list_replication_controllers("acme-prod", "").await.unwrap();
    assert_eq!(rcs.len(), 1);
    assert_eq!(rcs[0].metadata.name.as_deref(), Some("front-v2"));
    assert_eq!(rcs[0].spec.as_ref().unwrap().replicas, Some(1));
    let labels = rcs[0].metadata.labels.as_ref().unwrap();
    assert_eq!(labels.get("controller/name").map(String::as_str), Some("front"));
}

/// S5: the webhook re-tags only applications marked `autoupdate: "true"` for the matching
/// image, and triggers a deployment for them.
#[tokio::test]
async fn s5_webhook_auto_update() {
    let mut config = base_config();
    config.applications[0].tags = tags(&[
        ("name", "front"),
        ("image", "repo/app"),
        ("tag", "1.0"),
        ("autoupdate", "true"),
    ]);
    config.applications.push(Application {
        name: "back".to_string(),
        replication_controller: String::new(),
        service: String::new(),
        tags: tags(&[("image", "repo/app"), ("tag", "1.0")]),
    });

    let (controller, store, fake, _dir) = controller_over(config);

    fleetctl_engine::webhook::handle_new_tag(&controller, "repo/app", "1.1")
        .await
        .unwrap();
    wait_for_ready(&controller).await;

    let apps = store.list_applications().await;
    let front = apps.iter().find(|a| a.name == "front").unwrap();
    let back = apps.iter().find(|a| a.name == "back").unwrap();
    assert_eq!(front.tags.get("tag"), Some(&"1.1".to_string()));
    assert_eq!(back.tags.get("tag"), Some(&"1.0".to_string()));

    assert_eq!(fake.call_count(Call::CreateService), 1);
}

/// S6: an application added to the store while a reconcile is in flight is visible to readers
/// immediately, is absent from that reconcile's effects, and is picked up by the next commit.
#[tokio::test]
async fn s6_concurrent_edit_during_reconcile() {
    let (controller, store, fake, _dir) = controller_over(base_config());

    controller.commit().await.unwrap();

    store
        .create(fleetctl_engine::store::Entity::Application(Application {
            name: "back".to_string(),
            replication_controller: String::new(),
            service: "web-svc".to_string(),
            tags: tags(&[("name", "back")]),
        }))
        .await
        .unwrap();

    let apps = store.list_applications().await;
    assert!(apps.iter().any(|a| a.name == "back"));

    wait_for_ready(&controller).await;
    assert!(fake.list_services("acme-prod", "").await.unwrap().iter().all(|s| s.metadata.name.as_deref() != Some("back")));

    store
        .update(
            "g",
            fleetctl_engine::store::Entity::Group(ApplicationGroup {
                name: "g".to_string(),
                applications: vec!["front".to_string(), "back".to_string()],
                tags: Tags::new(),
            }),
        )
        .await
        .unwrap();

    controller.commit().await.unwrap();
    wait_for_ready(&controller).await;

    let services = fake.list_services("acme-prod", "").await.unwrap();
    assert!(services.iter().any(|s| s.metadata.name.as_deref() == Some("back")));
}
