//! Management Surface Adapter (§4.G): a thin `axum` `Router` over the store, the controller and
//! the webhook bridge. Dispatch over the four entity kinds is one generic handler set
//! instantiated per kind, rather than four hand-written route sets, matching the teacher's
//! `validate_resource<T>` plus thin per-type registration pattern.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, Router};

use fleetctl_engine::controller::{DeploymentController, State as DeployState};
use fleetctl_engine::model::{Application, ApplicationGroup, EntityKind, Namespace, Template};
use fleetctl_engine::store::{Entity, Store};
use fleetctl_engine::{webhook, Error};
use fleetctl_k8s_util::OrchestratorClient;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone)]
pub struct AppState<O: OrchestratorClient> {
    pub controller: DeploymentController<O>,
}

/// Bridges a concrete configuration entity type to the store's `EntityKind`-tagged operations,
/// so one set of handlers below can be instantiated per type instead of rewritten per type.
#[allow(async_fn_in_trait)]
pub trait CrudKind: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn into_entity(self) -> Entity;
    fn from_entity(entity: Entity) -> Self;
    async fn list(store: &Store) -> Vec<Self>;
}

impl CrudKind for Application {
    const KIND: EntityKind = EntityKind::Application;
    fn into_entity(self) -> Entity {
        Entity::Application(self)
    }
    fn from_entity(entity: Entity) -> Self {
        match entity {
            Entity::Application(a) => a,
            _ => unreachable!("store returned the wrong entity kind"),
        }
    }
    async fn list(store: &Store) -> Vec<Self> {
        store.list_applications().await
    }
}

impl CrudKind for ApplicationGroup {
    const KIND: EntityKind = EntityKind::Group;
    fn into_entity(self) -> Entity {
        Entity::Group(self)
    }
    fn from_entity(entity: Entity) -> Self {
        match entity {
            Entity::Group(g) => g,
            _ => unreachable!("store returned the wrong entity kind"),
        }
    }
    async fn list(store: &Store) -> Vec<Self> {
        store.list_groups().await
    }
}

impl CrudKind for Namespace {
    const KIND: EntityKind = EntityKind::Namespace;
    fn into_entity(self) -> Entity {
        Entity::Namespace(self)
    }
    fn from_entity(entity: Entity) -> Self {
        match entity {
            Entity::Namespace(n) => n,
            _ => unreachable!("store returned the wrong entity kind"),
        }
    }
    async fn list(store: &Store) -> Vec<Self> {
        store.list_namespaces().await
    }
}

impl CrudKind for Template {
    const KIND: EntityKind = EntityKind::Template;
    fn into_entity(self) -> Entity {
        Entity::Template(self)
    }
    fn from_entity(entity: Entity) -> Self {
        match entity {
            Entity::Template(t) => t,
            _ => unreachable!("store returned the wrong entity kind"),
        }
    }
    async fn list(store: &Store) -> Vec<Self> {
        store.list_templates().await
    }
}

async fn list_entities<T: CrudKind, O: OrchestratorClient>(
    State(state): State<AppState<O>>,
) -> Json<Vec<T>> {
    Json(T::list(state.controller.store()).await)
}

async fn get_entity<T: CrudKind, O: OrchestratorClient>(
    State(state): State<AppState<O>>,
    Path(name): Path<String>,
) -> Response {
    match state.controller.store().get(T::KIND, &name).await {
        Ok(entity) => Json(T::from_entity(entity)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_entity<T: CrudKind, O: OrchestratorClient>(
    State(state): State<AppState<O>>,
    Json(body): Json<T>,
) -> Response {
    match state.controller.store().create(body.into_entity()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_entity<T: CrudKind, O: OrchestratorClient>(
    State(state): State<AppState<O>>,
    Path(name): Path<String>,
    Json(body): Json<T>,
) -> Response {
    match state.controller.store().update(&name, body.into_entity()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_entity<T: CrudKind, O: OrchestratorClient>(
    State(state): State<AppState<O>>,
    Path(name): Path<String>,
) -> Response {
    match state.controller.store().delete(T::KIND, &name).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn deploy<O: OrchestratorClient>(State(state): State<AppState<O>>) -> Response {
    match state.controller.commit().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Serialize)]
struct DeployStatus {
    state: &'static str,
    err: Option<String>,
    errors: Vec<fleetctl_engine::log::LogEntry>,
    logs: Vec<fleetctl_engine::log::LogEntry>,
}

async fn deploy_status<O: OrchestratorClient>(State(state): State<AppState<O>>) -> Json<DeployStatus> {
    let status = state.controller.status();
    let state_label = match status.state {
        DeployState::Ready => "ready",
        DeployState::Processing => "processing",
    };
    Json(DeployStatus {
        state: state_label,
        err: status.terminal_error,
        errors: status.errors,
        logs: status.logs,
    })
}

async fn new_tag<O: OrchestratorClient>(
    State(state): State<AppState<O>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let (Some(image), Some(tag)) = (params.get("image"), params.get("tag")) else {
        return Error::BadRequest("query", "expected image and tag parameters".to_string())
            .into_response();
    };
    match webhook::handle_new_tag(&state.controller, image, tag).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub fn build_router<O: OrchestratorClient>(state: AppState<O>) -> Router {
    Router::new()
        .route(
            "/apps",
            get(list_entities::<Application, O>).post(create_entity::<Application, O>),
        )
        .route(
            "/apps/{name}",
            get(get_entity::<Application, O>)
                .put(update_entity::<Application, O>)
                .delete(delete_entity::<Application, O>),
        )
        .route(
            "/groups",
            get(list_entities::<ApplicationGroup, O>).post(create_entity::<ApplicationGroup, O>),
        )
        .route(
            "/groups/{name}",
            get(get_entity::<ApplicationGroup, O>)
                .put(update_entity::<ApplicationGroup, O>)
                .delete(delete_entity::<ApplicationGroup, O>),
        )
        .route(
            "/namespaces",
            get(list_entities::<Namespace, O>).post(create_entity::<Namespace, O>),
        )
        .route(
            "/namespaces/{name}",
            get(get_entity::<Namespace, O>)
                .put(update_entity::<Namespace, O>)
                .delete(delete_entity::<Namespace, O>),
        )
        .route(
            "/templates",
            get(list_entities::<Template, O>).post(create_entity::<Template, O>),
        )
        .route(
            "/templates/{name}",
            get(get_entity::<Template, O>)
                .put(update_entity::<Template, O>)
                .delete(delete_entity::<Template, O>),
        )
        .route("/deploy", post(deploy::<O>).get(deploy_status::<O>))
        .route("/hooks/newtag", post(new_tag::<O>))
        .route("/healthz", get(healthz))
        .with_state(state)
}
