//! Configuration Store (§4.B): one in-memory `Config`, guarded by a readers-writer lock,
//! with YAML load/persist and generic CRUD dispatch over [`EntityKind`].

use crate::error::{Error, Result};
use crate::model::{Application, ApplicationGroup, Config, EntityKind, Namespace, Template};

use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use tokio::sync::RwLock;

/// The kinds of entity the store can list/get/create/update/delete generically. Each variant
/// wraps the concrete value so callers decode their JSON body into the right type before
/// calling the store (the management surface adapter does this).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Application(Application),
    Group(ApplicationGroup),
    Namespace(Namespace),
    Template(Template),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Application(_) => EntityKind::Application,
            Entity::Group(_) => EntityKind::Group,
            Entity::Namespace(_) => EntityKind::Namespace,
            Entity::Template(_) => EntityKind::Template,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Application(a) => &a.name,
            Entity::Group(g) => &g.name,
            Entity::Namespace(n) => &n.name,
            Entity::Template(t) => &t.name,
        }
    }
}

pub struct Store {
    config: RwLock<Config>,
}

impl Store {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn empty(project: impl Into<String>) -> Self {
        Self::new(Config {
            project: project.into(),
            ..Default::default()
        })
    }

    pub fn load_from_reader(mut reader: impl Read) -> Result<Self> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|e| Error::ConfigLoad(Box::new(e)))?;
        let config: Config =
            serde_yaml::from_str(&buf).map_err(|e| Error::ConfigLoad(Box::new(e)))?;
        Ok(Self::new(config))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::ConfigLoad(Box::new(e)))?;
        Self::load_from_reader(file)
    }

    pub async fn persist_to_writer(&self, mut writer: impl Write) -> Result<()> {
        let config = self.config.read().await;
        let yaml =
            serde_yaml::to_string(&*config).map_err(|e| Error::ConfigPersist(Box::new(e)))?;
        writer
            .write_all(yaml.as_bytes())
            .map_err(|e| Error::ConfigPersist(Box::new(e)))
    }

    pub async fn persist_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("yaml.tmp");
        {
            let file =
                std::fs::File::create(&tmp_path).map_err(|e| Error::ConfigPersist(Box::new(e)))?;
            self.persist_to_writer(file).await?;
        }
        std::fs::rename(&tmp_path, path).map_err(|e| Error::ConfigPersist(Box::new(e)))
    }

    /// A deep copy of the current configuration, used to feed one reconcile pass. Once taken,
    /// further store edits do not affect it (§3 snapshot-semantics invariant).
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn list_applications(&self) -> Vec<Application> {
        self.config.read().await.applications.clone()
    }

    pub async fn list_groups(&self) -> Vec<ApplicationGroup> {
        self.config.read().await.groups.clone()
    }

    pub async fn list_namespaces(&self) -> Vec<Namespace> {
        self.config.read().await.namespaces.clone()
    }

    pub async fn list_templates(&self) -> Vec<Template> {
        self.config.read().await.templates.clone()
    }

    pub async fn get(&self, kind: EntityKind, name: &str) -> Result<Entity> {
        let config = self.config.read().await;
        match kind {
            EntityKind::Application => config
                .applications
                .iter()
                .find(|a| a.name == name)
                .cloned()
                .map(Entity::Application),
            EntityKind::Group => config
                .groups
                .iter()
                .find(|g| g.name == name)
                .cloned()
                .map(Entity::Group),
            EntityKind::Namespace => config
                .namespaces
                .iter()
                .find(|n| n.name == name)
                .cloned()
                .map(Entity::Namespace),
            EntityKind::Template => config
                .templates
                .iter()
                .find(|t| t.name == name)
                .cloned()
                .map(Entity::Template),
        }
        .ok_or_else(|| Error::NotFound(kind.as_str(), name.to_string()))
    }

    pub async fn create(&self, entity: Entity) -> Result<()> {
        let kind = entity.kind();
        let name = entity.name().to_string();
        let mut config = self.config.write().await;
        if exists(&config, kind, &name) {
            return Err(Error::Conflict(kind.as_str(), name));
        }
        match entity {
            Entity::Application(a) => config.applications.push(a),
            Entity::Group(g) => config.groups.push(g),
            Entity::Namespace(n) => config.namespaces.push(n),
            Entity::Template(t) => config.templates.push(t),
        }
        Ok(())
    }

    pub async fn update(&self, name: &str, entity: Entity) -> Result<()> {
        let kind = entity.kind();
        let mut config = self.config.write().await;
        if !exists(&config, kind, name) {
            return Err(Error::NotFound(kind.as_str(), name.to_string()));
        }
        match entity {
            Entity::Application(a) => replace(&mut config.applications, name, a, |x| &x.name),
            Entity::Group(g) => replace(&mut config.groups, name, g, |x| &x.name),
            Entity::Namespace(n) => replace(&mut config.namespaces, name, n, |x| &x.name),
            Entity::Template(t) => replace(&mut config.templates, name, t, |x| &x.name),
        }
        Ok(())
    }

    pub async fn delete(&self, kind: EntityKind, name: &str) -> Result<()> {
        let mut config = self.config.write().await;
        let removed = match kind {
            EntityKind::Application => remove(&mut config.applications, name, |x| &x.name),
            EntityKind::Group => remove(&mut config.groups, name, |x| &x.name),
            EntityKind::Namespace => remove(&mut config.namespaces, name, |x| &x.name),
            EntityKind::Template => remove(&mut config.templates, name, |x| &x.name),
        };
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(kind.as_str(), name.to_string()))
        }
    }
}

fn exists(config: &Config, kind: EntityKind, name: &str) -> bool {
    match kind {
        EntityKind::Application => config.applications.iter().any(|a| a.name == name),
        EntityKind::Group => config.groups.iter().any(|g| g.name == name),
        EntityKind::Namespace => config.namespaces.iter().any(|n| n.name == name),
        EntityKind::Template => config.templates.iter().any(|t| t.name == name),
    }
}

fn replace<T>(items: &mut [T], name: &str, value: T, key: impl Fn(&T) -> &String) {
    if let Some(slot) = items.iter_mut().find(|x| key(x) == name) {
        *slot = value;
    }
}

fn remove<T>(items: &mut Vec<T>, name: &str, key: impl Fn(&T) -> &String) -> bool {
    let before = items.len();
    items.retain(|x| key(x) != name);
    items.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> Entity {
        Entity::Application(Application {
            name: name.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn create_get_update_delete_round_trip() {
        let store = Store::empty("acme");
        store.create(app("front")).await.unwrap();

        let got = store.get(EntityKind::Application, "front").await.unwrap();
        assert_eq!(got.name(), "front");

        let mut updated = Application {
            name: "front".to_string(),
            ..Default::default()
        };
        updated.tags.insert("image".to_string(), "repo/app".to_string());
        store
            .update("front", Entity::Application(updated))
            .await
            .unwrap();

        let got = store.get(EntityKind::Application, "front").await.unwrap();
        match got {
            Entity::Application(a) => {
                assert_eq!(a.tags.get("image"), Some(&"repo/app".to_string()))
            }
            _ => panic!("expected application"),
        }

        store
            .delete(EntityKind::Application, "front")
            .await
            .unwrap();
        let err = store.get(EntityKind::Application, "front").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_, _)));
    }

    #[tokio::test]
    async fn duplicate_create_is_conflict() {
        let store = Store::empty("acme");
        store.create(app("front")).await.unwrap();
        let err = store.create(app("front")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_, _)));
    }

    #[tokio::test]
    async fn load_persist_round_trips_semantically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let store = Store::empty("acme");
        store.create(app("front")).await.unwrap();
        store.persist_to_path(&path).await.unwrap();

        let reloaded = Store::load_from_path(&path).unwrap();
        assert_eq!(reloaded.snapshot().await, store.snapshot().await);
    }
}
