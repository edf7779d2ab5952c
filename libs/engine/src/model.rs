//! The declarative configuration document (§3): projects, templates, applications, groups and
//! namespaces. Every entity is identified by `name`, unique within its own kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Tags = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replication_controller: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationGroup {
    pub name: String,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub application_group: String,
    #[serde(default)]
    pub tags: Tags,
}

impl Namespace {
    /// The authoritative cluster-side name, `<project>-<name>`.
    pub fn cluster_name(&self, project: &str) -> String {
        format!("{project}-{}", self.name)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub project: String,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub groups: Vec<ApplicationGroup>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

/// The generic dispatch tag used by the store and management surface (§9: "typed dispatch
/// table" in place of the source's runtime reflection).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Application,
    Group,
    Namespace,
    Template,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Group => "group",
            EntityKind::Namespace => "namespace",
            EntityKind::Template => "template",
        }
    }
}
