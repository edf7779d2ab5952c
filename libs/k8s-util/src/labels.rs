//! Identity labels every controller-owned live object carries, and the selector
//! used to scope list calls to exactly that set of objects.

use std::collections::BTreeMap;

pub const ENABLE_LABEL: &str = "controller/enable";
pub const PROJECT_LABEL: &str = "controller/project";
pub const NAME_LABEL: &str = "controller/name";

/// Label selector string scoping a list call to this project's owned objects.
pub fn project_selector(project: &str) -> String {
    format!("{ENABLE_LABEL}=true,{PROJECT_LABEL}={project}")
}

/// The canonical identity labels for a namespace-scoped object (Service, ReplicationController).
pub fn identity_labels(project: &str, app_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ENABLE_LABEL.to_string(), "true".to_string()),
        (PROJECT_LABEL.to_string(), project.to_string()),
        (NAME_LABEL.to_string(), app_name.to_string()),
    ])
}

/// The canonical identity labels for a namespace object (no `controller/name`, since a
/// namespace's identity is its cluster name).
pub fn namespace_identity_labels(project: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ENABLE_LABEL.to_string(), "true".to_string()),
        (PROJECT_LABEL.to_string(), project.to_string()),
    ])
}

/// Merge the identity labels into an existing label map, overwriting any conflicting keys.
pub fn apply_identity_labels(
    existing: &mut BTreeMap<String, String>,
    identity: BTreeMap<String, String>,
) {
    existing.extend(identity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_combines_enable_and_project() {
        assert_eq!(
            project_selector("acme"),
            "controller/enable=true,controller/project=acme"
        );
    }

    #[test]
    fn identity_labels_include_app_name() {
        let labels = identity_labels("acme", "front");
        assert_eq!(labels.get(NAME_LABEL), Some(&"front".to_string()));
        assert_eq!(labels.get(PROJECT_LABEL), Some(&"acme".to_string()));
    }
}
