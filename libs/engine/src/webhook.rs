//! Webhook Bridge (§4.F): mutate auto-updatable applications on an image-tag event and request
//! a commit.

use crate::controller::DeploymentController;
use crate::error::{Error, Result};
use crate::store::Entity;

use fleetctl_k8s_util::OrchestratorClient;

const IMAGE_TAG: &str = "image";
const TAG_TAG: &str = "tag";
const AUTOUPDATE_TAG: &str = "autoupdate";

/// Re-tag every application bound to `image` and marked auto-updatable, then trigger a commit.
/// Returns `NotFound` if no application matches; a `commit()` failure on one matched application
/// is surfaced but does not stop the others from being re-tagged.
pub async fn handle_new_tag<O: OrchestratorClient>(
    controller: &DeploymentController<O>,
    image: &str,
    tag: &str,
) -> Result<()> {
    let applications = controller.store().list_applications().await;
    let matches: Vec<_> = applications
        .into_iter()
        .filter(|app| {
            app.tags.get(IMAGE_TAG).map(String::as_str) == Some(image)
                && app.tags.contains_key(TAG_TAG)
                && app.tags.get(AUTOUPDATE_TAG).map(String::as_str) == Some("true")
        })
        .collect();

    if matches.is_empty() {
        return Err(Error::NotFound("application", format!("image={image}")));
    }

    let mut last_error = None;
    for mut app in matches {
        app.tags.insert(TAG_TAG.to_string(), tag.to_string());
        let name = app.name.clone();
        if let Err(e) = controller
            .store()
            .update(&name, Entity::Application(app))
            .await
        {
            last_error = Some(e);
            continue;
        }
        if let Err(e) = controller.commit().await {
            last_error = Some(e);
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
