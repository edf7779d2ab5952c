use crate::client::OrchestratorClient;
use crate::error::{Error, Result};

use std::time::Duration;

use k8s_openapi::api::core::v1::ReplicationController;

/// Timing knobs for [`run`]. The literal defaults (1s / 1s / 10s) come from the system this
/// controller replaces; `poll_interval` outliving `timeout` is a known quirk of that source and
/// is reproduced rather than "fixed" (see `DESIGN.md`).
#[derive(Clone, Copy, Debug)]
pub struct RollingUpdateOptions {
    pub update_interval: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl RollingUpdateOptions {
    pub const SPEC_DEFAULT: Self = Self {
        update_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(1),
        poll_interval: Duration::from_secs(10),
    };
}

/// Replace `old` with `new` inside `namespace`: create `new` scaled to zero, then step `new` up
/// and `old` down in unit increments until `new` carries its desired replica count and `old` has
/// none, then delete `old`. `opts.timeout` bounds each individual orchestrator call (a hang
/// detector), not the convergence loop as a whole: a real rolling update legitimately takes
/// `steps * update_interval` wall-clock time, and wrapping the whole loop in a single
/// `opts.timeout` budget would make any update needing even one pacing sleep self-timeout before
/// the old controller is ever deleted.
pub async fn run<O: OrchestratorClient>(
    client: &O,
    namespace: &str,
    old: ReplicationController,
    new: ReplicationController,
    opts: RollingUpdateOptions,
) -> Result<()> {
    let old_name = old.metadata.name.clone().unwrap_or_default();
    let new_name = new.metadata.name.clone().unwrap_or_default();
    let desired = new.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    tracing::trace!(
        poll_interval_ms = opts.poll_interval.as_millis() as u64,
        "rolling update step loop starting"
    );

    let mut scaled_new = new.clone();
    if let Some(spec) = scaled_new.spec.as_mut() {
        spec.replicas = Some(0);
    }
    call_with_timeout(
        opts.timeout,
        client.create_replication_controller(namespace, scaled_new.clone()),
        &old_name,
        &new_name,
        namespace,
    )
    .await?;

    let mut new_replicas = 0;
    let mut old_replicas = old.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);

    while new_replicas < desired || old_replicas > 0 {
        if new_replicas < desired {
            new_replicas += 1;
            scaled_new.spec.as_mut().unwrap().replicas = Some(new_replicas);
            call_with_timeout(
                opts.timeout,
                client.update_replication_controller(namespace, scaled_new.clone()),
                &old_name,
                &new_name,
                namespace,
            )
            .await?;
        }
        if old_replicas > 0 {
            old_replicas -= 1;
            let mut scaled_old = old.clone();
            scaled_old.spec.as_mut().unwrap().replicas = Some(old_replicas);
            call_with_timeout(
                opts.timeout,
                client.update_replication_controller(namespace, scaled_old),
                &old_name,
                &new_name,
                namespace,
            )
            .await?;
        }
        if new_replicas >= desired && old_replicas == 0 {
            break;
        }
        tokio::time::sleep(opts.update_interval).await;
    }

    call_with_timeout(
        opts.timeout,
        client.delete_replication_controller(namespace, &old_name),
        &old_name,
        &new_name,
        namespace,
    )
    .await
}

/// Bounds one orchestrator call against `timeout`, turning an `Elapsed` into the same
/// `RollingUpdateTimeout` the old whole-loop timeout used to report.
async fn call_with_timeout<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T>>,
    old_name: &str,
    new_name: &str,
    namespace: &str,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::RollingUpdateTimeout(
            old_name.to_string(),
            new_name.to_string(),
            namespace.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOrchestrator;
    use k8s_openapi::api::core::v1::ReplicationControllerSpec;
    use kube::api::ObjectMeta;

    fn rc(name: &str, replicas: i32) -> ReplicationController {
        ReplicationController {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(ReplicationControllerSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rolling_update_creates_new_and_deletes_old() {
        let fake = FakeOrchestrator::new();
        let opts = RollingUpdateOptions {
            update_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
        };
        run(&fake, "acme-prod", rc("front-v1", 2), rc("front-v2", 2), opts)
            .await
            .unwrap();

        let live = fake
            .list_replication_controllers("acme-prod", "")
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].metadata.name.as_deref(), Some("front-v2"));
        assert_eq!(live[0].spec.as_ref().unwrap().replicas, Some(2));
    }
}
