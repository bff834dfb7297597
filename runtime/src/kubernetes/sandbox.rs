use super::{delete_if_present, KubeRuntime};
use crate::error::{self, Error, Result};
use crate::http_status_code::AllowNotFound;
use crate::pod::PodState;
use crate::{SandboxHook, SandboxPlan};
use async_trait::async_trait;
use bundle_model::constants::LABEL_SANDBOX_POD;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::PostParams;
use kube::ResourceExt;
use log::{debug, info, warn};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The cluster objects of a sandbox, as seen by [`create_with_hooks`].
#[async_trait]
pub(super) trait SandboxObjects: Send + Sync {
    /// Creates the namespace the pod runs in if needed and returns its name.
    async fn create_namespace(&self, plan: &SandboxPlan) -> Result<String>;

    /// Creates the service account, role bindings and network policies.
    async fn populate(&self, plan: &SandboxPlan, location: &str) -> Result<()>;

    /// Removes whatever was created in `location`.
    async fn remove(&self, plan: &SandboxPlan, location: &str) -> Result<()>;
}

/// Creates the sandbox described by `plan` with `hooks` run around it and returns the namespace the
/// pod will run in. A failing pre-create hook stops creation before anything exists. Once the
/// namespace exists, any failure removes what was created before the error is returned.
pub(super) async fn create_with_hooks<S>(
    objects: &S,
    hooks: &[Arc<dyn SandboxHook>],
    plan: &SandboxPlan,
) -> Result<String>
where
    S: SandboxObjects + ?Sized,
{
    for hook in hooks {
        hook.pre_create(plan.pod_name(), plan.namespace(), plan.targets(), plan.role())
            .await
            .map_err(|e| hook_error(hook.name(), "pre create", e))?;
    }

    let location = objects.create_namespace(plan).await?;
    debug!("Sandbox for pod '{}' will run in '{}'", plan.pod_name(), location);

    if let Err(e) = populate_with_hooks(objects, hooks, plan, &location).await {
        warn!(
            "Unable to create sandbox for pod '{}', removing what was created: {}",
            plan.pod_name(),
            e
        );
        if let Err(cleanup) = objects.remove(plan, &location).await {
            warn!("Unable to remove partial sandbox of '{}': {}", plan.pod_name(), cleanup);
        }
        return Err(e);
    }
    Ok(location)
}

async fn populate_with_hooks<S>(
    objects: &S,
    hooks: &[Arc<dyn SandboxHook>],
    plan: &SandboxPlan,
    location: &str,
) -> Result<()>
where
    S: SandboxObjects + ?Sized,
{
    objects.populate(plan, location).await?;
    for hook in hooks {
        hook.post_create(plan.pod_name(), location, plan.targets(), plan.role())
            .await
            .map_err(|e| hook_error(hook.name(), "post create", e))?;
    }
    Ok(())
}

#[async_trait]
impl SandboxObjects for KubeRuntime {
    async fn create_namespace(&self, plan: &SandboxPlan) -> Result<String> {
        Ok(match plan.namespace_to_create() {
            None => plan.namespace().to_string(),
            Some(generated) => self
                .api::<Namespace>()
                .create(&PostParams::default(), &generated)
                .await
                .context(error::KubeSnafu {
                    action: format!("create namespace with prefix '{}'", plan.namespace()),
                })?
                .name_any(),
        })
    }

    async fn populate(&self, plan: &SandboxPlan, location: &str) -> Result<()> {
        self.populate_sandbox(plan, location).await
    }

    async fn remove(&self, plan: &SandboxPlan, location: &str) -> Result<()> {
        self.destroy_sandbox_objects(
            plan.pod_name(),
            location,
            plan.targets(),
            &[],
            "",
            false,
            false,
        )
        .await
    }
}

impl KubeRuntime {
    pub(super) async fn create_sandbox_objects(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        role: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        let plan = SandboxPlan::new(pod_name, namespace, targets, role, metadata);
        let location = create_with_hooks(self, &self.config.hooks, &plan).await?;
        info!(
            "Created sandbox for pod '{}' in '{}' with targets {:?}",
            pod_name, location, targets
        );
        Ok((plan.service_account_name().to_string(), location))
    }

    async fn populate_sandbox(&self, plan: &SandboxPlan, location: &str) -> Result<()> {
        self.create_or_update(
            &self.namespaced_api::<ServiceAccount>(location),
            &plan.service_account(location),
            "service account",
        )
        .await?;
        for target in plan.binding_namespaces(location) {
            self.create_or_update(
                &self.namespaced_api::<RoleBinding>(&target),
                &plan.role_binding(location, &target),
                "role binding",
            )
            .await?;
        }
        for target in plan.isolated_targets() {
            self.create_or_update(
                &self.namespaced_api::<NetworkPolicy>(&target),
                &plan.network_policy(location, &target),
                "network policy",
            )
            .await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) async fn destroy_sandbox_objects(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        secrets: &[String],
        config_namespace: &str,
        keep_namespace: bool,
        keep_namespace_on_error: bool,
    ) -> Result<()> {
        for hook in &self.config.hooks {
            if let Err(e) = hook.pre_destroy(pod_name, namespace, targets).await {
                warn!("Sandbox hook '{}' failed before destroy: {}", hook.name(), e);
            }
        }

        let mut failures = Vec::new();
        let mut record = |result: Result<()>| {
            if let Err(e) = result {
                warn!("Sandbox teardown of '{}': {}", pod_name, e);
                failures.push(e.to_string());
            }
        };

        // Objects in the target namespaces outlive the sandbox namespace, so remove them first.
        for target in targets.iter().filter(|target| *target != namespace) {
            record(
                delete_if_present(
                    &self.namespaced_api::<NetworkPolicy>(target),
                    pod_name,
                    "network policy",
                )
                .await,
            );
            record(
                delete_if_present(
                    &self.namespaced_api::<RoleBinding>(target),
                    pod_name,
                    "role binding",
                )
                .await,
            );
        }

        let reused = targets.iter().any(|target| target == namespace)
            || namespace == config_namespace
            || namespace == self.config.state_namespace;
        let pod_failed = keep_namespace_on_error && self.pod_failed(pod_name, namespace).await;
        if reused {
            // The namespace is not ours. Remove the pod and everything created for it.
            let state_name = if namespace == self.config.state_namespace {
                None
            } else {
                self.sandbox_state_name(pod_name, namespace).await
            };
            record(
                delete_if_present(&self.namespaced_api::<Pod>(namespace), pod_name, "pod").await,
            );
            record(
                delete_if_present(&self.namespaced_api::<Secret>(namespace), pod_name, "secret")
                    .await,
            );
            record(
                delete_if_present(
                    &self.namespaced_api::<RoleBinding>(namespace),
                    pod_name,
                    "role binding",
                )
                .await,
            );
            record(
                delete_if_present(
                    &self.namespaced_api::<ServiceAccount>(namespace),
                    pod_name,
                    "service account",
                )
                .await,
            );
            for secret in secrets {
                record(self.delete_copied_secret(pod_name, namespace, secret).await);
            }
            if let Some(state_name) = state_name {
                record(
                    delete_if_present(
                        &self.namespaced_api::<ConfigMap>(namespace),
                        &state_name,
                        "state",
                    )
                    .await,
                );
            }
        } else if keep_namespace || pod_failed {
            info!(
                "Keeping sandbox namespace '{}' of pod '{}' (keep namespace: {}, pod failed: {})",
                namespace, pod_name, keep_namespace, pod_failed
            );
        } else {
            record(delete_if_present(&self.api::<Namespace>(), namespace, "namespace").await);
        }

        for hook in &self.config.hooks {
            if let Err(e) = hook.post_destroy(pod_name, namespace, targets).await {
                warn!("Sandbox hook '{}' failed after destroy: {}", hook.name(), e);
            }
        }

        if failures.is_empty() {
            debug!("Destroyed sandbox of pod '{}'", pod_name);
            Ok(())
        } else {
            Err(Error::message(format!(
                "Unable to fully destroy the sandbox of pod '{}': {}",
                pod_name,
                failures.join("; ")
            )))
        }
    }

    /// Deletes secret `name` if it was copied in for `pod_name`. A secret of that name that was
    /// already there when the copy was made is left alone.
    async fn delete_copied_secret(
        &self,
        pod_name: &str,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let api = self.namespaced_api::<Secret>(namespace);
        let secret = api
            .get(name)
            .await
            .allow_not_found()
            .context(error::KubeSnafu {
                action: format!("get secret '{}/{}'", namespace, name),
            })?;
        match secret {
            Some(secret) if copied_for(&secret, pod_name) => {
                delete_if_present(&api, name, "copied secret").await
            }
            Some(_) => {
                debug!(
                    "Keeping secret '{}/{}', it was not copied for pod '{}'",
                    namespace, name, pod_name
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn pod_failed(&self, pod_name: &str, namespace: &str) -> bool {
        match self
            .namespaced_api::<Pod>(namespace)
            .get(pod_name)
            .await
            .allow_not_found()
        {
            Ok(Some(pod)) => matches!(PodState::from_pod(&pod), PodState::Failed { .. }),
            Ok(None) => false,
            Err(e) => {
                warn!("Unable to check if pod '{}' failed: {}", pod_name, e);
                false
            }
        }
    }

    /// The state a pod was started with is mounted from a config map named in its volumes.
    async fn sandbox_state_name(&self, pod_name: &str, namespace: &str) -> Option<String> {
        let pod = self
            .namespaced_api::<Pod>(namespace)
            .get(pod_name)
            .await
            .ok()?;
        pod.spec?
            .volumes?
            .into_iter()
            .find_map(|volume| volume.config_map?.name)
    }
}

fn hook_error(hook: &str, stage: &str, e: Error) -> Error {
    Error::Hook {
        hook: format!("{} ({})", hook, stage),
        message: e.to_string(),
    }
}

fn copied_for(secret: &Secret, pod_name: &str) -> bool {
    secret.labels().get(LABEL_SANDBOX_POD).map(String::as_str) == Some(pod_name)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::RuntimeConfig;
    use kube::api::ObjectMeta;
    use maplit::btreemap;
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<String>>>;

    const GENERATED: &str = "bundle-abcde";

    fn push(events: &Events, event: String) {
        events.lock().unwrap().push(event);
    }

    fn events(events: &Events) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    struct FakeObjects {
        events: Events,
        fail_populate: bool,
    }

    #[async_trait]
    impl SandboxObjects for FakeObjects {
        async fn create_namespace(&self, plan: &SandboxPlan) -> Result<String> {
            push(&self.events, format!("create {}", plan.namespace()));
            Ok(GENERATED.to_string())
        }

        async fn populate(&self, _plan: &SandboxPlan, location: &str) -> Result<()> {
            push(&self.events, format!("populate {}", location));
            if self.fail_populate {
                return Err(Error::message("role binding rejected"));
            }
            Ok(())
        }

        async fn remove(&self, _plan: &SandboxPlan, location: &str) -> Result<()> {
            push(&self.events, format!("remove {}", location));
            Ok(())
        }
    }

    struct RecordingHook {
        name: &'static str,
        fail_at: Option<&'static str>,
        events: Events,
    }

    impl RecordingHook {
        fn step(&self, step: &'static str, namespace: &str) -> Result<()> {
            push(&self.events, format!("{} {} {}", self.name, step, namespace));
            if self.fail_at == Some(step) {
                return Err(Error::message(format!("{} refused", self.name)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SandboxHook for RecordingHook {
        fn name(&self) -> &str {
            self.name
        }

        async fn pre_create(
            &self,
            _pod_name: &str,
            namespace: &str,
            _targets: &[String],
            _role: &str,
        ) -> Result<()> {
            self.step("pre-create", namespace)
        }

        async fn post_create(
            &self,
            _pod_name: &str,
            namespace: &str,
            _targets: &[String],
            _role: &str,
        ) -> Result<()> {
            self.step("post-create", namespace)
        }
    }

    fn plan() -> SandboxPlan {
        SandboxPlan::new(
            "bundle-1234",
            "bundle-",
            &["target".to_string()],
            "edit",
            &BTreeMap::new(),
        )
    }

    /// Builds hooks `first` and `second`, `first` failing at `fail_at`.
    fn hooks(events: &Events, fail_at: Option<&'static str>) -> RuntimeConfig {
        RuntimeConfig::default()
            .with_hook(Arc::new(RecordingHook {
                name: "first",
                fail_at,
                events: events.clone(),
            }))
            .with_hook(Arc::new(RecordingHook {
                name: "second",
                fail_at: None,
                events: events.clone(),
            }))
    }

    fn objects(events: &Events, fail_populate: bool) -> FakeObjects {
        FakeObjects {
            events: events.clone(),
            fail_populate,
        }
    }

    fn failed_hook(result: Result<String>) -> Option<String> {
        match result {
            Err(Error::Hook { hook, .. }) => Some(hook),
            _ => None,
        }
    }

    #[tokio::test]
    async fn hooks_run_in_order_around_creation() {
        let log: Events = Arc::default();
        let config = hooks(&log, None);
        let location = create_with_hooks(&objects(&log, false), &config.hooks, &plan())
            .await
            .unwrap();
        assert_eq!(location, GENERATED);
        assert_eq!(
            events(&log),
            vec![
                "first pre-create bundle-",
                "second pre-create bundle-",
                "create bundle-",
                "populate bundle-abcde",
                "first post-create bundle-abcde",
                "second post-create bundle-abcde",
            ]
        );
    }

    #[tokio::test]
    async fn failing_pre_create_hook_creates_nothing() {
        let log: Events = Arc::default();
        let config = hooks(&log, Some("pre-create"));
        let result = create_with_hooks(&objects(&log, false), &config.hooks, &plan()).await;
        assert_eq!(failed_hook(result).as_deref(), Some("first (pre create)"));
        assert_eq!(events(&log), vec!["first pre-create bundle-"]);
    }

    #[tokio::test]
    async fn failing_post_create_hook_removes_sandbox() {
        let log: Events = Arc::default();
        let config = hooks(&log, Some("post-create"));
        let result = create_with_hooks(&objects(&log, false), &config.hooks, &plan()).await;
        assert_eq!(failed_hook(result).as_deref(), Some("first (post create)"));
        assert_eq!(
            events(&log),
            vec![
                "first pre-create bundle-",
                "second pre-create bundle-",
                "create bundle-",
                "populate bundle-abcde",
                "first post-create bundle-abcde",
                "remove bundle-abcde",
            ]
        );
    }

    #[tokio::test]
    async fn failed_populate_removes_sandbox_without_post_hooks() {
        let log: Events = Arc::default();
        let config = hooks(&log, None);
        let result = create_with_hooks(&objects(&log, true), &config.hooks, &plan()).await;
        assert!(matches!(result, Err(Error::Message { .. })));
        let log = events(&log);
        assert_eq!(log.last().map(String::as_str), Some("remove bundle-abcde"));
        assert!(!log.iter().any(|event| event.contains("post-create")));
    }

    #[test]
    fn only_secrets_copied_for_the_pod_are_removed() {
        let secret = |labels: Option<BTreeMap<String, String>>| Secret {
            metadata: ObjectMeta {
                name: Some("db-admin".to_string()),
                labels,
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        let ours = secret(Some(btreemap! {
            LABEL_SANDBOX_POD.to_string() => "bundle-1234".to_string(),
        }));
        let other_pod = secret(Some(btreemap! {
            LABEL_SANDBOX_POD.to_string() => "bundle-9999".to_string(),
        }));
        assert!(copied_for(&ours, "bundle-1234"));
        assert!(!copied_for(&other_pod, "bundle-1234"));
        assert!(!copied_for(&secret(None), "bundle-1234"));
    }
}
