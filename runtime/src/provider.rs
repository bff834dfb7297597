use crate::{ExecutionContext, Result};
use async_trait::async_trait;
use bundle_model::Platform;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Called while a bundle pod runs with the latest description of what the bundle is doing and
/// the dashboard URL it reported, either of which may be empty.
pub type UpdateFn<'a> = &'a (dyn Fn(&str, &str) + Send + Sync);

/// Persists the state a bundle keeps between actions, one blob per service instance.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The name the state of `instance_id` is stored under.
    fn master_name(&self, instance_id: &str) -> String;

    /// The namespace holding the master copy of every instance's state.
    fn master_namespace(&self) -> String;

    /// Where a bundle pod finds its state on disk.
    fn mount_location(&self) -> String;

    /// Whether state named `name` exists in the master namespace.
    async fn state_is_present(&self, name: &str) -> Result<bool>;

    /// Copies state `from_name` in `from_namespace` to `to_name` in `to_namespace`, replacing
    /// whatever is there. A missing source is not an error; nothing is copied.
    async fn copy_state(
        &self,
        from_name: &str,
        to_name: &str,
        from_namespace: &str,
        to_namespace: &str,
    ) -> Result<()>;

    /// Deletes state `name` from the master namespace. A missing state is not an error.
    async fn delete_state(&self, name: &str) -> Result<()>;
}

/// Persists the credentials produced by bundles, keyed by binding or instance id.
#[async_trait]
pub trait ExtractedCredentialStore: Send + Sync {
    /// Stores `credentials` under `id`, replacing any existing record.
    async fn create_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
        credentials: &Map<String, Value>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn update_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
        credentials: &Map<String, Value>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Returns `None` if there is no record for `id`.
    async fn get_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
    ) -> Result<Option<Map<String, Value>>>;

    /// A missing record is not an error.
    async fn delete_extracted_credential(&self, id: &str, namespace: &str) -> Result<()>;
}

/// The cluster operations the bundle executor is built on. None of these keep state between calls;
/// the order they are called in is up to the caller.
#[async_trait]
pub trait Runtime: StateStore + ExtractedCredentialStore {
    /// Prepares a place for pod `pod_name` to run. `namespace` is reused when it is one of
    /// `targets`, otherwise a namespace is generated with `namespace` as its prefix. A service
    /// account named after the pod is bound to `role` in every target, and when `namespace` is not
    /// a target every other target gets a network policy that keeps the pod's namespace out.
    ///
    /// Returns the service account name and the namespace the pod will run in.
    async fn create_sandbox(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        role: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(String, String)>;

    /// Removes everything `create_sandbox` made, along with the copies of `secrets` made by
    /// `copy_secrets_to_namespace` for this pod. This is best effort; an error means something was
    /// left behind, not that the remainder was skipped.
    #[allow(clippy::too_many_arguments)]
    async fn destroy_sandbox(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        secrets: &[String],
        config_namespace: &str,
        keep_namespace: bool,
        keep_namespace_on_error: bool,
    ) -> Result<()>;

    /// Submits the bundle pod.
    async fn run_bundle(&self, context: ExecutionContext) -> Result<ExecutionContext>;

    /// Waits for the bundle pod to finish. Returns an error if the pod failed, could not be
    /// observed, or `cancel` fired first.
    async fn watch_running_bundle(
        &self,
        pod_name: &str,
        namespace: &str,
        update: UpdateFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Reads the credential payload written by a finished bundle pod.
    async fn extract_credentials(
        &self,
        pod_name: &str,
        namespace: &str,
        runtime_version: u32,
    ) -> Result<Vec<u8>>;

    /// Copies `secrets` from `cluster_namespace` into the namespace the pod runs in.
    async fn copy_secrets_to_namespace(
        &self,
        context: &ExecutionContext,
        cluster_namespace: &str,
        secrets: &[String],
    ) -> Result<()>;

    /// The kind of cluster this runtime talks to.
    fn get_runtime(&self) -> Platform;
}

/// Extra steps run around sandbox creation and teardown, for example to grant a sandbox access to
/// cluster specific resources. Every step defaults to doing nothing.
#[async_trait]
pub trait SandboxHook: Send + Sync {
    /// The name used when reporting a failure.
    fn name(&self) -> &str;

    async fn pre_create(
        &self,
        _pod_name: &str,
        _namespace: &str,
        _targets: &[String],
        _role: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn post_create(
        &self,
        _pod_name: &str,
        _namespace: &str,
        _targets: &[String],
        _role: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn pre_destroy(
        &self,
        _pod_name: &str,
        _namespace: &str,
        _targets: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn post_destroy(
        &self,
        _pod_name: &str,
        _namespace: &str,
        _targets: &[String],
    ) -> Result<()> {
        Ok(())
    }
}
