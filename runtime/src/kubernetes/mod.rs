mod credentials;
mod sandbox;
mod state;
mod watch;

use crate::error::{self, Result};
use crate::http_status_code::{AllowNotFound, HttpStatusCode, StatusCode};
use crate::pod::bundle_pod;
use crate::{ExecutionContext, Runtime, RuntimeConfig, StateStore, UpdateFn};
use async_trait::async_trait;
use bundle_model::constants::LABEL_SANDBOX_POD;
use bundle_model::Platform;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Only OpenShift serves this path.
const OPENSHIFT_VERSION_PATH: &str = "/version/openshift";

/// A [`Runtime`] backed by a Kubernetes or OpenShift API server.
#[derive(Clone)]
pub struct KubeRuntime {
    client: Client,
    config: RuntimeConfig,
    platform: Platform,
}

impl KubeRuntime {
    /// Retry attempts for creating or updating an object.
    const MAX_RETRIES: i32 = 3;
    /// Timeout for object creation/update retries.
    const BACKOFF_MS: u64 = 500;

    /// Creates a runtime, asking the API server whether it is OpenShift.
    pub async fn new(client: Client, config: RuntimeConfig) -> Result<Self> {
        let platform = detect_platform(&client).await?;
        info!("Detected a {} cluster", platform);
        Ok(Self::with_platform(client, config, platform))
    }

    /// Creates a runtime for a cluster known to be `platform`.
    pub fn with_platform(client: Client, config: RuntimeConfig, platform: Platform) -> Self {
        Self {
            client,
            config,
            platform,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn api<T>(&self) -> Api<T>
    where
        T: Resource,
        <T as Resource>::DynamicType: Default,
    {
        Api::<T>::all(self.client.clone())
    }

    fn namespaced_api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        Api::<T>::namespaced(self.client.clone(), namespace)
    }

    /// Create or update an existing k8s object
    async fn create_or_update<T>(&self, api: &Api<T>, data: &T, what: &str) -> Result<T>
    where
        T: Resource + Clone + DeserializeOwned + Serialize + Debug,
        <T as Resource>::DynamicType: Default,
    {
        let mut error = None;

        for _ in 0..Self::MAX_RETRIES {
            match create_or_update_internal(api, data).await {
                Ok(object) => return Ok(object),
                Err(e) => {
                    debug!("Unable to create or update {}, retrying: {}", what, e);
                    error = Some(e)
                }
            }
            tokio::time::sleep(Duration::from_millis(Self::BACKOFF_MS)).await;
        }
        match error {
            None => create_or_update_internal(api, data).await,
            Some(e) => Err(e),
        }
        .context(error::KubeSnafu {
            action: format!("create or update {}", what),
        })
    }
}

async fn create_or_update_internal<T>(api: &Api<T>, data: &T) -> kube::Result<T>
where
    T: Resource + Clone + DeserializeOwned + Serialize + Debug,
    <T as Resource>::DynamicType: Default,
{
    let name = data.name_any();
    // If the object already exists, update it with the new one using a `Patch`. If not create a
    // new one.
    match api.get(&name).await.allow_not_found()? {
        Some(_) => {
            api.patch(&name, &PatchParams::default(), &Patch::Merge(data))
                .await
        }
        None => api.create(&PostParams::default(), data).await,
    }
}

/// Deletes `name`, treating an object that is already gone as success.
async fn delete_if_present<T>(api: &Api<T>, name: &str, what: &str) -> Result<()>
where
    T: Resource + Clone + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let deleted = api
        .delete(name, &DeleteParams::default())
        .await
        .allow_not_found()
        .context(error::KubeSnafu {
            action: format!("delete {} '{}'", what, name),
        })?;
    if deleted.is_none() {
        debug!("We tried to delete {} '{}' but it did not exist", what, name);
    }
    Ok(())
}

async fn detect_platform(client: &Client) -> Result<Platform> {
    let request = http::Request::get(OPENSHIFT_VERSION_PATH)
        .body(Vec::new())
        .context(error::HttpRequestSnafu {
            uri: OPENSHIFT_VERSION_PATH,
        })?;
    match client.request_text(request).await {
        Ok(_) => Ok(Platform::Openshift),
        Err(e) => match e.status_code().and_then(platform_for_status) {
            Some(platform) => Ok(platform),
            None => Err(e).context(error::PlatformSnafu),
        },
    }
}

/// Interprets the status of a request for the OpenShift version. OpenShift answers it; a plain
/// Kubernetes API server does not know the path or refuses it.
fn platform_for_status(status: StatusCode) -> Option<Platform> {
    if status.is_success() {
        Some(Platform::Openshift)
    } else if [
        StatusCode::NOT_FOUND,
        StatusCode::UNAUTHORIZED,
        StatusCode::FORBIDDEN,
    ]
    .contains(&status)
    {
        Some(Platform::Kubernetes)
    } else {
        None
    }
}

#[async_trait]
impl Runtime for KubeRuntime {
    async fn create_sandbox(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        role: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        self.create_sandbox_objects(pod_name, namespace, targets, role, metadata)
            .await
    }

    async fn destroy_sandbox(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        secrets: &[String],
        config_namespace: &str,
        keep_namespace: bool,
        keep_namespace_on_error: bool,
    ) -> Result<()> {
        self.destroy_sandbox_objects(
            pod_name,
            namespace,
            targets,
            secrets,
            config_namespace,
            keep_namespace,
            keep_namespace_on_error,
        )
        .await
    }

    async fn run_bundle(&self, context: ExecutionContext) -> Result<ExecutionContext> {
        if context.state_present {
            self.copy_state(
                &context.state_name,
                &context.state_name,
                &context.state_location,
                &context.location,
            )
            .await?;
        }
        let pod = bundle_pod(&context, &self.config.state_mount_location);
        self.namespaced_api::<Pod>(&context.location)
            .create(&PostParams::default(), &pod)
            .await
            .context(error::KubeSnafu {
                action: format!("create pod '{}'", context.pod_name),
            })?;
        info!(
            "Started {} of '{}' in pod '{}/{}'",
            context.action, context.image, context.location, context.pod_name
        );
        Ok(context)
    }

    async fn watch_running_bundle(
        &self,
        pod_name: &str,
        namespace: &str,
        update: UpdateFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        watch::watch_pod(
            self.namespaced_api(namespace),
            pod_name,
            self.config.watch_interval,
            self.config.watch_retries,
            update,
            cancel,
        )
        .await
    }

    async fn extract_credentials(
        &self,
        pod_name: &str,
        namespace: &str,
        runtime_version: u32,
    ) -> Result<Vec<u8>> {
        if runtime_version >= 2 {
            credentials::read_credentials_secret(&self.namespaced_api(namespace), pod_name).await
        } else {
            credentials::exec_bind_credentials(&self.namespaced_api(namespace), pod_name).await
        }
    }

    async fn copy_secrets_to_namespace(
        &self,
        context: &ExecutionContext,
        cluster_namespace: &str,
        secrets: &[String],
    ) -> Result<()> {
        let from = self.namespaced_api::<Secret>(cluster_namespace);
        let to = self.namespaced_api::<Secret>(&context.location);
        // Teardown only removes copies carrying the pod label.
        let mut labels = context.metadata.clone();
        labels.insert(LABEL_SANDBOX_POD.to_string(), context.pod_name.clone());
        for name in secrets {
            let secret = from.get(name).await.context(error::KubeSnafu {
                action: format!("get secret '{}/{}'", cluster_namespace, name),
            })?;
            let copy = Secret {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(context.location.clone()),
                    labels: Some(labels.clone()),
                    ..ObjectMeta::default()
                },
                data: secret.data,
                string_data: secret.string_data,
                type_: secret.type_,
                ..Secret::default()
            };
            match to.create(&PostParams::default(), &copy).await {
                Err(e) if e.is_status_code(StatusCode::CONFLICT) => {
                    debug!(
                        "Secret '{}' already exists in '{}'",
                        name, context.location
                    );
                }
                result => {
                    result.context(error::KubeSnafu {
                        action: format!("copy secret '{}' to '{}'", name, context.location),
                    })?;
                }
            }
        }
        Ok(())
    }

    fn get_runtime(&self) -> Platform {
        self.platform
    }
}
