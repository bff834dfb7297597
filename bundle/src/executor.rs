use crate::error::{self, ExecutorError, Result};
use crate::{naming, ExecutorConfig, SecretsCache, StatusMessage, StatusStream};
use bundle_model::constants::{
    CLUSTER_KEY, NAMESPACE_KEY, SERVICE_BINDING_ID_KEY, SERVICE_INSTANCE_ID_KEY,
};
use bundle_model::{Action, ExtractedCredentials, Parameters, ServiceInstance};
use bundle_runtime::{ExecutionContext, Runtime};
use futures::channel::mpsc::{self, Sender};
use futures::SinkExt;
use log::{debug, error, info, warn};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// What the executor remembers about its most recent run.
#[derive(Debug, Default)]
struct RunState {
    pod_name: String,
    dashboard_url: Option<String>,
    description: String,
    extracted_credentials: Option<ExtractedCredentials>,
    last_status: StatusMessage,
}

/// Runs bundle actions against a [`Runtime`].
///
/// Each action is started with one of [`provision`](Self::provision), [`update`](Self::update),
/// [`deprovision`](Self::deprovision), [`bind`](Self::bind) or [`unbind`](Self::unbind), which
/// return immediately with a [`StatusStream`]. The action runs on the Tokio runtime the method is
/// called from. Once the stream has ended, the accessors describe the finished run.
///
/// An executor is meant for one action. Starting another resets what the accessors return, and
/// running two at once leaves the accessors describing whichever wrote last.
#[derive(Clone)]
pub struct Executor {
    runtime: Arc<dyn Runtime>,
    config: ExecutorConfig,
    secrets: Option<Arc<SecretsCache>>,
    state: Arc<Mutex<RunState>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("secrets", &self.secrets)
            .field("state", &self.state)
            .finish()
    }
}

impl Executor {
    pub fn new(runtime: Arc<dyn Runtime>, config: ExecutorConfig) -> Self {
        Self {
            runtime,
            config,
            secrets: None,
            state: Arc::default(),
        }
    }

    /// Bundle pods get the secrets `secrets` associates with their bundle.
    pub fn with_secrets(mut self, secrets: Arc<SecretsCache>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The name of the bundle pod of the last run, empty if no run has started.
    pub fn pod_name(&self) -> String {
        lock(&self.state).pod_name.clone()
    }

    /// The dashboard URL the bundle reported, if any.
    pub fn dashboard_url(&self) -> Option<String> {
        lock(&self.state).dashboard_url.clone()
    }

    /// The credentials of the last run. Only set once they have been extracted and stored.
    pub fn extracted_credentials(&self) -> Option<ExtractedCredentials> {
        lock(&self.state).extracted_credentials.clone()
    }

    pub fn last_status(&self) -> StatusMessage {
        lock(&self.state).last_status.clone()
    }

    pub fn provision(&self, instance: &ServiceInstance, parameters: Parameters) -> StatusStream {
        let id = instance.id.to_string();
        self.start(Action::Provision, instance, parameters, &id)
    }

    pub fn update(&self, instance: &ServiceInstance, parameters: Parameters) -> StatusStream {
        let id = instance.id.to_string();
        self.start(Action::Update, instance, parameters, &id)
    }

    pub fn deprovision(&self, instance: &ServiceInstance, parameters: Parameters) -> StatusStream {
        let id = instance.id.to_string();
        self.start(Action::Deprovision, instance, parameters, &id)
    }

    /// Binds `instance`. On success the credentials are stored under `binding_id`.
    pub fn bind(
        &self,
        instance: &ServiceInstance,
        parameters: Parameters,
        binding_id: &str,
    ) -> StatusStream {
        self.start(Action::Bind, instance, parameters, binding_id)
    }

    /// Unbinds `instance`, removing the credentials stored under `binding_id`.
    pub fn unbind(
        &self,
        instance: &ServiceInstance,
        parameters: Parameters,
        binding_id: &str,
    ) -> StatusStream {
        self.start(Action::Unbind, instance, parameters, binding_id)
    }

    fn start(
        &self,
        action: Action,
        instance: &ServiceInstance,
        parameters: Parameters,
        action_id: &str,
    ) -> StatusStream {
        *lock(&self.state) = RunState::default();
        // Room for both messages, so the run never waits on a slow reader.
        let (sender, receiver) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let run = Run {
            runtime: Arc::clone(&self.runtime),
            config: self.config.clone(),
            secrets: self.secrets.clone(),
            state: Arc::clone(&self.state),
            action,
            instance: instance.clone(),
            parameters,
            action_id: action_id.to_string(),
            cancel: cancel.clone(),
        };
        tokio::spawn(run.execute(sender));
        StatusStream::new(receiver, cancel)
    }
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One action, from sandbox creation to teardown.
struct Run {
    runtime: Arc<dyn Runtime>,
    config: ExecutorConfig,
    secrets: Option<Arc<SecretsCache>>,
    state: Arc<Mutex<RunState>>,
    action: Action,
    instance: ServiceInstance,
    parameters: Parameters,
    action_id: String,
    cancel: CancellationToken,
}

impl Run {
    async fn execute(self, mut sender: Sender<StatusMessage>) {
        let fq_name = &self.instance.spec.fq_name;
        info!("Starting {} of '{}' ({})", self.action, fq_name, self.action_id);
        self.send(
            &mut sender,
            StatusMessage::in_progress(format!("{} started", self.action)),
        )
        .await;

        let terminal = match self.sandboxed().await {
            Ok(()) => {
                info!("Finished {} of '{}' ({})", self.action, fq_name, self.action_id);
                let description = lock(&self.state).description.clone();
                if description.is_empty() {
                    StatusMessage::succeeded(format!("{} finished", self.action))
                } else {
                    StatusMessage::succeeded(description)
                }
            }
            Err(e) => {
                error!(
                    "The {} of '{}' ({}) failed: {}",
                    self.action, fq_name, self.action_id, e
                );
                StatusMessage::failed(e.to_string(), e)
            }
        };
        self.send(&mut sender, terminal).await;
        sender.close_channel();
    }

    async fn send(&self, sender: &mut Sender<StatusMessage>, message: StatusMessage) {
        lock(&self.state).last_status = message.clone();
        if let Err(e) = sender.send(message).await {
            warn!(
                "Unable to report the status of {} '{}', nobody is listening: {}",
                self.action, self.action_id, e
            );
        }
    }

    fn ensure_running(&self) -> Result<()> {
        ensure!(
            !self.cancel.is_cancelled(),
            error::CancelledSnafu {
                action: self.action
            }
        );
        Ok(())
    }

    /// Creates the sandbox, does the work in it and tears it down again. Nothing is torn down if
    /// the sandbox could not be created.
    async fn sandboxed(&self) -> Result<()> {
        self.ensure_running()?;
        let pod_name = naming::pod_name();
        lock(&self.state).pod_name = pod_name.clone();

        let target = self.instance.context.namespace.clone();
        let namespace = if self.config.skip_create_ns {
            target.clone()
        } else {
            naming::sandbox_namespace_prefix(&self.instance.spec.fq_name, self.action)
        };
        let targets = vec![target];
        let metadata = naming::sandbox_labels(&self.instance.spec.fq_name, self.action);

        debug!("Creating sandbox for pod '{}'", pod_name);
        let (service_account, location) = self
            .runtime
            .create_sandbox(
                &pod_name,
                &namespace,
                &targets,
                &self.config.sandbox_role,
                &metadata,
            )
            .await
            .context(error::CreateSandboxSnafu {
                action: self.action,
            })?;

        let secrets = self
            .secrets
            .as_ref()
            .map(|cache| cache.get_secrets(&self.instance.spec))
            .unwrap_or_default();
        let result = self
            .in_sandbox(ExecutionContext {
                pod_name: pod_name.clone(),
                location: location.clone(),
                targets: targets.clone(),
                secrets: secrets.clone(),
                service_account,
                image: self.instance.spec.image.clone(),
                action: self.action,
                image_pull_policy: self.config.image_pull_policy.clone(),
                extra_vars: String::new(),
                proxy: self.config.proxy.clone(),
                state_name: String::new(),
                state_location: String::new(),
                state_present: false,
                metadata,
            })
            .await;

        debug!("Destroying sandbox of pod '{}' in '{}'", pod_name, location);
        if let Err(e) = self
            .runtime
            .destroy_sandbox(
                &pod_name,
                &location,
                &targets,
                &secrets,
                &self.config.namespace,
                self.config.keep_namespace,
                self.config.keep_namespace_on_error,
            )
            .await
        {
            warn!("Unable to destroy sandbox of pod '{}': {}", pod_name, e);
        }
        result
    }

    async fn in_sandbox(&self, mut context: ExecutionContext) -> Result<()> {
        self.ensure_running()?;
        self.runtime
            .copy_secrets_to_namespace(&context, &self.config.namespace, &context.secrets)
            .await
            .context(error::CopySecretsSnafu {
                action: self.action,
            })?;

        context.state_name = self.runtime.master_name(&self.instance.id.to_string());
        context.state_location = self.runtime.master_namespace();
        context.state_present = self
            .runtime
            .state_is_present(&context.state_name)
            .await
            .context(error::StateCheckSnafu {
                name: &context.state_name,
            })?;
        debug!(
            "State '{}' of instance '{}' present: {}",
            context.state_name, self.instance.id, context.state_present
        );
        context.extra_vars = self.extra_vars()?;

        self.ensure_running()?;
        let context = self
            .runtime
            .run_bundle(context)
            .await
            .context(error::RunBundleSnafu)?;

        debug!("Watching pod '{}/{}'", context.location, context.pod_name);
        let state = &self.state;
        let update = |description: &str, dashboard_url: &str| {
            let mut state = lock(state);
            if !description.is_empty() {
                debug!("Pod '{}': {}", state.pod_name, description);
                state.description = description.to_string();
            }
            if !dashboard_url.is_empty() {
                state.dashboard_url = Some(dashboard_url.to_string());
            }
        };
        self.runtime
            .watch_running_bundle(&context.pod_name, &context.location, &update, &self.cancel)
            .await
            .map_err(|source| {
                if self.cancel.is_cancelled() {
                    ExecutorError::Cancelled {
                        action: self.action,
                    }
                } else {
                    ExecutorError::WatchBundle { source }
                }
            })?;

        self.sync_state(&context).await?;
        self.handle_credentials(&context).await
    }

    /// The parameters handed to the bundle, with the keys the broker always provides.
    fn extra_vars(&self) -> Result<String> {
        let mut parameters = self.parameters.clone();
        parameters.ensure_defaults();
        parameters.insert(NAMESPACE_KEY, self.instance.context.namespace.clone());
        parameters.insert(CLUSTER_KEY, self.runtime.get_runtime().to_string());
        parameters.insert(SERVICE_INSTANCE_ID_KEY, self.instance.id.to_string());
        if self.action.is_binding_scoped() {
            parameters.insert(SERVICE_BINDING_ID_KEY, self.action_id.clone());
        }
        parameters.to_json().context(error::ExtraVarsSnafu)
    }

    async fn sync_state(&self, context: &ExecutionContext) -> Result<()> {
        if self.action == Action::Deprovision {
            debug!("Deleting state '{}'", context.state_name);
            self.runtime
                .delete_state(&context.state_name)
                .await
                .context(error::DeleteStateSnafu {
                    name: &context.state_name,
                })
        } else {
            debug!(
                "Saving state '{}' from '{}' to '{}'",
                context.state_name, context.location, context.state_location
            );
            self.runtime
                .copy_state(
                    &context.state_name,
                    &context.state_name,
                    &context.location,
                    &context.state_location,
                )
                .await
                .context(error::CopyStateSnafu {
                    name: &context.state_name,
                    namespace: &context.state_location,
                })
        }
    }

    async fn handle_credentials(&self, context: &ExecutionContext) -> Result<()> {
        let bindable = self.instance.spec.bindable;
        let instance_id = self.instance.id.to_string();
        match self.action {
            Action::Bind => self.store_credentials(context, &self.action_id, true).await,
            Action::Provision if bindable => {
                self.store_credentials(context, &instance_id, true).await
            }
            Action::Update if bindable => {
                self.store_credentials(context, &instance_id, false).await
            }
            Action::Unbind => {
                self.delete_credentials(&self.action_id).await;
                Ok(())
            }
            Action::Deprovision if bindable => {
                self.delete_credentials(&instance_id).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Reads the credentials the bundle wrote and stores them under `id`. They are only made
    /// visible to the caller once they are stored.
    async fn store_credentials(
        &self,
        context: &ExecutionContext,
        id: &str,
        create: bool,
    ) -> Result<()> {
        let payload = self
            .runtime
            .extract_credentials(
                &context.pod_name,
                &context.location,
                self.instance.spec.runtime,
            )
            .await
            .context(error::ExtractCredentialsSnafu {
                pod: &context.pod_name,
            })?;
        let credentials = ExtractedCredentials::from_payload(&payload)
            .context(error::MalformedCredentialsSnafu)?;

        let labels: BTreeMap<String, String> =
            naming::credential_labels(&self.instance.spec.fq_name, self.action);
        let stored = if create {
            self.runtime
                .create_extracted_credential(
                    id,
                    &self.config.namespace,
                    &credentials.credentials,
                    &labels,
                )
                .await
        } else {
            self.runtime
                .update_extracted_credential(
                    id,
                    &self.config.namespace,
                    &credentials.credentials,
                    &labels,
                )
                .await
        };
        stored.context(error::StoreCredentialsSnafu { id })?;
        debug!("Stored credentials '{}'", id);
        lock(&self.state).extracted_credentials = Some(credentials);
        Ok(())
    }

    /// A credential record left behind is preferable to failing the action.
    async fn delete_credentials(&self, id: &str) {
        match self
            .runtime
            .delete_extracted_credential(id, &self.config.namespace)
            .await
        {
            Ok(()) => debug!("Deleted credentials '{}'", id),
            Err(e) => warn!("Unable to delete credentials '{}': {}", id, e),
        }
    }
}
