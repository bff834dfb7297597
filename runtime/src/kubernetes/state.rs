use super::{delete_if_present, KubeRuntime};
use crate::error::{self, Result};
use crate::http_status_code::AllowNotFound;
use crate::StateStore;
use async_trait::async_trait;
use bundle_model::constants::{STATE_FIELDS_KEY, STATE_NAME_SUFFIX};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use log::debug;
use snafu::ResultExt;

#[async_trait]
impl StateStore for KubeRuntime {
    fn master_name(&self, instance_id: &str) -> String {
        format!("{}{}", instance_id, STATE_NAME_SUFFIX)
    }

    fn master_namespace(&self) -> String {
        self.config.state_namespace.clone()
    }

    fn mount_location(&self) -> String {
        self.config.state_mount_location.clone()
    }

    async fn state_is_present(&self, name: &str) -> Result<bool> {
        let state = self
            .namespaced_api::<ConfigMap>(&self.config.state_namespace)
            .get(name)
            .await
            .allow_not_found()
            .context(error::StateSnafu {
                action: "get",
                name,
            })?;
        Ok(state.is_some())
    }

    async fn copy_state(
        &self,
        from_name: &str,
        to_name: &str,
        from_namespace: &str,
        to_namespace: &str,
    ) -> Result<()> {
        if from_name == to_name && from_namespace == to_namespace {
            return Ok(());
        }
        let source = self
            .namespaced_api::<ConfigMap>(from_namespace)
            .get(from_name)
            .await
            .allow_not_found()
            .context(error::StateSnafu {
                action: "read",
                name: format!("{}/{}", from_namespace, from_name),
            })?;
        let source = match source {
            Some(some) => some,
            None => {
                debug!(
                    "No state '{}/{}' to copy, nothing to do",
                    from_namespace, from_name
                );
                return Ok(());
            }
        };
        let fields = source
            .data
            .unwrap_or_default()
            .remove(STATE_FIELDS_KEY)
            .unwrap_or_default();
        let copy = ConfigMap {
            metadata: ObjectMeta {
                name: Some(to_name.to_string()),
                namespace: Some(to_namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some([(STATE_FIELDS_KEY.to_string(), fields)].into()),
            ..ConfigMap::default()
        };
        self.create_or_update(
            &self.namespaced_api::<ConfigMap>(to_namespace),
            &copy,
            "state",
        )
        .await?;
        debug!(
            "Copied state '{}/{}' to '{}/{}'",
            from_namespace, from_name, to_namespace, to_name
        );
        Ok(())
    }

    async fn delete_state(&self, name: &str) -> Result<()> {
        delete_if_present(
            &self.namespaced_api::<ConfigMap>(&self.config.state_namespace),
            name,
            "state",
        )
        .await
    }
}
