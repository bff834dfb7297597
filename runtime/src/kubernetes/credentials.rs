use super::KubeRuntime;
use crate::error::{self, Result};
use crate::http_status_code::AllowNotFound;
use crate::ExtractedCredentialStore;
use async_trait::async_trait;
use bundle_model::constants::{BIND_CREDENTIALS_COMMAND, CREDENTIALS_KEY, STATE_FIELDS_KEY};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::ByteString;
use kube::api::{AttachParams, ObjectMeta};
use kube::Api;
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;

/// Runtime version 2 bundles write their credentials to a secret named after their pod.
pub(super) async fn read_credentials_secret(api: &Api<Secret>, pod_name: &str) -> Result<Vec<u8>> {
    let secret = api.get(pod_name).await.context(error::KubeSnafu {
        action: format!("get credentials secret '{}'", pod_name),
    })?;
    let ByteString(payload) = secret
        .data
        .unwrap_or_default()
        .remove(STATE_FIELDS_KEY)
        .context(error::MissingDataSnafu {
            what: format!("Credentials secret '{}'", pod_name),
            key: STATE_FIELDS_KEY,
        })?;
    Ok(payload)
}

/// Older bundles print their credentials when asked with a command.
pub(super) async fn exec_bind_credentials(api: &Api<Pod>, pod_name: &str) -> Result<Vec<u8>> {
    let mut process = api
        .exec(
            pod_name,
            vec![BIND_CREDENTIALS_COMMAND],
            &AttachParams::default().stderr(false),
        )
        .await
        .context(error::KubeSnafu {
            action: format!("run '{}' in pod '{}'", BIND_CREDENTIALS_COMMAND, pod_name),
        })?;
    let mut stdout = tokio_util::io::ReaderStream::new(process.stdout().context(
        error::MissingDataSnafu {
            what: format!("Exec of '{}'", BIND_CREDENTIALS_COMMAND),
            key: "stdout",
        },
    )?);
    let mut payload = Vec::new();
    while let Some(data) = stdout.next().await {
        payload.extend_from_slice(&data.context(error::IoSnafu {
            what: BIND_CREDENTIALS_COMMAND,
        })?);
    }
    Ok(payload)
}

impl KubeRuntime {
    fn credential_secret(
        id: &str,
        namespace: &str,
        credentials: &Map<String, Value>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Secret> {
        let payload = serde_json::to_vec(credentials).context(error::CredentialSerdeSnafu {
            action: "serialize",
            id,
        })?;
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(id.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            data: Some([(CREDENTIALS_KEY.to_string(), ByteString(payload))].into()),
            ..Secret::default()
        })
    }
}

#[async_trait]
impl ExtractedCredentialStore for KubeRuntime {
    async fn create_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
        credentials: &Map<String, Value>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let secret = Self::credential_secret(id, namespace, credentials, labels)?;
        self.create_or_update(
            &self.namespaced_api::<Secret>(namespace),
            &secret,
            "extracted credential",
        )
        .await?;
        Ok(())
    }

    async fn update_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
        credentials: &Map<String, Value>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.create_extracted_credential(id, namespace, credentials, labels)
            .await
    }

    async fn get_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
    ) -> Result<Option<Map<String, Value>>> {
        let secret = self
            .namespaced_api::<Secret>(namespace)
            .get(id)
            .await
            .allow_not_found()
            .context(error::KubeSnafu {
                action: format!("get extracted credential '{}'", id),
            })?;
        let secret = match secret {
            None => return Ok(None),
            Some(some) => some,
        };
        let ByteString(payload) = secret
            .data
            .unwrap_or_default()
            .remove(CREDENTIALS_KEY)
            .context(error::MissingDataSnafu {
                what: format!("Extracted credential '{}'", id),
                key: CREDENTIALS_KEY,
            })?;
        let credentials =
            serde_json::from_slice(&payload).context(error::CredentialSerdeSnafu {
                action: "deserialize",
                id,
            })?;
        Ok(Some(credentials))
    }

    async fn delete_extracted_credential(&self, id: &str, namespace: &str) -> Result<()> {
        super::delete_if_present(
            &self.namespaced_api::<Secret>(namespace),
            id,
            "extracted credential",
        )
        .await
    }
}
