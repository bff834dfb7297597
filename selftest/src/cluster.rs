use crate::test_settings::TestSettings;
use anyhow::{format_err, Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::convert::TryInto;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const KUBECONFIG_FILENAME: &str = "kubeconfig.yaml";

/// A `kind` cluster that bundle runtime tests run against. The cluster is deleted when this is
/// dropped unless `BUNDLE_SELFTEST_KEEP_CLUSTER` is set.
#[derive(Debug)]
pub struct Cluster {
    name: String,
    kubeconfig_dir: TempDir,
}

impl Cluster {
    /// Creates kind cluster `cluster_name`, replacing any existing cluster of that name.
    pub fn new(cluster_name: &str) -> Result<Cluster> {
        let cluster = Self {
            name: cluster_name.into(),
            kubeconfig_dir: TempDir::new()?,
        };
        kind(&["delete", "cluster", "--name", cluster_name])?;
        let kubeconfig = cluster.kubeconfig();
        let kubeconfig = kubeconfig
            .to_str()
            .ok_or_else(|| format_err!("non utf-8 path '{}'", kubeconfig.to_string_lossy()))?;
        kind(&[
            "--kubeconfig",
            kubeconfig,
            "create",
            "cluster",
            "--name",
            cluster_name,
        ])?;
        Ok(cluster)
    }

    pub fn kubeconfig(&self) -> PathBuf {
        self.kubeconfig_dir.path().join(KUBECONFIG_FILENAME)
    }

    pub async fn k8s_client(&self) -> Result<Client> {
        let kubeconfig = Kubeconfig::read_from(self.kubeconfig())?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        Ok(config.try_into()?)
    }

    /// Creates the namespaces a test needs as bundle targets or as the broker namespace.
    pub async fn create_namespaces(&self, names: &[&str]) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.k8s_client().await?);
        for name in names {
            let namespace = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..ObjectMeta::default()
                },
                ..Namespace::default()
            };
            api.create(&PostParams::default(), &namespace)
                .await
                .with_context(|| format!("unable to create namespace '{}'", name))?;
        }
        Ok(())
    }

    /// Polls until namespace `name` is gone. Deleting a namespace returns before its contents are
    /// removed.
    pub async fn wait_for_namespace_deletion(&self, name: &str, timeout: Duration) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.k8s_client().await?);
        let start = Instant::now();
        while api.get_opt(name).await?.is_some() {
            if start.elapsed() > timeout {
                return Err(format_err!(
                    "namespace '{}' still exists after {:?}",
                    name,
                    timeout
                ));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(())
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if TestSettings::keep_cluster() {
            eprintln!(
                "keeping kind cluster '{}', use 'kind get kubeconfig --name {}' to reach it",
                self.name, self.name
            );
            return;
        }
        if let Err(e) = kind(&["delete", "cluster", "--name", &self.name]) {
            eprintln!("unable to delete kind cluster '{}': {}", self.name, e)
        }
    }
}

fn kind(args: &[&str]) -> Result<()> {
    let output = Command::new(TestSettings::kind_path())
        .args(args)
        .output()
        .context("unable to run kind")?;
    if !output.status.success() {
        return Err(format_err!(
            "'kind {}' failed with exit status '{}'\n\n{}\n\n{}",
            args.join(" "),
            output.status.code().unwrap_or(1),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(())
}
