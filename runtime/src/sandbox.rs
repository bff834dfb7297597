use bundle_model::constants::LABEL_SANDBOX_POD;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Kubernetes sets this label on every namespace (1.21+).
const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

/// The objects that make up the sandbox of one bundle pod, worked out before anything is sent to
/// the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPlan {
    pod_name: String,
    namespace: String,
    targets: Vec<String>,
    role: String,
    metadata: BTreeMap<String, String>,
}

impl SandboxPlan {
    pub fn new(
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        role: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            pod_name: pod_name.to_string(),
            namespace: namespace.to_string(),
            targets: targets.to_vec(),
            role: role.to_string(),
            metadata: metadata.clone(),
        }
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    /// The namespace that was asked for; a generated namespace only uses it as a prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// The requested namespace is used as is when it is one of the targets.
    pub fn reuses_namespace(&self) -> bool {
        self.targets.contains(&self.namespace)
    }

    /// The namespace to create, or `None` if the requested namespace is reused. The name is
    /// generated by the API server using the requested namespace as its prefix.
    pub fn namespace_to_create(&self) -> Option<Namespace> {
        if self.reuses_namespace() {
            return None;
        }
        Some(Namespace {
            metadata: ObjectMeta {
                generate_name: Some(self.namespace.clone()),
                labels: Some(self.labels()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// Targets that need a network policy keeping the sandbox namespace out. When the pod runs in
    /// one of its targets nothing is isolated.
    pub fn isolated_targets(&self) -> Vec<String> {
        if self.reuses_namespace() {
            return Vec::new();
        }
        self.targets
            .iter()
            .filter(|target| **target != self.namespace)
            .cloned()
            .collect()
    }

    /// The namespaces the service account is bound to `role` in: every target and the namespace
    /// the pod runs in.
    pub fn binding_namespaces(&self, location: &str) -> Vec<String> {
        let mut namespaces = self.targets.clone();
        if !namespaces.iter().any(|target| target == location) {
            namespaces.push(location.to_string());
        }
        namespaces
    }

    pub fn service_account_name(&self) -> &str {
        &self.pod_name
    }

    pub fn service_account(&self, location: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(self.service_account_name(), location),
            ..Default::default()
        }
    }

    pub fn role_binding(&self, location: &str, target: &str) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(&self.pod_name, target),
            role_ref: RoleRef {
                kind: "ClusterRole".to_string(),
                name: self.role.clone(),
                api_group: "rbac.authorization.k8s.io".to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.service_account_name().to_string(),
                namespace: Some(location.to_string()),
                ..Default::default()
            }]),
        }
    }

    /// Selects every pod in `target` and admits ingress from any namespace except `location`.
    pub fn network_policy(&self, location: &str, target: &str) -> NetworkPolicy {
        NetworkPolicy {
            metadata: self.metadata(&self.pod_name, target),
            spec: Some(NetworkPolicySpec {
                pod_selector: LabelSelector::default(),
                ingress: Some(vec![NetworkPolicyIngressRule {
                    from: Some(vec![NetworkPolicyPeer {
                        namespace_selector: Some(LabelSelector {
                            match_expressions: Some(vec![LabelSelectorRequirement {
                                key: NAMESPACE_NAME_LABEL.to_string(),
                                operator: "NotIn".to_string(),
                                values: Some(vec![location.to_string()]),
                            }]),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }]),
                policy_types: Some(vec!["Ingress".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.metadata.clone();
        labels.insert(LABEL_SANDBOX_POD.to_string(), self.pod_name.clone());
        labels
    }

    fn metadata(&self, name: &str, namespace: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn namespace_in_targets() {
        let plan = SandboxPlan::new(
            "pod-name",
            "foo-ns",
            &targets(&["foo-ns"]),
            "edit",
            &BTreeMap::new(),
        );
        assert!(plan.reuses_namespace());
        assert!(plan.namespace_to_create().is_none());
        assert!(plan.isolated_targets().is_empty());
        assert_eq!(plan.binding_namespaces("foo-ns"), targets(&["foo-ns"]));
    }

    #[test]
    fn namespace_not_in_targets() {
        let plan = SandboxPlan::new(
            "pod-name",
            "bar-ns",
            &targets(&["satoshi-ns", "nakamoto-ns"]),
            "edit",
            &BTreeMap::new(),
        );
        assert!(!plan.reuses_namespace());
        let namespace = plan.namespace_to_create().unwrap();
        assert_eq!(namespace.metadata.generate_name.as_deref(), Some("bar-ns"));
        assert!(namespace.metadata.name.is_none());
        assert_eq!(
            plan.isolated_targets(),
            targets(&["satoshi-ns", "nakamoto-ns"])
        );
        assert_eq!(
            plan.binding_namespaces("bar-nsx7k2q"),
            targets(&["satoshi-ns", "nakamoto-ns", "bar-nsx7k2q"])
        );
    }

    #[test]
    fn exec_namespace_differs_from_single_target() {
        let plan = SandboxPlan::new(
            "pod",
            "exec-ns",
            &targets(&["target-ns"]),
            "edit",
            &BTreeMap::new(),
        );
        assert_eq!(plan.isolated_targets(), targets(&["target-ns"]));
    }

    #[test]
    fn network_policy_keeps_sandbox_out() {
        let plan = SandboxPlan::new(
            "pod",
            "exec-ns",
            &targets(&["target-ns"]),
            "edit",
            &BTreeMap::new(),
        );
        let policy = plan.network_policy("exec-ns-abcde", "target-ns");
        assert_eq!(policy.metadata.namespace.as_deref(), Some("target-ns"));
        let spec = policy.spec.unwrap();
        assert_eq!(spec.pod_selector, LabelSelector::default());
        assert_eq!(spec.policy_types, Some(vec!["Ingress".to_string()]));
        let ingress = spec.ingress.unwrap();
        let peer = &ingress[0].from.as_ref().unwrap()[0];
        let requirement = &peer
            .namespace_selector
            .as_ref()
            .unwrap()
            .match_expressions
            .as_ref()
            .unwrap()[0];
        assert_eq!(requirement.key, NAMESPACE_NAME_LABEL);
        assert_eq!(requirement.operator, "NotIn");
        assert_eq!(requirement.values, Some(vec!["exec-ns-abcde".to_string()]));
    }

    #[test]
    fn role_binding_grants_role_to_pod_account() {
        let metadata = btreemap! { "bundle-action".to_string() => "bind".to_string() };
        let plan = SandboxPlan::new("pod", "exec-ns", &targets(&["target-ns"]), "admin", &metadata);
        let binding = plan.role_binding("exec-ns-abcde", "target-ns");
        assert_eq!(binding.metadata.namespace.as_deref(), Some("target-ns"));
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        assert_eq!(binding.role_ref.name, "admin");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.name, "pod");
        assert_eq!(subject.namespace.as_deref(), Some("exec-ns-abcde"));

        let labels = binding.metadata.labels.unwrap();
        assert_eq!(labels.get("bundle-action").map(String::as_str), Some("bind"));
        assert_eq!(labels.get(LABEL_SANDBOX_POD).map(String::as_str), Some("pod"));
    }
}
