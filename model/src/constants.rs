/// Helper macro for the implicit parameter keys the broker injects into a bundle's extra vars.
/// Every implicit key carries the `_apb_` prefix so that it cannot collide with a user parameter.
macro_rules! apb {
    ($s:literal) => {
        concat!("_apb_", $s)
    };
}

// Implicit parameter keys
pub const PROVISION_CREDENTIALS_KEY: &str = apb!("provision_creds");
pub const SERVICE_INSTANCE_ID_KEY: &str = apb!("service_instance_id");
pub const SERVICE_BINDING_ID_KEY: &str = apb!("service_binding_id");
pub const NAMESPACE_KEY: &str = "namespace";
pub const CLUSTER_KEY: &str = "cluster";

/// Keys that are stripped before parameters are shown to a user or passed to another bundle.
pub const RESERVED_PARAMETER_KEYS: [&str; 3] =
    [PROVISION_CREDENTIALS_KEY, NAMESPACE_KEY, CLUSTER_KEY];

// Label keys placed on extracted credentials
pub const LABEL_BUNDLE_ACTION: &str = "bundleAction";
pub const LABEL_BUNDLE_NAME: &str = "bundleName";

// Label keys placed on sandbox objects
pub const LABEL_SANDBOX_FQ_NAME: &str = "bundle-fqname";
pub const LABEL_SANDBOX_ACTION: &str = "bundle-action";
pub const LABEL_SANDBOX_POD: &str = "bundle-pod-name";

// Pod annotations a running bundle may set to report progress
pub const ANNOTATION_LAST_OPERATION: &str = "apb_last_operation";
pub const ANNOTATION_DASHBOARD_URL: &str = "apb_dashboard_url";

// Data keys
pub const STATE_FIELDS_KEY: &str = "fields";
pub const CREDENTIALS_KEY: &str = "credentials";

// Defaults
pub const DEFAULT_NAMESPACE: &str = "ansible-service-broker";
pub const DEFAULT_SANDBOX_ROLE: &str = "edit";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_STATE_MOUNT_LOCATION: &str = "/var/tmp/bundle";
pub const STATE_NAME_SUFFIX: &str = "-state";
pub const POD_NAME_PREFIX: &str = "bundle-";
pub const BIND_CREDENTIALS_COMMAND: &str = "broker-bind-creds";

// Kubernetes limits names to 63 characters
pub const MAX_NAME_LEN: usize = 63;

#[test]
fn apb_constants_macro_test() {
    assert_eq!("_apb_provision_creds", PROVISION_CREDENTIALS_KEY);
    assert_eq!("_apb_foo", apb!("foo"));
}
