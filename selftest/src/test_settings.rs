use serde::Deserialize;

/// Read once from `BUNDLE_SELFTEST_*` environment variables.
pub(super) struct TestSettings {}

impl TestSettings {
    /// The path or name of the `kind` binary.
    pub(super) fn kind_path() -> &'static str {
        SETTINGS.kind_path.as_str()
    }

    /// Whether clusters are left running after a test for inspection.
    pub(super) fn keep_cluster() -> bool {
        SETTINGS.keep_cluster
    }
}

#[derive(Debug, Deserialize)]
struct Settings {
    /// `BUNDLE_SELFTEST_KIND_PATH`, defaults to finding [kind] on `$PATH`.
    ///
    /// [kind]: https://kind.sigs.k8s.io/
    #[serde(default = "default_kind_path")]
    kind_path: String,

    /// `BUNDLE_SELFTEST_KEEP_CLUSTER=true` keeps the cluster of a failed run around so the sandbox
    /// namespaces and bundle pods it left can be looked at with `kubectl`.
    #[serde(default)]
    keep_cluster: bool,
}

lazy_static::lazy_static! {
    static ref SETTINGS: Settings = envy::prefixed("BUNDLE_SELFTEST_")
        .from_env::<Settings>()
        .unwrap_or_else(|e| panic!("invalid BUNDLE_SELFTEST_ settings: {}", e));
}

fn default_kind_path() -> String {
    String::from("kind")
}
