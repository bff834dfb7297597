use serde::{Deserialize, Serialize};

/// The lifecycle actions a bundle knows how to perform. The lowercase name is the first argument
/// passed to the bundle's entrypoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Provision,
    Update,
    Deprovision,
    Bind,
    Unbind,
}

serde_plain::derive_display_from_serialize!(Action);
serde_plain::derive_fromstr_from_deserialize!(Action);

impl Action {
    /// Bind and unbind act on a single binding of a service instance rather than the instance.
    pub fn is_binding_scoped(&self) -> bool {
        matches!(self, Action::Bind | Action::Unbind)
    }
}
