use bundle_model::constants::{
    LABEL_BUNDLE_ACTION, LABEL_BUNDLE_NAME, LABEL_SANDBOX_ACTION, LABEL_SANDBOX_FQ_NAME,
    MAX_NAME_LEN, POD_NAME_PREFIX,
};
use bundle_model::Action;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Room left for the suffix the API server appends to a generated name.
const GENERATED_SUFFIX_LEN: usize = 5;

/// A new, unique bundle pod name.
pub(crate) fn pod_name() -> String {
    format!("{}{}", POD_NAME_PREFIX, Uuid::new_v4())
}

/// The prefix of the namespace generated for a sandbox, e.g. `postgresql-apb-prov-`.
pub(crate) fn sandbox_namespace_prefix(fq_name: &str, action: Action) -> String {
    let name: String = fq_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let name = match name.trim_matches('-') {
        "" => POD_NAME_PREFIX.trim_end_matches('-'),
        trimmed => trimmed,
    };
    let short_action: String = action.to_string().chars().take(4).collect();
    let mut prefix = format!("{}-{}-", name, short_action);
    prefix.truncate(MAX_NAME_LEN - GENERATED_SUFFIX_LEN);
    prefix
}

/// `value` made acceptable as a label value: at most 63 characters of alphanumerics, `-`, `_`
/// and `.`, starting and ending with an alphanumeric.
pub(crate) fn label_value(value: &str) -> String {
    let mut cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    cleaned.truncate(MAX_NAME_LEN);
    cleaned
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Labels put on every sandbox object.
pub(crate) fn sandbox_labels(fq_name: &str, action: Action) -> BTreeMap<String, String> {
    [
        (LABEL_SANDBOX_FQ_NAME.to_string(), label_value(fq_name)),
        (LABEL_SANDBOX_ACTION.to_string(), action.to_string()),
    ]
    .into()
}

/// Labels put on a stored credential record.
pub(crate) fn credential_labels(fq_name: &str, action: Action) -> BTreeMap<String, String> {
    [
        (LABEL_BUNDLE_ACTION.to_string(), action.to_string()),
        (LABEL_BUNDLE_NAME.to_string(), label_value(fq_name)),
    ]
    .into()
}
