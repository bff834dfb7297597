use crate::constants::{PROVISION_CREDENTIALS_KEY, RESERVED_PARAMETER_KEYS};
use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::ResultExt;

/// The parameters of a bundle action. Holds user input together with the implicit values the
/// broker injects (provision credentials, namespace and cluster hints). Keys keep their insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts `value` at `key`, returning the previous value if there was one.
    pub fn insert<S, V>(&mut self, key: S, value: V) -> Option<Value>
    where
        S: Into<String>,
        V: Into<Value>,
    {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// A copy of these parameters with the reserved keys removed. This is what may be shown to a
    /// user or handed to another bundle.
    pub fn user_parameters(&self) -> Parameters {
        Parameters(
            self.0
                .iter()
                .filter(|(key, _)| !RESERVED_PARAMETER_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Makes sure the implicit keys a bundle expects are present. Existing values are never
    /// overwritten.
    pub fn ensure_defaults(&mut self) {
        if !self.0.contains_key(PROVISION_CREDENTIALS_KEY) {
            self.0.insert(
                PROVISION_CREDENTIALS_KEY.to_string(),
                Value::Object(Map::new()),
            );
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0).context(error::SerializationSnafu { what: "parameters" })?)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<S, V> FromIterator<(S, V)> for Parameters
where
    S: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::Parameters;
    use crate::constants::PROVISION_CREDENTIALS_KEY;
    use serde_json::{json, Value};

    #[test]
    fn user_parameters_strip_reserved_keys() {
        let params: Parameters = [
            ("foo", json!("bar")),
            ("cluster", json!("mycluster")),
            ("namespace", json!("mynamespace")),
            ("_apb_provision_creds", json!("letmein")),
        ]
        .into_iter()
        .collect();

        let user = params.user_parameters();
        assert_eq!(user.get("foo"), Some(&json!("bar")));
        for key in ["cluster", "namespace", "_apb_provision_creds"] {
            assert!(!user.contains_key(key), "'{}' should have been removed", key);
        }
        // `params` itself is unchanged.
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn ensure_defaults_sets_missing_key() {
        let mut params = Parameters::new();
        params.ensure_defaults();
        assert_eq!(
            params.get(PROVISION_CREDENTIALS_KEY),
            Some(&Value::Object(Default::default()))
        );
    }

    #[test]
    fn ensure_defaults_keeps_existing_value() {
        let mut params = Parameters::new();
        params.insert(PROVISION_CREDENTIALS_KEY, "avalue");
        params.insert("somekey", "avalue");
        params.ensure_defaults();
        assert_eq!(params.get(PROVISION_CREDENTIALS_KEY), Some(&json!("avalue")));
        assert_eq!(params.get("somekey"), Some(&json!("avalue")));
    }

    #[test]
    fn json_keeps_insertion_order() {
        let mut params = Parameters::new();
        params.insert("zeta", 1);
        params.insert("alpha", true);
        assert_eq!(params.to_json().unwrap(), r#"{"zeta":1,"alpha":true}"#);
    }
}
