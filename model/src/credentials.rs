use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};

/// The ways a credential payload written by a bundle can be malformed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CredentialsError {
    #[snafu(display("Malformed credential payload, invalid JSON: {}", source))]
    InvalidJson { source: serde_json::Error },

    #[snafu(display("Malformed credential payload, expected a JSON object but found {}", found))]
    NotAnObject { found: &'static str },

    #[snafu(display(
        "Malformed credential payload, '{}' is {} but must be a scalar or an object",
        key,
        found
    ))]
    InvalidValue { key: String, found: &'static str },
}

/// The credentials a bundle produced when it finished, for example connection details of the
/// database it provisioned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCredentials {
    pub credentials: Map<String, Value>,
}

impl ExtractedCredentials {
    /// Decodes the payload written by a bundle. The payload must be a JSON object whose values are
    /// strings, numbers, booleans or nested objects.
    pub fn from_payload(payload: &[u8]) -> Result<Self, CredentialsError> {
        let value: Value = serde_json::from_slice(payload).context(InvalidJsonSnafu)?;
        let credentials = match value {
            Value::Object(map) => map,
            other => {
                return NotAnObjectSnafu {
                    found: kind(&other),
                }
                .fail()
            }
        };
        if let Some((key, value)) = credentials
            .iter()
            .find(|(_, value)| matches!(value, Value::Null | Value::Array(_)))
        {
            return InvalidValueSnafu {
                key,
                found: kind(value),
            }
            .fail();
        }
        Ok(Self { credentials })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.credentials.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
