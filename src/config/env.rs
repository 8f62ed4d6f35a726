//! Ordered environment variable maps.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;

/// An ordered list of `KEY=VALUE` pairs.
///
/// YAML `env` blocks deserialize into this type in declaration order. Scalar
/// values (numbers, booleans) are coerced to strings so that `PORT: 8080`
/// works as expected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars(Vec<(String, String)>);

impl EnvVars {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Returns the value of a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over the pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders every pair as `KEY=VALUE`.
    pub fn to_pairs(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvVars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = EnvVars::new();
        for (k, v) in iter {
            vars.insert(k, v);
        }
        vars
    }
}

impl<'de> Deserialize<'de> for EnvVars {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mapping = Option::<serde_yaml::Mapping>::deserialize(deserializer)?.unwrap_or_default();

        let mut vars = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let key = scalar_to_string(&key)
                .ok_or_else(|| D::Error::custom("environment variable names must be scalars"))?;
            let value = scalar_to_string(&value).ok_or_else(|| {
                D::Error::custom(format!("environment variable {} must be a scalar", key))
            })?;
            vars.push((key, value));
        }

        Ok(EnvVars(vars))
    }
}

impl Serialize for EnvVars {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_vars_keep_declaration_order() {
        let vars: EnvVars = serde_yaml::from_str("ZED: last\nALPHA: first\nMID: 2\n").unwrap();
        assert_eq!(vars.to_pairs(), vec!["ZED=last", "ALPHA=first", "MID=2"]);
    }

    #[test]
    fn test_env_vars_coerce_scalars() {
        let vars: EnvVars = serde_yaml::from_str("PORT: 8080\nDEBUG: true\nRATIO: 0.5\n").unwrap();
        assert_eq!(vars.get("PORT"), Some("8080"));
        assert_eq!(vars.get("DEBUG"), Some("true"));
        assert_eq!(vars.get("RATIO"), Some("0.5"));
    }

    #[test]
    fn test_env_vars_reject_nested_values() {
        let result: Result<EnvVars, _> = serde_yaml::from_str("NESTED:\n  a: b\n");
        assert!(result.is_err());

        let result: Result<EnvVars, _> = serde_yaml::from_str("EMPTY: ~\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_vars_null_block_is_empty() {
        let vars: EnvVars = serde_yaml::from_str("~").unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_env_vars_insert_replaces() {
        let mut vars: EnvVars = [("A", "1"), ("B", "2")].into_iter().collect();
        vars.insert("A", "3");
        assert_eq!(vars.to_pairs(), vec!["A=3", "B=2"]);
        assert_eq!(vars.len(), 2);
    }
}
