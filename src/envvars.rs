//! Ordered `KEY=VALUE` environment bag.
//!
//! Kept as a `Vec<String>` rather than a `HashMap` on purpose: lookup is a
//! first-match scan, so later entries can be appended without needing to
//! know whether they shadow an earlier one. `join` just concatenates, and
//! shadowing falls out of `lookup` always returning the first hit.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars(Vec<String>);

impl EnvVars {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_key_value(key: &str, value: &str) -> Self {
        Self(vec![format!("{key}={value}")])
    }

    /// Snapshot of the current process environment, in whatever order
    /// `std::env::vars` yields it.
    pub fn from_process_env() -> Self {
        Self(
            std::env::vars()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
        )
    }

    pub fn add(mut self, key: &str, value: &str) -> Self {
        self.0.push(format!("{key}={value}"));
        self
    }

    /// Concatenates `other` after `self`; `other`'s entries shadow `self`'s
    /// on lookup.
    pub fn join(mut self, other: EnvVars) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Matches by raw prefix against `key`, not `key=` — this mirrors the
    /// upstream behavior exactly (`strings.HasPrefix(envVar, key)`), which
    /// means a lookup for `"FOO"` also matches an entry named `FOOBAR=...`.
    /// Surprising, but spec-mandated: callers must pass the exact variable
    /// name they mean to inherit.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|entry| entry.starts_with(key)).map(|entry| {
            let sep = entry.find('=').map(|i| i + 1).unwrap_or(entry.len());
            &entry[sep..]
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Render as a `key -> value` map suitable for `std::process::Command::envs`.
    /// A duplicate key keeps its *last* occurrence: this is the concrete
    /// child-process environment, not `lookup`'s first-match scan, and must
    /// match `os/exec`'s own last-one-wins deduplication so that later
    /// entries (e.g. an action's own `env`) shadow earlier ones (e.g. an
    /// inherited variable).
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for entry in &self.0 {
            if let Some((k, v)) = entry.split_once('=') {
                map.insert(k.to_string(), v.to_string());
            }
        }
        map
    }
}

impl fmt::Display for EnvVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl FromIterator<String> for EnvVars {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Configuration files spell out an action's extra environment as a YAML
/// map (`env: {KEY: value}`), not as a list of `KEY=VALUE` strings.
impl Serialize for EnvVars {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EnvVars {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = HashMap::<String, String>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect())
    }
}
