//! ProcessSpec — the canonical description of one supervised child.
//!
//! Read from a single file in the configuration directory, whose basename
//! is the child's logical name. Grounded on
//! `original_source/ncolony/process_events.py` (the whitelist and the
//! always-set `NCOLONY_CONFIG`/`NCOLONY_NAME` env vars) and
//! `original_source/ncolony/ctllib.py` (the field set `args`, `env`, `uid`,
//! `gid`, `env_inherit`, `group`, plus free-form extras).

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::SpecError;

/// Environment variable always present in a spawned child: the raw config
/// bytes it was spawned from.
pub const NCOLONY_CONFIG: &str = "NCOLONY_CONFIG";
/// Environment variable always present in a spawned child: its logical name.
pub const NCOLONY_NAME: &str = "NCOLONY_NAME";

/// Keys the event receiver recognizes on a config file's top-level JSON
/// object. Any other key is silently dropped by the receiver (but preserved
/// verbatim in `NCOLONY_CONFIG`, since that's the raw bytes).
const VALID_KEYS: &[&str] = &["args", "uid", "gid", "env", "env_inherit", "group"];

/// The canonical description of one supervised child, as parsed from a
/// config file. `raw` retains the original bytes so the event receiver can
/// set `NCOLONY_CONFIG` to exactly what was on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub name: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub env_inherit: Vec<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub group: Vec<String>,
    pub raw: Vec<u8>,
}

impl ProcessSpec {
    /// Parse `raw` (the exact bytes of the config file) into a ProcessSpec
    /// for `name`. Unknown top-level keys are dropped per the whitelist but
    /// `raw` is kept verbatim for `NCOLONY_CONFIG`.
    pub fn parse(name: &str, raw: &[u8]) -> Result<Self, SpecError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|source| SpecError::MalformedJson {
                name: name.to_string(),
                source,
            })?;

        let obj = value.as_object();

        let args: Vec<String> = obj
            .and_then(|o| o.get("args"))
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if args.is_empty() {
            return Err(SpecError::EmptyArgs {
                name: name.to_string(),
            });
        }

        let env: BTreeMap<String, String> = obj
            .and_then(|o| o.get("env"))
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let env_inherit: Vec<String> = obj
            .and_then(|o| o.get("env_inherit"))
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let group: Vec<String> = obj
            .and_then(|o| o.get("group"))
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let uid = obj
            .and_then(|o| o.get("uid"))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);
        let gid = obj
            .and_then(|o| o.get("gid"))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);

        Ok(Self {
            name: name.to_string(),
            args,
            env,
            env_inherit,
            uid,
            gid,
            group,
            raw: raw.to_vec(),
        })
    }

    /// Which top-level keys on a config file are recognized; everything
    /// else is dropped by the receiver but retained in `NCOLONY_CONFIG`.
    pub fn valid_keys() -> &'static [&'static str] {
        VALID_KEYS
    }

    /// The effective environment for a spawned child: `env`, then
    /// `env_inherit` names copied from `ambient` (empty string if absent),
    /// then the two always-set `NCOLONY_*` vars.
    pub fn effective_env<F>(&self, mut ambient: F) -> BTreeMap<String, String>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut env = self.env.clone();
        for key in &self.env_inherit {
            env.insert(key.clone(), ambient(key).unwrap_or_default());
        }
        env.insert(
            NCOLONY_CONFIG.to_string(),
            String::from_utf8_lossy(&self.raw).into_owned(),
        );
        env.insert(NCOLONY_NAME.to_string(), self.name.clone());
        env
    }

    /// Extract a named extension object (e.g. `beatcheck`, `httpcheck`) from
    /// the raw spec bytes, if present. Extensions are not in the receiver's
    /// whitelist, but checkers read them directly from `raw`/`NCOLONY_CONFIG`.
    pub fn extension(&self, key: &str) -> Option<Value> {
        let value: Value = serde_json::from_slice(&self.raw).ok()?;
        value.as_object()?.get(key).cloned()
    }
}
