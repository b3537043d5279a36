//! The event receiver: turns directory-monitor add/remove events into
//! process lifecycle operations, and keeps the group index that lets
//! RESTART-GROUP messages fan out to every member.
//!
//! Grounded on `original_source/ncolony/process_events.py`'s `Receiver`
//! class (whitelist filtering, add-is-remove-then-add-for-existing-name)
//! and `original_source/ncolony/ctllib.py`'s group bookkeeping.

use std::collections::{HashMap, HashSet};

use crate::directory_monitor::DirSink;
use crate::process_spec::ProcessSpec;

/// Process lifecycle operations the receiver drives. Implemented by the
/// process monitor. Kept synchronous (just enqueuing work) so the receiver
/// itself, and the `DirSink` it implements, stay synchronous and easy to
/// unit test without a runtime.
pub trait ProcessOps: Send {
    fn start(&mut self, spec: ProcessSpec);
    fn stop(&mut self, name: &str);
}

/// Turns raw config-directory events into `ProcessOps` calls, maintaining
/// a double index between group names and member names so a
/// RESTART-GROUP message can be resolved to the right set of children.
pub struct EventReceiver<P: ProcessOps> {
    specs: HashMap<String, ProcessSpec>,
    group_to_names: HashMap<String, HashSet<String>>,
    name_to_groups: HashMap<String, HashSet<String>>,
    ops: P,
}

impl<P: ProcessOps> EventReceiver<P> {
    pub fn new(ops: P) -> Self {
        Self {
            specs: HashMap::new(),
            group_to_names: HashMap::new(),
            name_to_groups: HashMap::new(),
            ops,
        }
    }

    fn unindex(&mut self, name: &str) {
        if let Some(groups) = self.name_to_groups.remove(name) {
            for group in groups {
                if let Some(members) = self.group_to_names.get_mut(&group) {
                    members.remove(name);
                    if members.is_empty() {
                        self.group_to_names.remove(&group);
                    }
                }
            }
        }
    }

    fn index(&mut self, spec: &ProcessSpec) {
        let groups: HashSet<String> = spec.group.iter().cloned().collect();
        for group in &groups {
            self.group_to_names
                .entry(group.clone())
                .or_default()
                .insert(spec.name.clone());
        }
        self.name_to_groups.insert(spec.name.clone(), groups);
    }

    /// All currently known child names, for RESTART-ALL.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Member names of `group`, for RESTART-GROUP. Empty if the group is
    /// unknown (not an error: a message may race a since-removed group).
    pub fn group_members(&self, group: &str) -> Vec<String> {
        self.group_to_names
            .get(group)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn spec(&self, name: &str) -> Option<&ProcessSpec> {
        self.specs.get(name)
    }
}

impl<P: ProcessOps> DirSink for EventReceiver<P> {
    fn add(&mut self, name: &str, raw: &[u8]) {
        match ProcessSpec::parse(name, raw) {
            Ok(spec) => {
                // an add for a name we already track is a replace: unindex
                // the old groups before indexing the new ones.
                if self.specs.remove(name).is_some() {
                    self.unindex(name);
                }
                self.index(&spec);
                self.specs.insert(name.to_string(), spec.clone());
                self.ops.start(spec);
            }
            Err(err) => {
                error!("dropping malformed spec '{name}': {err}");
            }
        }
    }

    fn remove(&mut self, name: &str) {
        self.specs.remove(name);
        self.unindex(name);
        self.ops.stop(name);
    }
}
