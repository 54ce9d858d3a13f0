//! Scripts the engine reported as loaded.

use std::collections::HashMap;

use lookout_engine::ScriptId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub file_id: ScriptId,
    pub file_name: String,
    pub source_map_url: Option<String>,
    /// Whether the current client has been sent `Debugger.scriptParsed`.
    pub notified_client: bool,
}

/// Scripts in load order, indexed by file id and by name.
#[derive(Debug, Default)]
pub struct ScriptTable {
    scripts: Vec<Script>,
    by_id: HashMap<ScriptId, usize>,
    by_name: HashMap<String, ScriptId>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a script; returns false if `file_id` is already known.
    pub fn record(
        &mut self,
        file_id: ScriptId,
        file_name: &str,
        source_map_url: Option<String>,
    ) -> bool {
        if self.by_id.contains_key(&file_id) {
            return false;
        }
        self.by_id.insert(file_id, self.scripts.len());
        self.by_name.insert(file_name.to_string(), file_id);
        self.scripts.push(Script {
            file_id,
            file_name: file_name.to_string(),
            source_map_url,
            notified_client: false,
        });
        true
    }

    pub fn get(&self, file_id: ScriptId) -> Option<&Script> {
        self.by_id.get(&file_id).map(|&i| &self.scripts[i])
    }

    /// Most recently loaded script with this name.
    pub fn id_for_name(&self, name: &str) -> Option<ScriptId> {
        self.by_name.get(name).copied()
    }

    /// Mark every script as not yet announced to the client.
    pub fn reset_notified(&mut self) {
        for script in &mut self.scripts {
            script.notified_client = false;
        }
    }

    /// Scripts not yet announced, in load order, marking them announced.
    pub fn take_unnotified(&mut self) -> Vec<Script> {
        self.scripts
            .iter_mut()
            .filter(|s| !s.notified_client)
            .map(|s| {
                s.notified_client = true;
                s.clone()
            })
            .collect()
    }

    /// Script names in load order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().map(|s| s.file_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
