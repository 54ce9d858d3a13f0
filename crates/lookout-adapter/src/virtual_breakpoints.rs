//! Breakpoints with no engine-side counterpart.
//!
//! Only the existence of an id in a category matters; which id fired is
//! never checked.

use std::collections::HashMap;

/// Prefix distinguishing virtual ids from engine breakpoint ids.
pub const VIRTUAL_BREAKPOINT_PREFIX: &str = "virtualbreakpoint-";

/// Pause before running any script that carries a source map.
pub const BEFORE_SCRIPT_WITH_SOURCE_MAP: &str = "beforeScriptWithSourceMapExecution";

/// Whether `id` was minted by a [`VirtualBreakpoints`] registry.
pub fn is_virtual_id(id: &str) -> bool {
    id.starts_with(VIRTUAL_BREAKPOINT_PREFIX)
}

#[derive(Debug)]
pub struct VirtualBreakpoints {
    next: u64,
    categories: HashMap<String, Vec<String>>,
}

impl Default for VirtualBreakpoints {
    fn default() -> Self {
        Self {
            next: 1,
            categories: HashMap::new(),
        }
    }
}

impl VirtualBreakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new id in `category`.
    pub fn create(&mut self, category: &str) -> String {
        let id = format!("{VIRTUAL_BREAKPOINT_PREFIX}{}", self.next);
        self.next += 1;
        self.categories
            .entry(category.to_string())
            .or_default()
            .push(id.clone());
        id
    }

    /// True iff `category` holds at least one id.
    pub fn has(&self, category: &str) -> bool {
        self.categories.get(category).is_some_and(|ids| !ids.is_empty())
    }

    /// Ids currently registered in `category`, oldest first.
    pub fn ids(&self, category: &str) -> Vec<String> {
        self.categories.get(category).cloned().unwrap_or_default()
    }

    /// Remove `id` from whichever category holds it.
    pub fn remove(&mut self, id: &str) -> bool {
        for ids in self.categories.values_mut() {
            if let Some(pos) = ids.iter().position(|existing| existing == id) {
                ids.remove(pos);
                return true;
            }
        }
        false
    }
}
