use crate::models::Location;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// The document root of the local frame.
pub trait DocumentRoot: Send + Sync {
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&self, name: &str, value: &str);
    fn title(&self) -> String;
    fn set_title(&self, title: &str);
}

/// The local frame's navigation history.
pub trait History: Send + Sync {
    fn current(&self) -> Location;
    fn push(&self, location: &Location);
    fn replace(&self, location: &Location);
}

#[derive(Debug, Default)]
struct DocumentState {
    attributes: BTreeMap<String, String>,
    title: String,
    attribute_writes: usize,
    title_writes: usize,
}

/// Headless document that counts writes.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    state: Mutex<DocumentState>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute_writes(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).attribute_writes
    }

    pub fn title_writes(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).title_writes
    }
}

impl DocumentRoot for MemoryDocument {
    fn attribute(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attributes
            .get(name)
            .cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.attributes.insert(name.to_string(), value.to_string());
        state.attribute_writes += 1;
    }

    fn title(&self) -> String {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).title.clone()
    }

    fn set_title(&self, title: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.title = title.to_string();
        state.title_writes += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEntryKind {
    Push,
    Replace,
}

/// Headless history keeping a back stack and a log of operations.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Mutex<Vec<Location>>,
    operations: Mutex<Vec<(HistoryEntryKind, Location)>>,
}

impl MemoryHistory {
    pub fn new(initial: Location) -> Self {
        Self {
            entries: Mutex::new(vec![initial]),
            operations: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn operations(&self) -> Vec<(HistoryEntryKind, Location)> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl History for MemoryHistory {
    fn current(&self) -> Location {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or_default()
    }

    fn push(&self, location: &Location) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(location.clone());
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((HistoryEntryKind::Push, location.clone()));
    }

    fn replace(&self, location: &Location) {
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.last_mut() {
                Some(last) => *last = location.clone(),
                None => entries.push(location.clone()),
            }
        }
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((HistoryEntryKind::Replace, location.clone()));
    }
}
