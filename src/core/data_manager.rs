//! Per-dataset undo/redo history of scan snapshots

use crate::core::manipulation::Manipulation;
use crate::io::{SicmReader, SicmWriter};
use crate::types::{Scan, ScanData, SicmError, SicmResult};
use std::collections::HashMap;
use std::path::Path;

/// Action name of the first record of every dataset
pub const RAW_DATA_ACTION: &str = "raw_data";
/// Action name pushed by a reset
pub const RESET_ACTION: &str = "reset";

/// A named snapshot in a dataset's history
#[derive(Debug, Clone, PartialEq)]
pub struct UndoRedoRecord {
    pub action_name: String,
    pub scan: Scan,
}

impl UndoRedoRecord {
    pub fn new(action_name: impl Into<String>, scan: Scan) -> Self {
        Self {
            action_name: action_name.into(),
            scan,
        }
    }
}

/// Undo and redo stacks of one dataset; the undo stack is never empty
#[derive(Debug, Clone)]
struct Dataset {
    undo_stack: Vec<UndoRedoRecord>,
    redo_stack: Vec<UndoRedoRecord>,
}

impl Dataset {
    fn new(scan: Scan) -> Self {
        Self {
            undo_stack: vec![UndoRedoRecord::new(RAW_DATA_ACTION, scan)],
            redo_stack: Vec::new(),
        }
    }

    fn current(&self) -> &UndoRedoRecord {
        // seeded with the raw record, which is never popped
        &self.undo_stack[self.undo_stack.len() - 1]
    }

    fn raw(&self) -> &UndoRedoRecord {
        &self.undo_stack[0]
    }
}

/// Outcome of importing a batch of files
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<String>,
    /// Paths already present as dataset keys
    pub duplicates: Vec<String>,
    pub failed: Vec<(String, SicmError)>,
}

type Listener = Box<dyn FnMut(&str)>;

/// Owns every loaded dataset and drives operations on them
pub struct DataManager {
    datasets: HashMap<String, Dataset>,
    order: Vec<String>,
    listener: Option<Listener>,
}

impl DataManager {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            order: Vec::new(),
            listener: None,
        }
    }

    /// Install the callback invoked with the dataset key after every
    /// mutation. It must not mutate the manager itself.
    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&str) + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    fn notify(&mut self, key: &str) {
        if let Some(listener) = self.listener.as_mut() {
            listener(key);
        }
    }

    fn dataset(&self, key: &str) -> SicmResult<&Dataset> {
        self.datasets
            .get(key)
            .ok_or_else(|| SicmError::State(format!("Unknown dataset '{}'", key)))
    }

    fn dataset_mut(&mut self, key: &str) -> SicmResult<&mut Dataset> {
        self.datasets
            .get_mut(key)
            .ok_or_else(|| SicmError::State(format!("Unknown dataset '{}'", key)))
    }

    /// Decode every new path and seed its history with the raw scan.
    /// A failing file does not prevent the others from loading.
    pub fn import_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> ImportReport {
        let mut report = ImportReport::default();

        for path in paths {
            let key = path.as_ref().to_string_lossy().to_string();
            if self.datasets.contains_key(&key) || report.imported.contains(&key) {
                log::debug!("Skipping already loaded file {}", key);
                report.duplicates.push(key);
                continue;
            }

            match SicmReader::new(path.as_ref()).and_then(|reader| reader.read_scan()) {
                Ok(scan) => {
                    self.insert(key.clone(), scan);
                    report.imported.push(key);
                }
                Err(e) => {
                    log::warn!("Failed to import {}: {}", key, e);
                    report.failed.push((key, e));
                }
            }
        }

        log::info!(
            "Imported {} files ({} duplicates, {} failures)",
            report.imported.len(),
            report.duplicates.len(),
            report.failed.len()
        );
        report
    }

    /// Register an already decoded scan under `key`
    pub fn add_scan(&mut self, key: impl Into<String>, scan: Scan) -> SicmResult<()> {
        let key = key.into();
        if self.datasets.contains_key(&key) {
            return Err(SicmError::State(format!("Dataset '{}' already exists", key)));
        }
        self.insert(key, scan);
        Ok(())
    }

    fn insert(&mut self, key: String, scan: Scan) {
        self.datasets.insert(key.clone(), Dataset::new(scan));
        self.order.push(key.clone());
        self.notify(&key);
    }

    /// Run `operation` on a copy of the current snapshot and push the result.
    ///
    /// On failure nothing is pushed and the redo stack is kept.
    pub fn execute_operation<F>(&mut self, key: &str, action_name: &str, operation: F) -> SicmResult<()>
    where
        F: FnOnce(&mut Scan) -> SicmResult<()>,
    {
        let mut snapshot = self.dataset(key)?.current().scan.clone();
        operation(&mut snapshot)?;
        if let ScanData::Raster(raster) = &snapshot.data {
            raster.check_invariants()?;
        }

        let dataset = self.dataset_mut(key)?;
        dataset.undo_stack.push(UndoRedoRecord::new(action_name, snapshot));
        dataset.redo_stack.clear();
        log::info!("Applied '{}' to {} (history depth {})", action_name, key, dataset.undo_stack.len());

        self.notify(key);
        Ok(())
    }

    /// Apply a catalogued manipulation under its canonical action name
    pub fn apply(&mut self, key: &str, manipulation: &Manipulation) -> SicmResult<()> {
        let action_name = manipulation.action_name();
        self.execute_operation(key, &action_name, |scan| manipulation.apply(scan))
    }

    /// Read-only evaluation on the current snapshot; history is untouched
    pub fn measure<T, F>(&self, key: &str, measurement: F) -> SicmResult<T>
    where
        F: FnOnce(&Scan) -> SicmResult<T>,
    {
        measurement(&self.dataset(key)?.current().scan)
    }

    pub fn undo(&mut self, key: &str) -> SicmResult<()> {
        let dataset = self.dataset_mut(key)?;
        if dataset.undo_stack.len() <= 1 {
            return Err(SicmError::State(format!("Nothing to undo for '{}'", key)));
        }
        if let Some(record) = dataset.undo_stack.pop() {
            log::info!("Undo '{}' on {}", record.action_name, key);
            dataset.redo_stack.push(record);
        }
        self.notify(key);
        Ok(())
    }

    pub fn redo(&mut self, key: &str) -> SicmResult<()> {
        let dataset = self.dataset_mut(key)?;
        let record = dataset
            .redo_stack
            .pop()
            .ok_or_else(|| SicmError::State(format!("Nothing to redo for '{}'", key)))?;
        log::info!("Redo '{}' on {}", record.action_name, key);
        dataset.undo_stack.push(record);
        self.notify(key);
        Ok(())
    }

    /// Push a fresh copy of the raw record; earlier history stays undoable
    pub fn reset(&mut self, key: &str) -> SicmResult<()> {
        let dataset = self.dataset_mut(key)?;
        let raw = dataset.raw().scan.clone();
        dataset.undo_stack.push(UndoRedoRecord::new(RESET_ACTION, raw));
        dataset.redo_stack.clear();
        log::info!("Reset {} to raw data", key);
        self.notify(key);
        Ok(())
    }

    /// Drop a dataset and all of its snapshots
    pub fn remove(&mut self, key: &str) -> SicmResult<()> {
        self.datasets
            .remove(key)
            .ok_or_else(|| SicmError::State(format!("Unknown dataset '{}'", key)))?;
        self.order.retain(|k| k != key);
        log::info!("Removed dataset {}", key);
        self.notify(key);
        Ok(())
    }

    /// Move a dataset to a new key, keeping both stacks
    pub fn rename(&mut self, old_key: &str, new_key: impl Into<String>) -> SicmResult<()> {
        let new_key = new_key.into();
        if self.datasets.contains_key(&new_key) {
            return Err(SicmError::State(format!("Dataset '{}' already exists", new_key)));
        }
        let dataset = self
            .datasets
            .remove(old_key)
            .ok_or_else(|| SicmError::State(format!("Unknown dataset '{}'", old_key)))?;
        self.datasets.insert(new_key.clone(), dataset);
        for key in self.order.iter_mut() {
            if key == old_key {
                *key = new_key.clone();
            }
        }
        self.notify(&new_key);
        Ok(())
    }

    /// Current snapshot; re-read after every mutation
    pub fn get_scan(&self, key: &str) -> SicmResult<&Scan> {
        Ok(&self.dataset(key)?.current().scan)
    }

    /// The pristine decoded scan
    pub fn get_raw_scan(&self, key: &str) -> SicmResult<&Scan> {
        Ok(&self.dataset(key)?.raw().scan)
    }

    pub fn is_undoable(&self, key: &str) -> SicmResult<bool> {
        Ok(self.dataset(key)?.undo_stack.len() > 1)
    }

    pub fn is_redoable(&self, key: &str) -> SicmResult<bool> {
        Ok(!self.dataset(key)?.redo_stack.is_empty())
    }

    pub fn undo_depth(&self, key: &str) -> SicmResult<usize> {
        Ok(self.dataset(key)?.undo_stack.len())
    }

    /// Applied actions, oldest first, without the raw record
    pub fn action_names(&self, key: &str) -> SicmResult<Vec<&str>> {
        Ok(self.dataset(key)?
            .undo_stack
            .iter()
            .skip(1)
            .map(|record| record.action_name.as_str())
            .collect())
    }

    /// Redoable actions, next redo first
    pub fn redo_action_names(&self, key: &str) -> SicmResult<Vec<&str>> {
        Ok(self.dataset(key)?
            .redo_stack
            .iter()
            .rev()
            .map(|record| record.action_name.as_str())
            .collect())
    }

    /// Write the current snapshot as a `.sicm` container
    pub fn export<P: AsRef<Path>>(&self, key: &str, path: P) -> SicmResult<()> {
        SicmWriter::new().write(self.get_scan(key)?, path)
    }

    /// Dataset keys in insertion order
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, key: &str) -> bool {
        self.datasets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}
