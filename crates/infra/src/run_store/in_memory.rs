use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use gstflow_core::{ExpectedVersion, RunId};
use gstflow_events::Event;
use gstflow_runs::{RunEvent, RunInput, RunOutput, RunStore, RunStoreError};

#[derive(Debug, Default)]
struct Runs {
    streams: HashMap<RunId, Vec<RunEvent>>,
    inputs: HashMap<RunId, RunInput>,
    outputs: HashMap<RunId, RunOutput>,
}

/// In-memory append-only run store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<Runs>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Runs>, RunStoreError> {
        self.runs
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Runs>, RunStoreError> {
        self.runs
            .write()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))
    }
}

impl RunStore for InMemoryRunStore {
    fn append(
        &self,
        run_id: RunId,
        expected: ExpectedVersion,
        events: Vec<RunEvent>,
    ) -> Result<u64, RunStoreError> {
        if let Some((idx, _)) = events.iter().enumerate().find(|(_, e)| e.run_id() != run_id) {
            return Err(RunStoreError::Conflict(format!(
                "batch contains an event for another run (index {idx})"
            )));
        }

        let mut runs = self.write()?;
        let stream = runs.streams.entry(run_id).or_default();
        let current = stream.len() as u64;
        if !expected.matches(current) {
            return Err(RunStoreError::Conflict(format!(
                "expected {expected}, stream is at version {current}"
            )));
        }

        stream.extend(events);
        Ok(stream.len() as u64)
    }

    fn load(&self, run_id: RunId) -> Result<Vec<RunEvent>, RunStoreError> {
        Ok(self.read()?.streams.get(&run_id).cloned().unwrap_or_default())
    }

    fn save_input(&self, run_id: RunId, input: RunInput) -> Result<(), RunStoreError> {
        let mut runs = self.write()?;
        match runs.inputs.get(&run_id) {
            Some(existing) if *existing == input => Ok(()),
            Some(_) => Err(RunStoreError::InputMismatch(run_id)),
            None => {
                runs.inputs.insert(run_id, input);
                Ok(())
            }
        }
    }

    fn load_input(&self, run_id: RunId) -> Result<Option<RunInput>, RunStoreError> {
        Ok(self.read()?.inputs.get(&run_id).cloned())
    }

    fn finalize_outputs(&self, run_id: RunId, output: RunOutput) -> Result<(), RunStoreError> {
        let mut runs = self.write()?;
        if runs.outputs.contains_key(&run_id) {
            return Err(RunStoreError::AlreadyFinalized(run_id));
        }
        runs.outputs.insert(run_id, output);
        Ok(())
    }

    fn load_outputs(&self, run_id: RunId) -> Result<Option<RunOutput>, RunStoreError> {
        Ok(self.read()?.outputs.get(&run_id).cloned())
    }
}
