// crates/driftwatch-store/src/memory.rs
//
// In-memory registry implementing the `Registry` trait.
//
// All state lives behind a single mutex, so the archive-old + set-new pair
// in `promote` is applied under one lock acquisition and can never be
// observed half-done.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use driftwatch_core::{Baseline, DriftwatchError, ModelVersion, Registry, Stage, VersionId};

use crate::{check_promotable, superseded_reason};

#[derive(Debug)]
struct RegistryState {
    next_id: VersionId,
    versions: BTreeMap<VersionId, ModelVersion>,
    production: HashMap<String, VersionId>,
    baselines: HashMap<String, Baseline>,
}

/// Registry held entirely in process memory.
#[derive(Debug)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    /// Create an empty registry. The first registered version gets id 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                versions: BTreeMap::new(),
                production: HashMap::new(),
                baselines: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().expect("registry lock poisoned")
    }

    /// Number of versions of `model` currently in `stage`.
    pub fn count_in_stage(&self, model: &str, stage: Stage) -> usize {
        self.lock()
            .versions
            .values()
            .filter(|v| v.model == model && v.stage == stage)
            .count()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(&self, mut version: ModelVersion) -> Result<VersionId, DriftwatchError> {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        version.version_id = id;
        state.versions.insert(id, version);
        Ok(id)
    }

    async fn promote(
        &self,
        model: &str,
        version_id: VersionId,
        expected_current: Option<VersionId>,
    ) -> Result<(), DriftwatchError> {
        let mut state = self.lock();

        let actual = state.production.get(model).copied();
        if actual != expected_current {
            return Err(DriftwatchError::Conflict {
                model: model.to_string(),
                expected: expected_current,
                actual,
            });
        }
        if actual == Some(version_id) {
            return Ok(());
        }

        let candidate = state
            .versions
            .get(&version_id)
            .ok_or_else(|| DriftwatchError::NotFound(format!("version {}", version_id)))?;
        check_promotable(model, version_id, candidate)?;

        let now = Utc::now();
        if let Some(previous) = actual {
            if let Some(old) = state.versions.get_mut(&previous) {
                old.mark_archived(&superseded_reason(version_id), now);
            }
        }
        if let Some(new) = state.versions.get_mut(&version_id) {
            new.mark_production(now);
        }
        state.production.insert(model.to_string(), version_id);
        Ok(())
    }

    async fn get_production(&self, model: &str) -> Result<Option<ModelVersion>, DriftwatchError> {
        let state = self.lock();
        Ok(state
            .production
            .get(model)
            .and_then(|id| state.versions.get(id))
            .cloned())
    }

    async fn get(&self, version_id: VersionId) -> Result<Option<ModelVersion>, DriftwatchError> {
        Ok(self.lock().versions.get(&version_id).cloned())
    }

    async fn archive(&self, version_id: VersionId, reason: &str) -> Result<(), DriftwatchError> {
        let mut state = self.lock();
        let model = state
            .versions
            .get(&version_id)
            .map(|v| v.model.clone())
            .ok_or_else(|| DriftwatchError::NotFound(format!("version {}", version_id)))?;

        if state.production.get(&model) == Some(&version_id) {
            return Err(DriftwatchError::InvalidState(format!(
                "version {} is production for {}; promote a successor instead",
                version_id, model
            )));
        }

        if let Some(v) = state.versions.get_mut(&version_id) {
            v.mark_archived(reason, Utc::now());
        }
        Ok(())
    }

    async fn list(&self, model: &str) -> Result<Vec<ModelVersion>, DriftwatchError> {
        Ok(self
            .lock()
            .versions
            .values()
            .filter(|v| v.model == model)
            .cloned()
            .collect())
    }

    async fn baseline(&self, model: &str) -> Result<Option<Baseline>, DriftwatchError> {
        Ok(self.lock().baselines.get(model).cloned())
    }

    async fn set_baseline(&self, baseline: Baseline) -> Result<(), DriftwatchError> {
        self.lock()
            .baselines
            .insert(baseline.model.clone(), baseline);
        Ok(())
    }
}
