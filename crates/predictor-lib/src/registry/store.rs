//! Slot-per-name predictor storage

use crate::error::{Error, Result};
use crate::models::{PredictorRecord, PredictorStatus, Schema, SourceSpec, TrainingOptions};
use crate::training::TrainedModel;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

/// State behind one predictor name
struct SlotState {
    record: PredictorRecord,
    model: Option<Arc<dyn TrainedModel>>,
    /// Set under the write lock right before the slot leaves the map
    removed: bool,
}

type Slot = Arc<RwLock<SlotState>>;

/// Authoritative table of predictors
#[derive(Default)]
pub struct PredictorRegistry {
    slots: DashMap<String, Slot>,
    generations: AtomicU64,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Result<Slot> {
        self.slots
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Insert a new predictor in `generating`; fails with `DuplicateName`
    pub fn create(
        &self,
        name: &str,
        predict: Vec<String>,
        source: SourceSpec,
        options: TrainingOptions,
    ) -> Result<PredictorRecord> {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateName(name.to_string())),
            Entry::Vacant(vacant) => {
                let mut record = PredictorRecord::new(name, predict, source, options);
                record.generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(Arc::new(RwLock::new(SlotState {
                    record: record.clone(),
                    model: None,
                    removed: false,
                })));
                info!(predictor = %name, "Predictor registered");
                Ok(record)
            }
        }
    }

    /// Latest record for `name`
    pub async fn get(&self, name: &str) -> Result<PredictorRecord> {
        let slot = self.slot(name)?;
        let state = slot.read().await;
        if state.removed {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(state.record.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Every record, ordered by creation time then name
    pub async fn list(&self) -> Vec<PredictorRecord> {
        let slots: Vec<Slot> = self.slots.iter().map(|r| r.value().clone()).collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            let state = slot.read().await;
            if !state.removed {
                records.push(state.record.clone());
            }
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        records
    }

    /// Names of predictors whose virtual table exists (status `complete`)
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .list()
            .await
            .into_iter()
            .filter(|r| r.status == PredictorStatus::Complete)
            .map(|r| r.name)
            .collect();
        names.sort();
        names
    }

    /// Number of predictors per status
    pub async fn status_counts(&self) -> HashMap<PredictorStatus, usize> {
        let mut counts: HashMap<PredictorStatus, usize> =
            PredictorStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for record in self.list().await {
            *counts.entry(record.status).or_default() += 1;
        }
        counts
    }

    /// Write-lock the slot of `name` if it still holds `generation`
    async fn live_slot(
        &self,
        name: &str,
        generation: u64,
    ) -> Result<OwnedRwLockWriteGuard<SlotState>> {
        let state = self.slot(name)?.write_owned().await;
        if state.removed || state.record.generation != generation {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(state)
    }

    /// Move a predictor along the lifecycle chain.
    ///
    /// Writes aimed at an earlier predictor of the same name fail with
    /// `NotFound`.
    pub(crate) async fn set_status(
        &self,
        name: &str,
        generation: u64,
        status: PredictorStatus,
        message: Option<String>,
    ) -> Result<PredictorRecord> {
        let mut state = self.live_slot(name, generation).await?;
        transition(&mut state.record, status)?;
        state.record.error = message;
        debug!(predictor = %name, status = %status, "Predictor status updated");
        Ok(state.record.clone())
    }

    /// Mark a predictor `complete` and install its model in one step
    pub(crate) async fn complete(
        &self,
        name: &str,
        generation: u64,
        model: Arc<dyn TrainedModel>,
        source_schema: Schema,
    ) -> Result<PredictorRecord> {
        let mut state = self.live_slot(name, generation).await?;
        transition(&mut state.record, PredictorStatus::Complete)?;
        state.record.error = None;
        state.record.source_schema = Some(source_schema);
        state.model = Some(model);
        Ok(state.record.clone())
    }

    /// Remove a predictor and its virtual table.
    ///
    /// Predictors still `generating` or `training` are only removed with
    /// `force`. Waits for in-flight queries holding the slot to finish.
    pub async fn delete(&self, name: &str, force: bool) -> Result<PredictorRecord> {
        let slot = self.slot(name)?;
        let mut state = slot.write().await;
        if state.removed {
            return Err(Error::NotFound(name.to_string()));
        }
        if !state.record.status.is_terminal() && !force {
            return Err(Error::TrainingInProgress(name.to_string()));
        }

        state.removed = true;
        state.model = None;
        self.slots.remove_if(name, |_, current| Arc::ptr_eq(current, &slot));
        debug!(predictor = %name, status = %state.record.status, force, "Predictor slot removed");
        Ok(state.record.clone())
    }

    /// Pin a `complete` predictor for querying.
    ///
    /// The returned handle holds the slot's read lock; deletion of the same
    /// name blocks until it is dropped.
    pub async fn acquire(&self, name: &str) -> Result<PredictorHandle> {
        let slot = self.slot(name)?;
        let guard = slot.read_owned().await;
        if guard.removed {
            return Err(Error::NotFound(name.to_string()));
        }
        let model = match (&guard.model, guard.record.status) {
            (Some(model), PredictorStatus::Complete) => model.clone(),
            (_, status) => {
                return Err(Error::PredictorNotReady {
                    name: name.to_string(),
                    status,
                })
            }
        };
        Ok(PredictorHandle { guard, model })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn transition(record: &mut PredictorRecord, next: PredictorStatus) -> Result<()> {
    if !record.status.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            name: record.name.clone(),
            from: record.status,
            to: next,
        });
    }
    record.status = next;
    record.updated_at = Utc::now();
    Ok(())
}

/// Read access to a completed predictor
pub struct PredictorHandle {
    guard: OwnedRwLockReadGuard<SlotState>,
    model: Arc<dyn TrainedModel>,
}

impl PredictorHandle {
    pub fn record(&self) -> &PredictorRecord {
        &self.guard.record
    }

    pub fn model(&self) -> &dyn TrainedModel {
        self.model.as_ref()
    }
}
