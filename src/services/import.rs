//! Import runs: one viewing-history upload turned into statistics.
//!
//! A run resolves unique titles one at a time, merges entries that resolve to
//! the same catalog entry, then aggregates under the entry's canonical title. Progress is published on a
//! watch channel for polling; cancellation is checked before each title and
//! discards everything the run built.

use chrono::Datelike;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::ResolverSettings,
    db::TitleCache,
    error::{AppError, AppResult},
    models::{TitleRecord, UserStatistics, ViewingIndex},
    services::{
        aggregator::Aggregator, binge::detect_binge, history::build_index,
        providers::MetadataProvider, resolver::Resolver,
    },
};

/// Bundled history for trying the service without an export
const SAMPLE_HISTORY: &str = include_str!("../../data/sample_history.csv");

/// Advisory progress of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub current_title: Option<String>,
}

/// Final result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub statistics: UserStatistics,
    pub total_watch_hours: f64,
    pub completed_count: usize,
}

impl From<UserStatistics> for ImportOutcome {
    fn from(statistics: UserStatistics) -> Self {
        Self {
            total_watch_hours: statistics.total_watch_hours(),
            completed_count: statistics.completed_count(),
            statistics,
        }
    }
}

/// One sequential pass over a viewing index
pub struct ImportRun {
    resolver: Resolver,
    default_runtime: u32,
    progress: watch::Sender<Progress>,
    cancel: CancellationToken,
}

impl ImportRun {
    pub fn new(
        resolver: Resolver,
        default_runtime: u32,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<Progress>) {
        let (progress, receiver) = watch::channel(Progress::default());
        let run = Self {
            resolver,
            default_runtime,
            progress,
            cancel,
        };
        (run, receiver)
    }

    fn check_cancelled(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Aborted);
        }
        Ok(())
    }

    pub async fn execute(mut self, index: ViewingIndex) -> AppResult<ImportOutcome> {
        let total = index.len();
        self.progress.send_replace(Progress {
            current: 0,
            total,
            current_title: None,
        });

        let mut merged = ViewingIndex::new();
        let mut records: HashMap<String, TitleRecord> = HashMap::new();
        let mut missed = Vec::new();

        for (position, entry) in index.iter().enumerate() {
            self.check_cancelled()?;

            match self.resolver.resolve(&entry.display_title).await {
                Some(record) => {
                    let identity = catalog_key(&record);
                    merged.merge(&identity, &record.title, &entry.dates, entry.frequency);
                    records.entry(identity).or_insert(record);
                }
                None => missed.push(entry.display_title.clone()),
            }

            self.progress.send_replace(Progress {
                current: position + 1,
                total,
                current_title: Some(entry.display_title.clone()),
            });
        }

        self.check_cancelled()?;

        let labels = stat_labels(&merged, &records);
        let mut labelled = ViewingIndex::new();
        let mut aggregator = Aggregator::new(self.default_runtime);
        for entry in merged.iter() {
            let (Some(record), Some(label)) = (records.get(&entry.key), labels.get(&entry.key)) else {
                continue;
            };
            labelled.merge(label, label, &entry.dates, entry.frequency);
            aggregator.ingest(label, record, entry.frequency);
        }
        for title in &missed {
            aggregator.record_miss(title);
        }
        if let Some(binge) = detect_binge(&labelled) {
            aggregator.set_binge(binge);
        }

        let statistics = aggregator.finish();
        tracing::info!(
            titles = total,
            resolved = merged.len(),
            missed = statistics.missed.count,
            minutes = statistics.total_watch_minutes,
            "Import run finished"
        );

        Ok(ImportOutcome::from(statistics))
    }
}

/// Identity of a catalog entry; tv and movie ids overlap
fn catalog_key(record: &TitleRecord) -> String {
    format!("{}:{}", record.kind, record.external_id)
}

/// Statistics label per catalog key. Entries sharing a canonical title are
/// qualified by release year (or kind when undated), then by id if still equal.
fn stat_labels(merged: &ViewingIndex, records: &HashMap<String, TitleRecord>) -> HashMap<String, String> {
    let mut sharing: HashMap<&str, usize> = HashMap::new();
    for record in records.values() {
        *sharing.entry(record.title.as_str()).or_insert(0) += 1;
    }

    let mut taken = HashSet::new();
    let mut labels = HashMap::new();
    for entry in merged.iter() {
        let Some(record) = records.get(&entry.key) else {
            continue;
        };

        let shared = sharing.get(record.title.as_str()).copied().unwrap_or(0) > 1;
        let mut label = match (shared, record.release_date) {
            (false, _) => record.title.clone(),
            (true, Some(date)) => format!("{} ({})", record.title, date.year()),
            (true, None) => format!("{} ({})", record.title, record.kind),
        };
        if !taken.insert(label.clone()) {
            label = format!("{} #{}", label, record.external_id);
            taken.insert(label.clone());
        }
        labels.insert(entry.key.clone(), label);
    }
    labels
}

// ============================================================================
// Run slot
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Aborted,
}

/// Snapshot of the run slot for polling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportStatus {
    pub run_id: Option<Uuid>,
    pub state: RunState,
    pub progress: Progress,
    pub error: Option<String>,
}

struct Slot {
    run_id: Option<Uuid>,
    state: RunState,
    progress: Option<watch::Receiver<Progress>>,
    cancel: Option<CancellationToken>,
    outcome: Option<ImportOutcome>,
    error: Option<String>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            run_id: None,
            state: RunState::Idle,
            progress: None,
            cancel: None,
            outcome: None,
            error: None,
        }
    }
}

/// The process's single import slot. Starting a run while one is active is a conflict.
#[derive(Clone)]
pub struct ImportManager {
    slot: Arc<RwLock<Slot>>,
    cache: Arc<dyn TitleCache>,
    provider: Arc<dyn MetadataProvider>,
    settings: ResolverSettings,
    default_runtime: u32,
}

impl ImportManager {
    pub fn new(
        cache: Arc<dyn TitleCache>,
        provider: Arc<dyn MetadataProvider>,
        settings: ResolverSettings,
        default_runtime: u32,
    ) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Slot::default())),
            cache,
            provider,
            settings,
            default_runtime,
        }
    }

    /// Validates the upload and starts a background run over it
    pub async fn start(&self, csv_text: &str) -> AppResult<Uuid> {
        let mut slot = self.slot.write().await;
        if slot.state == RunState::Running {
            return Err(AppError::Conflict("An import is already running".to_string()));
        }

        let index = build_index(csv_text)?;

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let resolver = Resolver::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.provider),
            self.settings.clone(),
        );
        let (run, progress) = ImportRun::new(resolver, self.default_runtime, cancel.clone());

        *slot = Slot {
            run_id: Some(run_id),
            state: RunState::Running,
            progress: Some(progress),
            cancel: Some(cancel),
            outcome: None,
            error: None,
        };
        drop(slot);

        tracing::info!(run_id = %run_id, titles = index.len(), "Import run started");

        let shared = Arc::clone(&self.slot);
        tokio::spawn(async move {
            let result = run.execute(index).await;

            let mut slot = shared.write().await;
            // A reset replaced the slot; this run's result is stale
            if slot.run_id != Some(run_id) {
                tracing::debug!(run_id = %run_id, "Discarding result of reset run");
                return;
            }

            match result {
                Ok(outcome) => {
                    slot.state = RunState::Completed;
                    slot.outcome = Some(outcome);
                }
                Err(AppError::Aborted) => {
                    tracing::info!(run_id = %run_id, "Import run aborted");
                    slot.state = RunState::Aborted;
                }
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e, "Import run failed");
                    slot.state = RunState::Failed;
                    slot.error = Some(e.to_string());
                }
            }
            slot.cancel = None;
        });

        Ok(run_id)
    }

    /// Starts a run over the bundled sample history
    pub async fn start_sample(&self) -> AppResult<Uuid> {
        self.start(SAMPLE_HISTORY).await
    }

    pub async fn status(&self) -> ImportStatus {
        let slot = self.slot.read().await;
        ImportStatus {
            run_id: slot.run_id,
            state: slot.state,
            progress: slot
                .progress
                .as_ref()
                .map(|rx| rx.borrow().clone())
                .unwrap_or_default(),
            error: slot.error.clone(),
        }
    }

    /// Statistics of the last completed run
    pub async fn outcome(&self) -> AppResult<ImportOutcome> {
        let slot = self.slot.read().await;
        slot.outcome
            .clone()
            .ok_or_else(|| AppError::NotFound("No completed import".to_string()))
    }

    /// Cancels any running import and clears progress and statistics
    pub async fn reset(&self) {
        let mut slot = self.slot.write().await;
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        *slot = Slot::default();
        tracing::info!("Import slot reset");
    }
}
