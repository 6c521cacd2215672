//! Optimistic-concurrency reconciliation of one product version.
//!
//! Many writers share the catalog record, each owning one product version
//! subtree. A writer never locks the record. Every attempt:
//!
//! 1. rests for a jittered delay to stagger contending writers
//! 2. reads the record and its resource version
//! 3. decodes its product entry and merges the fragment into its version
//! 4. stops if the merged state is already what the record holds
//! 5. otherwise writes the whole record conditioned on the version it read
//!
//! A conflict means someone else wrote in between; the attempt is discarded
//! and the next one merges against fresh data. Because the merge always starts
//! from what was just read, a retry never appends list entries twice.

use std::time::Duration;

use rand::Rng;
use serde_yaml::Mapping;
use tracing::Instrument;

use prodcat_core::merge::{merge_mappings, shallow_overwrite};
use prodcat_core::observability::reconcile_span;
use prodcat_core::store::{RecordData, RecordStore, WriteResult};

use crate::config::{ActiveMode, ProductTarget, ReconcileOptions, WriteMode};
use crate::error::{CatalogError, Result};
use crate::product::ProductDocument;

/// Default minimum rest before each read.
pub const DEFAULT_MIN_JITTER: Duration = Duration::from_secs(1);

/// Default maximum rest before each read.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(3);

/// Decides how long to rest before each read.
pub trait Pacing: Send + Sync {
    /// Delay before attempt number `attempt` (starting at 1).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Uniformly random delay within a range.
#[derive(Debug, Clone, Copy)]
pub struct RandomJitter {
    min: Duration,
    max: Duration,
}

impl RandomJitter {
    /// Creates a jitter between `min` and `max` inclusive.
    ///
    /// The bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_JITTER, DEFAULT_MAX_JITTER)
    }
}

impl Pacing for RandomJitter {
    fn delay(&self, _attempt: u32) -> Duration {
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// No rest between attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacing for NoDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// How a reconcile finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record already held the desired state; nothing was written.
    Converged {
        /// Attempts made, including the final read.
        attempts: u32,
    },
    /// One conditional write established the desired state.
    Written {
        /// Attempts made, including the successful write.
        attempts: u32,
        /// Resource version after the write.
        resource_version: String,
    },
}

impl ReconcileOutcome {
    /// Returns true if a write was performed.
    #[must_use]
    pub const fn wrote(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    /// Number of attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Converged { attempts } | Self::Written { attempts, .. } => *attempts,
        }
    }
}

/// Drives a product version's data into the shared catalog record.
pub struct Reconciler<S: RecordStore> {
    store: S,
    pacing: Box<dyn Pacing>,
    max_attempts: Option<u32>,
}

impl<S: RecordStore> Reconciler<S> {
    /// Creates a reconciler with random 1-3 second jitter and no attempt
    /// ceiling.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            pacing: Box::new(RandomJitter::default()),
            max_attempts: None,
        }
    }

    /// Replaces the pacing strategy.
    #[must_use]
    pub fn with_pacing(mut self, pacing: impl Pacing + 'static) -> Self {
        self.pacing = Box::new(pacing);
        self
    }

    /// Sets an attempt ceiling. `None` retries until done.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Merges `fragment` into the target version until the record reflects it.
    ///
    /// Returns without writing when the record already holds the desired
    /// state, so repeating the same call is a no-op.
    ///
    /// # Errors
    ///
    /// - configuration error if both active options are set (before any I/O)
    /// - store errors other than "not found" on read
    /// - merge kind conflicts and undecodable product entries
    /// - [`CatalogError::RetriesExhausted`] when an attempt ceiling is set and
    ///   reached
    ///
    /// Write failures other than conflicts are logged and retried.
    pub async fn reconcile(
        &self,
        target: &ProductTarget,
        fragment: &Mapping,
        options: ReconcileOptions,
    ) -> Result<ReconcileOutcome> {
        let active = options.active_mode()?;
        let plan = UpdatePlan {
            target,
            fragment,
            active,
            mode: options.write_mode(),
        };

        let span = reconcile_span(
            &target.product,
            &target.version,
            &target.record.to_string(),
        );
        self.run(&plan).instrument(span).await
    }

    async fn run(&self, plan: &UpdatePlan<'_>) -> Result<ReconcileOutcome> {
        let record_key = &plan.target.record;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if self.max_attempts.is_some_and(|max| attempt > max) {
                return Err(CatalogError::RetriesExhausted {
                    attempts: attempt - 1,
                });
            }

            let delay = self.pacing.delay(attempt);
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "resting before reading catalog record"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let record = match self.store.read(record_key).await {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    tracing::warn!(record = %record_key, "catalog record doesn't exist, attempting again");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "error reading catalog record");
                    return Err(e.into());
                }
            };

            let Some(data) = plan.apply(record.data)? else {
                tracing::info!(attempt, "catalog record already up to date");
                return Ok(ReconcileOutcome::Converged { attempts: attempt });
            };

            tracing::info!(
                attempt,
                resource_version = %record.resource_version,
                "catalog record update attempt"
            );
            match self
                .store
                .write_if(record_key, &record.resource_version, data)
                .await
            {
                Ok(WriteResult::Success { resource_version }) => {
                    tracing::info!(attempt, %resource_version, "catalog record updated");
                    return Ok(ReconcileOutcome::Written {
                        attempts: attempt,
                        resource_version,
                    });
                }
                Ok(WriteResult::Conflict { current_version }) => {
                    tracing::warn!(
                        attempt,
                        read_version = %record.resource_version,
                        current_version = current_version.as_deref().unwrap_or("unknown"),
                        "conflict updating catalog record"
                    );
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "error writing catalog record");
                }
            }
        }
    }
}

/// Inputs of one reconcile that stay fixed across attempts.
struct UpdatePlan<'a> {
    target: &'a ProductTarget,
    fragment: &'a Mapping,
    active: ActiveMode,
    mode: WriteMode,
}

impl UpdatePlan<'_> {
    /// Computes the record to write from freshly read data.
    ///
    /// Returns `None` when the record already holds the desired state. Other
    /// products' entries pass through untouched.
    fn apply(&self, mut data: RecordData) -> Result<Option<RecordData>> {
        let product = self.target.product.as_str();
        let version = self.target.version.as_str();

        let mut document = match data.get(product) {
            Some(raw) => ProductDocument::decode(raw)?,
            None => {
                tracing::info!(product, "product does not exist; will update");
                ProductDocument::new()
            }
        };

        let existing = match document.version(version) {
            Some(existing) => Some(existing.clone()),
            None => {
                tracing::info!(version, "version does not exist; will update");
                None
            }
        };
        let current = existing.clone().unwrap_or_default();

        let (updated, changed) = match self.mode {
            WriteMode::Merge => {
                let merged = merge_mappings(self.fragment, &current)?;
                let changed = merged != current;
                (merged, changed)
            }
            WriteMode::Overwrite => {
                let outcome = shallow_overwrite(self.fragment, &current);
                (outcome.result, outcome.changed)
            }
        };

        if existing.is_some() && !changed && document.active_state_satisfied(version, self.active)
        {
            return Ok(None);
        }

        document.insert(version, updated);
        match self.active {
            ActiveMode::Set => document.set_active(version),
            ActiveMode::Clear => document.clear_active(),
            ActiveMode::Unchanged => {}
        }

        data.insert(product.to_string(), document.encode()?);
        Ok(Some(data))
    }
}
