//! Batched pairwise similarity over all stored listings.
//!
//! Listings are split into batches and only pairs inside a batch are
//! compared, which keeps a run at O(batch_size²) per batch instead of
//! O(n²) overall. With shuffling on, each run groups listings differently,
//! so pairs missed by one run are picked up by later ones.

pub mod pool;
pub mod score;

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::info;

use crate::db::{listing_repo, Database};
use crate::error::ScoutError;

pub use pool::{Batch, BatchPool, BatchResult};
pub use score::{listing_similarity, ratio};

#[derive(Debug, Clone)]
pub struct SimilaritySettings {
    pub workers: usize,
    pub shuffle: bool,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            workers: 10,
            shuffle: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimilarityReport {
    pub listings: usize,
    pub batches: usize,
    pub pairs_compared: usize,
    pub already_scored: usize,
    pub inserted: usize,
    pub duplicates_skipped: usize,
    pub failed_batches: Vec<String>,
}

pub struct SimilarityEngine {
    db: Database,
    settings: SimilaritySettings,
}

impl SimilarityEngine {
    pub fn new(db: Database, settings: SimilaritySettings) -> Self {
        Self { db, settings }
    }

    /// Scores every unscored pair that shares a batch. Blocking; run it off
    /// the async runtime.
    pub fn compute_all(&self, batch_size: usize) -> Result<SimilarityReport, ScoutError> {
        if batch_size == 0 {
            return Err(ScoutError::Worker("batch_size must be at least 1".to_string()));
        }

        let mut listings = listing_repo::load_features(&self.db)?;
        if self.settings.shuffle {
            listings.shuffle(&mut rand::thread_rng());
        }

        let mut report = SimilarityReport {
            listings: listings.len(),
            ..SimilarityReport::default()
        };
        if listings.len() < 2 {
            return Ok(report);
        }

        let pool = BatchPool::new(self.db.clone(), self.settings.workers)?;
        for (index, chunk) in listings.chunks(batch_size).enumerate() {
            pool.submit(Batch {
                index,
                listings: Arc::new(chunk.to_vec()),
            })?;
            report.batches += 1;
        }

        for result in pool.finish() {
            report.pairs_compared += result.pairs_compared;
            report.already_scored += result.already_scored;
            report.inserted += result.inserted;
            report.duplicates_skipped += result.duplicates_skipped;
            if let Some(error) = result.error {
                report
                    .failed_batches
                    .push(format!("batch {}: {}", result.index, error));
            }
        }

        info!(
            listings = report.listings,
            batches = report.batches,
            inserted = report.inserted,
            already_scored = report.already_scored,
            failed = report.failed_batches.len(),
            "Similarity run finished"
        );
        Ok(report)
    }
}
