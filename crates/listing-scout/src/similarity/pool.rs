//! Fixed-size thread pool scoring listing batches.
//!
//! Batches go out over a bounded crossbeam channel; each worker scores every
//! pair inside the batch it received and writes the new scores in one
//! transaction. Workers share nothing but the database handle.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::db::listing_repo::ListingFeatures;
use crate::db::similarity_repo::{self, ScoredPair};
use crate::db::{Database, DatabaseError};
use crate::error::ScoutError;

use super::score::listing_similarity;

pub struct Batch {
    pub index: usize,
    pub listings: Arc<Vec<ListingFeatures>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub index: usize,
    pub pairs_compared: usize,
    pub already_scored: usize,
    pub inserted: usize,
    pub duplicates_skipped: usize,
    pub error: Option<String>,
}

pub struct BatchPool {
    batch_sender: Sender<Batch>,
    result_receiver: Receiver<BatchResult>,
    workers: Vec<JoinHandle<()>>,
}

impl BatchPool {
    pub fn new(db: Database, worker_count: usize) -> Result<Self, ScoutError> {
        if worker_count == 0 {
            return Err(ScoutError::Worker("worker_count must be at least 1".to_string()));
        }
        let (batch_sender, batch_receiver) = bounded::<Batch>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<BatchResult>();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = batch_receiver.clone();
            let tx = result_sender.clone();
            let db = db.clone();
            let handle = thread::Builder::new()
                .name(format!("similarity-{}", worker_id))
                .spawn(move || run_worker(worker_id, rx, tx, db))
                .map_err(|e| ScoutError::Worker(e.to_string()))?;
            workers.push(handle);
        }

        debug!("Started {} similarity workers", worker_count);

        Ok(Self {
            batch_sender,
            result_receiver,
            workers,
        })
    }

    pub fn submit(&self, batch: Batch) -> Result<(), ScoutError> {
        self.batch_sender
            .send(batch)
            .map_err(|_| ScoutError::Worker("batch channel closed".to_string()))
    }

    /// Closes the queue, waits for every worker and returns all results.
    pub fn finish(self) -> Vec<BatchResult> {
        drop(self.batch_sender);
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Similarity worker {} panicked: {:?}", i, e);
            }
        }
        self.result_receiver.try_iter().collect()
    }
}

fn run_worker(worker_id: usize, batches: Receiver<Batch>, results: Sender<BatchResult>, db: Database) {
    while let Ok(batch) = batches.recv() {
        let index = batch.index;
        let result = match score_batch(&db, &batch) {
            Ok(result) => result,
            Err(e) => {
                error!("Worker {} failed on batch {}: {}", worker_id, index, e);
                BatchResult {
                    index,
                    error: Some(e.to_string()),
                    ..BatchResult::default()
                }
            }
        };
        if results.send(result).is_err() {
            break;
        }
    }
    debug!("Similarity worker {} finished", worker_id);
}

/// Scores every unordered pair in the batch that has no score yet.
pub fn score_batch(db: &Database, batch: &Batch) -> Result<BatchResult, DatabaseError> {
    let listings = batch.listings.as_slice();
    let mut result = BatchResult {
        index: batch.index,
        ..BatchResult::default()
    };
    let mut pending = Vec::new();

    for (i, a) in listings.iter().enumerate() {
        for b in &listings[i + 1..] {
            if a.id == b.id {
                continue;
            }
            if similarity_repo::exists(db, a.id, b.id)? {
                result.already_scored += 1;
                continue;
            }
            result.pairs_compared += 1;
            pending.push(ScoredPair::new(a.id, b.id, listing_similarity(a, b))?);
        }
    }

    let outcome = similarity_repo::bulk_insert(db, &pending)?;
    result.inserted = outcome.inserted;
    result.duplicates_skipped = outcome.skipped;

    info!(
        "Batch {}: {} listings, {} new scores, {} already scored",
        batch.index,
        listings.len(),
        result.inserted,
        result.already_scored
    );
    Ok(result)
}
