//! Consolidation orchestrator
//!
//! A run rebuilds the attack surface graph of one scope target from scratch:
//! clear the previous graph, resolve every asset type, infer relationships and
//! assemble the result. The run executes inside a single immediate transaction,
//! so a failed stage rolls back and the previous graph stays visible. Runs for
//! the same scope target are serialized; different targets proceed in parallel
//! on their own pooled connections and queue on SQLite's single write lock,
//! retrying a busy database until `consolidation.write_lock_wait` runs out.

pub mod assembler;
mod guard;

pub use assembler::{AssetView, ConsolidationResult, ConsolidationSummary};
pub use guard::ScopeLocks;

use crate::config::ConsolidationConfig;
use crate::error::Result;
use crate::relationships::RelationshipEngine;
use crate::resolve::{default_resolvers, run_resolver};
use crate::sources::SourceViews;
use crate::storage::{AssetStore, Database};
use rusqlite::TransactionBehavior;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pause between attempts while another writer holds the database
const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(50);

pub const CLEAR_STAGE: &str = "clear_previous_state";
pub const ASSEMBLE_STAGE: &str = "assemble_result";

pub struct Consolidator {
    db: Arc<Database>,
    config: ConsolidationConfig,
    locks: ScopeLocks,
}

impl Consolidator {
    pub fn new(db: Arc<Database>, config: ConsolidationConfig) -> Self {
        Self {
            db,
            config,
            locks: ScopeLocks::new(),
        }
    }

    /// Rebuild the consolidated graph of a scope target.
    ///
    /// Safe to call repeatedly; with unchanged sources every run produces the
    /// same assets and edges by natural key.
    pub fn consolidate(&self, scope_target_id: &str) -> Result<ConsolidationResult> {
        self.locks
            .run(scope_target_id, || self.run_queued(scope_target_id))
    }

    /// Counts of the last consolidated state, without rebuilding
    pub fn summary(&self, scope_target_id: &str) -> Result<ConsolidationSummary> {
        let conn = self.db.get_conn()?;
        assembler::summarize(&AssetStore::new(&conn), scope_target_id)
    }

    /// Retry whole runs that could not take the write lock. A busy failure
    /// always rolls back, so the next attempt starts from the committed graph.
    fn run_queued(&self, scope_target_id: &str) -> Result<ConsolidationResult> {
        let wait = self.config.write_lock_wait()?;
        let queued = Instant::now();
        let mut attempt = 1;

        loop {
            match self.run(scope_target_id) {
                Err(e) if e.is_busy() && queued.elapsed() < wait => {
                    tracing::debug!(
                        "Database busy on attempt {} for {}, retrying",
                        attempt,
                        scope_target_id
                    );
                    attempt += 1;
                    std::thread::sleep(BUSY_RETRY_INTERVAL);
                }
                other => return other,
            }
        }
    }

    fn run(&self, scope_target_id: &str) -> Result<ConsolidationResult> {
        let started = Instant::now();
        let containment_timeout = self.config.containment_timeout()?;

        tracing::info!("Consolidating attack surface for {}", scope_target_id);

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut result = {
            let store = AssetStore::new(&tx);
            let sources = SourceViews::new(&tx, self.config.successful_scan_status.clone());

            let cleared = store
                .clear_scope(scope_target_id)
                .map_err(|e| e.in_stage(CLEAR_STAGE))?;
            tracing::debug!(
                "Cleared {} assets, {} relationships, {} DNS records, {} metadata entries",
                cleared.assets,
                cleared.relationships,
                cleared.dns_records,
                cleared.metadata
            );

            for resolver in default_resolvers(&self.config) {
                let written = run_resolver(resolver.as_ref(), &sources, &store, scope_target_id)
                    .map_err(|e| e.in_stage(resolver.name()))?;
                tracing::info!(
                    "{}: {} {} assets",
                    resolver.name(),
                    written,
                    resolver.asset_type()
                );
            }

            let edges = RelationshipEngine::new(containment_timeout).infer(
                &sources,
                &store,
                scope_target_id,
            )?;
            tracing::info!("Inferred {} relationships", edges.total());

            assembler::assemble(&store, scope_target_id, started)
                .map_err(|e| e.in_stage(ASSEMBLE_STAGE))?
        };

        tx.commit()?;
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Consolidated {} assets and {} relationships for {} in {}ms",
            result.asset_counts.total(),
            result.relationship_count,
            scope_target_id,
            result.elapsed_ms
        );

        Ok(result)
    }
}
