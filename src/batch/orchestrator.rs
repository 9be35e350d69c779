//! Load Orchestrator Module
//!
//! This module implements the orchestration layer that connects the record
//! store, the partitioner and the load strategies. Every run walks the same
//! state machine; strategies only change how the DISPATCHED and JOINED
//! phases happen.
//!
//! # Run Flow
//! 1. Reset the `customers` table (`Init -> TableReady`)
//! 2. Split raw names into fragments and partition them (`-> Partitioned`)
//! 3. Hand the sub-batches to the strategy (`-> Dispatched`)
//! 4. Block until every sub-batch has finished (`-> Joined`)
//! 5. Look up the configured first name and log the matches (`-> Queried -> Done`)
//!
//! Any error moves the run to `Failed`; `run_all` logs it and moves on to the
//! next strategy.

use crate::{
    Customer, JoinSummary, SubBatch,
    batch::partition,
    config::LoadConfig,
    error::LoadError,
    split_names,
    strategy::{DispatchContext, LoadStrategy, StrategyType, create_strategy},
};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Phases of a single strategy run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    TableReady,
    Partitioned,
    Dispatched,
    Joined,
    Queried,
    Done,
    Failed,
}

/// Outcome of a successful strategy run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub strategy: StrategyType,
    /// Every state the run passed through, starting with `Init`
    pub states: Vec<RunState>,
    pub summary: JoinSummary,
    /// Customers found by the final lookup, in the order the store returned them
    pub matches: Vec<Customer>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// State tracker for one run
struct Run {
    strategy: &'static str,
    states: Vec<RunState>,
}

impl Run {
    fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            states: vec![RunState::Init],
        }
    }

    fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Init)
    }

    fn advance(&mut self, next: RunState) {
        debug!(strategy = self.strategy, from = ?self.state(), to = ?next, "Run state transition");
        self.states.push(next);
    }
}

/// Load orchestrator
///
/// Owns nothing but shared references: the store and the worker pool are
/// created by the caller and outlive every run.
pub struct Orchestrator {
    ctx: DispatchContext,
    load: LoadConfig,
    join_timeout: Option<Duration>,
}

impl Orchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    /// * `ctx` - Store and worker pool shared by every strategy
    /// * `load` - Dataset, partition count and lookup name
    /// * `join_timeout` - Optional deadline for the join phase
    pub fn new(ctx: DispatchContext, load: LoadConfig, join_timeout: Option<Duration>) -> Self {
        Self {
            ctx,
            load,
            join_timeout,
        }
    }

    /// Run every strategy in order
    ///
    /// A failing strategy is logged and does not stop the ones after it.
    pub async fn run_all(
        &self,
        strategies: &[StrategyType],
    ) -> Vec<(StrategyType, Result<RunReport, LoadError>)> {
        let mut results = Vec::with_capacity(strategies.len());

        for &strategy in strategies {
            info!("{} load start", strategy);

            let result = self.run(strategy).await;
            if let Err(e) = &result {
                error!("{} load: {}", strategy, e);
            }

            info!("{} load end", strategy);
            results.push((strategy, result));
        }

        results
    }

    /// Run one strategy through the full state machine
    pub async fn run(&self, strategy_type: StrategyType) -> Result<RunReport, LoadError> {
        let strategy = create_strategy(strategy_type);
        let mut run = Run::new(strategy.name());
        let started_at = Utc::now();
        let clock = Instant::now();

        match self.execute(strategy.as_ref(), &mut run).await {
            Ok((summary, matches)) => Ok(RunReport {
                strategy: strategy_type,
                states: run.states,
                summary,
                matches,
                started_at,
                elapsed: clock.elapsed(),
            }),
            Err(e) => {
                error!(strategy = run.strategy, state = ?run.state(), "Run failed: {}", e);
                run.advance(RunState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        strategy: &dyn LoadStrategy,
        run: &mut Run,
    ) -> Result<(JoinSummary, Vec<Customer>), LoadError> {
        self.ctx.store.create_table().await?;
        run.advance(RunState::TableReady);

        let batches = self.prepare_batches(strategy)?;
        run.advance(RunState::Partitioned);

        let pending = strategy.dispatch(&self.ctx, batches).await?;
        if pending.is_empty() {
            debug!(strategy = run.strategy, "Sub-batches ran inline, nothing in flight");
        } else {
            info!(strategy = run.strategy, in_flight = pending.len(), "Sub-batches dispatched");
        }
        run.advance(RunState::Dispatched);

        let summary = pending.join(self.join_timeout).await?;
        info!(
            strategy = run.strategy,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "All sub-batches finished"
        );
        run.advance(RunState::Joined);

        let search = &self.load.search_first_name;
        info!("Customers with firstName='{}': ", search);
        let mut matches = Vec::new();
        self.ctx
            .store
            .for_each_by_first_name(search, |customer| {
                info!("{}", customer);
                matches.push(customer);
            })
            .await?;
        run.advance(RunState::Queried);

        run.advance(RunState::Done);
        Ok((summary, matches))
    }

    /// Split the raw names and cut them into the strategy's sub-batches
    fn prepare_batches(&self, strategy: &dyn LoadStrategy) -> Result<Vec<SubBatch>, LoadError> {
        info!("Raw names: {:?}", self.load.names);

        let fragments = split_names(&self.load.names)?;
        for fragment in &fragments {
            info!("Source data: {}, {}", fragment.first_name, fragment.last_name);
        }

        let count = strategy.partitions(self.load.partitions);
        let batches = partition(&fragments, count)?
            .into_iter()
            .enumerate()
            .map(|(index, rows)| SubBatch { index, rows })
            .collect();

        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        NameFragment,
        config::{DatabaseConfig, TempDatabase},
        error::StoreError,
        pool::WorkerPool,
        store::RecordStore,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    async fn orchestrator_with(config: DatabaseConfig, load: LoadConfig) -> Orchestrator {
        let store = Arc::new(RecordStore::connect(&config).await.unwrap());
        let pool = Arc::new(WorkerPool::new(4));
        Orchestrator::new(DispatchContext { store, pool }, load, None)
    }

    async fn default_orchestrator() -> Orchestrator {
        orchestrator_with(DatabaseConfig::in_memory(), LoadConfig::default()).await
    }

    /// Column width of 4 rejects "Bloch", which lives in the second sub-batch
    async fn narrow_orchestrator() -> Orchestrator {
        let config = DatabaseConfig {
            column_width: 4,
            ..DatabaseConfig::in_memory()
        };
        orchestrator_with(config, LoadConfig::default()).await
    }

    fn stored_names(customers: &[Customer]) -> HashSet<(String, String)> {
        customers
            .iter()
            .map(|c| (c.first_name.clone(), c.last_name.clone()))
            .collect()
    }

    fn expected_names() -> HashSet<(String, String)> {
        [("John", "Woo"), ("Jeff", "Dean"), ("Josh", "Bloch"), ("Josh", "Long")]
            .iter()
            .map(|(f, l)| (f.to_string(), l.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_sequential_run_walks_every_state() {
        let orchestrator = default_orchestrator().await;

        let report = orchestrator.run(StrategyType::Sequential).await.unwrap();

        assert_eq!(
            report.states,
            vec![
                RunState::Init,
                RunState::TableReady,
                RunState::Partitioned,
                RunState::Dispatched,
                RunState::Joined,
                RunState::Queried,
                RunState::Done,
            ]
        );
        assert_eq!(report.summary, JoinSummary { succeeded: 1, failed: 0 });
        assert_eq!(
            report.matches,
            vec![
                Customer { id: 1003, first_name: "Josh".into(), last_name: "Bloch".into() },
                Customer { id: 1004, first_name: "Josh".into(), last_name: "Long".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_run_inserts_every_row_once() {
        let orchestrator = default_orchestrator().await;

        let report = orchestrator.run(StrategyType::Concurrent).await.unwrap();
        assert_eq!(report.summary, JoinSummary { succeeded: 2, failed: 0 });

        let all = orchestrator.ctx.store.find_all().await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(stored_names(&all), expected_names());

        let ids: HashSet<i64> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, (1001..=1004).collect());

        let josh: HashSet<String> = report.matches.iter().map(|c| c.last_name.clone()).collect();
        assert_eq!(josh, ["Bloch".to_string(), "Long".to_string()].into_iter().collect());
    }

    #[tokio::test]
    async fn test_async_run_inserts_every_row_once() {
        let orchestrator = default_orchestrator().await;

        let report = orchestrator.run(StrategyType::Async).await.unwrap();
        assert_eq!(report.summary, JoinSummary { succeeded: 2, failed: 0 });
        assert_eq!(report.matches.len(), 2);

        let all = orchestrator.ctx.store.find_all().await.unwrap();
        assert_eq!(stored_names(&all), expected_names());
    }

    #[tokio::test]
    async fn test_concurrent_failure_is_isolated() {
        let orchestrator = narrow_orchestrator().await;

        let report = orchestrator.run(StrategyType::Concurrent).await.unwrap();

        assert_eq!(report.summary, JoinSummary { succeeded: 1, failed: 1 });
        assert!(report.matches.is_empty());

        let all = orchestrator.ctx.store.find_all().await.unwrap();
        assert_eq!(
            all.iter().map(|c| NameFragment::new(c.first_name.clone(), c.last_name.clone())).collect::<Vec<_>>(),
            vec![NameFragment::new("John", "Woo"), NameFragment::new("Jeff", "Dean")]
        );
    }

    #[tokio::test]
    async fn test_async_failure_fails_run_after_all_resolved() {
        let orchestrator = narrow_orchestrator().await;

        let err = orchestrator.run(StrategyType::Async).await.unwrap_err();

        assert!(matches!(err, LoadError::AsyncInsert { failed: 1, total: 2 }));
        // The sibling sub-batch committed before the run was failed
        assert_eq!(orchestrator.ctx.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sequential_failure_aborts_run() {
        let orchestrator = narrow_orchestrator().await;

        let err = orchestrator.run(StrategyType::Sequential).await.unwrap_err();

        assert!(matches!(err, LoadError::Store(StoreError::BatchInsert { .. })));
        assert_eq!(orchestrator.ctx.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_name_fails_before_dispatch() {
        let load = LoadConfig {
            names: vec!["John Woo".into(), "Madonna".into()],
            ..LoadConfig::default()
        };
        let orchestrator = orchestrator_with(DatabaseConfig::in_memory(), load).await;

        let err = orchestrator.run(StrategyType::Concurrent).await.unwrap_err();

        assert!(matches!(err, LoadError::Partition(_)));
        assert_eq!(orchestrator.ctx.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_all_continues_after_a_failed_strategy() {
        let orchestrator = narrow_orchestrator().await;

        let results = orchestrator
            .run_all(&[StrategyType::Sequential, StrategyType::Concurrent])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }

    #[tokio::test]
    async fn test_run_all_resets_table_between_strategies() {
        let orchestrator = default_orchestrator().await;

        let results = orchestrator
            .run_all(&[StrategyType::Sequential, StrategyType::Concurrent, StrategyType::Async])
            .await;

        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert_eq!(orchestrator.ctx.store.count().await.unwrap(), 4);
        assert_eq!(orchestrator.ctx.pool.outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_database_run_all_inserts_each_row_once() {
        let temp = TempDatabase::new("run_all");
        let orchestrator = orchestrator_with(temp.config.clone(), LoadConfig::default()).await;
        let store = orchestrator.ctx.store.clone();

        for strategy in [StrategyType::Sequential, StrategyType::Concurrent, StrategyType::Async] {
            let results = orchestrator.run_all(&[strategy]).await;
            let report = results[0].1.as_ref().unwrap();
            assert_eq!(report.matches.len(), 2);

            let all = store.find_all().await.unwrap();
            assert_eq!(all.len(), 4);
            assert_eq!(stored_names(&all), expected_names());
            let ids: HashSet<i64> = all.iter().map(|c| c.id).collect();
            assert_eq!(ids, (1001..=1004).collect());
        }

        store.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_database_many_partitions_stay_distinct() {
        let temp = TempDatabase::new("many_partitions");
        let load = LoadConfig {
            names: (0..200).map(|i| format!("First{i} Last{i}")).collect(),
            partitions: 4,
            ..LoadConfig::default()
        };
        let orchestrator = orchestrator_with(temp.config.clone(), load).await;

        for _ in 0..3 {
            let results = orchestrator
                .run_all(&[StrategyType::Concurrent, StrategyType::Async])
                .await;
            for (_, result) in &results {
                assert_eq!(
                    result.as_ref().unwrap().summary,
                    JoinSummary { succeeded: 4, failed: 0 }
                );
            }

            let all = orchestrator.ctx.store.find_all().await.unwrap();
            let distinct: HashSet<(String, String)> = stored_names(&all);
            assert_eq!(distinct.len(), 200);
            assert_eq!(all.first().map(|c| c.id), Some(1001));
            assert_eq!(all.last().map(|c| c.id), Some(1200));
        }

        orchestrator.ctx.store.close().await;
    }
}
