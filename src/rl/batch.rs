//! Several environments stepped concurrently, one blocking worker per environment

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::task::{JoinError, spawn_blocking};
use tracing::{debug, warn};

use crate::sim::{GrowthSimulator, IlandBridge};

use super::action_space::Action;
use super::config::{EnvConfig, SimulatorConfig};
use super::encoder::Observation;
use super::env::{EnvError, Environment, ForestEnv, StepResult};
use super::metrics::EpisodeMetrics;

/// Errors carry the environment's process index, not its position in the batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("expected {expected} actions, got {got}")]
    ActionCount { expected: usize, got: usize },
    #[error("environment {process} failed: {source}")]
    Env {
        process: usize,
        #[source]
        source: EnvError,
    },
    /// The environment stays in the batch, closed; the next reset starts it over.
    #[error("environment {process} panicked; its episode was discarded")]
    Panicked { process: usize },
    #[error("worker for environment {process} did not finish: {source}")]
    Worker {
        process: usize,
        #[source]
        source: JoinError,
    },
}

type Slot<S> = Arc<Mutex<ForestEnv<S>>>;

/// Environments live in fixed slots for the lifetime of the batch. A worker only
/// borrows its slot, so a panic or a dropped future never removes an environment.
pub struct BatchEnv<S = IlandBridge>
where
    S: GrowthSimulator + Send + 'static,
{
    slots: Vec<Slot<S>>,
    processes: Vec<usize>,
    metrics: Arc<Mutex<EpisodeMetrics>>,
}

impl BatchEnv<IlandBridge> {
    /// `count` environments with process indices `0..count`. Seeds are offset per environment.
    pub fn from_config(
        config: &EnvConfig,
        simulator: &SimulatorConfig,
        count: usize,
    ) -> Result<Self, EnvError> {
        let envs = (0..count)
            .map(|index| {
                let mut config = config.clone();
                config.seed = config.seed.map(|s| s.wrapping_add(index as u64));
                ForestEnv::from_config(config, simulator, index)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(envs))
    }
}

impl<S> BatchEnv<S>
where
    S: GrowthSimulator + Send + 'static,
{
    pub fn new(envs: Vec<ForestEnv<S>>) -> Self {
        Self {
            processes: envs.iter().map(|env| env.process_index()).collect(),
            slots: envs.into_iter().map(|env| Arc::new(Mutex::new(env))).collect(),
            metrics: Arc::new(Mutex::new(EpisodeMetrics::default())),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.slots.len()
    }

    /// Process indices, in batch order.
    pub fn processes(&self) -> &[usize] {
        &self.processes
    }

    /// Environment at batch position `position`. Blocks while a worker still holds it.
    pub fn env(&self, position: usize) -> Option<MutexGuard<'_, ForestEnv<S>>> {
        self.slots.get(position).map(|slot| lock(slot))
    }

    pub fn metrics(&self) -> MutexGuard<'_, EpisodeMetrics> {
        lock(&self.metrics)
    }

    /// Reset all environments; the environment with process index `p` gets `seed + p`.
    pub async fn reset_all(&mut self, seed: Option<u64>) -> Vec<Result<Observation, BatchError>> {
        self.dispatch(move |_, env| {
            let seed = seed.map(|s| s.wrapping_add(env.process_index() as u64));
            env.reset(seed)
        })
        .await
    }

    /// Step every environment with its action, concurrently. Finished episodes are
    /// recorded in the metrics as soon as their worker returns.
    pub async fn step_all(
        &mut self,
        actions: &[Action],
    ) -> Result<Vec<Result<StepResult, BatchError>>, BatchError> {
        if actions.len() != self.slots.len() {
            return Err(BatchError::ActionCount {
                expected: self.slots.len(),
                got: actions.len(),
            });
        }
        let actions = actions.to_vec();
        let metrics = Arc::clone(&self.metrics);
        let results = self
            .dispatch(move |position, env| {
                let result = env.step(&actions[position])?;
                if let Some(summary) = &result.info.episode {
                    let mut metrics = lock(&metrics);
                    metrics.record(summary);
                    metrics.log_to_console();
                }
                Ok(result)
            })
            .await;
        Ok(results)
    }

    /// Close every environment; reports the first failure after all have been tried.
    pub async fn close_all(&mut self) -> Result<(), BatchError> {
        self.dispatch(|_, env| env.close())
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map(|_| ())
    }

    /// Run `work` on every environment in its own blocking task. Outputs come back
    /// in batch order, one per environment, whatever happened to the others.
    async fn dispatch<T, F>(&mut self, work: F) -> Vec<Result<T, BatchError>>
    where
        T: Send + 'static,
        F: Fn(usize, &mut ForestEnv<S>) -> Result<T, EnvError> + Clone + Send + 'static,
    {
        let handles: Vec<_> = self
            .slots
            .iter()
            .enumerate()
            .map(|(position, slot)| {
                let slot = Arc::clone(slot);
                let work = work.clone();
                spawn_blocking(move || run_slot(&slot, position, work))
            })
            .collect();
        debug!(workers = handles.len(), "Dispatched batch");

        let mut outputs = Vec::with_capacity(handles.len());
        for (handle, &process) in handles.into_iter().zip(&self.processes) {
            outputs.push(match handle.await {
                Ok(output) => output,
                Err(source) => Err(BatchError::Worker { process, source }),
            });
        }
        outputs
    }
}

fn run_slot<S, T, F>(slot: &Mutex<ForestEnv<S>>, position: usize, work: F) -> Result<T, BatchError>
where
    S: GrowthSimulator,
    F: Fn(usize, &mut ForestEnv<S>) -> Result<T, EnvError>,
{
    let mut env = lock(slot);
    let process = env.process_index();
    match panic::catch_unwind(AssertUnwindSafe(|| work(position, &mut *env))) {
        Ok(output) => output.map_err(|source| BatchError::Env { process, source }),
        Err(_) => {
            warn!(process, "Environment panicked, closing it");
            if let Err(e) = env.close() {
                warn!(process, error = %e, "Failed to release workspace after panic");
            }
            Err(BatchError::Panicked { process })
        }
    }
}

/// A poisoned lock still guards a usable value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::env::testing::{MockSimulator, Scripted, action_for, cells, scenario_config, workspace_manager};
    use tempfile::tempdir;

    fn batch_of(dir: &std::path::Path, scripts: &[Scripted], config: EnvConfig) -> BatchEnv<MockSimulator> {
        let envs = scripts
            .iter()
            .enumerate()
            .map(|(index, &script)| {
                ForestEnv::new(config.clone(), MockSimulator::new(script), workspace_manager(dir), index).unwrap()
            })
            .collect();
        BatchEnv::new(envs)
    }

    fn batch(dir: &std::path::Path, count: usize, config: EnvConfig) -> BatchEnv<MockSimulator> {
        batch_of(dir, &vec![Scripted::Mass(100.0); count], config)
    }

    fn all_ok<T>(outputs: Vec<Result<T, BatchError>>) -> Vec<T> {
        outputs.into_iter().collect::<Result<Vec<_>, _>>().unwrap()
    }

    fn first_open_cells(batch: &BatchEnv<MockSimulator>) -> Vec<Action> {
        (0..batch.batch_size())
            .map(|i| action_for(cells(batch.env(i).unwrap().keepout(), true)[0], 100, 0.0))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_step_all_keeps_order_and_records_episodes() {
        let temp = tempdir().unwrap();
        let config = EnvConfig {
            total_seedlings: 1,
            ..scenario_config()
        };
        let mut batch = batch(temp.path(), 3, config);
        let observations = all_ok(batch.reset_all(Some(11)).await);
        assert_eq!(observations.len(), 3);

        let actions = first_open_cells(&batch);
        let results = all_ok(batch.step_all(&actions).await.unwrap());

        assert_eq!(results.len(), 3);
        assert_eq!(batch.batch_size(), 3);
        assert_eq!(batch.processes(), &[0, 1, 2]);
        for (index, result) in results.iter().enumerate() {
            assert_eq!(batch.env(index).unwrap().process_index(), index);
            assert!(result.terminated);
            assert!((result.reward - 50.0).abs() < 1e-4);
        }
        assert_eq!(batch.metrics().episodes, 3);
        assert!((batch.metrics().carbon.average() - 50.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_workspaces_are_disjoint() {
        let temp = tempdir().unwrap();
        let mut batch = batch(temp.path(), 2, scenario_config());
        all_ok(batch.reset_all(None).await);

        let a = batch.env(0).unwrap().workspace().cloned().unwrap();
        let b = batch.env(1).unwrap().workspace().cloned().unwrap();
        assert_ne!(a.directory, b.directory);
        assert_ne!(a.config_path, b.config_path);
        assert_ne!(a.output_db_path, b.output_db_path);
        assert_ne!(a.seedling_file_path, b.seedling_file_path);
    }

    #[tokio::test]
    async fn test_action_count_mismatch() {
        let temp = tempdir().unwrap();
        let mut batch = batch(temp.path(), 2, scenario_config());
        all_ok(batch.reset_all(None).await);
        let err = batch.step_all(&[Action::Continuous([0.0; 3])]).await.unwrap_err();
        assert!(matches!(err, BatchError::ActionCount { expected: 2, got: 1 }));
        assert_eq!(batch.batch_size(), 2);
    }

    #[tokio::test]
    async fn test_env_errors_carry_process_index() {
        let temp = tempdir().unwrap();
        let envs = (3..5)
            .map(|index| {
                ForestEnv::new(
                    scenario_config(),
                    MockSimulator::new(Scripted::Mass(1.0)),
                    workspace_manager(temp.path()),
                    index,
                )
                .unwrap()
            })
            .collect();
        let mut batch = BatchEnv::new(envs);
        let outputs = batch
            .step_all(&[Action::Continuous([0.0; 3]), Action::Continuous([0.0; 3])])
            .await
            .unwrap();
        assert!(matches!(outputs[0], Err(BatchError::Env { process: 3, source: EnvError::NotReady })));
        assert!(matches!(outputs[1], Err(BatchError::Env { process: 4, source: EnvError::NotReady })));
        assert_eq!(batch.batch_size(), 2);

        batch.close_all().await.unwrap();
        assert!((0..2).all(|i| batch.env(i).unwrap().workspace().is_none()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_simulator_keeps_batch_intact() {
        let temp = tempdir().unwrap();
        let config = EnvConfig {
            total_seedlings: 1,
            ..scenario_config()
        };
        let scripts = [Scripted::Mass(100.0), Scripted::Panic, Scripted::Mass(100.0)];
        let mut batch = batch_of(temp.path(), &scripts, config.clone());
        all_ok(batch.reset_all(Some(5)).await);
        let panicked_dir = batch.env(1).unwrap().workspace().unwrap().directory.clone();

        let actions = first_open_cells(&batch);
        let outputs = batch.step_all(&actions).await.unwrap();

        assert!(matches!(outputs[1], Err(BatchError::Panicked { process: 1 })));
        assert!(outputs[0].as_ref().unwrap().terminated);
        assert!(outputs[2].as_ref().unwrap().terminated);
        assert_eq!(batch.metrics().episodes, 2);

        assert_eq!(batch.processes(), &[0, 1, 2]);
        assert!(batch.env(1).unwrap().workspace().is_none());
        assert!(!panicked_dir.exists());

        // Seeds still follow process indices after the panic.
        let observations = batch.reset_all(Some(5)).await;
        assert!(observations.iter().all(Result::is_ok));
        let other = tempdir().unwrap();
        let mut fresh = ForestEnv::new(
            config,
            MockSimulator::new(Scripted::Mass(1.0)),
            workspace_manager(other.path()),
            2,
        )
        .unwrap();
        fresh.reset(Some(7)).unwrap();
        assert_eq!(batch.env(2).unwrap().keepout(), fresh.keepout());
    }
}
