use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
};

use serde::Serialize;

use crate::{
    algo::{Agent, AgentKind, Hyperparameters},
    env::{Environment, GridConfig, GridWorld, Pos},
    error::SessionError,
};

/// A training request
#[derive(Debug, Clone)]
pub struct Job {
    pub grid: GridConfig,
    pub agent: AgentKind,
    pub params: Hyperparameters,
    pub episodes: u32,
    /// Tables are saved here once training completes
    pub save_dir: Option<PathBuf>,
    /// Step cap of the replay that follows training
    pub replay_steps: u32,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            agent: AgentKind::Random,
            params: Hyperparameters::default(),
            episodes: 100,
            save_dir: None,
            replay_steps: 50,
        }
    }
}

/// Snapshot of the current or most recent job
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    /// Positions visited by the post-training replay
    pub positions: Vec<Pos>,
    pub errors: Vec<f64>,
    pub goals: Vec<Pos>,
    pub obstacles: Vec<Pos>,
    pub size: usize,
    pub training_complete: bool,
    pub current_episode: u32,
    pub total_episodes: u32,
    pub agent_name: String,
    /// Why the last job stopped early, if it did
    pub error: Option<String>,
}

/// Runs at most one training job at a time on a background thread
///
/// Progress is published into a shared [`Status`] that can be polled from any thread.
#[derive(Debug, Clone, Default)]
pub struct TrainingSession {
    status: Arc<Mutex<Status>>,
    active: Arc<AtomicBool>,
}

/// Clears the active flag when the worker exits, including by panic
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TrainingSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        lock(&self.status)
    }

    /// Whether a job is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start `job` on a new thread
    ///
    /// The environment and agent are built before the thread starts, so a bad
    /// configuration is reported here and leaves the session idle.
    pub fn start(&self, job: Job) -> Result<JoinHandle<()>, SessionError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }
        let guard = ActiveGuard(self.active.clone());

        let mut env = GridWorld::new(job.grid.clone())?;
        let mut agent = job.agent.build(&env, &job.params)?;

        *self.lock() = Status {
            goals: env.goals().collect(),
            obstacles: env.obstacles().collect(),
            size: env.size(),
            total_episodes: job.episodes,
            agent_name: agent.name().to_string(),
            ..Default::default()
        };

        let status = self.status.clone();
        let handle = thread::spawn(move || {
            let _guard = guard;
            run_job(&status, &mut env, agent.as_mut(), &job);
        });

        Ok(handle)
    }

    /// A consistent copy of the current status
    pub fn status(&self) -> Status {
        self.lock().clone()
    }

    /// Clear the results of the last job
    ///
    /// Does nothing while a job is running.
    pub fn reset(&self) -> bool {
        if self.is_active() {
            return false;
        }
        let mut status = self.lock();
        status.positions.clear();
        status.errors.clear();
        status.training_complete = false;
        status.current_episode = 0;
        status.error = None;
        true
    }
}

fn lock(status: &Mutex<Status>) -> MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Train, save and replay, publishing into `status` as each stage finishes
///
/// A training error or panic marks the job complete with [`Status::error`] set.
fn run_job(status: &Mutex<Status>, env: &mut GridWorld, agent: &mut dyn Agent, job: &Job) {
    let name = agent.name();
    log::info!("Starting {name} training for {} episodes", job.episodes);

    let result = panic::catch_unwind(AssertUnwindSafe(|| agent.train(env, job.episodes)));
    let training = match result {
        Ok(Ok(training)) => training,
        Ok(Err(e)) => return fail(status, format!("training failed: {e}")),
        Err(payload) => {
            let message = format!("training panicked: {}", panic_message(&*payload));
            return fail(status, message);
        }
    };

    {
        let mut status = lock(status);
        status.errors = training.errors;
        status.training_complete = true;
        status.current_episode = job.episodes;
    }
    log::info!("{name} training completed");

    if let Some(dir) = &job.save_dir {
        match agent.save_tables(dir) {
            Ok(()) => log::info!("{name} tables saved to {}", dir.display()),
            Err(e) => log::warn!("Saving {name} tables failed: {e}"),
        }
    }

    let mut state = env.reset();
    for step in 0..job.replay_steps {
        let outcome = env.step(agent.choose_action(state));
        lock(status).positions.push(outcome.next_state);
        state = outcome.next_state;

        if outcome.terminated {
            log::info!("Goal reached in {} steps", step + 1);
            break;
        }
        if outcome.truncated {
            break;
        }
    }
    log::debug!("Replay finished");
}

fn fail(status: &Mutex<Status>, message: String) {
    log::error!("{message}");
    let mut status = lock(status);
    status.training_complete = true;
    status.error = Some(message);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown cause"
    }
}
