//! Scheduler engine: the main loop that checks and triggers tasks.
//! Uses tokio::interval for ticking (sleeps between checks).
//!
//! Task list and trigger registry sit behind one async mutex. A firing marks the
//! task in flight under the lock, runs the action with the lock released, then
//! re-takes the lock to record the outcome and re-arm.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use agentdesk_core::{DispatchError, ResolutionError, SchedulerConfig, SchedulerError, StoreBackend};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{PlannedTask, SchedulerStats, TaskDescriptor, TaskUpdate};
use crate::clock::{Clock, SystemClock};
use crate::condition;
use crate::dispatch::{ActionDispatcher, Collaborators, WebhookActionRunner};
use crate::persistence::SqliteTaskStore;
use crate::recurrence;
use crate::store::{JsonTaskStore, TaskRecordStore};
use crate::tasks::{Action, NextExecution, Schedule, Task, TaskStatus, Timestamp};
use crate::triggers::{Trigger, TriggerRegistry};

/// Outcome of one firing, as returned by a tick.
#[derive(Debug, Clone)]
pub struct FiringReport {
    pub task_id: String,
    pub name: String,
    pub outcome: Result<String, DispatchError>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    tasks: Vec<Task>,
    triggers: TriggerRegistry,
    /// Tasks whose action is currently running.
    in_flight: HashSet<String>,
    /// In-flight tasks skipped by a re-arm; their firing re-arms them on completion.
    detached: HashSet<String>,
    /// Suffix counter for generated ids.
    seq: u64,
}

impl SchedulerState {
    fn next_id(&mut self, now: Timestamp) -> String {
        loop {
            let id = format!("task_{}_{}", now.format("%Y%m%d_%H%M%S"), self.seq);
            self.seq += 1;
            if !self.tasks.iter().any(|t| t.id == id) {
                return id;
            }
        }
    }
}

/// A task picked for firing in the current tick.
struct Firing {
    task_id: String,
    name: String,
    action: Action,
    revision: u64,
}

struct Core {
    state: Mutex<SchedulerState>,
    store: Arc<dyn TaskRecordStore>,
    dispatcher: ActionDispatcher,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    condition_interval: chrono::Duration,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns tasks and triggers, fires due tasks.
pub struct Scheduler {
    core: Arc<Core>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    /// Load tasks from `store` and arm their triggers. The background loop is
    /// not started; call [`Scheduler::start`].
    pub fn open(
        store: Arc<dyn TaskRecordStore>,
        dispatcher: ActionDispatcher,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let tasks = store.load_all()?;
        let now = clock.now();
        let mut state = SchedulerState {
            seq: tasks.len() as u64,
            tasks,
            ..SchedulerState::default()
        };
        if rearm_all(&mut state, now) {
            store.replace_all(&state.tasks)?;
        }
        tracing::info!(
            "📅 Scheduler loaded {} tasks ({} armed)",
            state.tasks.len(),
            state.triggers.len()
        );

        let condition_interval = chrono::Duration::from_std(config.condition_interval())
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        Ok(Self {
            core: Arc::new(Core {
                state: Mutex::new(state),
                store,
                dispatcher,
                clock,
                tick_interval: config.tick_interval(),
                condition_interval,
            }),
            worker: Mutex::new(None),
        })
    }

    /// Build a scheduler from configuration: configured store backend,
    /// simulated collaborators, wall clock.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let store = open_store(config)?;
        let mut collaborators = Collaborators::simulated(config.simulated_delay());
        if config.webhook_custom_actions {
            collaborators =
                collaborators.with_custom(Arc::new(WebhookActionRunner::new(config.dispatch_timeout())));
        }
        let dispatcher = ActionDispatcher::new(collaborators, config.dispatch_timeout());
        Self::open(store, dispatcher, Arc::new(SystemClock), config)
    }

    /// Spawn the tick loop. Re-arms every enabled task first, so a scheduler
    /// that was stopped picks up where the task list left off.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        self.core.rearm().await;

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.core.clone(), rx));
        *worker = Some(Worker { shutdown, handle });
        tracing::info!(
            "⏰ Scheduler started (tick every {}s)",
            self.core.tick_interval.as_secs()
        );
    }

    /// Stop the tick loop and drop every live trigger. Persisted tasks are untouched.
    pub async fn stop(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                tracing::warn!("⚠️ Scheduler loop ended abnormally: {e}");
            }
        }
        self.core.state.lock().await.triggers.clear();
        tracing::info!("🛑 Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Validate, resolve and persist a new task.
    ///
    /// Shape problems in the descriptor are rejected. A schedule the resolver
    /// cannot compute is still stored, disabled, with the error in `next_execution`.
    pub async fn plan_task(&self, descriptor: TaskDescriptor) -> Result<PlannedTask, SchedulerError> {
        let schedule = Schedule::from_config(descriptor.schedule_type, &descriptor.schedule_config)?;
        let action = Action::from_target(descriptor.action_type, &descriptor.target)?;
        check_max_executions(descriptor.max_executions)?;

        let now = self.core.clock.now();
        let mut state = self.core.state.lock().await;
        let mut task = Task {
            id: state.next_id(now),
            name: descriptor
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Untitled task".into()),
            description: descriptor.description.unwrap_or_default(),
            action,
            schedule,
            status: TaskStatus::Planned,
            created_at: now,
            next_execution: None,
            last_execution: None,
            execution_count: 0,
            max_executions: descriptor.max_executions,
            enabled: true,
            last_error: None,
        };
        let trigger = resolve(&mut task, now);
        self.core.store.put(&task)?;

        install(&mut state.triggers, &task, trigger);
        tracing::info!(
            "📅 Task planned: '{}' ({}) next: {}",
            task.name,
            task.id,
            task.next_execution.as_ref().map(ToString::to_string).unwrap_or_default()
        );
        let planned = PlannedTask {
            task_id: task.id.clone(),
            name: task.name.clone(),
            next_execution: task.next_execution.clone(),
        };
        state.tasks.push(task);
        Ok(planned)
    }

    /// All tasks, optionally filtered by status.
    pub async fn get_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let state = self.core.state.lock().await;
        state
            .tasks
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect()
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        let state = self.core.state.lock().await;
        state.tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Apply `update`. Returns `Ok(false)` if the task does not exist.
    ///
    /// The new version is persisted before it replaces the in-memory task and
    /// its trigger, so a failed write leaves the old schedule fully in place.
    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<bool, SchedulerError> {
        let now = self.core.clock.now();
        let mut state = self.core.state.lock().await;
        let SchedulerState { tasks, triggers, .. } = &mut *state;
        let Some(idx) = tasks.iter().position(|t| t.id == id) else {
            return Ok(false);
        };

        let mut next = tasks[idx].clone();
        if let Some(name) = update.name {
            next.name = name;
        }
        if let Some(description) = update.description {
            next.description = description;
        }
        if let Some(max) = update.max_executions {
            check_max_executions(max)?;
            next.max_executions = max;
        }
        if let Some(target) = &update.target {
            next.action = Action::from_target(next.action_type(), target)?;
        }

        let mut rearm = false;
        if let Some(config) = &update.schedule_config {
            next.schedule = Schedule::from_config(next.schedule_type(), config)?;
            rearm = true;
        }
        if let Some(enabled) = update.enabled {
            if enabled && next.cap_reached() {
                return Err(SchedulerError::Configuration(format!(
                    "Task '{}' reached max_executions ({}); raise it before enabling",
                    next.name, next.max_executions
                )));
            }
            if enabled && !next.schedule.repeats() && next.execution_count > 0 {
                return Err(SchedulerError::Configuration(format!(
                    "Task '{}' is a single-run {} task and has already fired",
                    next.name,
                    next.schedule_type()
                )));
            }
            if enabled != next.enabled {
                next.enabled = enabled;
                rearm = true;
            }
        }
        if next.enabled && next.cap_reached() {
            next.enabled = false;
            rearm = true;
        }

        // A schedule that cannot be resolved rejects the update only if it
        // would leave the task enabled.
        let trigger = if rearm {
            match arm(&mut next, now) {
                Ok(trigger) => trigger,
                Err(e) if next.enabled => return Err(e.into()),
                Err(e) => {
                    next.next_execution = Some(NextExecution::Error(e.to_string()));
                    None
                }
            }
        } else {
            None
        };
        self.core.store.put(&next)?;

        if rearm {
            install(triggers, &next, trigger);
        }
        tracing::info!("✏️ Task updated: '{}' ({})", next.name, next.id);
        tasks[idx] = next;
        Ok(true)
    }

    /// Remove the stored record and the live trigger.
    pub async fn delete_task(&self, id: &str) -> Result<bool, SchedulerError> {
        let mut state = self.core.state.lock().await;
        let Some(idx) = state.tasks.iter().position(|t| t.id == id) else {
            return Ok(false);
        };
        self.core.store.remove(id)?;
        let task = state.tasks.remove(idx);
        state.triggers.remove(id);
        tracing::info!("🗑️ Task deleted: '{}' ({})", task.name, task.id);
        Ok(true)
    }

    pub async fn enable_task(&self, id: &str) -> Result<bool, SchedulerError> {
        self.update_task(id, TaskUpdate::enabled(true)).await
    }

    pub async fn disable_task(&self, id: &str) -> Result<bool, SchedulerError> {
        self.update_task(id, TaskUpdate::enabled(false)).await
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let running = self.is_running().await;
        let state = self.core.state.lock().await;
        let count = |status: TaskStatus| state.tasks.iter().filter(|t| t.status == status).count();
        SchedulerStats {
            total: state.tasks.len(),
            enabled: state.tasks.iter().filter(|t| t.enabled).count(),
            completed: count(TaskStatus::Completed),
            error: count(TaskStatus::Error),
            executing: state.in_flight.len(),
            running,
        }
    }

    /// The live trigger for a task, if it is armed.
    pub async fn trigger(&self, id: &str) -> Option<Trigger> {
        self.core.state.lock().await.triggers.get(id)
    }

    pub async fn armed_count(&self) -> usize {
        self.core.state.lock().await.triggers.len()
    }

    /// Run one tick against the scheduler's clock.
    pub async fn tick(&self) -> Vec<FiringReport> {
        let now = self.core.clock.now();
        self.core.tick_at(now).await
    }

    /// Run one tick as if the time were `now`.
    pub async fn tick_at(&self, now: Timestamp) -> Vec<FiringReport> {
        self.core.tick_at(now).await
    }
}

impl Core {
    async fn tick_at(&self, now: Timestamp) -> Vec<FiringReport> {
        let batch = self.collect_due(now).await;
        if batch.is_empty() {
            return Vec::new();
        }

        // Each action runs on its own tokio task; a panicking collaborator
        // becomes a dispatch error instead of taking the loop down.
        let handles: Vec<_> = batch
            .iter()
            .map(|firing| {
                let dispatcher = self.dispatcher.clone();
                let action = firing.action.clone();
                tokio::spawn(async move { dispatcher.dispatch(&action).await })
            })
            .collect();
        let mut outcomes = Vec::with_capacity(handles.len());
        for (firing, joined) in batch.iter().zip(futures::future::join_all(handles).await) {
            outcomes.push(joined.unwrap_or_else(|e| {
                Err(DispatchError::Failed {
                    action: firing.action.action_type().to_string(),
                    message: format!("collaborator aborted: {e}"),
                })
            }));
        }

        self.finish(batch, outcomes).await
    }

    /// Pick due tasks and move them into the firing state.
    async fn collect_due(&self, now: Timestamp) -> Vec<Firing> {
        let mut state = self.state.lock().await;
        let SchedulerState {
            tasks,
            triggers,
            in_flight,
            ..
        } = &mut *state;

        let mut due = triggers.due_at(now);
        for id in triggers.probes_due(now) {
            triggers.defer_probe(&id, now + self.condition_interval);
            if in_flight.contains(&id) {
                continue;
            }
            let holds = tasks.iter().find(|t| t.id == id).is_some_and(|t| match &t.schedule {
                Schedule::Conditional { condition } => condition::evaluate(condition, now),
                _ => false,
            });
            if holds {
                due.push(id);
            }
        }
        due.sort();

        let mut batch = Vec::new();
        for id in due {
            if in_flight.contains(&id) {
                continue;
            }
            let Some(revision) = triggers.revision(&id) else {
                continue;
            };
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                triggers.remove(&id);
                continue;
            };
            if !task.enabled {
                triggers.remove(&id);
                continue;
            }

            task.status = TaskStatus::Executing;
            task.last_execution = Some(now);
            task.execution_count += 1;
            in_flight.insert(id.clone());
            tracing::info!(
                "🔔 Task triggered: '{}' ({}) run #{}",
                task.name,
                task.id,
                task.execution_count
            );
            if let Err(e) = self.store.put(task) {
                tracing::warn!("⚠️ Failed to persist firing of '{}': {e}", task.id);
            }
            batch.push(Firing {
                task_id: id,
                name: task.name.clone(),
                action: task.action.clone(),
                revision,
            });
        }
        batch
    }

    /// Record outcomes and re-arm or retire each fired task.
    async fn finish(
        &self,
        batch: Vec<Firing>,
        outcomes: Vec<Result<String, DispatchError>>,
    ) -> Vec<FiringReport> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let SchedulerState {
            tasks,
            triggers,
            in_flight,
            detached,
            ..
        } = &mut *state;

        let mut reports = Vec::with_capacity(batch.len());
        for (firing, outcome) in batch.into_iter().zip(outcomes) {
            in_flight.remove(&firing.task_id);
            let expected = if detached.remove(&firing.task_id) {
                None
            } else {
                Some(firing.revision)
            };
            match tasks.iter_mut().find(|t| t.id == firing.task_id) {
                Some(task) => {
                    match &outcome {
                        Ok(output) => tracing::info!("✅ Task '{}' completed: {}", task.name, output),
                        Err(e) => tracing::warn!("⚠️ Task '{}' failed: {e}", task.name),
                    }
                    settle(task, triggers, expected, &outcome, now);
                    if let Err(e) = self.store.put(task) {
                        tracing::warn!("⚠️ Failed to persist outcome of '{}': {e}", task.id);
                    }
                }
                None => tracing::debug!(
                    "Task {} was deleted while firing; dropping outcome",
                    firing.task_id
                ),
            }
            reports.push(FiringReport {
                task_id: firing.task_id,
                name: firing.name,
                outcome,
            });
        }
        reports
    }

    async fn rearm(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if rearm_all(&mut state, now) {
            if let Err(e) = self.store.replace_all(&state.tasks) {
                tracing::warn!("⚠️ Failed to persist re-armed tasks: {e}");
            }
        }
    }
}

/// Open the store configured in `config`.
pub fn open_store(config: &SchedulerConfig) -> Result<Arc<dyn TaskRecordStore>, SchedulerError> {
    let dir = config.data_dir();
    Ok(match config.store {
        StoreBackend::Json => Arc::new(JsonTaskStore::new(&dir)?),
        StoreBackend::Sqlite => Arc::new(SqliteTaskStore::open(&dir.join("tasks.db"))?),
    })
}

/// Tasks as persisted, without recovery or re-arming.
///
/// Inspecting a store never writes to it, so this is safe while another
/// process runs a [`Scheduler`] on the same data dir.
#[derive(Debug, Clone, Default)]
pub struct StoredTasks {
    tasks: Vec<Task>,
}

impl StoredTasks {
    pub fn load(store: &dyn TaskRecordStore) -> Result<Self, SchedulerError> {
        Ok(Self {
            tasks: store.load_all()?,
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::load(open_store(config)?.as_ref())
    }

    pub fn get_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect()
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Counts from stored state. `executing` counts tasks persisted as
    /// `Executing`; `running` is always false.
    pub fn stats(&self) -> SchedulerStats {
        let count = |status: TaskStatus| self.tasks.iter().filter(|t| t.status == status).count();
        SchedulerStats {
            total: self.tasks.len(),
            enabled: self.tasks.iter().filter(|t| t.enabled).count(),
            completed: count(TaskStatus::Completed),
            error: count(TaskStatus::Error),
            executing: count(TaskStatus::Executing),
            running: false,
        }
    }
}

async fn run_loop(core: Arc<Core>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(core.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = core.clock.now();
                core.tick_at(now).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn check_max_executions(max: i64) -> Result<(), SchedulerError> {
    if max == -1 || max > 0 {
        Ok(())
    } else {
        Err(SchedulerError::Configuration(format!(
            "max_executions must be -1 (unlimited) or positive, got {max}"
        )))
    }
}

/// Resolve `task`'s next occurrence and return the trigger to install.
/// An unresolvable schedule disables the task and records the error marker.
fn resolve(task: &mut Task, now: Timestamp) -> Option<Trigger> {
    match arm(task, now) {
        Ok(trigger) => trigger,
        Err(e) => {
            tracing::warn!("⚠️ Cannot schedule '{}' ({}): {e}", task.name, task.id);
            task.next_execution = Some(NextExecution::Error(e.to_string()));
            task.enabled = false;
            None
        }
    }
}

/// Compute and record `task`'s next occurrence. Returns the trigger to
/// install if the task is enabled; leaves the task untouched on error.
fn arm(task: &mut Task, now: Timestamp) -> Result<Option<Trigger>, ResolutionError> {
    let next = recurrence::compute_next(&task.schedule, now)?;
    let trigger = match &next {
        NextExecution::At(at) => Trigger::At(*at),
        _ => Trigger::Watch { next_probe: now },
    };
    task.next_execution = Some(next);
    Ok(task.enabled.then_some(trigger))
}

fn install(triggers: &mut TriggerRegistry, task: &Task, trigger: Option<Trigger>) {
    match trigger {
        Some(trigger) if task.enabled => {
            triggers.register(&task.id, trigger);
        }
        _ => {
            triggers.remove(&task.id);
        }
    }
}

/// Apply a firing outcome: status, then retire or re-arm.
fn settle(
    task: &mut Task,
    triggers: &mut TriggerRegistry,
    expected: Option<u64>,
    outcome: &Result<String, DispatchError>,
    now: Timestamp,
) {
    match outcome {
        Ok(_) => task.status = TaskStatus::Completed,
        Err(e) => {
            task.status = TaskStatus::Error;
            task.last_error = Some(e.to_string());
        }
    }

    if task.cap_reached() {
        task.enabled = false;
        triggers.remove(&task.id);
        tracing::info!("🏁 Task '{}' reached its execution limit", task.name);
        return;
    }
    // Re-registered or disabled while the action ran: the newer state wins.
    if triggers.revision(&task.id) != expected {
        return;
    }
    if task.schedule.repeats() {
        let trigger = resolve(task, now);
        install(triggers, task, trigger);
    } else {
        task.enabled = false;
        triggers.remove(&task.id);
        tracing::info!("🏁 Task '{}' finished (single run)", task.name);
    }
}

/// Re-register every task after load or restart. Returns whether any task changed.
fn rearm_all(state: &mut SchedulerState, now: Timestamp) -> bool {
    let SchedulerState {
        tasks,
        triggers,
        in_flight,
        detached,
        ..
    } = state;
    triggers.clear();
    let mut changed = false;

    for task in tasks.iter_mut() {
        if in_flight.contains(&task.id) {
            detached.insert(task.id.clone());
            continue;
        }
        if task.status == TaskStatus::Executing {
            task.status = TaskStatus::Error;
            task.last_error = Some("interrupted by restart".into());
            if !task.schedule.repeats() || task.cap_reached() {
                task.enabled = false;
            }
            changed = true;
        }
        if !task.enabled {
            continue;
        }

        match &task.schedule {
            // One-offs keep their instant; an overdue one fires on the next tick.
            Schedule::Datetime { datetime } => {
                let at = *datetime;
                if task.next_execution != Some(NextExecution::At(at)) {
                    task.next_execution = Some(NextExecution::At(at));
                    changed = true;
                }
                triggers.register(&task.id, Trigger::At(at));
            }
            _ => match task.next_at() {
                Some(at) if at > now => {
                    triggers.register(&task.id, Trigger::At(at));
                }
                _ => {
                    let before = task.next_execution.clone();
                    let trigger = resolve(task, now);
                    install(triggers, task, trigger);
                    changed |= task.next_execution != before;
                }
            },
        }
    }
    changed
}
