//! Application state controller.
//!
//! Owns the normalized [`Store`], the filter toggles, the current route and
//! the sync bookkeeping. Every mutation is applied locally first; the ones
//! that persist return a [`SyncOp`] for the caller to send to the data
//! service. Outcomes come back through [`Controller::apply_outcome`], which
//! never rolls local state back.

use std::collections::VecDeque;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::chart::{self, ChartPoint};
use crate::filter::{self, Toggle, Toggles};
use crate::model::{Color, List, ListId, Task, TaskId, TaskPatch};
use crate::route::{self, ActiveList, ROOT_PATH, Route};
use crate::store::Store;
use crate::sync::{InitialLoad, SyncAction, SyncOp, SyncOutcome, SyncStatus, SyncTracker};

/// Pending request for a task's new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditTaskPrompt {
    pub list_id: ListId,
    pub task_id: TaskId,
    pub current_text: String,
}

/// Pending confirmation of a task removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveTaskPrompt {
    pub list_id: ListId,
    pub task_id: TaskId,
    pub text: String,
}

/// Pending request for a list's new title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameListPrompt {
    pub list_id: ListId,
    pub current_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

/// What the current route shows.
#[derive(Debug, Clone, PartialEq)]
pub enum View<'a> {
    /// Lists with at least one task, in list order.
    AllLists(Vec<(&'a List, Vec<&'a Task>)>),
    /// The active list, possibly empty.
    Single(&'a List, Vec<&'a Task>),
    Nothing,
}

#[derive(Debug, Clone, Default)]
struct ChartMemo {
    revision: Option<u64>,
    points: Vec<ChartPoint>,
}

#[derive(Debug, Clone)]
pub struct Controller {
    store: Store,
    toggles: Toggles,
    path: String,
    active: ActiveList,
    sync: SyncTracker,
    alerts: VecDeque<String>,
    chart: ChartMemo,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            store: Store::new(),
            toggles: Toggles::default(),
            path: ROOT_PATH.to_string(),
            active: ActiveList::Cleared,
            sync: SyncTracker::default(),
            alerts: VecDeque::new(),
            chart: ChartMemo::default(),
        }
    }

    #[instrument(skip_all)]
    pub fn apply_initial_load(&mut self, load: InitialLoad) {
        self.store = Store::from_remote(load.lists, load.colors, load.tasks);
        self.refresh_active();
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn lists(&self) -> &[List] {
        self.store.lists()
    }

    pub fn colors(&self) -> &[Color] {
        self.store.colors()
    }

    pub fn toggles(&self) -> Toggles {
        self.toggles
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn active(&self) -> ActiveList {
        self.active
    }

    pub fn active_list(&self) -> Option<&List> {
        self.active.resolve(&self.store)
    }

    pub fn sync(&self) -> &SyncTracker {
        &self.sync
    }

    pub fn sync_status(&self, task_id: TaskId) -> Option<SyncStatus> {
        self.sync.status(task_id)
    }

    // -- filters -----------------------------------------------------------

    pub fn toggle(&mut self, toggle: Toggle) -> bool {
        self.toggles.flip(toggle)
    }

    pub fn filtered_tasks(&self) -> Vec<&Task> {
        filter::completion_tasks(&self.store, self.toggles)
    }

    pub fn overdue_tasks(&self, now: DateTime<Utc>) -> Vec<&Task> {
        filter::overdue_tasks(&self.store, self.toggles, now)
    }

    /// Completed-task counts per list, recomputed only when the store changed.
    pub fn chart(&mut self) -> &[ChartPoint] {
        let revision = self.store.revision();
        if self.chart.revision != Some(revision) {
            self.chart.points = chart::completed_per_list(&self.store);
            self.chart.revision = Some(revision);
        }
        &self.chart.points
    }

    // -- routing -----------------------------------------------------------

    #[instrument(skip(self))]
    pub fn navigate(&mut self, path: &str) {
        self.path = path.to_string();
        self.refresh_active();
    }

    pub fn view(&self) -> View<'_> {
        match Route::parse(&self.path) {
            Route::AllTasks => View::AllLists(
                self.store
                    .lists()
                    .iter()
                    .map(|list| (list, self.store.tasks_of(list)))
                    .filter(|(_, tasks)| !tasks.is_empty())
                    .collect(),
            ),
            Route::List(_) => match self.active_list() {
                Some(list) => View::Single(list, self.store.tasks_of(list)),
                None => View::Nothing,
            },
            Route::Unknown => View::Nothing,
        }
    }

    fn refresh_active(&mut self) {
        self.active = route::derive_active_list(&self.store, &self.path);
    }

    // -- list mutations ----------------------------------------------------

    #[instrument(skip(self, list), fields(list = list.id))]
    pub fn add_list(&mut self, list: List) -> anyhow::Result<()> {
        self.store.push_list(list)?;
        self.refresh_active();
        Ok(())
    }

    pub fn request_rename_list(&self, list_id: ListId) -> anyhow::Result<RenameListPrompt> {
        let list = self
            .store
            .list(list_id)
            .ok_or_else(|| anyhow!("list not found: {list_id}"))?;
        Ok(RenameListPrompt {
            list_id,
            current_name: list.name.clone(),
        })
    }

    /// Returns whether the title changed. Cancelled or blank input is a no-op.
    #[instrument(skip(self, prompt), fields(list = prompt.list_id))]
    pub fn resolve_rename_list(
        &mut self,
        prompt: RenameListPrompt,
        answer: Option<String>,
    ) -> anyhow::Result<bool> {
        let Some(name) = non_blank(answer) else {
            debug!("rename cancelled");
            return Ok(false);
        };
        self.store.rename_list(prompt.list_id, name)?;
        Ok(true)
    }

    #[instrument(skip(self))]
    pub fn remove_list(&mut self, list_id: ListId) -> anyhow::Result<()> {
        let list = self.store.remove_list(list_id)?;
        info!(list = list.id, name = %list.name, "list removed locally");
        self.refresh_active();
        Ok(())
    }

    // -- task mutations ----------------------------------------------------

    #[instrument(skip(self, task), fields(task = task.id))]
    pub fn add_task(&mut self, list_id: ListId, task: Task) -> anyhow::Result<()> {
        self.store
            .push_task(list_id, task)
            .context("failed to add task")
    }

    pub fn request_edit_task(
        &self,
        list_id: ListId,
        task_id: TaskId,
    ) -> anyhow::Result<EditTaskPrompt> {
        let task = self.member_task(list_id, task_id)?;
        Ok(EditTaskPrompt {
            list_id,
            task_id,
            current_text: task.text.clone(),
        })
    }

    #[instrument(skip(self, prompt), fields(task = prompt.task_id))]
    pub fn resolve_edit_task(
        &mut self,
        prompt: EditTaskPrompt,
        answer: Option<String>,
    ) -> anyhow::Result<Option<SyncOp>> {
        let Some(text) = non_blank(answer) else {
            debug!("edit cancelled");
            return Ok(None);
        };
        self.store
            .update_task(prompt.list_id, prompt.task_id, |task| {
                task.text = text.clone();
            })?;
        Ok(Some(self.sync.issue(
            prompt.task_id,
            SyncAction::Patch(TaskPatch::Text { text }),
        )))
    }

    pub fn request_remove_task(
        &self,
        list_id: ListId,
        task_id: TaskId,
    ) -> anyhow::Result<RemoveTaskPrompt> {
        let task = self.member_task(list_id, task_id)?;
        Ok(RemoveTaskPrompt {
            list_id,
            task_id,
            text: task.text.clone(),
        })
    }

    #[instrument(skip(self, prompt), fields(task = prompt.task_id))]
    pub fn resolve_remove_task(
        &mut self,
        prompt: RemoveTaskPrompt,
        answer: Confirmation,
    ) -> anyhow::Result<Option<SyncOp>> {
        if answer == Confirmation::Declined {
            debug!("removal declined");
            return Ok(None);
        }
        self.store.remove_task(prompt.list_id, prompt.task_id)?;
        Ok(Some(self.sync.issue(prompt.task_id, SyncAction::Delete)))
    }

    #[instrument(skip(self))]
    pub fn set_task_completed(
        &mut self,
        list_id: ListId,
        task_id: TaskId,
        completed: bool,
    ) -> anyhow::Result<SyncOp> {
        self.store
            .update_task(list_id, task_id, |task| task.completed = completed)?;
        Ok(self.sync.issue(
            task_id,
            SyncAction::Patch(TaskPatch::Completed { completed }),
        ))
    }

    fn member_task(&self, list_id: ListId, task_id: TaskId) -> anyhow::Result<&Task> {
        let list = self
            .store
            .list(list_id)
            .ok_or_else(|| anyhow!("list not found: {list_id}"))?;
        if !list.task_ids.contains(&task_id) {
            return Err(anyhow!("task {task_id} is not in list {list_id}"));
        }
        self.store
            .task(task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))
    }

    // -- sync --------------------------------------------------------------

    /// Records a remote outcome. Every failure queues an alert; local state
    /// is left as it is.
    #[instrument(skip(self, outcome), fields(seq = outcome.op.seq, task = outcome.op.task_id))]
    pub fn apply_outcome(&mut self, outcome: SyncOutcome) {
        let retryable = self.sync.record(&outcome);
        if let Some(err) = &outcome.error {
            warn!(error = %err, retryable, "remote write failed; keeping local state");
            self.alerts
                .push_back(outcome.op.failure_message().to_string());
        }
    }

    pub fn retry_failed(&mut self) -> Vec<SyncOp> {
        let ops = self.sync.retry_failed();
        info!(count = ops.len(), "retrying failed remote writes");
        ops
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        self.alerts.drain(..).collect()
    }
}

fn non_blank(answer: Option<String>) -> Option<String> {
    answer.filter(|text| !text.trim().is_empty())
}
