use std::collections::BTreeMap;
use std::future::Future;

use anyhow::Context;
use tracing::{debug, instrument, warn};

use crate::model::{Color, ListRecord, Task, TaskId, TaskPatch};

/// The remote collection service the application state mirrors.
pub trait DataService {
    fn fetch_lists(&self) -> impl Future<Output = anyhow::Result<Vec<ListRecord>>>;

    fn fetch_colors(&self) -> impl Future<Output = anyhow::Result<Vec<Color>>>;

    fn fetch_tasks(&self) -> impl Future<Output = anyhow::Result<Vec<Task>>>;

    fn patch_task(
        &self,
        id: TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = anyhow::Result<()>>;

    fn delete_task(&self, id: TaskId) -> impl Future<Output = anyhow::Result<()>>;
}

/// Result of the three initial reads. A failed read is `None`.
#[derive(Debug, Default)]
pub struct InitialLoad {
    pub lists: Option<Vec<ListRecord>>,
    pub colors: Option<Vec<Color>>,
    pub tasks: Option<Vec<Task>>,
}

#[instrument(skip(service))]
pub async fn initial_load<S: DataService>(service: &S) -> InitialLoad {
    let (lists, colors, tasks) = tokio::join!(
        service.fetch_lists(),
        service.fetch_colors(),
        service.fetch_tasks()
    );
    InitialLoad {
        lists: keep_or_warn(lists, "lists"),
        colors: keep_or_warn(colors, "colors"),
        tasks: keep_or_warn(tasks, "tasks"),
    }
}

fn keep_or_warn<T>(result: anyhow::Result<T>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(collection = what, error = %format!("{err:#}"), "initial load failed");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Patch(TaskPatch),
    Delete,
}

/// A remote write produced by a local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOp {
    pub seq: u64,
    pub task_id: TaskId,
    pub action: SyncAction,
}

impl SyncOp {
    pub fn failure_message(&self) -> &'static str {
        match self.action {
            SyncAction::Patch(_) => "failed to update task",
            SyncAction::Delete => "failed to delete task",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub op: SyncOp,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Failed(String),
}

/// Sends one operation to the service and reports how it went. Never fails
/// itself; the error travels inside the outcome.
#[instrument(skip(service), fields(seq = op.seq, task = op.task_id))]
pub async fn execute<S: DataService>(service: &S, op: SyncOp) -> SyncOutcome {
    let result = match &op.action {
        SyncAction::Patch(patch) => service
            .patch_task(op.task_id, patch.clone())
            .await
            .with_context(|| format!("PATCH task {}", op.task_id)),
        SyncAction::Delete => service
            .delete_task(op.task_id)
            .await
            .with_context(|| format!("DELETE task {}", op.task_id)),
    };

    match result {
        Ok(()) => {
            debug!("remote write confirmed");
            SyncOutcome { op, error: None }
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "remote write failed");
            SyncOutcome {
                op,
                error: Some(format!("{err:#}")),
            }
        }
    }
}

/// The part of a task an operation writes. A later operation on the same
/// slot carries the newer value; a delete covers the whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Text,
    Completed,
    Whole,
}

impl SyncAction {
    fn slot(&self) -> Slot {
        match self {
            SyncAction::Patch(TaskPatch::Text { .. }) => Slot::Text,
            SyncAction::Patch(TaskPatch::Completed { .. }) => Slot::Completed,
            SyncAction::Delete => Slot::Whole,
        }
    }

    /// Whether a confirmed `self` makes an older `other` pointless to resend.
    fn covers(&self, other: &SyncAction) -> bool {
        let slot = self.slot();
        slot == Slot::Whole || slot == other.slot()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    op: SyncOp,
    status: SyncStatus,
}

/// Outstanding remote writes keyed by seq. Confirmed writes are dropped. A
/// failed write stays for retry until a newer write covering the same field
/// of the same task is issued.
#[derive(Debug, Clone, Default)]
pub struct SyncTracker {
    next_seq: u64,
    entries: BTreeMap<u64, Entry>,
}

impl SyncTracker {
    pub fn issue(&mut self, task_id: TaskId, action: SyncAction) -> SyncOp {
        self.entries.retain(|_, entry| {
            !(entry.op.task_id == task_id
                && matches!(entry.status, SyncStatus::Failed(_))
                && action.covers(&entry.op.action))
        });

        self.next_seq += 1;
        let op = SyncOp {
            seq: self.next_seq,
            task_id,
            action,
        };
        self.entries.insert(
            op.seq,
            Entry {
                op: op.clone(),
                status: SyncStatus::Pending,
            },
        );
        op
    }

    /// Records an outcome. Returns `true` when the operation failed and is
    /// kept for retry.
    pub fn record(&mut self, outcome: &SyncOutcome) -> bool {
        let seq = outcome.op.seq;
        let Some(err) = &outcome.error else {
            let op = &outcome.op;
            self.entries.retain(|&other, entry| {
                other != seq
                    && !(other < seq
                        && entry.op.task_id == op.task_id
                        && op.action.covers(&entry.op.action))
            });
            return false;
        };
        if !self.entries.contains_key(&seq) {
            return false;
        }

        let superseded = self.entries.range(seq + 1..).any(|(_, entry)| {
            entry.op.task_id == outcome.op.task_id && entry.op.action.covers(&outcome.op.action)
        });
        if superseded {
            debug!(
                task = outcome.op.task_id,
                seq, "failed write already superseded by a newer one"
            );
            self.entries.remove(&seq);
            return false;
        }

        if let Some(entry) = self.entries.get_mut(&seq) {
            entry.status = SyncStatus::Failed(err.clone());
        }
        true
    }

    /// `None` when nothing is outstanding for the task. A failure outranks
    /// writes still in flight.
    pub fn status(&self, task_id: TaskId) -> Option<SyncStatus> {
        let mut status = None;
        for entry in self.entries.values().filter(|e| e.op.task_id == task_id) {
            match entry.status {
                SyncStatus::Failed(_) => status = Some(entry.status.clone()),
                SyncStatus::Pending if status.is_none() => status = Some(SyncStatus::Pending),
                SyncStatus::Pending => {}
            }
        }
        status
    }

    /// Operations not confirmed yet, in seq order.
    pub fn unsettled(&self) -> Vec<(&SyncOp, &SyncStatus)> {
        self.entries
            .values()
            .map(|e| (&e.op, &e.status))
            .collect()
    }

    /// Re-issues every failed operation under a fresh seq.
    pub fn retry_failed(&mut self) -> Vec<SyncOp> {
        let failed: Vec<SyncOp> = self
            .entries
            .values()
            .filter(|e| matches!(e.status, SyncStatus::Failed(_)))
            .map(|e| e.op.clone())
            .collect();

        failed
            .into_iter()
            .map(|op| self.issue(op.task_id, op.action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{SyncAction, SyncOutcome, SyncStatus, SyncTracker};
    use crate::model::TaskPatch;

    fn ok(op: &super::SyncOp) -> SyncOutcome {
        SyncOutcome {
            op: op.clone(),
            error: None,
        }
    }

    fn failed(op: &super::SyncOp) -> SyncOutcome {
        SyncOutcome {
            op: op.clone(),
            error: Some("boom".to_string()),
        }
    }

    fn edit(text: &str) -> SyncAction {
        SyncAction::Patch(TaskPatch::Text {
            text: text.to_string(),
        })
    }

    #[test]
    fn confirmed_writes_are_dropped() {
        let mut tracker = SyncTracker::default();
        let first = tracker.issue(1, edit("a"));
        let second = tracker.issue(2, SyncAction::Delete);
        assert!(second.seq > first.seq);
        assert_eq!(tracker.status(1), Some(SyncStatus::Pending));

        assert!(!tracker.record(&ok(&first)));
        assert!(!tracker.record(&ok(&second)));
        assert_eq!(tracker.status(1), None);
        assert!(tracker.unsettled().is_empty());
        assert!(tracker.entries.is_empty());
    }

    #[test]
    fn failed_edit_survives_later_completion_of_same_task() {
        let mut tracker = SyncTracker::default();
        let text = tracker.issue(10, edit("Ship it"));
        let done = tracker.issue(10, SyncAction::Patch(TaskPatch::Completed { completed: true }));

        tracker.record(&ok(&done));
        assert!(tracker.record(&failed(&text)));
        assert_eq!(tracker.status(10), Some(SyncStatus::Failed("boom".to_string())));

        let retried = tracker.retry_failed();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].action, edit("Ship it"));
    }

    #[test]
    fn newer_write_of_same_field_supersedes_failure() {
        let mut tracker = SyncTracker::default();
        let older = tracker.issue(1, edit("a"));
        let newer = tracker.issue(1, edit("b"));

        assert!(!tracker.record(&failed(&older)));
        assert_eq!(tracker.status(1), Some(SyncStatus::Pending));
        tracker.record(&ok(&newer));
        assert!(tracker.retry_failed().is_empty());

        let slow = tracker.issue(5, edit("x"));
        let fast = tracker.issue(5, edit("y"));
        tracker.record(&ok(&fast));
        assert!(!tracker.record(&failed(&slow)));
        assert_eq!(tracker.status(5), None);

        let patch = tracker.issue(2, edit("c"));
        let delete = tracker.issue(2, SyncAction::Delete);
        assert!(!tracker.record(&failed(&patch)));
        tracker.record(&ok(&delete));
        assert_eq!(tracker.status(2), None);
    }

    #[test]
    fn reissuing_a_field_replaces_its_failed_write() {
        let mut tracker = SyncTracker::default();
        let first = tracker.issue(3, edit("a"));
        tracker.record(&failed(&first));

        tracker.issue(3, edit("b"));
        assert_eq!(tracker.status(3), Some(SyncStatus::Pending));
        assert!(tracker.retry_failed().is_empty());
    }

    #[test]
    fn failed_operations_can_be_retried() {
        let mut tracker = SyncTracker::default();
        let op = tracker.issue(4, SyncAction::Patch(TaskPatch::Completed { completed: true }));

        tracker.record(&failed(&op));
        assert_eq!(
            tracker.status(4),
            Some(SyncStatus::Failed("boom".to_string()))
        );
        assert_eq!(tracker.unsettled().len(), 1);

        let retried = tracker.retry_failed();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].action, op.action);
        assert!(retried[0].seq > op.seq);
        assert_eq!(tracker.status(4), Some(SyncStatus::Pending));

        tracker.record(&ok(&retried[0]));
        assert!(tracker.unsettled().is_empty());
        assert!(tracker.retry_failed().is_empty());
    }
}
