use std::collections::HashMap;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::model::{Color, List, ListId, ListRecord, Task, TaskId};

/// Normalized local state: every task is held once, keyed by id. Lists keep
/// the ordered ids of their tasks, and the flat order of the task collection
/// is kept separately.
#[derive(Debug, Clone, Default)]
pub struct Store {
    lists: Vec<List>,
    lists_loaded: bool,
    colors: Vec<Color>,
    tasks: HashMap<TaskId, Task>,
    task_order: Vec<TaskId>,
    revision: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from the three collections of the initial load. Any
    /// of them may be missing when its request failed.
    #[tracing::instrument(skip_all)]
    pub fn from_remote(
        lists: Option<Vec<ListRecord>>,
        colors: Option<Vec<Color>>,
        tasks: Option<Vec<Task>>,
    ) -> Self {
        let mut store = Self::new();
        store.lists_loaded = lists.is_some();
        store.colors = colors.unwrap_or_default();

        for task in tasks.unwrap_or_default() {
            store.insert_task(task);
        }

        for record in lists.unwrap_or_default() {
            let mut task_ids = Vec::with_capacity(record.tasks.len());
            for task in record.tasks {
                task_ids.push(task.id);
                if !store.tasks.contains_key(&task.id) {
                    store.insert_task(task);
                }
            }
            store.lists.push(List {
                id: record.id,
                name: record.name,
                color_id: record.color_id.or(record.color.as_ref().map(|c| c.id)),
                color: record.color,
                task_ids,
            });
        }

        info!(
            lists = store.lists.len(),
            colors = store.colors.len(),
            tasks = store.task_order.len(),
            "store populated from remote"
        );
        store
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn lists_loaded(&self) -> bool {
        self.lists_loaded
    }

    pub fn lists(&self) -> &[List] {
        &self.lists
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn color(&self, id: u64) -> Option<&Color> {
        self.colors.iter().find(|c| c.id == id)
    }

    pub fn list(&self, id: ListId) -> Option<&List> {
        self.lists.iter().find(|l| l.id == id)
    }

    pub fn has_list(&self, id: ListId) -> bool {
        self.list(id).is_some()
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All tasks in flat collection order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.task_order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Tasks of one list in the list's own order.
    pub fn tasks_of(&self, list: &List) -> Vec<&Task> {
        list.task_ids
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    pub fn next_list_id(&self) -> ListId {
        self.lists.iter().map(|l| l.id).max().unwrap_or(0) + 1
    }

    pub fn next_task_id(&self) -> TaskId {
        self.tasks.keys().copied().max().unwrap_or(0) + 1
    }

    pub fn push_list(&mut self, list: List) -> anyhow::Result<()> {
        if self.has_list(list.id) {
            return Err(anyhow!("list {} already exists", list.id));
        }
        debug!(list = list.id, name = %list.name, "appending list");
        self.lists.push(list);
        self.lists_loaded = true;
        self.bump();
        Ok(())
    }

    pub fn push_task(&mut self, list_id: ListId, mut task: Task) -> anyhow::Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(anyhow!("task {} already exists", task.id));
        }
        let list = self
            .lists
            .iter_mut()
            .find(|l| l.id == list_id)
            .ok_or_else(|| anyhow!("list not found: {list_id}"))?;

        task.list_id = list_id;
        list.task_ids.push(task.id);
        debug!(list = list_id, task = task.id, "appending task");
        self.insert_task(task);
        self.bump();
        Ok(())
    }

    /// Applies `f` to a task that must belong to `list_id`.
    pub fn update_task<F>(&mut self, list_id: ListId, task_id: TaskId, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Task),
    {
        self.ensure_member(list_id, task_id)?;
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
        f(task);
        self.bump();
        Ok(())
    }

    pub fn remove_task(&mut self, list_id: ListId, task_id: TaskId) -> anyhow::Result<Task> {
        self.ensure_member(list_id, task_id)?;
        if let Some(list) = self.lists.iter_mut().find(|l| l.id == list_id) {
            list.task_ids.retain(|id| *id != task_id);
        }
        self.task_order.retain(|id| *id != task_id);
        let task = self
            .tasks
            .remove(&task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
        self.bump();
        Ok(task)
    }

    pub fn rename_list(&mut self, list_id: ListId, name: String) -> anyhow::Result<()> {
        let list = self
            .lists
            .iter_mut()
            .find(|l| l.id == list_id)
            .ok_or_else(|| anyhow!("list not found: {list_id}"))?;
        list.name = name;
        self.bump();
        Ok(())
    }

    /// Drops the list only. Its tasks stay in the flat collection.
    pub fn remove_list(&mut self, list_id: ListId) -> anyhow::Result<List> {
        let idx = self
            .lists
            .iter()
            .position(|l| l.id == list_id)
            .ok_or_else(|| anyhow!("list not found: {list_id}"))?;
        let list = self.lists.remove(idx);
        self.bump();
        Ok(list)
    }

    fn ensure_member(&self, list_id: ListId, task_id: TaskId) -> anyhow::Result<()> {
        let list = self
            .list(list_id)
            .ok_or_else(|| anyhow!("list not found: {list_id}"))?;
        if list.task_ids.contains(&task_id) {
            Ok(())
        } else {
            Err(anyhow!("task {task_id} is not in list {list_id}"))
        }
    }

    fn insert_task(&mut self, task: Task) {
        self.task_order.push(task.id);
        self.tasks.insert(task.id, task);
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use crate::model::{Color, ListRecord, Task};

    fn record(id: u64, name: &str, tasks: Vec<Task>) -> ListRecord {
        ListRecord {
            id,
            name: name.to_string(),
            color_id: Some(1),
            color: Some(Color {
                id: 1,
                hex: "#64C4ED".to_string(),
                name: "blue".to_string(),
            }),
            tasks,
        }
    }

    #[test]
    fn embedded_tasks_fill_gaps_in_flat_collection() {
        let flat = vec![Task::new(2, 1, "flat".to_string())];
        let lists = vec![record(
            1,
            "Work",
            vec![
                Task::new(1, 1, "embedded".to_string()),
                Task::new(2, 1, "flat".to_string()),
            ],
        )];

        let store = Store::from_remote(Some(lists), None, Some(flat));
        let ids: Vec<u64> = store.tasks().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);

        let list = store.list(1).expect("list");
        let own: Vec<u64> = store.tasks_of(list).iter().map(|t| t.id).collect();
        assert_eq!(own, vec![1, 2]);
        assert!(store.lists_loaded());
    }

    #[test]
    fn failed_list_load_leaves_store_loading() {
        let store = Store::from_remote(None, None, Some(vec![Task::new(1, 1, "x".to_string())]));
        assert!(!store.lists_loaded());
        assert!(store.lists().is_empty());
        assert_eq!(store.tasks().count(), 1);
    }

    #[test]
    fn pushed_task_is_visible_in_list_and_flat_views() {
        let mut store = Store::from_remote(Some(vec![record(1, "Work", vec![])]), None, None);
        let before = store.revision();

        store
            .push_task(1, Task::new(5, 0, "new".to_string()))
            .expect("push task");

        assert!(store.revision() > before);
        assert_eq!(store.task(5).map(|t| t.list_id), Some(1));
        assert_eq!(store.tasks().count(), 1);
        let list = store.list(1).expect("list");
        assert_eq!(list.task_ids, vec![5]);
    }

    #[test]
    fn rejects_task_for_unknown_list_and_duplicate_ids() {
        let mut store = Store::from_remote(Some(vec![record(1, "Work", vec![])]), None, None);
        assert!(store.push_task(9, Task::new(1, 9, "x".to_string())).is_err());

        store
            .push_task(1, Task::new(1, 1, "x".to_string()))
            .expect("push task");
        assert!(store.push_task(1, Task::new(1, 1, "again".to_string())).is_err());
    }

    #[test]
    fn removing_list_keeps_its_tasks() {
        let mut store = Store::from_remote(
            Some(vec![record(1, "Work", vec![Task::new(1, 1, "x".to_string())])]),
            None,
            None,
        );
        store.remove_list(1).expect("remove list");
        assert!(store.lists().is_empty());
        assert!(store.task(1).is_some());
    }

    #[test]
    fn next_ids_follow_the_maximum() {
        let store = Store::from_remote(
            Some(vec![
                record(3, "A", vec![Task::new(7, 3, "x".to_string())]),
                record(1, "B", vec![]),
            ]),
            None,
            None,
        );
        assert_eq!(store.next_list_id(), 4);
        assert_eq!(store.next_task_id(), 8);
        assert_eq!(Store::new().next_task_id(), 1);
    }
}
