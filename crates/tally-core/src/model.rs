use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::datetime::due_date_serde;

pub type ListId = u64;
pub type TaskId = u64;
pub type ColorId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Color {
    pub id: ColorId,
    pub hex: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub list_id: ListId,

    pub text: String,

    #[serde(default, deserialize_with = "null_as_false")]
    pub completed: bool,

    #[serde(
        default,
        rename = "dateOverdue",
        with = "due_date_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub due: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, list_id: ListId, text: String) -> Self {
        Self {
            id,
            list_id,
            text,
            completed: false,
            due: None,
        }
    }

    /// Due strictly before `now` and still open.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due.is_some_and(|due| due < now)
    }
}

/// `null` and a missing flag both mean "not completed".
fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

/// A list as the data service returns it with `_expand=color&_embed=tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    pub id: ListId,
    pub name: String,
    #[serde(default)]
    pub color_id: Option<ColorId>,
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A list in the local store. Tasks are referenced by id only; the task data
/// lives once in [`crate::store::Store`].
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub id: ListId,
    pub name: String,
    pub color_id: Option<ColorId>,
    pub color: Option<Color>,
    pub task_ids: Vec<TaskId>,
}

impl List {
    pub fn new(id: ListId, name: String, color: Option<Color>) -> Self {
        Self {
            id,
            name,
            color_id: color.as_ref().map(|c| c.id),
            color,
            task_ids: vec![],
        }
    }
}

/// Partial update body for `PATCH /tasks/{id}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TaskPatch {
    Text { text: String },
    Completed { completed: bool },
}
