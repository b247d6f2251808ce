use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::trace;

use crate::model::Task;
use crate::store::Store;

/// The three independent filter
/// checkboxes. All off at start.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
)]
pub struct Toggles {
  pub show_completed:  bool,
  pub show_incomplete: bool,
  pub show_overdue:    bool
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Toggle {
  Completed,
  Incomplete,
  Overdue
}

impl FromStr for Toggle {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | "incomplete" | "open" => {
        Ok(Self::Incomplete)
      }
      | "overdue" | "late" => {
        Ok(Self::Overdue)
      }
      | other => Err(anyhow!(
        "unknown filter: {other} \
         (expected completed, \
         incomplete or overdue)"
      ))
    }
  }
}

impl Toggles {
  pub fn flip(
    &mut self,
    toggle: Toggle
  ) -> bool {
    let slot = match toggle {
      | Toggle::Completed => {
        &mut self.show_completed
      }
      | Toggle::Incomplete => {
        &mut self.show_incomplete
      }
      | Toggle::Overdue => {
        &mut self.show_overdue
      }
    };
    *slot = !*slot;
    trace!(?toggle, value = *slot, "flipped filter");
    *slot
  }

  pub fn get(
    &self,
    toggle: Toggle
  ) -> bool {
    match toggle {
      | Toggle::Completed => {
        self.show_completed
      }
      | Toggle::Incomplete => {
        self.show_incomplete
      }
      | Toggle::Overdue => {
        self.show_overdue
      }
    }
  }
}

/// Completed/incomplete projection of
/// the flat task collection.
///
/// With both boxes ticked every task
/// passes, orphans included. With only
/// one ticked the task's list must still
/// exist.
pub fn completion_tasks<'a>(
  store: &'a Store,
  toggles: Toggles
) -> Vec<&'a Task> {
  store
    .tasks()
    .filter(|task| {
      passes_completion(
        store, toggles, task
      )
    })
    .collect()
}

fn passes_completion(
  store: &Store,
  toggles: Toggles,
  task: &Task
) -> bool {
  match (
    toggles.show_completed,
    toggles.show_incomplete
  ) {
    | (true, true) => true,
    | (true, false) => {
      store.has_list(task.list_id)
        && task.completed
    }
    | (false, true) => {
      store.has_list(task.list_id)
        && !task.completed
    }
    | (false, false) => false
  }
}

/// Open tasks whose due date is before
/// `now`. Empty unless the overdue box is
/// ticked; the other two boxes do not
/// matter.
pub fn overdue_tasks<'a>(
  store: &'a Store,
  toggles: Toggles,
  now: DateTime<Utc>
) -> Vec<&'a Task> {
  if !toggles.show_overdue {
    return vec![];
  }
  store
    .tasks()
    .filter(|task| task.is_overdue(now))
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    Utc
  };
  use rstest::rstest;

  use super::{
    Toggle,
    Toggles,
    completion_tasks,
    overdue_tasks
  };
  use crate::model::{
    ListRecord,
    Task
  };
  use crate::store::Store;

  fn task(
    id: u64,
    list_id: u64,
    completed: bool
  ) -> Task {
    let mut t = Task::new(
      id,
      list_id,
      format!("task {id}")
    );
    t.completed = completed;
    t
  }

  // list 1 exists; task 4 belongs to a
  // list that was never loaded.
  fn fixture() -> Store {
    let lists = vec![ListRecord {
      id:       1,
      name:     "Work".to_string(),
      color_id: None,
      color:    None,
      tasks:    vec![]
    }];
    Store::from_remote(
      Some(lists),
      None,
      Some(vec![
        task(1, 1, true),
        task(2, 1, false),
        task(3, 1, true),
        task(4, 2, false),
      ])
    )
  }

  #[rstest]
  #[case(true, true, vec![1, 2, 3, 4])]
  #[case(true, false, vec![1, 3])]
  #[case(false, true, vec![2])]
  #[case(false, false, vec![])]
  fn completion_rule_table(
    #[case] show_completed: bool,
    #[case] show_incomplete: bool,
    #[case] expected: Vec<u64>
  ) {
    let store = fixture();
    for show_overdue in [false, true] {
      let toggles = Toggles {
        show_completed,
        show_incomplete,
        show_overdue
      };
      let ids: Vec<u64> =
        completion_tasks(&store, toggles)
          .iter()
          .map(|t| t.id)
          .collect();
      assert_eq!(ids, expected);
    }
  }

  #[rstest]
  #[case(false, false)]
  #[case(true, false)]
  #[case(false, true)]
  #[case(true, true)]
  fn overdue_ignores_other_toggles(
    #[case] show_completed: bool,
    #[case] show_incomplete: bool
  ) {
    let now = Utc::now();
    let mut late = task(1, 1, false);
    late.due =
      Some(now - Duration::days(1));
    let mut late_done = task(2, 1, true);
    late_done.due =
      Some(now - Duration::days(1));
    let mut future = task(3, 1, false);
    future.due =
      Some(now + Duration::days(1));
    let undated = task(4, 1, false);

    let store = Store::from_remote(
      None,
      None,
      Some(vec![
        late, late_done, future, undated,
      ])
    );

    let mut toggles = Toggles {
      show_completed,
      show_incomplete,
      show_overdue: true
    };
    let ids: Vec<u64> =
      overdue_tasks(&store, toggles, now)
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![1]);

    toggles.show_overdue = false;
    assert!(
      overdue_tasks(&store, toggles, now)
        .is_empty()
    );
  }

  #[test]
  fn flip_toggles_one_box() {
    let mut toggles = Toggles::default();
    assert!(
      toggles.flip(Toggle::Overdue)
    );
    assert!(toggles.show_overdue);
    assert!(!toggles.show_completed);
    assert!(
      !toggles.flip(Toggle::Overdue)
    );
  }

  #[test]
  fn parses_toggle_names() {
    assert_eq!(
      "Completed"
        .parse::<Toggle>()
        .expect("parse"),
      Toggle::Completed
    );
    assert_eq!(
      "open"
        .parse::<Toggle>()
        .expect("parse"),
      Toggle::Incomplete
    );
    assert!(
      "nope".parse::<Toggle>().is_err()
    );
  }
}
