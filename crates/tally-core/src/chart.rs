use std::collections::HashMap;
use std::fmt;

use crate::model::ListId;
use crate::store::Store;

pub const DATASET_LABEL: &str = "Tasks completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Display color for a list. Depends on the id only, so a list keeps its
    /// color across recomputations and renames.
    pub fn for_list(id: ListId) -> Self {
        let mixed = splitmix64(id);
        Self((mixed >> 16) as u8, (mixed >> 8) as u8, mixed as u8)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub list_id: ListId,
    pub label: String,
    pub value: usize,
    pub color: Rgb,
}

/// Completed tasks per list, one point per list in list order.
#[tracing::instrument(skip(store), fields(revision = store.revision()))]
pub fn completed_per_list(store: &Store) -> Vec<ChartPoint> {
    let mut counts: HashMap<ListId, usize> = HashMap::new();
    for task in store.tasks().filter(|t| t.completed) {
        *counts.entry(task.list_id).or_default() += 1;
    }

    store
        .lists()
        .iter()
        .map(|list| ChartPoint {
            list_id: list.id,
            label: list.name.clone(),
            value: counts.get(&list.id).copied().unwrap_or(0),
            color: Rgb::for_list(list.id),
        })
        .collect()
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
