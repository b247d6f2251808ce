use tracing::debug;

use crate::model::{List, ListId};
use crate::store::Store;

pub const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/`: every list's tasks.
    AllTasks,
    /// `/lists/<id>`: one list's tasks.
    List(ListId),
    /// A `lists/` path whose id is not a number, or any other path.
    Unknown,
}

impl Route {
    pub fn parse(path: &str) -> Self {
        if let Some(id) = list_id_from_path(path) {
            return Route::List(id);
        }
        if path.trim().trim_matches('/').is_empty() {
            Route::AllTasks
        } else {
            Route::Unknown
        }
    }

    pub fn list_path(id: ListId) -> String {
        format!("/lists/{id}")
    }
}

/// The list selected by the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveList {
    Cleared,
    NotFound(ListId),
    Found(ListId),
}

impl ActiveList {
    pub fn resolve<'a>(&self, store: &'a Store) -> Option<&'a List> {
        match self {
            ActiveList::Found(id) => store.list(*id),
            ActiveList::Cleared | ActiveList::NotFound(_) => None,
        }
    }

    pub fn id(&self) -> Option<ListId> {
        match self {
            ActiveList::Found(id) => Some(*id),
            ActiveList::Cleared | ActiveList::NotFound(_) => None,
        }
    }
}

/// Text after the last `lists/` segment, parsed as a list id.
pub fn list_id_from_path(path: &str) -> Option<ListId> {
    let (_, rest) = path.rsplit_once("lists/")?;
    rest.trim().trim_matches('/').parse().ok()
}

pub fn derive_active_list(store: &Store, path: &str) -> ActiveList {
    let active = match list_id_from_path(path) {
        Some(id) if store.has_list(id) => ActiveList::Found(id),
        Some(id) => ActiveList::NotFound(id),
        None => ActiveList::Cleared,
    };
    debug!(path, ?active, "derived active list");
    active
}
