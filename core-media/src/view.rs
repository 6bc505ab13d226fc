//! Per-filter collection state
//!
//! [`ViewState`] is what the cache mutates under its lock;
//! [`MediaCollectionView`] is the cloned snapshot handed to callers.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{MediaFilter, MediaItem, MediaPage};

/// Read-only snapshot of one filter configuration's view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCollectionView {
    pub filter: MediaFilter,
    /// Server order, optimistic inserts first. No two items share an id.
    pub items: Vec<MediaItem>,
    /// Highest page applied so far, 0 before the first one
    pub current_page: u32,
    pub has_more: bool,
    pub total_count: u64,
    /// First page outstanding
    pub is_loading: bool,
    /// A continuation page outstanding
    pub is_loading_more: bool,
    pub error: Option<String>,
    /// Bumped by every refresh
    pub generation: u64,
}

#[derive(Debug)]
pub(crate) struct ViewState {
    pub(crate) filter: MediaFilter,
    pub(crate) items: Vec<MediaItem>,
    pub(crate) ids: HashSet<String>,
    pub(crate) current_page: u32,
    pub(crate) has_more: bool,
    pub(crate) total_count: u64,
    pub(crate) is_loading: bool,
    pub(crate) is_loading_more: bool,
    pub(crate) error: Option<String>,
    pub(crate) generation: u64,
    /// Requests issued for the current generation and not yet answered
    pub(crate) in_flight: usize,
    /// Live `ViewHandle`s
    pub(crate) observers: usize,
    /// Whether any page has been applied since the last reset
    pub(crate) has_data: bool,
    /// Optimistic changes made in this generation
    pub(crate) mutations: u64,
    /// Optimistic inserts no page has returned yet, keyed to their mutation
    pub(crate) unconfirmed: HashMap<String, u64>,
    /// Ids removed in this generation. Pages never bring them back.
    pub(crate) tombstones: HashMap<String, Tombstone>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Tombstone {
    /// Mutation that removed the id
    pub(crate) at: u64,
    /// Known to belong to this view, so server totals taken before the
    /// removal still count it
    pub(crate) admitted: bool,
}

impl ViewState {
    pub(crate) fn new(filter: MediaFilter, generation: u64) -> Self {
        Self {
            filter,
            items: Vec::new(),
            ids: HashSet::new(),
            current_page: 0,
            has_more: true,
            total_count: 0,
            is_loading: false,
            is_loading_more: false,
            error: None,
            generation,
            in_flight: 0,
            observers: 0,
            has_data: false,
            mutations: 0,
            unconfirmed: HashMap::new(),
            tombstones: HashMap::new(),
        }
    }

    /// Drop every item and cursor and move to `generation`. Observers stay.
    pub(crate) fn reset(&mut self, generation: u64) {
        let observers = self.observers;
        *self = Self::new(self.filter, generation);
        self.observers = observers;
    }

    /// Mark a request in flight. Returns the mutation mark the response is
    /// later applied against.
    pub(crate) fn begin_request(&mut self) -> u64 {
        self.in_flight += 1;
        if self.has_data {
            self.is_loading_more = true;
        } else {
            self.is_loading = true;
        }
        self.mutations
    }

    pub(crate) fn end_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            self.is_loading = false;
            self.is_loading_more = false;
        }
    }

    /// Append the items of `page` that are not yet held or removed. Returns
    /// how many were new.
    ///
    /// `issued_at` is the mark from [`begin_request`](Self::begin_request).
    /// The server total is corrected for optimistic changes made after the
    /// request went out, since the server could not have counted them.
    pub(crate) fn apply_page(&mut self, page: MediaPage, issued_at: u64) -> usize {
        let has_more = page.has_more();
        let mut added = 0;

        for item in page.items {
            if let Some(tombstone) = self.tombstones.get_mut(&item.id) {
                tombstone.admitted = true;
                continue;
            }
            self.unconfirmed.remove(&item.id);
            if self.ids.insert(item.id.clone()) {
                self.items.push(item);
                added += 1;
            }
        }

        let late_inserts = self
            .unconfirmed
            .values()
            .filter(|at| **at > issued_at)
            .count() as u64;
        let late_removals = self
            .tombstones
            .values()
            .filter(|t| t.admitted && t.at > issued_at)
            .count() as u64;

        self.current_page = self.current_page.max(page.page);
        self.total_count = (page.total_count + late_inserts).saturating_sub(late_removals);
        self.has_more = has_more;
        self.has_data = true;
        self.error = None;
        added
    }

    /// Prepend `item` unless its id is already held.
    pub(crate) fn prepend(&mut self, item: &MediaItem) -> bool {
        self.mutations += 1;
        self.tombstones.remove(&item.id);
        if !self.ids.insert(item.id.clone()) {
            return false;
        }
        self.items.insert(0, item.clone());
        self.unconfirmed.insert(item.id.clone(), self.mutations);
        self.total_count += 1;
        true
    }

    /// Drop `id` and remember it for the rest of the generation, whether or
    /// not it is held yet. Returns whether it was held.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.mutations += 1;
        self.unconfirmed.remove(id);
        let held = self.ids.remove(id);
        self.tombstones.insert(
            id.to_string(),
            Tombstone {
                at: self.mutations,
                admitted: held,
            },
        );
        if !held {
            return false;
        }
        self.items.retain(|item| item.id != id);
        self.total_count = self.total_count.saturating_sub(1);
        true
    }

    pub(crate) fn snapshot(&self) -> MediaCollectionView {
        MediaCollectionView {
            filter: self.filter,
            items: self.items.clone(),
            current_page: self.current_page,
            has_more: self.has_more,
            total_count: self.total_count,
            is_loading: self.is_loading,
            is_loading_more: self.is_loading_more,
            error: self.error.clone(),
            generation: self.generation,
        }
    }
}
