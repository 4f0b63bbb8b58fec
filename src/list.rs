//! In-progress and frozen item lists.
//!
//! A build produces items into a [`BuildList`], which build logic and
//! interceptors mutate freely. When the interceptor chain has run, the
//! controller freezes the list: [`BuildList::freeze`] consumes it and
//! produces an immutable [`FrozenList`]. Freezing is an ownership transfer,
//! not a runtime flag, so mutation after freeze is unrepresentable and a
//! frozen list is always safe to diff without tearing.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::item::{Identity, Item};

/// A duplicate identity found while validating a built list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateConflict {
    /// The identity shared by both items.
    pub identity: Identity,
    /// Position of the first occurrence (kept under the filter policy).
    pub first_position: usize,
    /// Position of the conflicting occurrence (discarded under the filter
    /// policy).
    pub duplicate_position: usize,
}

/// The mutable list of items produced by one build, before freezing.
///
/// Build logic appends items with [`add`](Self::add); interceptors may
/// insert, remove, replace, and reorder. Positions are list indices.
#[derive(Debug, Default)]
pub struct BuildList {
    items: Vec<Arc<dyn Item>>,
}

impl BuildList {
    /// Create an empty list.
    ///
    /// The controller hands build logic a fresh list per build; construct
    /// one directly to drive
    /// [`compute_edit_script`](crate::compute_edit_script) by hand.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append an item to the end of the list.
    pub fn add(&mut self, item: impl Item) {
        self.items.push(Arc::new(item));
    }

    /// Append an already-shared item.
    pub fn add_item(&mut self, item: Arc<dyn Item>) {
        self.items.push(item);
    }

    /// Insert an item at `position`, shifting later items right.
    pub fn insert(&mut self, position: usize, item: impl Item) {
        self.items.insert(position, Arc::new(item));
    }

    /// Remove and return the item at `position`, or `None` if out of bounds.
    pub fn remove(&mut self, position: usize) -> Option<Arc<dyn Item>> {
        if position < self.items.len() {
            Some(self.items.remove(position))
        } else {
            None
        }
    }

    /// Replace the item at `position`, returning the previous one.
    ///
    /// Items are shared immutably once added, so interceptors modify a row
    /// by replacing it with an edited copy.
    pub fn replace(&mut self, position: usize, item: impl Item) -> Option<Arc<dyn Item>> {
        if position < self.items.len() {
            Some(std::mem::replace(&mut self.items[position], Arc::new(item)))
        } else {
            None
        }
    }

    /// Move the item at `from` so it ends up at `to`.
    ///
    /// Returns `false`, leaving the list unchanged, when either position is
    /// out of bounds.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        true
    }

    /// Number of items currently in the list.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the list has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&Arc<dyn Item>> {
        self.items.get(position)
    }

    /// Iterate the items in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Item>> {
        self.items.iter()
    }

    /// Scan for duplicate identities without modifying the list.
    ///
    /// Each conflict pairs a later occurrence with the first occurrence of
    /// the same identity, in list order.
    pub(crate) fn scan_duplicates(&self) -> Vec<DuplicateConflict> {
        let mut seen: AHashMap<Identity, usize> = AHashMap::with_capacity(self.items.len());
        let mut conflicts = Vec::new();
        for (position, item) in self.items.iter().enumerate() {
            let identity = item.identity();
            match seen.get(&identity) {
                Some(&first_position) => conflicts.push(DuplicateConflict {
                    identity,
                    first_position,
                    duplicate_position: position,
                }),
                None => {
                    seen.insert(identity, position);
                }
            }
        }
        conflicts
    }

    /// Keep the first occurrence of each identity and drop the rest.
    ///
    /// Returns one conflict per discarded item, with positions as they were
    /// before any discard.
    pub(crate) fn drop_duplicates(&mut self) -> Vec<DuplicateConflict> {
        let conflicts = self.scan_duplicates();
        if !conflicts.is_empty() {
            let mut seen: AHashSet<Identity> = AHashSet::with_capacity(self.items.len());
            self.items.retain(|item| seen.insert(item.identity()));
        }
        conflicts
    }

    /// Consume the list, producing an immutable snapshot.
    pub fn freeze(self) -> FrozenList {
        FrozenList {
            items: self.items.into(),
        }
    }
}

/// Immutable snapshot of one build's output.
///
/// Cheap to clone; owned exclusively by the controller and superseded, never
/// mutated, by the next build. [`with_moved`](Self::with_moved) produces a
/// new snapshot rather than editing in place.
#[derive(Debug, Clone)]
pub struct FrozenList {
    items: Arc<[Arc<dyn Item>]>,
}

impl FrozenList {
    /// The empty list; the baseline before the first build.
    pub fn empty() -> Self {
        Self { items: Arc::from([]) }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the list has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&Arc<dyn Item>> {
        self.items.get(position)
    }

    /// Iterate the items in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Item>> {
        self.items.iter()
    }

    /// A new snapshot with the item at `from` moved to `to`.
    ///
    /// Positions must be in bounds; the controller validates before calling.
    pub(crate) fn with_moved(&self, from: usize, to: usize) -> FrozenList {
        let mut items: Vec<Arc<dyn Item>> = self.items.to_vec();
        let item = items.remove(from);
        items.insert(to, item);
        FrozenList {
            items: items.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{RowItem, ViewType};

    fn row(id: i64) -> RowItem {
        RowItem::new(ViewType(0)).id(id)
    }

    #[test]
    fn scan_finds_all_duplicates_of_first_occurrence() {
        let mut list = BuildList::new();
        list.add(row(1));
        list.add(row(2));
        list.add(row(1));
        list.add(row(1));

        let conflicts = list.scan_duplicates();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].first_position, 0);
        assert_eq!(conflicts[0].duplicate_position, 2);
        assert_eq!(conflicts[1].duplicate_position, 3);
        assert_eq!(conflicts[0].identity, Identity::Id(1));
    }

    #[test]
    fn drop_duplicates_keeps_first() {
        let mut list = BuildList::new();
        list.add(row(1).field("v", 1));
        list.add(row(2));
        list.add(row(1).field("v", 2));

        let conflicts = list.drop_duplicates();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(list.len(), 2);
        // The first occurrence survives.
        let first = list.get(0).unwrap();
        assert_eq!(first.identity(), Identity::Id(1));
    }

    #[test]
    fn clean_list_has_no_conflicts() {
        let mut list = BuildList::new();
        list.add(row(1));
        list.add(row(2));
        assert!(list.scan_duplicates().is_empty());
        assert!(list.drop_duplicates().is_empty());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn move_item_reports_out_of_bounds() {
        let mut list = BuildList::new();
        list.add(row(1));
        list.add(row(2));
        assert!(list.move_item(1, 0));
        assert!(!list.move_item(0, 2));
        assert!(!list.move_item(2, 0));
        let ids: Vec<Identity> = list.iter().map(|i| i.identity()).collect();
        assert_eq!(ids, vec![Identity::Id(2), Identity::Id(1)]);
    }

    #[test]
    fn freeze_preserves_order() {
        let mut list = BuildList::new();
        list.add(row(3));
        list.add(row(1));
        list.add(row(2));
        let frozen = list.freeze();
        let ids: Vec<Identity> = frozen.iter().map(|i| i.identity()).collect();
        assert_eq!(
            ids,
            vec![Identity::Id(3), Identity::Id(1), Identity::Id(2)]
        );
    }

    #[test]
    fn with_moved_leaves_original_untouched() {
        let mut list = BuildList::new();
        list.add(row(1));
        list.add(row(2));
        list.add(row(3));
        let frozen = list.freeze();
        let moved = frozen.with_moved(1, 0);
        assert_eq!(moved.get(0).unwrap().identity(), Identity::Id(2));
        assert_eq!(frozen.get(0).unwrap().identity(), Identity::Id(1));
    }

    #[test]
    fn interceptor_style_mutation() {
        let mut list = BuildList::new();
        list.add(row(1));
        list.add(row(2));
        list.insert(1, row(3));
        list.move_item(2, 0);
        let removed = list.remove(1).unwrap();
        assert_eq!(removed.identity(), Identity::Id(1));
        let ids: Vec<Identity> = list.iter().map(|i| i.identity()).collect();
        assert_eq!(ids, vec![Identity::Id(2), Identity::Id(3)]);
    }
}
