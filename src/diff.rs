//! Diff engine: computes an edit script between two frozen lists.
//!
//! The engine matches rows by identity, never by position. For each build it
//! walks the new list once, resolves which rows persisted, and emits the
//! smallest set of structural operations the rendering surface needs:
//!
//! - identity only in the old list, or present in both with an incompatible
//!   view type, becomes a removal (plus an insertion for the replacement);
//! - identity only in the new list becomes an insertion;
//! - a persisting identity with a changed content fingerprint becomes an
//!   in-place update carrying the previous item as payload;
//! - persisting identities whose relative order changed become moves.
//!
//! Moves are minimal in the displaced-item sense: a longest increasing
//! subsequence of old positions (taken in new-list order) stays put, and
//! exactly the rows outside it move. A consecutive block shift therefore
//! costs one move per displaced row, never a rebuild of the whole tail.
//!
//! Complexity is O(n log n) for the common mostly-stable list; each emitted
//! move or insert pays a linear scan of the working list, so heavily
//! shuffled lists degrade toward quadratic rather than invoking a general
//! edit-distance algorithm.

use ahash::AHashMap;

use crate::item::Identity;
use crate::list::FrozenList;
use crate::op::{EditOp, EditScript};

/// Compute the edit script transforming `previous` into `next`.
///
/// Pure: no state is read or written besides the two lists. Both lists must
/// have unique identities; the controller validates this before freezing.
///
/// The returned script is ordered for safe sequential application: removals
/// (back to front), then updates, then a back-to-front placement pass
/// interleaving inserts and moves. Every operation's positions are valid at
/// the moment it is applied.
pub fn compute_edit_script(previous: &FrozenList, next: &FrozenList) -> EditScript {
    let mut script = EditScript::new();

    let old_index: AHashMap<Identity, usize> = previous
        .iter()
        .enumerate()
        .map(|(pos, item)| (item.identity(), pos))
        .collect();

    // For each new position, the old position of the same row, when the row
    // persisted with a compatible view type.
    let paired_old: Vec<Option<usize>> = next
        .iter()
        .map(|item| {
            old_index
                .get(&item.identity())
                .copied()
                .filter(|&old_pos| {
                    previous
                        .get(old_pos)
                        .is_some_and(|old| old.view_type() == item.view_type())
                })
        })
        .collect();

    let mut paired_new: Vec<Option<usize>> = vec![None; previous.len()];
    for (new_pos, old_pos) in paired_old.iter().enumerate() {
        if let Some(old_pos) = old_pos {
            paired_new[*old_pos] = Some(new_pos);
        }
    }

    collect_removals(&mut script, &paired_new);
    collect_updates(&mut script, previous, next, &paired_new);
    collect_placements(&mut script, &paired_old, &paired_new);

    script
}

/// Emit batched removals back to front, so each removal's position is
/// unaffected by the ones already applied.
fn collect_removals(script: &mut EditScript, paired_new: &[Option<usize>]) {
    let mut end = paired_new.len();
    while end > 0 {
        if paired_new[end - 1].is_some() {
            end -= 1;
            continue;
        }
        let mut start = end - 1;
        while start > 0 && paired_new[start - 1].is_none() {
            start -= 1;
        }
        script.push(EditOp::Remove {
            position: start,
            count: end - start,
        });
        end = start;
    }
}

/// Emit batched updates for persisting rows whose fingerprint changed.
///
/// Positions are expressed against the post-removal list: the survivors in
/// old order. The payload carries the previous items in position order.
fn collect_updates(
    script: &mut EditScript,
    previous: &FrozenList,
    next: &FrozenList,
    paired_new: &[Option<usize>],
) {
    let mut run_start: Option<usize> = None;
    let mut payload = Vec::new();
    let mut rank = 0usize;

    for (old_pos, new_pos) in paired_new.iter().enumerate() {
        let Some(new_pos) = new_pos else { continue };
        let changed = match (previous.get(old_pos), next.get(*new_pos)) {
            (Some(old), Some(new)) => old.content_fingerprint() != new.content_fingerprint(),
            _ => false,
        };
        if changed {
            run_start.get_or_insert(rank);
            // paired_new guarantees the old item exists here
            if let Some(old) = previous.get(old_pos) {
                payload.push(old.clone());
            }
        } else if let Some(position) = run_start.take() {
            script.push(EditOp::Update {
                position,
                count: payload.len(),
                payload: std::mem::take(&mut payload),
            });
        }
        rank += 1;
    }
    if let Some(position) = run_start.take() {
        script.push(EditOp::Update {
            position,
            count: payload.len(),
            payload,
        });
    }
}

/// Emit inserts and moves in one back-to-front placement pass.
///
/// The working list starts as the survivors (tagged with their new
/// positions) in old order, which is exactly the list state after removals
/// and updates. Walking the new list from the end, each row not yet in its
/// place is inserted or moved directly before the previously placed row, so
/// positions are valid at application time. Rows on the longest increasing
/// subsequence of old positions never move.
fn collect_placements(
    script: &mut EditScript,
    paired_old: &[Option<usize>],
    paired_new: &[Option<usize>],
) {
    let mut working: Vec<usize> = paired_new.iter().filter_map(|p| *p).collect();
    let stable = stable_positions(paired_old);

    for t in (0..paired_old.len()).rev() {
        // Index the row must land directly before: the position of row t+1,
        // or the end of the working list for the last row.
        let anchor = match paired_old.get(t + 1) {
            None => working.len(),
            Some(_) => position_of(&working, t + 1),
        };

        match paired_old[t] {
            None => {
                // Inserted row. Consecutive inserts land at the same anchor
                // and merge into one range op.
                match script.last_mut() {
                    Some(EditOp::Insert { position, count }) if *position == anchor => {
                        *count += 1;
                    }
                    _ => script.push(EditOp::Insert {
                        position: anchor,
                        count: 1,
                    }),
                }
                working.insert(anchor, t);
            }
            Some(_) if stable[t] => {}
            Some(_) => {
                let from = position_of(&working, t);
                let to = if from < anchor { anchor - 1 } else { anchor };
                if from != to {
                    script.push(EditOp::Move { from, to });
                    let row = working.remove(from);
                    working.insert(to, row);
                }
            }
        }
    }
}

fn position_of(working: &[usize], value: usize) -> usize {
    working
        .iter()
        .position(|&v| v == value)
        .unwrap_or(working.len())
}

/// Mark the persisting rows that keep their relative order: a longest
/// increasing subsequence of old positions, taken in new-list order.
/// Everything outside it is judged moved.
fn stable_positions(paired_old: &[Option<usize>]) -> Vec<bool> {
    let pairs: Vec<(usize, usize)> = paired_old
        .iter()
        .enumerate()
        .filter_map(|(new_pos, old_pos)| old_pos.map(|o| (new_pos, o)))
        .collect();

    let mut stable = vec![false; paired_old.len()];
    if pairs.is_empty() {
        return stable;
    }

    // Patience algorithm with parent links for reconstruction.
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; pairs.len()];
    for i in 0..pairs.len() {
        let value = pairs[i].1;
        let slot = tails.partition_point(|&j| pairs[j].1 < value);
        if slot > 0 {
            parent[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        stable[pairs[i].0] = true;
        cursor = parent[i];
    }
    stable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, RowItem, ViewType};
    use crate::list::BuildList;

    fn list(ids: &[i64]) -> FrozenList {
        let mut build = BuildList::new();
        for &id in ids {
            build.add(RowItem::new(ViewType(0)).id(id));
        }
        build.freeze()
    }

    fn ops(previous: &[i64], next: &[i64]) -> Vec<EditOp> {
        compute_edit_script(&list(previous), &list(next))
            .into_iter()
            .collect()
    }

    #[test]
    fn identical_lists_yield_empty_script() {
        assert!(ops(&[1, 2, 3], &[1, 2, 3]).is_empty());
        assert!(ops(&[], &[]).is_empty());
    }

    #[test]
    fn initial_build_is_one_insert_batch() {
        let script = ops(&[], &[1, 2, 3]);
        assert!(matches!(
            script.as_slice(),
            [EditOp::Insert {
                position: 0,
                count: 3
            }]
        ));
    }

    #[test]
    fn clearing_is_one_remove_batch() {
        let script = ops(&[1, 2, 3], &[]);
        assert!(matches!(
            script.as_slice(),
            [EditOp::Remove {
                position: 0,
                count: 3
            }]
        ));
    }

    #[test]
    fn removals_are_batched_back_to_front() {
        let script = ops(&[1, 2, 3, 4, 5], &[1, 4]);
        assert!(matches!(
            script.as_slice(),
            [
                EditOp::Remove {
                    position: 4,
                    count: 1
                },
                EditOp::Remove {
                    position: 1,
                    count: 2
                },
            ]
        ));
    }

    #[test]
    fn middle_insertions_merge() {
        let script = ops(&[1, 2], &[1, 8, 9, 2]);
        assert!(matches!(
            script.as_slice(),
            [EditOp::Insert {
                position: 1,
                count: 2
            }]
        ));
    }

    #[test]
    fn block_shift_is_one_move_per_displaced_row() {
        // 1 moves to the end; 2..5 merely shift and must not move.
        let script = ops(&[1, 2, 3, 4, 5], &[2, 3, 4, 5, 1]);
        assert!(matches!(script.as_slice(), [EditOp::Move { from: 0, to: 4 }]));

        // The swap from the controller move scenario.
        let script = ops(&[1, 2, 3], &[2, 1, 3]);
        assert_eq!(script.len(), 1);
        assert!(matches!(script[0], EditOp::Move { .. }));
    }

    #[test]
    fn fingerprint_change_yields_single_update_with_payload() {
        let mut old = BuildList::new();
        old.add(RowItem::new(ViewType(0)).id(5).field("value", 1));
        let mut new = BuildList::new();
        new.add(RowItem::new(ViewType(0)).id(5).field("value", 2));

        let script = compute_edit_script(&old.freeze(), &new.freeze());
        let ops: Vec<EditOp> = script.into_iter().collect();
        match ops.as_slice() {
            [EditOp::Update {
                position: 0,
                count: 1,
                payload,
            }] => {
                assert_eq!(payload.len(), 1);
                assert_eq!(payload[0].identity(), crate::Identity::Id(5));
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn contiguous_updates_batch() {
        let build = |values: [i64; 3]| {
            let mut list = BuildList::new();
            for (i, v) in values.into_iter().enumerate() {
                list.add(RowItem::new(ViewType(0)).id(i as i64).field("v", v));
            }
            list.freeze()
        };
        let script = compute_edit_script(&build([1, 1, 1]), &build([2, 2, 1]));
        let ops: Vec<EditOp> = script.into_iter().collect();
        assert!(matches!(
            ops.as_slice(),
            [EditOp::Update {
                position: 0,
                count: 2,
                ..
            }]
        ));
    }

    #[test]
    fn view_type_change_is_remove_plus_insert() {
        let mut old = BuildList::new();
        old.add(RowItem::new(ViewType(1)).id(7));
        let mut new = BuildList::new();
        new.add(RowItem::new(ViewType(2)).id(7));

        let script = compute_edit_script(&old.freeze(), &new.freeze());
        let ops: Vec<EditOp> = script.into_iter().collect();
        assert!(matches!(
            ops.as_slice(),
            [
                EditOp::Remove {
                    position: 0,
                    count: 1
                },
                EditOp::Insert {
                    position: 0,
                    count: 1
                },
            ]
        ));
    }

    #[test]
    fn equal_content_different_identities_are_unrelated_rows() {
        let mut old = BuildList::new();
        old.add(RowItem::new(ViewType(0)).id(1).field("v", 9));
        let mut new = BuildList::new();
        new.add(RowItem::new(ViewType(0)).id(2).field("v", 9));

        let script = compute_edit_script(&old.freeze(), &new.freeze());
        let ops: Vec<EditOp> = script.into_iter().collect();
        assert!(matches!(
            ops.as_slice(),
            [EditOp::Remove { .. }, EditOp::Insert { .. }]
        ));
    }
}
