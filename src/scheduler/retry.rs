//! Retry queue and the distinct-flows assignment algorithm of §4.5.
//!
//! This is the trickiest piece of the worker pool: a bounded bipartite
//! matching between queued retries and free worker slots, where a retry may
//! not land on a flow it has already visited (unless it has visited all of
//! them, in which case its history resets). Implemented as Kuhn's augmenting
//! path algorithm over "retry -> candidate free slots" so that a later retry
//! may steal a slot from an earlier one exactly when the earlier retry still
//! has another slot available (§4.5's "steal... only if the earlier retry
//! has other options left").

use std::collections::{HashSet, VecDeque};

/// A previously failed unit queued for another attempt.
#[derive(Debug, Clone)]
pub struct PendingRetry<P> {
    pub payload: P,
    pub attempted_flows: HashSet<usize>,
    pub attempts_left: u32,
}

impl<P> PendingRetry<P> {
    #[must_use]
    pub fn new(payload: P, attempts_left: u32) -> Self {
        Self {
            payload,
            attempted_flows: HashSet::new(),
            attempts_left,
        }
    }
}

/// Assign queued retries to free worker slots.
///
/// `total_flows` is the current pool size, used to detect "this retry has
/// visited every flow" so its history can reset. Returns `(slot, retry)`
/// pairs to dispatch immediately; any retry that couldn't be matched stays at
/// the front of `pending` in its original relative order.
pub fn assign_retries<P>(
    pending: &mut VecDeque<PendingRetry<P>>,
    free_slots: &[usize],
    distinct_flows: bool,
    total_flows: usize,
) -> Vec<(usize, PendingRetry<P>)> {
    if pending.is_empty() || free_slots.is_empty() {
        return Vec::new();
    }

    if !distinct_flows {
        return assign_fifo(pending, free_slots);
    }

    assign_distinct(pending, free_slots, total_flows)
}

fn assign_fifo<P>(
    pending: &mut VecDeque<PendingRetry<P>>,
    free_slots: &[usize],
) -> Vec<(usize, PendingRetry<P>)> {
    let mut assigned = Vec::new();
    for &slot in free_slots {
        let Some(retry) = pending.pop_front() else {
            break;
        };
        assigned.push((slot, retry));
    }
    assigned
}

fn assign_distinct<P>(
    pending: &mut VecDeque<PendingRetry<P>>,
    free_slots: &[usize],
    total_flows: usize,
) -> Vec<(usize, PendingRetry<P>)> {
    let n = pending.len();
    // Reset any retry that has visited every flow, then compute this round's
    // candidate slots for each retry.
    let mut candidates: Vec<Vec<usize>> = Vec::with_capacity(n);
    for retry in pending.iter_mut() {
        if total_flows > 0 && retry.attempted_flows.len() >= total_flows {
            retry.attempted_flows.clear();
        }
        let cands: Vec<usize> = free_slots
            .iter()
            .copied()
            .filter(|s| !retry.attempted_flows.contains(s))
            .collect();
        candidates.push(cands);
    }

    let mut claimed_by: Vec<Option<usize>> = vec![None; free_slots.len()];
    let slot_pos: std::collections::HashMap<usize, usize> =
        free_slots.iter().enumerate().map(|(i, &s)| (s, i)).collect();

    let mut matched_retry: Vec<bool> = vec![false; n];
    let mut matches = 0usize;

    for i in 0..n {
        if matches >= free_slots.len() {
            break;
        }
        let mut visited = vec![false; free_slots.len()];
        if try_assign(i, &candidates, &slot_pos, &mut claimed_by, &mut visited) {
            matched_retry[i] = true;
            matches += 1;
        }
    }

    // Build the dispatch list in original pending order, removing matched
    // retries from the queue; unmatched ones stay queued.
    let mut dispatch = Vec::new();
    let mut remaining = VecDeque::new();
    let mut claim_lookup: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    for (slot_idx, owner) in claimed_by.iter().enumerate() {
        if let Some(retry_idx) = owner {
            claim_lookup.insert(*retry_idx, free_slots[slot_idx]);
        }
    }

    for (idx, retry) in pending.drain(..).enumerate() {
        if let Some(&slot) = claim_lookup.get(&idx) {
            dispatch.push((slot, retry));
        } else {
            remaining.push_back(retry);
        }
    }
    *pending = remaining;
    // Preserve deterministic slot order matching pending-order priority.
    dispatch.sort_by_key(|(slot, _)| *slot);
    dispatch
}

/// Kuhn's augmenting path: try to find a free or stealable slot for `retry_idx`.
fn try_assign(
    retry_idx: usize,
    candidates: &[Vec<usize>],
    slot_pos: &std::collections::HashMap<usize, usize>,
    claimed_by: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &ctx in &candidates[retry_idx] {
        let Some(&pos) = slot_pos.get(&ctx) else {
            continue;
        };
        if visited[pos] {
            continue;
        }
        visited[pos] = true;
        match claimed_by[pos] {
            None => {
                claimed_by[pos] = Some(retry_idx);
                return true;
            }
            Some(other) => {
                if try_assign(other, candidates, slot_pos, claimed_by, visited) {
                    claimed_by[pos] = Some(retry_idx);
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry(payload: u64) -> PendingRetry<u64> {
        PendingRetry::new(payload, 2)
    }

    #[test]
    fn fifo_assigns_in_order() {
        let mut pending = VecDeque::from([retry(1), retry(2), retry(3)]);
        let assigned = assign_retries(&mut pending, &[10, 11], false, 4);
        assert_eq!(assigned.len(), 2);
        assert_eq!(assigned[0].1.payload, 1);
        assert_eq!(assigned[1].1.payload, 2);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, 3);
    }

    #[test]
    fn distinct_avoids_attempted_flows() {
        let mut r1 = retry(1);
        r1.attempted_flows.insert(10);
        let mut pending = VecDeque::from([r1]);
        let assigned = assign_retries(&mut pending, &[10, 11], true, 4);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].0, 11);
    }

    #[test]
    fn distinct_resets_when_all_flows_visited() {
        let mut r1 = retry(1);
        r1.attempted_flows.insert(10);
        r1.attempted_flows.insert(11);
        let mut pending = VecDeque::from([r1]);
        // total_flows=2 means this retry has visited everything; it resets
        // and may be dispatched to either slot.
        let assigned = assign_retries(&mut pending, &[10, 11], true, 2);
        assert_eq!(assigned.len(), 1);
    }

    #[test]
    fn later_retry_steals_only_if_earlier_has_other_options() {
        // Retry A can only go to slot 10. Retry B can go to 10 or 11.
        // B should be pushed to 11, leaving A on 10 (no stealing needed).
        let mut a = retry(1);
        a.attempted_flows.insert(11);
        let b = retry(2);
        let mut pending = VecDeque::from([a, b]);
        let assigned = assign_retries(&mut pending, &[10, 11], true, 4);
        assert_eq!(assigned.len(), 2);
        let a_slot = assigned.iter().find(|(_, r)| r.payload == 1).unwrap().0;
        let b_slot = assigned.iter().find(|(_, r)| r.payload == 2).unwrap().0;
        assert_eq!(a_slot, 10);
        assert_eq!(b_slot, 11);
    }

    #[test]
    fn steals_via_augmenting_path_when_necessary() {
        // A can only use slot 10. B can only use slot 10 too, arriving
        // after A in priority. Since only one slot exists, B cannot be
        // matched and stays queued; A keeps slot 10 (no augmenting path
        // exists because B has no alternative).
        let mut a = retry(1);
        a.attempted_flows.insert(11);
        let mut b = retry(2);
        b.attempted_flows.insert(11);
        let mut pending = VecDeque::from([a, b]);
        let assigned = assign_retries(&mut pending, &[10, 11], true, 4);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].1.payload, 1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, 2);
    }

    #[test]
    fn unmatched_retries_stay_queued_in_relative_order() {
        let mut pending = VecDeque::from([retry(1), retry(2)]);
        let assigned = assign_retries(&mut pending, &[], true, 4);
        assert!(assigned.is_empty());
        assert_eq!(pending.len(), 2);
    }
}
