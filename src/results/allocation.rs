//! D'Hondt divisor method for proportional seat allocation.

use std::collections::HashMap;

/// Allocate `total_seats` over `votes` (entity id, vote count) pairs using
/// the D'Hondt largest-quotient method.
///
/// Entities below `threshold_percent` of the total vote are dropped before
/// any seat is awarded and do not affect the remaining entities' divisors.
/// Each round awards one seat to the entity with the strictly largest
/// quotient `votes / (seats + 1)`; on a tie the entity seen first in slice
/// order wins, so callers must supply a deterministic ordering.
///
/// An entity with zero votes can only be seated once every other quotient is
/// also zero; that follows from the method's definition and is not
/// special-cased.
pub fn allocate(
    votes: &[(i64, i64)],
    total_seats: u32,
    threshold_percent: f64,
) -> HashMap<i64, u32> {
    let total_votes: i64 = votes.iter().map(|(_, v)| *v).sum();

    let eligible: Vec<(i64, i64)> = votes
        .iter()
        .copied()
        .filter(|(_, v)| {
            if threshold_percent <= 0.0 || total_votes == 0 {
                return true;
            }
            (*v as f64) / (total_votes as f64) * 100.0 >= threshold_percent
        })
        .collect();

    let mut seats: HashMap<i64, u32> = votes.iter().map(|(id, _)| (*id, 0)).collect();
    if eligible.is_empty() || total_seats == 0 {
        return seats;
    }

    for _ in 0..total_seats {
        let mut best: Option<(i64, f64)> = None;
        for (id, entity_votes) in &eligible {
            let divisor = seats[id] + 1;
            let quotient = *entity_votes as f64 / divisor as f64;
            // Strict comparison keeps the first-seen entity on ties.
            if best.map_or(true, |(_, best_q)| quotient > best_q) {
                best = Some((*id, quotient));
            }
        }
        if let Some((winner, _)) = best {
            if let Some(count) = seats.get_mut(&winner) {
                *count += 1;
            }
        }
    }

    seats
}
