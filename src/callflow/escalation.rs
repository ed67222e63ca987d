//! Operator dial order for one escalation chain.
//!
//! Each enabled human gets `priority + offset`, where the offsets are drawn in
//! creation order from an RNG seeded with the chain's seed, and the list is
//! sorted ascending. Priorities are whole numbers, so any two distinct
//! priorities are at least 1 apart; offsets lie in `[0, PRIORITY_JITTER)` with
//! `PRIORITY_JITTER < 1`, so jitter only ever reorders humans that share a
//! priority. Re-deriving the order with the same seed and the same humans
//! gives the same list, which is how every retry callback finds its place.

use crate::directory::{Human, PhoneNumber};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

/// Width of the random offset added to each priority.
pub const PRIORITY_JITTER: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialTarget {
    pub name: String,
    pub phone: PhoneNumber,
}

pub fn new_seed() -> u64 {
    rand::random()
}

pub fn escalation_order(seed: u64, humans: &[Human]) -> Vec<DialTarget> {
    let mut enabled: Vec<&Human> = humans.iter().filter(|h| h.priority > 0).collect();
    enabled.sort_by_key(|h| h.id);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut keyed: Vec<(f64, &Human)> = enabled
        .into_iter()
        .map(|h| (h.priority as f64 + rng.random::<f64>() * PRIORITY_JITTER, h))
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    keyed
        .into_iter()
        .map(|(_, h)| DialTarget {
            name: h.name.clone(),
            phone: h.phone.clone(),
        })
        .collect()
}
