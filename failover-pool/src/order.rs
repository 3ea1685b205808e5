// Copyright 2020 Joyent, Inc.

//! Strategies for the order in which servers are tried within a round.
//!
//! Whatever the order, the first server that produces a connection ends the
//! round and the `get_connection` call.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// Chooses the order of server indices tried in one round.
pub trait ServerOrder: Debug + Send + Sync {
    /// Indices into the server list, in the order they should be tried during
    /// the zero-based `round` of a `get_connection` call. Indices out of range
    /// are skipped by the manager.
    fn select_order(&self, server_count: usize, round: u64) -> Vec<usize>;
}

/// List order, restarting from the first server every round.
#[derive(Clone, Copy, Debug, Default)]
pub struct InOrder;

impl ServerOrder for InOrder {
    fn select_order(&self, server_count: usize, _round: u64) -> Vec<usize> {
        (0..server_count).collect()
    }
}

/// List order, with the starting server advanced by one on every round of
/// every call.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerOrder for RoundRobin {
    fn select_order(&self, server_count: usize, _round: u64) -> Vec<usize> {
        if server_count == 0 {
            return Vec::new();
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed) % server_count;
        (0..server_count)
            .map(|i| (start + i) % server_count)
            .collect()
    }
}

/// A fresh random order every round.
#[derive(Clone, Copy, Debug, Default)]
pub struct Shuffled;

impl ServerOrder for Shuffled {
    fn select_order(&self, server_count: usize, _round: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..server_count).collect();
        shuffle(&mut order, rand::thread_rng());
        order
    }
}

/// Fisher-Yates shuffle
fn shuffle<T, R>(items: &mut [T], mut rng: R)
where
    R: Rng,
{
    let mut i = items.len();
    while i > 1 {
        i -= 1;
        let new_idx = rng.gen_range(0..=i);
        items.swap(i, new_idx);
    }
}
