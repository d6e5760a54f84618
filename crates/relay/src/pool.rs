use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use delay_echo_domain::config::BalancingStrategy;

use crate::RelayError;

/// One upstream handed out by a pool. Must be returned through
/// [`UpstreamPool::release`] once the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    slot: usize,
    port: u16,
}

impl Lease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Trait describing how the balancer picks upstreams.
pub trait UpstreamPool: Send + Sync {
    /// Picks the upstream for a new session.
    fn acquire(&self) -> Lease;

    /// Returns the upstream and records how long the session held it.
    fn release(&self, lease: Lease, held_for: Duration);
}

#[derive(Debug)]
struct Slot {
    port: u16,
    in_flight: usize,
    response_time: Duration,
}

#[derive(Debug)]
struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Fixed-size pool with one slot per configured upstream port.
///
/// Round robin walks the slots in configuration order. Least response time
/// prefers idle slots, then the slot whose last session was shortest; slots
/// never used count as zero, and ties go to the earlier slot.
#[derive(Debug)]
pub struct BackendPool {
    strategy: BalancingStrategy,
    state: Mutex<PoolState>,
}

impl BackendPool {
    pub fn new(strategy: BalancingStrategy, ports: &[u16]) -> Result<Self, RelayError> {
        if ports.is_empty() {
            return Err(RelayError::EmptyPool);
        }

        let slots = ports
            .iter()
            .map(|&port| Slot {
                port,
                in_flight: 0,
                response_time: Duration::ZERO,
            })
            .collect();

        Ok(Self {
            strategy,
            state: Mutex::new(PoolState { slots, cursor: 0 }),
        })
    }

    pub fn strategy(&self) -> BalancingStrategy {
        self.strategy
    }

    pub fn in_flight(&self) -> usize {
        self.lock().slots.iter().map(|slot| slot.in_flight).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UpstreamPool for BackendPool {
    fn acquire(&self) -> Lease {
        let mut state = self.lock();
        let slot = match self.strategy {
            BalancingStrategy::RoundRobin => {
                let slot = state.cursor;
                state.cursor = (state.cursor + 1) % state.slots.len();
                slot
            }
            BalancingStrategy::LeastResponseTime => state
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, slot)| (slot.in_flight, slot.response_time))
                .map(|(idx, _)| idx)
                .unwrap_or(0),
        };

        let entry = &mut state.slots[slot];
        entry.in_flight += 1;
        Lease {
            slot,
            port: entry.port,
        }
    }

    fn release(&self, lease: Lease, held_for: Duration) {
        let mut state = self.lock();
        if let Some(entry) = state.slots.get_mut(lease.slot) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.response_time = held_for;
        }
    }
}
