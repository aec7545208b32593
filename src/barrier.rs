//! Counting barrier for the per-parameter fetches of one station.
//!
//! Each `arm` starts a new epoch and hands out a `FetchTicket`. Completions
//! carrying an older epoch are reported as `Stale` and leave the current
//! count alone, so a user switching stations mid-fetch cannot have the new
//! station's barrier decremented by the old station's late responses.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::logging::{self, DataSource};

/// Identifies one arming of a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub epoch: u64,
    pub station_id: u32,
}

/// Result of reporting one finished fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Other fetches of the current epoch are still outstanding.
    Pending { remaining: usize },
    /// This completion (or an earlier one) brought the count to zero.
    Settled,
    /// The ticket belongs to a superseded epoch.
    Stale,
}

#[derive(Debug, Default)]
struct BarrierState {
    epoch: u64,
    station_id: Option<u32>,
    pending: usize,
}

#[derive(Debug, Default)]
pub struct FetchBarrier {
    state: Mutex<BarrierState>,
    settled: Condvar,
}

impl FetchBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new epoch expecting `expected` completions for `station_id`.
    ///
    /// `expected == 0` arms an already-settled barrier. Waiters on the
    /// previous epoch are woken and see their ticket as no longer current.
    pub fn arm(&self, station_id: u32, expected: usize) -> FetchTicket {
        let mut state = self.lock();
        state.epoch += 1;
        state.station_id = Some(station_id);
        state.pending = expected;
        let ticket = FetchTicket {
            epoch: state.epoch,
            station_id,
        };
        drop(state);

        self.settled.notify_all();
        ticket
    }

    /// Records one finished fetch, successful or failed.
    pub fn complete(&self, ticket: FetchTicket) -> Completion {
        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            return Completion::Stale;
        }

        if state.pending == 0 {
            logging::warn(
                DataSource::Session,
                Some(&ticket.station_id.to_string()),
                &format!("Extra completion for already settled epoch {}", ticket.epoch),
            );
            return Completion::Settled;
        }

        state.pending -= 1;
        if state.pending > 0 {
            return Completion::Pending {
                remaining: state.pending,
            };
        }
        drop(state);

        self.settled.notify_all();
        Completion::Settled
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.lock().epoch == ticket.epoch
    }

    /// Station the current epoch was armed for, if any.
    pub fn current_station(&self) -> Option<u32> {
        self.lock().station_id
    }

    /// Outstanding completions for `ticket`, or `None` once it is stale.
    pub fn remaining(&self, ticket: FetchTicket) -> Option<usize> {
        let state = self.lock();
        (state.epoch == ticket.epoch).then_some(state.pending)
    }

    /// Blocks until `ticket`'s epoch settles, it is superseded, or `timeout`
    /// elapses. Returns true only if the epoch settled while still current.
    pub fn wait_settled(&self, ticket: FetchTicket, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.epoch != ticket.epoch {
                return false;
            }
            if state.pending == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .settled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
