//! The in-memory record of the station currently being browsed.
//!
//! A session is opened when a station is selected. It arms the shared
//! `FetchBarrier` with one slot per requested parameter, then absorbs each
//! parameter's batch exactly once as it arrives, in any order and from any
//! thread. Analysis is available per parameter as soon as that parameter
//! has arrived; `is_settled` / `wait_settled` report when all have.
//!
//! Opening a new session on the same barrier supersedes the old one. Late
//! batches for the old session still merge into the old session's record
//! (its own state is never wrong), but the barrier reports them as `Stale`
//! so the caller knows to discard the result.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::analysis::{self, WindowAnalysis};
use crate::archive::{ArchiveError, ArchiveStore, SaveOutcome};
use crate::barrier::{Completion, FetchBarrier, FetchTicket};
use crate::ingest::gios::{self, Sensor};
use crate::ingest::IngestError;
use crate::logging::{self, DataSource};
use crate::merge::{self, MergeSummary};
use crate::model::{ParameterNames, Reading, StationRecord, WindowSpec};
use crate::stations::Station;

/// What happened to one delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted {
        completion: Completion,
        /// `None` when the fetch failed.
        merge: Option<MergeSummary>,
    },
    /// The parameter was not requested, or has already been delivered.
    Ignored,
}

#[derive(Debug)]
struct SessionState {
    record: StationRecord,
    arrived: HashSet<String>,
    failed: Vec<String>,
}

#[derive(Debug)]
pub struct StationSession {
    station_id: u32,
    requested: Vec<String>,
    barrier: Arc<FetchBarrier>,
    ticket: FetchTicket,
    state: Mutex<SessionState>,
}

impl StationSession {
    /// Opens a session expecting one batch per distinct code in
    /// `param_codes`. Each series is created up front, named from `names`.
    pub fn open(
        barrier: Arc<FetchBarrier>,
        station: &Station,
        param_codes: &[String],
        names: &ParameterNames,
    ) -> Self {
        let mut requested: Vec<String> = Vec::with_capacity(param_codes.len());
        for code in param_codes {
            if !requested.contains(code) {
                requested.push(code.clone());
            }
        }

        let mut record = StationRecord::new(&station.name, &station.location());
        for code in &requested {
            record.series_mut_or_insert(code).param_name = Some(names.display_name(code).to_string());
        }

        let ticket = barrier.arm(station.id, requested.len());
        logging::debug(
            DataSource::Session,
            Some(&station.name),
            &format!(
                "Opened session (epoch {}) for {} parameter(s)",
                ticket.epoch,
                requested.len()
            ),
        );

        Self {
            station_id: station.id,
            requested,
            barrier,
            ticket,
            state: Mutex::new(SessionState {
                record,
                arrived: HashSet::new(),
                failed: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn station_id(&self) -> u32 {
        self.station_id
    }

    pub fn ticket(&self) -> FetchTicket {
        self.ticket
    }

    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Absorbs the fetch result for `param_code`, then counts it against
    /// the barrier. A failed fetch counts but leaves the series untouched.
    pub fn deliver(&self, param_code: &str, result: Result<Vec<Reading>, IngestError>) -> Delivery {
        let mut state = self.lock();
        let station_name = state.record.name.clone();

        if !self.requested.iter().any(|c| c == param_code) || state.arrived.contains(param_code) {
            logging::warn(
                DataSource::Session,
                Some(&station_name),
                &format!("Ignoring unexpected or repeated batch for {}", param_code),
            );
            return Delivery::Ignored;
        }
        state.arrived.insert(param_code.to_string());

        let merge = match result {
            Ok(readings) => Some(merge::merge_into(
                state.record.series_mut_or_insert(param_code),
                &readings,
            )),
            Err(e) => {
                logging::log_fetch_failure(
                    DataSource::Gios,
                    &station_name,
                    &format!("{} readings", param_code),
                    &e,
                );
                state.failed.push(param_code.to_string());
                None
            }
        };

        let completion = self.barrier.complete(self.ticket);
        match completion {
            Completion::Settled => {
                let failed = state.failed.len();
                logging::log_fetch_summary(
                    &station_name,
                    self.requested.len(),
                    self.requested.len() - failed,
                    failed,
                );
            }
            Completion::Stale => logging::debug(
                DataSource::Session,
                Some(&station_name),
                &format!("{} arrived after the session was superseded", param_code),
            ),
            Completion::Pending { .. } => {}
        }

        Delivery::Accepted { completion, merge }
    }

    /// Windowed analysis of `param_code`, or `None` until its batch arrives.
    pub fn analyze(&self, param_code: &str, window: WindowSpec, now: NaiveDateTime) -> Option<WindowAnalysis> {
        let state = self.lock();
        if !state.arrived.contains(param_code) {
            return None;
        }
        let series = state.record.series(param_code)?;
        Some(analysis::analyze(series, window, now))
    }

    pub fn has_arrived(&self, param_code: &str) -> bool {
        self.lock().arrived.contains(param_code)
    }

    /// Requested parameters whose batch has not arrived yet, in request order.
    pub fn pending(&self) -> Vec<String> {
        let state = self.lock();
        self.requested
            .iter()
            .filter(|c| !state.arrived.contains(*c))
            .cloned()
            .collect()
    }

    pub fn failed(&self) -> Vec<String> {
        self.lock().failed.clone()
    }

    /// True once every requested parameter has been delivered, whether or
    /// not the session is still current.
    pub fn is_settled(&self) -> bool {
        self.lock().arrived.len() == self.requested.len()
    }

    /// True while no newer session has armed the shared barrier.
    pub fn is_current(&self) -> bool {
        self.barrier.is_current(self.ticket)
    }

    /// Waits for the remaining deliveries. Returns false on timeout or if
    /// the session was superseded.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        self.barrier.wait_settled(self.ticket, timeout)
    }

    /// A copy of the record as it stands.
    pub fn snapshot(&self) -> StationRecord {
        self.lock().record.clone()
    }

    pub fn save_to(&self, store: &ArchiveStore) -> Result<SaveOutcome, ArchiveError> {
        store.save(&self.snapshot())
    }

    /// Fetches every requested parameter from GIOŚ, one thread per sensor,
    /// delivering each result as it completes.
    ///
    /// Requested parameters with no matching sensor are delivered as
    /// `IngestError::NoData` so the barrier still settles.
    pub fn fetch_from_gios(
        &self,
        client: &reqwest::blocking::Client,
        base_url: &str,
        sensors: &[Sensor],
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(self.requested.len());
        thread::scope(|scope| {
            let mut handles = Vec::new();
            for code in &self.requested {
                match sensors.iter().find(|s| &s.param_code == code) {
                    Some(sensor) => {
                        let sensor_id = sensor.id;
                        handles.push(scope.spawn(move || {
                            let result = gios::fetch_readings(client, base_url, sensor_id);
                            self.deliver(code, result)
                        }));
                    }
                    None => deliveries.push(self.deliver(
                        code,
                        Err(IngestError::NoData(format!("no sensor for {}", code))),
                    )),
                }
            }
            for handle in handles {
                match handle.join() {
                    Ok(delivery) => deliveries.push(delivery),
                    Err(_) => logging::error(
                        DataSource::Session,
                        Some(&self.station_id.to_string()),
                        "Fetch thread panicked",
                    ),
                }
            }
        });
        deliveries
    }
}
