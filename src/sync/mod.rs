//! # Sync Module
//!
//! The periodic measure / decide / upload-or-archive cycle.
//!
//! Each cycle:
//! 1. Takes one reading against the current reference pressure and builds a
//!    `TelemetryRecord`
//! 2. Asks the network probe once whether the link is up
//! 3. Online: uploads the reading, then drains the record store backlog in a
//!    single batch request and deletes what was drained
//! 4. Offline: archives the reading in the record store
//!
//! Store and upload failures are logged and the cycle carries on. A reading
//! taken offline while the store is unavailable is lost; there is no
//! in-memory queue behind the store.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::DrainPolicy;
use crate::error::Result;
use crate::network::NetworkProbe;
use crate::record::{RecordId, TelemetryRecord};
use crate::reference::ReferencePressure;
use crate::sensor::Altimeter;
use crate::state::{ProcessState, StateFile};
use crate::store::RecordStore;
use crate::uplink::endpoint::{KeenIoEndpoint, ThingSpeakEndpoint};
use crate::uplink::{RequestOutcome, UploadGateway};

/// Where readings are uploaded
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Live endpoint, one request per reading
    pub primary: Option<ThingSpeakEndpoint>,
    /// Batch endpoint, used for live readings and the backlog
    pub batch: KeenIoEndpoint,
}

/// Tunables of the cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    /// Minimum altitude change [m] that counts towards the climb
    pub climb_threshold: f32,
    /// When drained records are deleted
    pub drain_policy: DrainPolicy,
}

/// What a single cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// A reading was taken
    pub measured: bool,
    /// The network probe reported the link up
    pub online: bool,
    /// Upload requests issued
    pub uploads: usize,
    /// Id the reading was archived under, if it was
    pub archived: Option<RecordId>,
    /// Backlog records deleted after upload
    pub drained: usize,
    /// Unreadable backlog records deleted without upload
    pub discarded: usize,
    /// The reading was lost because it could not be archived
    pub dropped: bool,
}

/// Runs the sync cycle against an owned record store.
pub struct SyncController<A, R, N, G, C> {
    store: RecordStore,
    altimeter: A,
    reference: R,
    network: N,
    gateway: G,
    clock: C,
    endpoints: Endpoints,
    settings: SyncSettings,
    state: ProcessState,
    state_file: Option<StateFile>,
}

impl<A, R, N, G, C> SyncController<A, R, N, G, C>
where
    A: Altimeter,
    R: ReferencePressure,
    N: NetworkProbe,
    G: UploadGateway,
    C: Clock,
{
    /// Create a controller with fresh process state.
    ///
    /// The store should already have been opened; a closed store simply
    /// disables archiving and draining.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: RecordStore,
        altimeter: A,
        reference: R,
        network: N,
        gateway: G,
        clock: C,
        endpoints: Endpoints,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            altimeter,
            reference,
            network,
            gateway,
            clock,
            endpoints,
            settings,
            state: ProcessState::default(),
            state_file: None,
        }
    }

    /// Restore process state from `file` and checkpoint back to it.
    #[must_use]
    pub fn with_state_file(mut self, file: StateFile) -> Self {
        self.state = file.load();
        self.state_file = Some(file);
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    /// Run cycles every `period` until `shutdown` resolves.
    ///
    /// The delay is measured from the end of one cycle to the start of the
    /// next, so cycles never overlap. A cycle in progress is never
    /// interrupted; shutdown is only observed while sleeping.
    pub async fn run<F>(&mut self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Starting sync loop, period {:?}", period);

        loop {
            let report = self.run_cycle().await;
            info!(
                cycle = self.state.cycles,
                online = report.online,
                uploads = report.uploads,
                archived = ?report.archived,
                drained = report.drained,
                discarded = report.discarded,
                dropped = report.dropped,
                "Cycle finished"
            );
            self.checkpoint();

            tokio::select! {
                _ = sleep(period) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, leaving sync loop");
                    break;
                }
            }
        }
    }

    /// Execute one full cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let record = match self.capture().await {
            Ok(record) => record,
            Err(e) => {
                error!("Measurement failed, skipping cycle: {}", e);
                return report;
            }
        };
        report.measured = true;

        report.online = self.network.is_network_alive().await;
        if report.online {
            self.upload_live(&record, &mut report).await;
            self.drain_backlog(&mut report).await;
        } else {
            info!("Network down, archiving reading");
            self.archive(record, &mut report);
        }

        self.state.cycles += 1;
        report
    }

    /// Persist process state, logging failures.
    pub fn checkpoint(&self) {
        if let Some(file) = &self.state_file {
            if let Err(e) = file.checkpoint(&self.state) {
                warn!("Failed to checkpoint state to {}: {}", file.path().display(), e);
            }
        }
    }

    async fn capture(&mut self) -> Result<TelemetryRecord> {
        let reference_pressure = self.reference.current().await;
        let measurement = self.altimeter.measure(reference_pressure)?;
        let climbed = self
            .state
            .climb
            .update(measurement.altitude, self.settings.climb_threshold);

        let record = TelemetryRecord::new(
            measurement.pressure,
            reference_pressure,
            measurement.altitude,
            climbed,
            measurement.temperature,
            self.clock.up_time(),
        )
        .with_timestamp(self.clock.now());

        debug!(
            "Captured {} Pa, {:.1} m, {:.1} m climbed",
            record.pressure(),
            record.altitude(),
            record.altitude_climbed()
        );
        Ok(record)
    }

    async fn upload_live(&self, record: &TelemetryRecord, report: &mut CycleReport) {
        if let Some(primary) = &self.endpoints.primary {
            let outcome = self.gateway.send(primary.host(), &primary.request(record)).await;
            report.uploads += 1;
            log_outcome("live reading", primary.host(), &outcome);
        }

        let batch = &self.endpoints.batch;
        match batch.request(std::slice::from_ref(record)) {
            Ok(request) => {
                let outcome = self.gateway.send(batch.host(), &request).await;
                report.uploads += 1;
                log_outcome("live reading", batch.host(), &outcome);
            }
            Err(e) => error!("Failed to build live batch request: {}", e),
        }
    }

    async fn drain_backlog(&self, report: &mut CycleReport) {
        if !self.store.is_open() {
            debug!("Record store unavailable, nothing to drain");
            return;
        }

        let count = match self.store.peek_count() {
            Ok(0) => {
                debug!("No archived records");
                return;
            }
            Ok(count) => count,
            Err(e) => {
                error!("Failed to count archived records: {}", e);
                return;
            }
        };

        let ids: BTreeSet<RecordId> = match self.store.list_ids(count) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                error!("Failed to list archived records: {}", e);
                return;
            }
        };

        let batch = match self.store.read_batch(&ids) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to read archived records: {}", e);
                return;
            }
        };
        if batch.count() == 0 {
            warn!("None of {} archived record(s) could be read, discarding them", ids.len());
            match self.store.delete_batch(&ids) {
                Ok(deleted) => report.discarded = deleted,
                Err(e) => error!("Failed to discard unreadable records: {}", e),
            }
            return;
        }
        info!("Uploading backlog of {} record(s)", batch.count());

        let endpoint = &self.endpoints.batch;
        let request = match endpoint.request(&batch.to_records()) {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to build backlog request: {}", e);
                return;
            }
        };
        let outcome = self.gateway.send(endpoint.host(), &request).await;
        report.uploads += 1;
        log_outcome("backlog", endpoint.host(), &outcome);

        // The collector's answer is not inspected: `Completed` only means the
        // exchange finished, so records can be lost if the POST was rejected.
        let delete = match self.settings.drain_policy {
            DrainPolicy::AfterSend => true,
            DrainPolicy::AfterCompleted => outcome.is_completed(),
        };
        if !delete {
            warn!("Keeping {} archived record(s) for the next cycle", ids.len());
            return;
        }

        match self.store.delete_batch(&ids) {
            Ok(deleted) => report.drained = deleted,
            Err(e) => error!("Failed to delete drained records: {}", e),
        }
    }

    fn archive(&self, record: TelemetryRecord, report: &mut CycleReport) {
        if !self.store.is_open() {
            error!("Record store unavailable, reading dropped");
            report.dropped = true;
            return;
        }

        match self.store.save(&record.into_archived()) {
            Ok(id) => report.archived = Some(id),
            Err(e) => {
                error!("Failed to archive reading, dropped: {}", e);
                report.dropped = true;
            }
        }
    }
}

fn log_outcome(what: &str, host: &str, outcome: &RequestOutcome) {
    match outcome {
        RequestOutcome::Completed(response) => {
            if response.is_success() {
                debug!("Uploaded {} to {} (status {:?})", what, host, response.status);
            } else {
                warn!("Uploaded {} to {} but got status {:?}", what, host, response.status);
            }
        }
        failure => error!("Uploading {} to {} failed: {:?}", what, host, failure),
    }
}
