use crate::models::Observation;
use crate::queue::DurableQueue;
use crate::sink::ObservationSink;
use crate::source::ObservationSource;
use log::{error, info, warn};

/// Counts for one collector cycle. `lost` is non-zero only when rows could be
/// neither persisted nor queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub persisted: usize,
    pub queued: usize,
    pub lost: usize,
}

/// Runs one fetch-and-persist cycle, routing store failures to the queue.
///
/// Nothing here returns an error: every failure ends up as a count in the
/// [`CycleReport`] and a log line.
pub struct Collector<'a> {
    queue: &'a DurableQueue,
}

impl<'a> Collector<'a> {
    pub fn new(queue: &'a DurableQueue) -> Self {
        Self { queue }
    }

    /// Source errors have already been retried by the source; they collapse
    /// to an empty batch here.
    pub async fn fetch<Src>(&self, source: &Src) -> Vec<Observation>
    where
        Src: ObservationSource + ?Sized,
    {
        match source.fetch().await {
            Ok(observations) => observations,
            Err(err) => {
                error!("Fetching {} failed: {:#}", source.describe(), err);
                Vec::new()
            }
        }
    }

    /// Persists `observations` through `sink` and queues whatever failed.
    /// Without a sink (no store connection) everything is queued.
    pub async fn persist<S>(
        &self,
        sink: Option<&mut S>,
        observations: Vec<Observation>,
    ) -> CycleReport
    where
        S: ObservationSink + ?Sized,
    {
        let fetched = observations.len();
        if fetched == 0 {
            info!("Collector cycle: nothing fetched");
            return CycleReport::default();
        }

        let failed = match sink {
            Some(sink) => sink.insert_many(&observations).await,
            None => {
                warn!(
                    "No store available; queueing all {} fetched observation(s)",
                    fetched
                );
                observations
            }
        };
        let persisted = fetched - failed.len();

        let (queued, lost) = match self.queue.append(&failed).await {
            Ok(queued) => (queued, 0),
            Err(err) => {
                error!(
                    "Could not queue {} unpersisted observation(s): {}",
                    failed.len(),
                    err
                );
                (0, failed.len())
            }
        };

        let report = CycleReport {
            fetched,
            persisted,
            queued,
            lost,
        };
        info!(
            "Collector cycle: fetched={} persisted={} queued={} lost={}",
            report.fetched, report.persisted, report.queued, report.lost
        );
        report
    }

    pub async fn run_cycle<Src, S>(&self, source: &Src, sink: Option<&mut S>) -> CycleReport
    where
        Src: ObservationSource + ?Sized,
        S: ObservationSink + ?Sized,
    {
        let observations = self.fetch(source).await;
        self.persist(sink, observations).await
    }
}
