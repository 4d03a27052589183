use crate::queue::DurableQueue;
use crate::sink::ObservationSink;
use log::{error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub remaining: usize,
}

/// Replays queued observations through the store on its own cadence.
pub struct QueueDrainer<'a> {
    queue: &'a DurableQueue,
}

impl<'a> QueueDrainer<'a> {
    pub fn new(queue: &'a DurableQueue) -> Self {
        Self { queue }
    }

    pub fn has_pending(&self) -> bool {
        self.queue.exists()
    }

    pub async fn run_cycle<S>(&self, sink: &mut S) -> DrainReport
    where
        S: ObservationSink + ?Sized,
    {
        match self.queue.drain_and_retry(sink).await {
            Ok(outcome) => {
                info!(
                    "Drainer cycle: processed={} remaining={}",
                    outcome.processed, outcome.remaining
                );
                DrainReport {
                    processed: outcome.processed,
                    remaining: outcome.remaining,
                }
            }
            Err(err) => {
                error!("Drainer cycle failed: {}", err);
                DrainReport::default()
            }
        }
    }
}
