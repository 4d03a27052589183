use crate::models::Observation;
use async_trait::async_trait;

/// Destination for observations, idempotent on `(entity_id, event_time)`.
///
/// `insert_one` reports `true` when the row is present afterwards, whether it
/// was written now or by an earlier delivery, and `false` only on a genuine
/// persistence failure.
#[async_trait]
pub trait ObservationSink: Send {
    async fn insert_one(&mut self, observation: &Observation) -> bool;

    /// Inserts each observation independently and returns the ones that
    /// failed, in input order.
    async fn insert_many(&mut self, observations: &[Observation]) -> Vec<Observation> {
        let mut failed = Vec::new();
        for observation in observations {
            if !self.insert_one(observation).await {
                failed.push(observation.clone());
            }
        }
        failed
    }
}
