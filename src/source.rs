use crate::models::Observation;
use anyhow::Result;
use async_trait::async_trait;

/// Supplies one batch of observations per collector cycle.
///
/// Implementations own their retry policy; an `Err` means attempts were
/// exhausted and the collector treats the cycle as having fetched nothing.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Vec<Observation>>;
}

/// Fixed batch, used when observations were obtained out of band.
pub struct StaticSource {
    label: String,
    observations: Vec<Observation>,
}

impl StaticSource {
    pub fn new<S: Into<String>>(label: S, observations: Vec<Observation>) -> Self {
        Self {
            label: label.into(),
            observations,
        }
    }
}

#[async_trait]
impl ObservationSource for StaticSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn fetch(&self) -> Result<Vec<Observation>> {
        Ok(self.observations.clone())
    }
}
