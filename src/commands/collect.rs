use crate::collector::{Collector, CycleReport};
use crate::context::AppContext;
use crate::database::Database;
use crate::prices_api::TimeseriesSource;
use crate::source::ObservationSource;
use anyhow::Result;
use log::{info, warn};

pub async fn run(app: &AppContext, item_id: i64) -> Result<CycleReport> {
    info!("Starting collector cycle for item {}", item_id);
    let client = app.prices_client()?;
    let source = TimeseriesSource::new(&client, item_id);
    Ok(collect_from(app, &source).await)
}

/// Fetches first and only connects to the store when there is something to
/// write. A failed connection degrades to queueing the whole batch.
pub(crate) async fn collect_from<Src>(app: &AppContext, source: &Src) -> CycleReport
where
    Src: ObservationSource + ?Sized,
{
    let collector = Collector::new(app.queue());
    let observations = collector.fetch(source).await;
    if observations.is_empty() {
        return collector.persist(None::<&mut Database>, observations).await;
    }

    let mut database = match app.database().await {
        Ok(database) => Some(database),
        Err(err) => {
            warn!("Database unavailable for {}: {:#}", source.describe(), err);
            None
        }
    };
    collector.persist(database.as_mut(), observations).await
}
