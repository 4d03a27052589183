use crate::collector::CycleReport;
use crate::commands::collect::collect_from;
use crate::context::AppContext;
use crate::prices_api::SnapshotSource;
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext, timestamp: i64) -> Result<CycleReport> {
    info!("Starting snapshot collector cycle for timestamp {}", timestamp);
    let client = app.prices_client()?;
    let source = SnapshotSource::new(&client, timestamp);
    Ok(collect_from(app, &source).await)
}
