use crate::context::AppContext;
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext) -> Result<()> {
    let database = app.database().await?;
    database.apply_schema().await?;
    info!("price_observations schema is in place");
    Ok(())
}
