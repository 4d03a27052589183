use crate::context::AppContext;
use crate::drainer::{DrainReport, QueueDrainer};
use anyhow::Result;
use log::{debug, warn};

pub async fn run(app: &AppContext) -> Result<DrainReport> {
    let drainer = QueueDrainer::new(app.queue());
    if !drainer.has_pending() {
        debug!(
            "No queue file at {}; nothing to drain",
            app.queue().queue_path().display()
        );
        return Ok(DrainReport::default());
    }

    let mut database = match app.database().await {
        Ok(database) => database,
        Err(err) => {
            warn!("Database unavailable; leaving queue for the next cycle: {:#}", err);
            return Ok(DrainReport::default());
        }
    };
    Ok(drainer.run_cycle(&mut database).await)
}
