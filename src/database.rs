use crate::models::Observation;
use crate::sink::ObservationSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, warn};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row, Statement, Transaction};

pub const SCHEMA_SQL: &str = include_str!("../schema.sql");

const INSERT_OBSERVATION_SQL: &str = "INSERT INTO price_observations (
        entity_id, avg_high_price, high_price_volume,
        avg_low_price, low_price_volume, event_time, fetch_time
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (entity_id, event_time) DO NOTHING";

const ROW_SAVEPOINT: &str = "observation_row";

/// One PostgreSQL session. Each cycle opens its own and drops it on return,
/// which also ends the background connection task.
pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref();
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("failed to connect to PostgreSQL")?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }

    pub async fn apply_schema(&self) -> Result<()> {
        self.client
            .batch_execute(SCHEMA_SQL)
            .await
            .context("failed to apply price_observations schema")?;
        Ok(())
    }

    /// Returns the number of rows written: 1 for a new key, 0 for a duplicate.
    pub async fn insert_observation(&self, observation: &Observation) -> Result<u64> {
        let inserted = self
            .client
            .execute(INSERT_OBSERVATION_SQL, &observation_params(observation))
            .await?;
        Ok(inserted)
    }

    /// Inserts all rows in one transaction with a savepoint per row, so a
    /// failing row is rolled back alone. Returns the rows that failed. If the
    /// transaction itself cannot be opened or committed, every row failed.
    pub async fn insert_observations(
        &mut self,
        observations: &[Observation],
    ) -> Result<Vec<Observation>> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.client.transaction().await?;
        let statement = tx.prepare(INSERT_OBSERVATION_SQL).await?;

        let mut failed = Vec::new();
        for observation in observations {
            if let Err(err) = insert_in_savepoint(&mut tx, &statement, observation).await {
                warn!(
                    "Insert failed for item {} at {}: {}",
                    observation.entity_id, observation.event_time, err
                );
                failed.push(observation.clone());
            }
        }

        tx.commit().await?;
        Ok(failed)
    }

    pub async fn count_observations(&self) -> Result<i64> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM price_observations", &[])
            .await?;
        Ok(row.get(0))
    }

    pub async fn get_observation(
        &self,
        entity_id: i64,
        event_time: i64,
    ) -> Result<Option<Observation>> {
        let row = self
            .client
            .query_opt(
                "SELECT entity_id, avg_high_price, high_price_volume,
                        avg_low_price, low_price_volume, event_time, fetch_time
                 FROM price_observations
                 WHERE entity_id = $1 AND event_time = $2",
                &[&entity_id, &event_time],
            )
            .await?;
        Ok(row.map(|row| observation_from_row(&row)))
    }
}

#[async_trait]
impl ObservationSink for Database {
    async fn insert_one(&mut self, observation: &Observation) -> bool {
        match self.insert_observation(observation).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    "Insert failed for item {} at {}: {}",
                    observation.entity_id, observation.event_time, err
                );
                false
            }
        }
    }

    async fn insert_many(&mut self, observations: &[Observation]) -> Vec<Observation> {
        match self.insert_observations(observations).await {
            Ok(failed) => failed,
            Err(err) => {
                error!(
                    "Batch insert of {} observation(s) failed: {}",
                    observations.len(),
                    err
                );
                observations.to_vec()
            }
        }
    }
}

async fn insert_in_savepoint(
    tx: &mut Transaction<'_>,
    statement: &Statement,
    observation: &Observation,
) -> Result<u64, tokio_postgres::Error> {
    let savepoint = tx.savepoint(ROW_SAVEPOINT).await?;
    match savepoint.execute(statement, &observation_params(observation)).await {
        Ok(inserted) => {
            savepoint.commit().await?;
            Ok(inserted)
        }
        Err(err) => {
            savepoint.rollback().await?;
            Err(err)
        }
    }
}

fn observation_params(observation: &Observation) -> [&(dyn ToSql + Sync); 7] {
    [
        &observation.entity_id,
        &observation.avg_high_price,
        &observation.high_price_volume,
        &observation.avg_low_price,
        &observation.low_price_volume,
        &observation.event_time,
        &observation.fetch_time,
    ]
}

fn observation_from_row(row: &Row) -> Observation {
    Observation {
        entity_id: row.get(0),
        avg_high_price: row.get(1),
        high_price_volume: row.get(2),
        avg_low_price: row.get(3),
        low_price_volume: row.get(4),
        event_time: row.get(5),
        fetch_time: row.get(6),
    }
}
