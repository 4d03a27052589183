use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use ingestor::collector::Collector;
use ingestor::database::Database;
use ingestor::drainer::QueueDrainer;
use ingestor::models::Observation;
use ingestor::queue::DurableQueue;
use ingestor::sink::ObservationSink;
use std::sync::Once;
use tokio_postgres::Client;

const STORE_TEST_DB_NAME: &str = "ingestor_test_store";
const REPLAY_TEST_DB_NAME: &str = "ingestor_test_replay";

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn observation(entity_id: i64, event_time: i64) -> Observation {
    Observation {
        entity_id,
        avg_high_price: Some(210),
        high_price_volume: None,
        avg_low_price: Some(204),
        low_price_volume: Some(17),
        event_time,
        fetch_time: Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap(),
    }
}

struct TestDatabase {
    admin_url: String,
    database_url: String,
    db_name: String,
}

impl TestDatabase {
    async fn create_with_name(db_name: &str) -> Result<Self> {
        let root = test_db_root_url()?;
        let admin_url = format!("{}/postgres", root);
        let database_url = format!("{}/{}", root, db_name);

        let admin_client = connect(&admin_url).await?;
        drop_database_with_client(&admin_client, db_name).await?;
        admin_client
            .batch_execute(&format!("CREATE DATABASE {} TEMPLATE template0", db_name))
            .await?;

        let database = Database::new(&database_url).await?;
        database.apply_schema().await?;

        Ok(Self {
            admin_url,
            database_url,
            db_name: db_name.to_string(),
        })
    }

    fn database_url(&self) -> &str {
        &self.database_url
    }

    async fn cleanup(self) -> Result<()> {
        let admin_client = connect(&self.admin_url).await?;
        drop_database_with_client(&admin_client, &self.db_name).await
    }
}

fn test_db_root_url() -> Result<String> {
    dotenvy::dotenv().ok();
    let url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow!("DATABASE_URL must be set in .env"))?;
    let url = url
        .split('?')
        .next()
        .unwrap_or(url.as_str())
        .trim_end_matches('/');
    let root = url.rsplit_once('/').map(|(root, _)| root).unwrap_or(url);
    Ok(root.to_string())
}

async fn connect(url: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("postgres error: {}", err);
        }
    });
    Ok(client)
}

async fn drop_database_with_client(client: &Client, db_name: &str) -> Result<()> {
    client
        .execute(
            "SELECT pg_terminate_backend(pid)
             FROM pg_stat_activity
             WHERE datname = $1 AND pid <> pg_backend_pid()",
            &[&db_name],
        )
        .await
        .ok();
    client
        .batch_execute(&format!("DROP DATABASE IF EXISTS {}", db_name))
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server reachable via DATABASE_URL"]
async fn repeated_inserts_store_one_row() -> Result<()> {
    ensure_test_env();
    let test_db = TestDatabase::create_with_name(STORE_TEST_DB_NAME).await?;
    let mut database = Database::new(test_db.database_url()).await?;
    let row = observation(565, 1000);

    assert!(database.insert_one(&row).await);
    assert!(database.insert_one(&row).await);
    let failed = database
        .insert_many(&[row.clone(), observation(565, 1005), row.clone()])
        .await;

    assert!(failed.is_empty());
    assert_eq!(database.count_observations().await?, 2);
    assert_eq!(database.get_observation(565, 1000).await?, Some(row));

    drop(database);
    test_db.cleanup().await
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server reachable via DATABASE_URL"]
async fn failing_row_does_not_roll_back_batch() -> Result<()> {
    ensure_test_env();
    let test_db = TestDatabase::create_with_name(REPLAY_TEST_DB_NAME).await?;
    let admin = connect(test_db.database_url()).await?;
    admin
        .batch_execute(
            "ALTER TABLE price_observations
             ADD CONSTRAINT positive_high_price CHECK (avg_high_price IS NULL OR avg_high_price > 0)",
        )
        .await?;

    let mut database = Database::new(test_db.database_url()).await?;
    let mut bad = observation(565, 1005);
    bad.avg_high_price = Some(-1);
    let batch = vec![observation(565, 1000), bad.clone(), observation(565, 1010)];

    let dir = tempfile::tempdir()?;
    let queue = DurableQueue::new(dir.path());
    let report = Collector::new(&queue)
        .persist(Some(&mut database), batch)
        .await;

    assert_eq!(report.persisted, 2);
    assert_eq!(report.queued, 1);
    assert_eq!(queue.pending().await?, vec![bad]);
    assert_eq!(database.count_observations().await?, 2);

    admin
        .batch_execute("ALTER TABLE price_observations DROP CONSTRAINT positive_high_price")
        .await?;
    let drained = QueueDrainer::new(&queue).run_cycle(&mut database).await;

    assert_eq!(drained.processed, 1);
    assert!(!queue.queue_path().exists());
    assert_eq!(database.count_observations().await?, 3);
    let replayed = database
        .get_observation(565, 1005)
        .await?
        .ok_or_else(|| anyhow!("replayed row missing"))?;
    assert_eq!(replayed.fetch_time, observation(565, 1005).fetch_time);

    drop(database);
    drop(admin);
    test_db.cleanup().await
}
