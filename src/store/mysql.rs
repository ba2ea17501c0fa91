use anyhow::{Context, Result};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, QueryBuilder};

use crate::model::{DeviceReading, MachineLog};

use super::RecordSink;

/// The MySQL store.
///
/// Write-capable only: the benchmark never queries the relational store,
/// it is seeded purely for storage comparison.
pub struct MySqlStore {
    pool: MySqlPool,
    machine_log_table: String,
    readings_table: String,
}

impl MySqlStore {
    pub async fn connect(
        url: &str,
        machine_log_table: &str,
        readings_table: &str,
    ) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to mysql at {url}"))?;
        Ok(Self {
            pool,
            machine_log_table: machine_log_table.to_owned(),
            readings_table: readings_table.to_owned(),
        })
    }

    /// Creates the target tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let machine_log = format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
                id INT AUTO_INCREMENT PRIMARY KEY, \
                partij_id VARCHAR(255), \
                partij_omschrijving TEXT, \
                herkomst VARCHAR(255), \
                maat VARCHAR(255), \
                container VARCHAR(255), \
                inhaaldatum DATETIME, \
                locatie VARCHAR(255), \
                timestamp DATETIME, \
                value INT \
            )",
            self.machine_log_table,
        );
        sqlx::query(&machine_log)
            .execute(&self.pool)
            .await
            .context("failed to create the machine log table")?;

        let readings = format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
                id INT AUTO_INCREMENT PRIMARY KEY, \
                device_id INT, \
                device_item_id INT, \
                created_at DATETIME, \
                updated_at DATETIME, \
                timestamp DATETIME(6), \
                value DOUBLE \
            )",
            self.readings_table,
        );
        sqlx::query(&readings)
            .execute(&self.pool)
            .await
            .context("failed to create the readings table")?;

        Ok(())
    }
}

#[async_trait]
impl RecordSink for MySqlStore {
    async fn insert_machine_logs(&self, batch: &[MachineLog]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "INSERT INTO {} (partij_id, partij_omschrijving, herkomst, maat, \
             container, inhaaldatum, locatie, timestamp, value) ",
            self.machine_log_table,
        ));
        builder.push_values(batch, |mut row, record| {
            row.push_bind(record.partij_id.as_str())
                .push_bind(record.partij_omschrijving.as_str())
                .push_bind(record.herkomst.as_str())
                .push_bind(record.maat.as_str())
                .push_bind(record.container.as_str())
                .push_bind(record.inhaaldatum.as_str())
                .push_bind(record.locatie.as_str())
                .push_bind(record.timestamp.as_str())
                .push_bind(record.value);
        });
        builder
            .build()
            .execute(&self.pool)
            .await
            .context("machine log bulk insert failed")?;
        Ok(())
    }

    async fn insert_readings(&self, batch: &[DeviceReading]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "INSERT INTO {} (device_id, device_item_id, created_at, updated_at, \
             timestamp, value) ",
            self.readings_table,
        ));
        builder.push_values(batch, |mut row, record| {
            row.push_bind(record.device_id)
                .push_bind(record.device_item_id)
                .push_bind(record.created_at)
                .push_bind(record.updated_at)
                .push_bind(record.timestamp)
                .push_bind(record.value);
        });
        builder
            .build()
            .execute(&self.pool)
            .await
            .context("reading bulk insert failed")?;
        Ok(())
    }
}
