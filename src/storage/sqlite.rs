//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of every store trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//! - **Dedup at the schema level**: a partial unique index allows only one `open` alert per
//!   `(device_id, condition)`
//!
//! Timestamps are stored as Unix milliseconds.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{AlertStore, DeviceRegistry, IspRegistry, MetricStore};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Alert, AlertId, AlertSeverity, AlertStatus, Device, DeviceId, Isp, Metric, NewAlert,
    NewDevice, NewIsp, NewMetric,
};

const DEVICE_COLUMNS: &str = "id, name, ip_address, device_type, credential, port, \
     custom_targets, poll_interval_secs, is_active, is_online, last_seen, reported_name, \
     uptime_secs, cpu_load, memory_load, temperature";

const ALERT_COLUMNS: &str = "id, device_id, condition, title, description, severity, status, \
     created_at, acknowledged_at, resolved_at";

const ISP_COLUMNS: &str = "id, name, host, is_active, last_checked, latency_ms, packet_loss, \
     upstream_mbps, downstream_mbps";

/// SQLite storage backend
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use netpulse::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./netpulse.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self { pool })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn optional_timestamp(millis: Option<i64>) -> Option<DateTime<Utc>> {
        millis.map(Self::millis_to_timestamp)
    }

    fn device_from_row(row: &SqliteRow) -> StorageResult<Device> {
        let ip: String = row.try_get("ip_address")?;
        let device_type: String = row.try_get("device_type")?;
        let targets: String = row.try_get("custom_targets")?;
        let port: i64 = row.try_get("port")?;
        let uptime: i64 = row.try_get("uptime_secs")?;
        let interval: Option<i64> = row.try_get("poll_interval_secs")?;

        Ok(Device {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            ip_address: ip
                .parse()
                .map_err(|e| StorageError::Serialization(format!("bad ip_address {ip}: {e}")))?,
            device_type: device_type.parse().map_err(StorageError::Serialization)?,
            credential: row.try_get("credential")?,
            port: u16::try_from(port)
                .map_err(|e| StorageError::Serialization(format!("bad port {port}: {e}")))?,
            custom_targets: serde_json::from_str(&targets)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            poll_interval_secs: interval.map(|secs| secs.max(0) as u64),
            is_active: row.try_get("is_active")?,
            is_online: row.try_get("is_online")?,
            last_seen: Self::optional_timestamp(row.try_get("last_seen")?),
            reported_name: row.try_get("reported_name")?,
            uptime_secs: uptime.max(0) as u64,
            cpu_load: row.try_get("cpu_load")?,
            memory_load: row.try_get("memory_load")?,
            temperature: row.try_get("temperature")?,
        })
    }

    fn metric_from_row(row: &SqliteRow) -> StorageResult<Metric> {
        Ok(Metric {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            cpu_usage: row.try_get("cpu_usage")?,
            memory_usage: row.try_get("memory_usage")?,
            network_in: row.try_get("network_in")?,
            network_out: row.try_get("network_out")?,
            temperature: row.try_get("temperature")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<Alert> {
        let severity: String = row.try_get("severity")?;
        let status: String = row.try_get("status")?;

        Ok(Alert {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            condition: row.try_get("condition")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            severity: severity.parse().map_err(StorageError::Serialization)?,
            status: status.parse().map_err(StorageError::Serialization)?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            acknowledged_at: Self::optional_timestamp(row.try_get("acknowledged_at")?),
            resolved_at: Self::optional_timestamp(row.try_get("resolved_at")?),
        })
    }

    fn isp_from_row(row: &SqliteRow) -> StorageResult<Isp> {
        Ok(Isp {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            is_active: row.try_get("is_active")?,
            last_checked: Self::optional_timestamp(row.try_get("last_checked")?),
            latency_ms: row.try_get("latency_ms")?,
            packet_loss: row.try_get("packet_loss")?,
            upstream_mbps: row.try_get("upstream_mbps")?,
            downstream_mbps: row.try_get("downstream_mbps")?,
        })
    }

    async fn get_alert(&self, id: AlertId) -> StorageResult<Alert> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound { entity: "alert", id })?;
        Self::alert_from_row(&row)
    }

    pub async fn close(&self) {
        debug!("closing SQLite connection pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl DeviceRegistry for SqliteStore {
    async fn list_active(&self) -> StorageResult<Vec<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE is_active = 1 ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::device_from_row).collect()
    }

    async fn get(&self, id: DeviceId) -> StorageResult<Device> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound {
                entity: "device",
                id,
            })?;
        Self::device_from_row(&row)
    }

    #[instrument(skip(self, device), fields(device_id = device.id))]
    async fn save(&self, device: &Device) -> StorageResult<()> {
        // observed state only; configuration belongs to upsert
        let result = sqlx::query(
            r#"
            UPDATE devices SET
                is_online = ?, last_seen = ?, reported_name = ?, uptime_secs = ?,
                cpu_load = ?, memory_load = ?, temperature = ?
            WHERE id = ?
            "#,
        )
        .bind(device.is_online)
        .bind(device.last_seen.as_ref().map(Self::timestamp_to_millis))
        .bind(&device.reported_name)
        .bind(device.uptime_secs as i64)
        .bind(device.cpu_load)
        .bind(device.memory_load)
        .bind(device.temperature)
        .bind(device.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "device",
                id: device.id,
            });
        }
        Ok(())
    }

    async fn upsert(&self, device: NewDevice) -> StorageResult<Device> {
        let targets = serde_json::to_string(&device.custom_targets)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO devices (
                name, ip_address, device_type, credential, port,
                custom_targets, poll_interval_secs, is_active
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (ip_address) DO UPDATE SET
                name = excluded.name,
                device_type = excluded.device_type,
                credential = excluded.credential,
                port = excluded.port,
                custom_targets = excluded.custom_targets,
                poll_interval_secs = excluded.poll_interval_secs,
                is_active = excluded.is_active
            RETURNING id
            "#,
        )
        .bind(&device.name)
        .bind(device.ip_address.to_string())
        .bind(device.device_type.as_str())
        .bind(&device.credential)
        .bind(i64::from(device.port))
        .bind(targets)
        .bind(device.poll_interval_secs.map(|secs| secs as i64))
        .bind(device.is_active)
        .fetch_one(&self.pool)
        .await?;

        let id: DeviceId = row.try_get("id")?;
        self.get(id).await
    }

    async fn count_online(&self) -> StorageResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE is_online = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn append(&self, metric: NewMetric) -> StorageResult<Metric> {
        let row = sqlx::query(
            r#"
            INSERT INTO metrics (
                device_id, cpu_usage, memory_usage, network_in, network_out, temperature, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(metric.device_id)
        .bind(metric.cpu_usage)
        .bind(metric.memory_usage)
        .bind(metric.network_in)
        .bind(metric.network_out)
        .bind(metric.temperature)
        .bind(Self::timestamp_to_millis(&metric.timestamp))
        .fetch_one(&self.pool)
        .await?;

        Ok(metric.into_metric(row.try_get("id")?))
    }

    async fn latest(&self, device_id: Option<DeviceId>, limit: usize) -> StorageResult<Vec<Metric>> {
        let columns = "id, device_id, cpu_usage, memory_usage, network_in, network_out, \
                       temperature, timestamp";
        let rows = match device_id {
            Some(id) => {
                let sql = format!(
                    "SELECT {columns} FROM metrics WHERE device_id = ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?"
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql =
                    format!("SELECT {columns} FROM metrics ORDER BY timestamp DESC, id DESC LIMIT ?");
                sqlx::query(&sql)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::metric_from_row).collect()
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn find_open(&self, device_id: DeviceId, condition: &str) -> StorageResult<Option<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE device_id = ? AND condition = ? AND status = 'open' LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(condition)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::alert_from_row).transpose()
    }

    #[instrument(skip(self, alert), fields(device_id = alert.device_id, condition = %alert.condition))]
    async fn create(&self, alert: NewAlert) -> StorageResult<Alert> {
        let created_at = Utc::now();

        // the partial unique index turns a duplicate open alert into StorageError::Conflict
        let row = sqlx::query(
            r#"
            INSERT INTO alerts (device_id, condition, title, description, severity, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'open', ?)
            RETURNING id
            "#,
        )
        .bind(alert.device_id)
        .bind(&alert.condition)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.severity.as_str())
        .bind(Self::timestamp_to_millis(&created_at))
        .fetch_one(&self.pool)
        .await?;

        let id: AlertId = row.try_get("id")?;
        // round-trip through millis so the returned row matches what a later read yields
        Ok(alert.into_alert(
            id,
            Self::millis_to_timestamp(Self::timestamp_to_millis(&created_at)),
        ))
    }

    async fn set_status(&self, id: AlertId, status: AlertStatus) -> StorageResult<Alert> {
        let mut alert = self.get_alert(id).await?;
        alert.transition_to(status, Utc::now());

        sqlx::query(
            "UPDATE alerts SET status = ?, acknowledged_at = ?, resolved_at = ? WHERE id = ?",
        )
        .bind(alert.status.as_str())
        .bind(alert.acknowledged_at.as_ref().map(Self::timestamp_to_millis))
        .bind(alert.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_alert(id).await
    }

    async fn list_for_device(&self, device_id: DeviceId) -> StorageResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE device_id = ? ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn count_open(&self, severity: Option<AlertSeverity>) -> StorageResult<usize> {
        let count: i64 = match severity {
            Some(severity) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM alerts WHERE status = 'open' AND severity = ?",
                )
                .bind(severity.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE status = 'open'")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl IspRegistry for SqliteStore {
    async fn list_active_isps(&self) -> StorageResult<Vec<Isp>> {
        let sql = format!("SELECT {ISP_COLUMNS} FROM isps WHERE is_active = 1 ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::isp_from_row).collect()
    }

    async fn save_isp(&self, isp: &Isp) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE isps SET
                name = ?, host = ?, is_active = ?, last_checked = ?, latency_ms = ?,
                packet_loss = ?, upstream_mbps = ?, downstream_mbps = ?
            WHERE id = ?
            "#,
        )
        .bind(&isp.name)
        .bind(&isp.host)
        .bind(isp.is_active)
        .bind(isp.last_checked.as_ref().map(Self::timestamp_to_millis))
        .bind(isp.latency_ms)
        .bind(isp.packet_loss)
        .bind(isp.upstream_mbps)
        .bind(isp.downstream_mbps)
        .bind(isp.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "isp",
                id: isp.id,
            });
        }
        Ok(())
    }

    async fn upsert_isp(&self, isp: NewIsp) -> StorageResult<Isp> {
        let sql = format!(
            "INSERT INTO isps (name, host, is_active) VALUES (?, ?, ?) \
             ON CONFLICT (name) DO UPDATE SET host = excluded.host, is_active = excluded.is_active \
             RETURNING {ISP_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&isp.name)
            .bind(&isp.host)
            .bind(isp.is_active)
            .fetch_one(&self.pool)
            .await?;
        Self::isp_from_row(&row)
    }
}
