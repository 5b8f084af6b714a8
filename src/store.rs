use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::collector::ProbeSink;
use crate::types::{Probe, ProbeOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

const SCHEMA_SQL: &str = r#"
-- One row per observed certificate or per failed probe
CREATE TABLE IF NOT EXISTS certificates (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    host             TEXT NOT NULL,
    ip               TEXT NOT NULL,
    failed           INTEGER NOT NULL DEFAULT 0,
    failure_error    TEXT,
    protocol         INTEGER,
    ciphersuite      INTEGER,
    certificate_idx  INTEGER,
    certificate_raw  BLOB,
    certificate_data TEXT,
    fingerprint_sha1 TEXT,
    timestamp        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cert_host ON certificates(host);
CREATE INDEX IF NOT EXISTS idx_cert_fingerprint ON certificates(fingerprint_sha1);

-- Scan bookkeeping so an interrupted run can resume
CREATE TABLE IF NOT EXISTS hosts (
    hostname    TEXT PRIMARY KEY,
    started_at  INTEGER,
    finished_at INTEGER
);
"#;

/// SQLite-backed certificate archive and host ledger.
pub struct CertStore {
    conn: Connection,
}

impl CertStore {
    /// Open (and create if needed) the archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened certificate store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Insert hosts that are not known yet. Returns how many were new.
    pub fn insert_hosts(&mut self, hosts: &[String]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO hosts (hostname) VALUES (?1)")?;
            for host in hosts {
                inserted += stmt.execute(params![host])?;
            }
        }
        tx.commit()?;
        info!(inserted, total = hosts.len(), "hosts written to the database");
        Ok(inserted)
    }

    /// Hosts that never finished and either never started or started more
    /// than `staleness` ago.
    pub fn load_pending_hosts(&self, staleness: Duration) -> Result<Vec<String>, StoreError> {
        let window = i64::try_from(staleness.as_secs()).unwrap_or(i64::MAX);
        let cutoff = unix_now().saturating_sub(window);
        let mut stmt = self.conn.prepare(
            "SELECT hostname FROM hosts
             WHERE finished_at IS NULL AND (started_at IS NULL OR started_at < ?1)
             ORDER BY hostname",
        )?;
        let hosts = stmt
            .query_map(params![cutoff], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hosts)
    }

    pub fn mark_started(&mut self, host: &str) -> Result<(), StoreError> {
        self.mark_started_at(host, unix_now())
    }

    fn mark_started_at(&mut self, host: &str, at: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO hosts (hostname, started_at) VALUES (?1, ?2)
             ON CONFLICT(hostname) DO UPDATE SET started_at = excluded.started_at",
            params![host, at],
        )?;
        Ok(())
    }

    pub fn mark_finished(&mut self, host: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE hosts SET finished_at = ?2 WHERE hostname = ?1",
            params![host, unix_now()],
        )?;
        Ok(())
    }

    pub fn count_certificates(&self, host: &str) -> Result<u64, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM certificates WHERE host = ?1 AND failed = 0",
            params![host],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

impl ProbeSink for CertStore {
    fn save(&mut self, probe: &Probe) -> Result<u64, StoreError> {
        let ts = probe.timestamp.unix_timestamp();
        let rows = match &probe.outcome {
            ProbeOutcome::Failed(failure) => self.conn.execute(
                "INSERT INTO certificates (host, ip, failed, failure_error, timestamp)
                 VALUES (?1, ?2, 1, ?3, ?4)",
                params![probe.host, probe.ip, failure.to_string(), ts],
            )?,
            ProbeOutcome::Certificate(cert) => {
                let data = cert.record.as_ref().map(serde_json::to_string).transpose()?;
                let fingerprint = cert
                    .record
                    .as_ref()
                    .map(|r| r.fingerprint_sha1.as_str())
                    .filter(|fp| !fp.is_empty());
                self.conn.execute(
                    "INSERT INTO certificates
                     (host, ip, protocol, ciphersuite, certificate_idx, certificate_raw,
                      certificate_data, fingerprint_sha1, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        probe.host,
                        probe.ip,
                        cert.protocol,
                        cert.cipher_suite,
                        cert.index as i64,
                        cert.der,
                        data,
                        fingerprint,
                        ts
                    ],
                )?
            }
        };
        Ok(rows as u64)
    }

    fn host_started(&mut self, host: &str) -> Result<(), StoreError> {
        self.mark_started(host)
    }

    fn host_finished(&mut self, host: &str) -> Result<(), StoreError> {
        self.mark_finished(host)
    }
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
