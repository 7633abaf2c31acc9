use crate::models::{sheet_rows, ScrapeRecord};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::info;

// ── Sink trait ────────────────────────────────────────────────────────────────

/// Tabular destination for one run's records.
pub trait ResultSink {
    /// Persist `records`; returns how many were written.
    fn store(&mut self, records: &[ScrapeRecord]) -> Result<usize>;
}

// ── CSV sink ──────────────────────────────────────────────────────────────────

/// Rewrites the whole file on every run: header in the first row, one row per record.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSink for CsvSink {
    fn store(&mut self, records: &[ScrapeRecord]) -> Result<usize> {
        ensure_parent(&self.path)?;
        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("Failed to open {:?} for writing", self.path))?;

        for row in sheet_rows(records) {
            writer.write_record(&row)?;
        }
        writer.flush()?;

        info!("Wrote {} rows to {:?}", records.len(), self.path);
        Ok(records.len())
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS scrape_run_ids START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('scrape_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    targets_processed   INTEGER DEFAULT 0,
    records_inserted    INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS swot_snapshots (
    run_id          INTEGER  NOT NULL,
    ticker          VARCHAR  NOT NULL,
    name            VARCHAR  NOT NULL,
    strengths       INTEGER  NOT NULL,
    weaknesses      INTEGER  NOT NULL,
    opportunities   INTEGER  NOT NULL,
    threats         INTEGER  NOT NULL,
    scraped_at      TIMESTAMP NOT NULL,
    PRIMARY KEY (run_id, ticker)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_snapshots_ticker ON swot_snapshots (ticker);
CREATE INDEX IF NOT EXISTS idx_snapshots_time   ON swot_snapshots (scraped_at);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    pub fn insert_snapshots(&self, run_id: i64, records: &[ScrapeRecord]) -> Result<usize> {
        if records.is_empty() { return Ok(0); }

        let tx = self.conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO swot_snapshots
                (run_id, ticker, name, strengths, weaknesses, opportunities, threats, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (run_id, ticker) DO UPDATE SET
                name          = excluded.name,
                strengths     = excluded.strengths,
                weaknesses    = excluded.weaknesses,
                opportunities = excluded.opportunities,
                threats       = excluded.threats,
                scraped_at    = excluded.scraped_at
        "#;

        for rec in records {
            tx.execute(sql, params![
                run_id, rec.ticker, rec.name,
                i64::from(rec.counts.strengths), i64::from(rec.counts.weaknesses),
                i64::from(rec.counts.opportunities), i64::from(rec.counts.threats),
                rec.scraped_at.naive_utc(),
            ]).with_context(|| format!("insert snapshot {} (run {})", rec.ticker, run_id))?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub fn snapshot_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM swot_snapshots")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn ticker_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(DISTINCT ticker) FROM swot_snapshots")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    /// (ticker, strengths, weaknesses, opportunities, threats) from the newest run.
    pub fn latest_counts(&self) -> Result<Vec<(String, i64, i64, i64, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT ticker, strengths, weaknesses, opportunities, threats
               FROM swot_snapshots
               WHERE run_id = (SELECT MAX(run_id) FROM swot_snapshots)
               ORDER BY ticker"#,
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(
        &self, run_id: i64, targets: usize, records: usize, error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               targets_processed = ?, records_inserted = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                targets as i64, records as i64, error, run_id,
            ],
        )?;
        Ok(())
    }

    pub fn run_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM scrape_runs")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn last_run_at(&self) -> Result<Option<NaiveDateTime>> {
        let mut s = self.conn.prepare(
            "SELECT MAX(finished_at) FROM scrape_runs WHERE status = 'success'",
        )?;
        Ok(s.query_row([], |r| r.get(0))?)
    }
}

impl ResultSink for Repository {
    fn store(&mut self, records: &[ScrapeRecord]) -> Result<usize> {
        let run_id = self.begin_scrape_run()?;
        match self.insert_snapshots(run_id, records) {
            Ok(n) => {
                self.finish_scrape_run(run_id, records.len(), n, None)?;
                info!("Stored {} snapshots (run {})", n, run_id);
                Ok(n)
            }
            Err(e) => {
                let msg = format!("{:#}", e);
                self.finish_scrape_run(run_id, records.len(), 0, Some(&msg)).ok();
                Err(e)
            }
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    Ok(())
}
