use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use super::{check_series, SeriesStore, StoredSeries};
use crate::error::SinkError;
use crate::normalize::NormalizedSeries;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS series (
        pathname         TEXT PRIMARY KEY NOT NULL,
        identifier       TEXT NOT NULL,
        a_part           TEXT NOT NULL,
        b_part           TEXT NOT NULL,
        c_part           TEXT NOT NULL,
        e_part           TEXT NOT NULL,
        f_part           TEXT NOT NULL,
        units            TEXT NOT NULL,
        value_type       TEXT NOT NULL,
        interval_minutes INTEGER NOT NULL,
        grid_minutes     INTEGER NOT NULL,
        start_minute     INTEGER NOT NULL,
        end_minute       INTEGER NOT NULL,
        time_zone        TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS samples (
        pathname TEXT NOT NULL,
        minute   INTEGER NOT NULL,
        value    REAL NOT NULL,
        PRIMARY KEY (pathname, minute)
    ) WITHOUT ROWID;
";

/// Series store backed by a single SQLite file.
///
/// The connection takes an exclusive lock on first write and holds it until [`SeriesStore::close`].
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Opens or creates the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| {
            row.get::<_, String>(0)
        })?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened series store");
        Ok(Self {
            path,
            conn: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection, SinkError> {
        self.conn.as_ref().ok_or(SinkError::Closed)
    }

    pub fn pathnames(&self) -> Result<Vec<String>, SinkError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT pathname FROM series ORDER BY pathname")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn read(&self, pathname: &str) -> Result<Option<StoredSeries>, SinkError> {
        let conn = self.conn()?;
        let meta = conn
            .query_row(
                "SELECT pathname, identifier, units, value_type, interval_minutes, grid_minutes,
                        start_minute, end_minute, time_zone
                 FROM series WHERE pathname = ?1",
                params![pathname],
                |row| {
                    Ok(StoredSeries {
                        pathname: row.get(0)?,
                        identifier: row.get(1)?,
                        units: row.get(2)?,
                        value_type: row.get(3)?,
                        interval_minutes: row.get(4)?,
                        grid_minutes: row.get(5)?,
                        start_minute: row.get(6)?,
                        end_minute: row.get(7)?,
                        time_zone: row.get(8)?,
                        samples: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut stored) = meta else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT minute, value FROM samples WHERE pathname = ?1 ORDER BY minute")?;
        let rows = stmt.query_map(params![pathname], |row| Ok((row.get(0)?, row.get(1)?)))?;
        for row in rows {
            stored.samples.push(row?);
        }
        Ok(Some(stored))
    }
}

impl SeriesStore for SqliteStore {
    fn put(&mut self, series: &NormalizedSeries) -> Result<(), SinkError> {
        check_series(series)?;
        let conn = self.conn.as_mut().ok_or(SinkError::Closed)?;
        let pathname = series.pathname();
        let path = &series.path;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO series (pathname, identifier, a_part, b_part, c_part, e_part, f_part,
                                 units, value_type, interval_minutes, grid_minutes,
                                 start_minute, end_minute, time_zone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(pathname) DO UPDATE SET
                 identifier = excluded.identifier,
                 units = excluded.units,
                 value_type = excluded.value_type,
                 interval_minutes = excluded.interval_minutes,
                 grid_minutes = excluded.grid_minutes,
                 time_zone = excluded.time_zone,
                 start_minute = MIN(series.start_minute, excluded.start_minute),
                 end_minute = MAX(series.end_minute, excluded.end_minute)",
            params![
                pathname,
                series.identifier,
                path.a,
                path.b,
                path.c,
                path.e,
                path.f,
                series.units,
                series.value_type,
                series.interval_minutes,
                series.grid_minutes,
                series.start_minute,
                series.end_minute,
                series.time_zone,
            ],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO samples (pathname, minute, value) VALUES (?1, ?2, ?3)",
            )?;
            for (minute, value) in series.present() {
                stmt.execute(params![pathname, minute, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| SinkError::Database(err))?;
            debug!(path = %self.path.display(), "closed series store");
        }
        Ok(())
    }
}
