//! SQLite student store

use super::{StoreError, StoreFactory, StudentStore};
use crate::{ProgramRecord, StudentNumber, StudentRecord};
use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long a connection waits for another writer before reporting busy
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const DATE_FORMAT: &str = "%Y-%m-%d";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let busy = matches!(
            &err,
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        );
        if busy {
            StoreError::Busy(err.to_string())
        } else {
            StoreError::Database(err.to_string())
        }
    }
}

/// One SQLite connection
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets workers read while another connection commits
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS students(
                std_no INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                national_id TEXT,
                date_of_birth TEXT,
                gender TEXT,
                marital_status TEXT,
                religion TEXT,
                phone1 TEXT,
                phone2 TEXT,
                synced_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS student_programs(
                id INTEGER PRIMARY KEY,
                std_no INTEGER NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                status TEXT NOT NULL,
                FOREIGN KEY(std_no) REFERENCES students(std_no)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_student_programs_std_no ON student_programs(std_no)",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Read back one student with its programs
    pub fn student(&self, std_no: StudentNumber) -> Result<Option<StudentRecord>, StoreError> {
        let student = self
            .conn
            .query_row(
                "SELECT std_no, name, national_id, date_of_birth, gender, marital_status,
                        religion, phone1, phone2
                 FROM students WHERE std_no = ?",
                [std_no],
                |row| {
                    let date_of_birth: Option<String> = row.get(3)?;
                    Ok(StudentRecord {
                        std_no: row.get(0)?,
                        name: row.get(1)?,
                        national_id: row.get(2)?,
                        date_of_birth: date_of_birth
                            .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
                        gender: row.get(4)?,
                        marital_status: row.get(5)?,
                        religion: row.get(6)?,
                        phone1: row.get(7)?,
                        phone2: row.get(8)?,
                        programs: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut student) = student else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, name, version, status FROM student_programs
             WHERE std_no = ? ORDER BY id",
        )?;
        student.programs = stmt
            .query_map([std_no], |row| {
                Ok(ProgramRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    version: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(student))
    }

    /// Number of student rows
    pub fn student_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl StudentStore for SqliteStore {
    fn write_or_update(&mut self, record: &StudentRecord) -> Result<(), StoreError> {
        record.validate().map_err(StoreError::InvalidRecord)?;

        let synced_at = chrono::Utc::now().to_rfc3339();
        let date_of_birth = record
            .date_of_birth
            .map(|date| date.format(DATE_FORMAT).to_string());

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO students(std_no, name, national_id, date_of_birth, gender,
                                  marital_status, religion, phone1, phone2, synced_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(std_no) DO UPDATE SET
               name = excluded.name,
               national_id = excluded.national_id,
               date_of_birth = excluded.date_of_birth,
               gender = excluded.gender,
               marital_status = excluded.marital_status,
               religion = excluded.religion,
               phone1 = excluded.phone1,
               phone2 = excluded.phone2,
               synced_at = excluded.synced_at",
            params![
                record.std_no,
                record.name,
                record.national_id,
                date_of_birth,
                record.gender,
                record.marital_status,
                record.religion,
                record.phone1,
                record.phone2,
                synced_at,
            ],
        )?;

        for program in &record.programs {
            tx.execute(
                "INSERT INTO student_programs(id, std_no, name, version, status)
                 VALUES(?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   std_no = excluded.std_no,
                   name = excluded.name,
                   version = excluded.version,
                   status = excluded.status",
                params![
                    program.id,
                    record.std_no,
                    program.name,
                    program.version,
                    program.status
                ],
            )?;
        }
        tx.commit()?;

        debug!(std_no = record.std_no, programs = record.programs.len(), "Student upserted");
        Ok(())
    }
}

/// Opens a new connection to one database file per worker
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    path: PathBuf,
}

impl SqliteStoreFactory {
    /// Create the schema once and remember the path
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        SqliteStore::open(&path)?;
        Ok(Self { path })
    }

    /// Database file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreFactory for SqliteStoreFactory {
    fn open(&self) -> Result<Box<dyn StudentStore>, StoreError> {
        Ok(Box::new(SqliteStore::open(&self.path)?))
    }
}
