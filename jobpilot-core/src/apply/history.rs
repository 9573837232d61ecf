use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::ApplicationResult;
use crate::sqlite::configure_connection;

const HISTORY_SCHEMA: &str = include_str!("../../../sql/applications.sql");

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub link: String,
    pub success: bool,
    pub message: String,
    pub applied_at: DateTime<Utc>,
}

/// Append-only log of apply attempts.
#[derive(Debug, Clone)]
pub struct ApplicationHistory {
    path: PathBuf,
}

impl ApplicationHistory {
    /// Opens (creating when missing) the database and its schema.
    pub fn open(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let history = Self { path };
        history.connect()?.execute_batch(HISTORY_SCHEMA)?;
        Ok(history)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> HistoryResult<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|source| {
            HistoryError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| HistoryError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn append(&self, user_id: &str, result: &ApplicationResult) -> HistoryResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO applications (id, user_id, platform, job_id, job_title, company, link, success, message, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                user_id,
                result.job.platform,
                result.job.id,
                result.job.title,
                result.job.company,
                result.job.link,
                result.success,
                result.message,
                result.timestamp,
            ],
        )?;
        Ok(id)
    }

    /// Newest first.
    pub fn list_for_user(&self, user_id: &str, limit: usize) -> HistoryResult<Vec<HistoryEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, platform, job_id, job_title, company, link, success, message, applied_at
             FROM applications WHERE user_id = ?1
             ORDER BY applied_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                platform: row.get(2)?,
                job_id: row.get(3)?,
                job_title: row.get(4)?,
                company: row.get(5)?,
                link: row.get(6)?,
                success: row.get(7)?,
                message: row.get(8)?,
                applied_at: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobPosting, PostingKind};
    use tempfile::tempdir;

    fn job(id: &str) -> JobPosting {
        JobPosting {
            id: id.into(),
            title: "Rust 工程师".into(),
            company: "Acme".into(),
            location: "上海".into(),
            salary: "20-30K".into(),
            platform: "Boss直聘".into(),
            provider: "boss".into(),
            link: format!("https://www.zhipin.com/job_detail/{id}.html"),
            updated_at: None,
            kind: PostingKind::RealPosting,
        }
    }

    #[test]
    fn appends_and_lists_per_user_newest_first() {
        let dir = tempdir().unwrap();
        let history = ApplicationHistory::open(dir.path().join("nested/history.sqlite")).unwrap();

        let mut first = ApplicationResult::succeeded(&job("a"), "sent");
        first.timestamp = Utc::now() - chrono::Duration::minutes(5);
        history.append("alice", &first).unwrap();
        history
            .append("alice", &ApplicationResult::failed(&job("b"), "no button"))
            .unwrap();
        history
            .append("bob", &ApplicationResult::succeeded(&job("c"), "sent"))
            .unwrap();

        let entries = history.list_for_user("alice", 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job_id, "b");
        assert!(!entries[0].success);
        assert_eq!(entries[1].job_id, "a");

        assert_eq!(history.list_for_user("alice", 1).unwrap().len(), 1);
        assert!(history.list_for_user("carol", 10).unwrap().is_empty());
    }
}
