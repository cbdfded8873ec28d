use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use tracing::info;

use super::domain::{
    AssignmentStatus, FileRef, InvoiceData, InvoiceSubmission, Membership, MembershipRole,
    OrganizationId, ReviewAssignment, SubmissionComment, SubmissionId, SubmissionStatus, UserId,
    UserRef,
};
use super::record::{NewSubmission, SubmissionRecord};
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS organization_membership (
        organization_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (organization_id, user_id)
    );
    CREATE TABLE IF NOT EXISTS invoice_submission (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        organization_id TEXT NOT NULL,
        submitted_by_id TEXT NOT NULL,
        status TEXT NOT NULL,
        invoice_data TEXT NOT NULL,
        invoice_file_ref TEXT,
        reviewed_by_id TEXT,
        exported_at TEXT,
        exported_by_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS invoice_review_assignment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        submission_id INTEGER NOT NULL REFERENCES invoice_submission(id) ON DELETE CASCADE,
        reviewer_id TEXT NOT NULL,
        assigned_by_id TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (submission_id, reviewer_id)
    );
    CREATE TABLE IF NOT EXISTS invoice_submission_comment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        submission_id INTEGER NOT NULL REFERENCES invoice_submission(id) ON DELETE CASCADE,
        author_id TEXT,
        message TEXT NOT NULL,
        author_is_admin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_submission_organization ON invoice_submission(organization_id);
";

const SUBMISSION_COLUMNS: &str = "
    SELECT s.id, s.organization_id, s.submitted_by_id, COALESCE(u.email, ''), s.status,
           s.invoice_data, s.invoice_file_ref, s.reviewed_by_id, s.exported_at,
           s.exported_by_id, s.created_at, s.updated_at
    FROM invoice_submission s
    LEFT JOIN users u ON u.id = s.submitted_by_id";

/// SQLite-backed store. Workflow updates run inside `BEGIN IMMEDIATE`, which takes
/// the database writer lock before the assignments are read. Both the in-process
/// connection lock and SQLite's busy handler wait at most the configured lock
/// timeout; past it the operation fails with [`StoreError::Contention`].
pub struct SqliteStore {
    connection: Mutex<Connection>,
    lock_timeout: Duration,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let connection = Connection::open(path)?;
        let store = Self::initialise(connection, lock_timeout)?;
        info!(path = %path.display(), "review database initialised");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialise(Connection::open_in_memory()?, Duration::from_secs(5))
    }

    fn initialise(connection: Connection, lock_timeout: Duration) -> Result<Self, StoreError> {
        connection.busy_timeout(lock_timeout)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
            lock_timeout,
        })
    }

    /// Register or replace a user's membership (and the user's email).
    pub fn add_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        let connection = self.connection()?;
        upsert_user(&connection, &membership.user)?;
        connection.execute(
            "INSERT INTO organization_membership (organization_id, user_id, role, is_active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(organization_id, user_id) DO UPDATE SET
                role = excluded.role,
                is_active = excluded.is_active",
            params![
                membership.organization.0,
                membership.user.id.0,
                membership.role.label(),
                membership.active,
            ],
        )?;
        Ok(())
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::Contention)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Contention
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl SubmissionStore for SqliteStore {
    fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let mut connection = self.connection()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        upsert_user(&tx, &submission.submitted_by)?;
        for reviewer in &submission.reviewers {
            upsert_user(&tx, reviewer)?;
        }

        tx.execute(
            "INSERT INTO invoice_submission
                (organization_id, submitted_by_id, status, invoice_data, invoice_file_ref,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                submission.organization.0,
                submission.submitted_by.id.0,
                SubmissionStatus::Pending.label(),
                encode_data(&submission.invoice_data)?,
                submission.invoice_file.as_ref().map(|file| file.0.as_str()),
                now,
            ],
        )?;
        let id = SubmissionId(tx.last_insert_rowid() as u64);
        let record = submission.into_record(id, now);
        save_children(&tx, &record, 0)?;
        tx.commit()?;

        Ok(record)
    }

    fn fetch(&self, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        let connection = self.connection()?;
        load(&connection, id)
    }

    fn update<T, E, F>(&self, id: SubmissionId, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubmissionRecord) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut connection = self.connection()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let mut record = load(&tx, id)?.ok_or(StoreError::NotFound)?;
        let persisted_comments = record.comments.len();

        // Dropping `tx` on the error path rolls back.
        let value = apply(&mut record)?;

        save(&tx, &record, persisted_comments)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    fn delete_if<E, F>(&self, id: SubmissionId, allow: F) -> Result<SubmissionRecord, E>
    where
        F: FnOnce(&SubmissionRecord) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut connection = self.connection()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let record = load(&tx, id)?.ok_or(StoreError::NotFound)?;
        allow(&record)?;
        tx.execute(
            "DELETE FROM invoice_submission WHERE id = ?1",
            params![id.0 as i64],
        )
        .map_err(StoreError::from)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(record)
    }

    fn list_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<InvoiceSubmission>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(&format!(
            "{SUBMISSION_COLUMNS} WHERE s.organization_id = ?1 ORDER BY s.id"
        ))?;
        let rows = statement
            .query_map(params![organization.0], SubmissionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(SubmissionRow::into_submission).collect()
    }
}

impl MembershipDirectory for SqliteStore {
    fn membership(
        &self,
        organization: &OrganizationId,
        user: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        let connection = self.connection()?;
        find_membership(&connection, organization, user)
    }

    fn active_admins(
        &self,
        organization: &OrganizationId,
        users: &[UserId],
    ) -> Result<Vec<UserRef>, StoreError> {
        let connection = self.connection()?;
        let mut admins = Vec::new();
        for user in users.iter().collect::<BTreeSet<_>>() {
            if let Some(membership) = find_membership(&connection, organization, user)? {
                if membership.is_active_admin() {
                    admins.push(membership.user);
                }
            }
        }
        Ok(admins)
    }
}

fn find_membership(
    connection: &Connection,
    organization: &OrganizationId,
    user: &UserId,
) -> Result<Option<Membership>, StoreError> {
    let row = connection
        .query_row(
            "SELECT m.user_id, COALESCE(u.email, ''), m.role, m.is_active
             FROM organization_membership m
             LEFT JOIN users u ON u.id = m.user_id
             WHERE m.organization_id = ?1 AND m.user_id = ?2",
            params![organization.0, user.0],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(user_id, email, role, active)| {
        let role = MembershipRole::parse(&role)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown membership role '{role}'")))?;
        Ok(Membership {
            organization: organization.clone(),
            user: UserRef::new(user_id, email),
            role,
            active,
        })
    })
    .transpose()
}

fn upsert_user(connection: &Connection, user: &UserRef) -> Result<(), StoreError> {
    connection.execute(
        "INSERT INTO users (id, email) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET email = excluded.email",
        params![user.id.0, user.email],
    )?;
    Ok(())
}

fn load(connection: &Connection, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
    let row = connection
        .query_row(
            &format!("{SUBMISSION_COLUMNS} WHERE s.id = ?1"),
            params![id.0 as i64],
            SubmissionRow::from_row,
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };
    let submission = row.into_submission()?;

    let mut statement = connection.prepare(
        "SELECT a.reviewer_id, COALESCE(u.email, ''), a.assigned_by_id, a.status,
                a.created_at, a.updated_at
         FROM invoice_review_assignment a
         LEFT JOIN users u ON u.id = a.reviewer_id
         WHERE a.submission_id = ?1
         ORDER BY a.id",
    )?;
    let assignments = statement
        .query_map(params![id.0 as i64], |row| {
            Ok((
                UserRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                row.get::<_, Option<String>>(2)?.map(UserId),
                row.get::<_, String>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
                row.get::<_, DateTime<Utc>>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(|(reviewer, assigned_by, status, created_at, updated_at)| {
            let status = AssignmentStatus::parse(&status).ok_or_else(|| {
                StoreError::Corrupt(format!("unknown assignment status '{status}'"))
            })?;
            Ok(ReviewAssignment {
                reviewer,
                assigned_by,
                status,
                created_at,
                updated_at,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let mut statement = connection.prepare(
        "SELECT author_id, message, author_is_admin, created_at
         FROM invoice_submission_comment
         WHERE submission_id = ?1
         ORDER BY id",
    )?;
    let comments = statement
        .query_map(params![id.0 as i64], |row| {
            Ok(SubmissionComment {
                author: row.get::<_, Option<String>>(0)?.map(UserId),
                message: row.get(1)?,
                author_is_admin: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(SubmissionRecord {
        submission,
        assignments,
        comments,
    }))
}

fn save(
    connection: &Connection,
    record: &SubmissionRecord,
    persisted_comments: usize,
) -> Result<(), StoreError> {
    let submission = &record.submission;
    connection.execute(
        "UPDATE invoice_submission SET
            status = ?2,
            invoice_data = ?3,
            invoice_file_ref = ?4,
            reviewed_by_id = ?5,
            exported_at = ?6,
            exported_by_id = ?7,
            updated_at = ?8
         WHERE id = ?1",
        params![
            submission.id.0 as i64,
            submission.status.label(),
            encode_data(&submission.invoice_data)?,
            submission.invoice_file.as_ref().map(|file| file.0.as_str()),
            submission.reviewed_by.as_ref().map(|user| user.0.as_str()),
            submission.exported_at,
            submission.exported_by.as_ref().map(|user| user.0.as_str()),
            submission.updated_at,
        ],
    )?;
    for assignment in &record.assignments {
        upsert_user(connection, &assignment.reviewer)?;
    }
    save_children(connection, record, persisted_comments)
}

/// Upsert every assignment and append comments past `persisted_comments`.
fn save_children(
    connection: &Connection,
    record: &SubmissionRecord,
    persisted_comments: usize,
) -> Result<(), StoreError> {
    let id = record.submission.id.0 as i64;
    for assignment in &record.assignments {
        connection.execute(
            "INSERT INTO invoice_review_assignment
                (submission_id, reviewer_id, assigned_by_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(submission_id, reviewer_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                id,
                assignment.reviewer.id.0,
                assignment.assigned_by.as_ref().map(|user| user.0.as_str()),
                assignment.status.label(),
                assignment.created_at,
                assignment.updated_at,
            ],
        )?;
    }
    for comment in record.comments.iter().skip(persisted_comments) {
        connection.execute(
            "INSERT INTO invoice_submission_comment
                (submission_id, author_id, message, author_is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                comment.author.as_ref().map(|user| user.0.as_str()),
                comment.message,
                comment.author_is_admin,
                comment.created_at,
            ],
        )?;
    }
    Ok(())
}

fn encode_data(data: &InvoiceData) -> Result<String, StoreError> {
    serde_json::to_string(data).map_err(|err| StoreError::Corrupt(err.to_string()))
}

struct SubmissionRow {
    id: i64,
    organization: String,
    submitted_by: String,
    submitted_by_email: String,
    status: String,
    invoice_data: String,
    invoice_file: Option<String>,
    reviewed_by: Option<String>,
    exported_at: Option<DateTime<Utc>>,
    exported_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubmissionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            organization: row.get(1)?,
            submitted_by: row.get(2)?,
            submitted_by_email: row.get(3)?,
            status: row.get(4)?,
            invoice_data: row.get(5)?,
            invoice_file: row.get(6)?,
            reviewed_by: row.get(7)?,
            exported_at: row.get(8)?,
            exported_by: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_submission(self) -> Result<InvoiceSubmission, StoreError> {
        let status = SubmissionStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown submission status '{}'", self.status))
        })?;
        let invoice_data = match serde_json::from_str::<Value>(&self.invoice_data) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(StoreError::Corrupt(format!(
                    "invoice_data of submission {} is not an object",
                    self.id
                )))
            }
            Err(err) => return Err(StoreError::Corrupt(err.to_string())),
        };

        Ok(InvoiceSubmission {
            id: SubmissionId(self.id as u64),
            organization: OrganizationId(self.organization),
            submitted_by: UserRef::new(self.submitted_by, self.submitted_by_email),
            status,
            invoice_data,
            invoice_file: self.invoice_file.map(FileRef),
            reviewed_by: self.reviewed_by.map(UserId),
            exported_at: self.exported_at,
            exported_by: self.exported_by.map(UserId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
