//! External collaborators of the session layer: data rows, authentication and
//! file storage. The session code only sees the traits; the daemon ships a
//! SQLite implementation that keeps everything inside the workspace.

use crate::role::Role;
use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    /// `None` keeps the stored avatar.
    pub avatar_url: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_no: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub student_no: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "excused" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub recorded_by: Option<String>,
}

/// Row-based access to the `profiles`, `students` and `attendance_records`
/// collections.
pub trait DataService {
    fn fetch_profile(&self, user_id: &str) -> anyhow::Result<ProfileRow>;
    fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> anyhow::Result<()>;
    fn set_role(&self, user_id: &str, role: Role) -> anyhow::Result<()>;
    fn count_students(&self) -> anyhow::Result<i64>;
    fn insert_student(&self, student: &NewStudent) -> anyhow::Result<StudentRow>;
    fn list_students(&self) -> anyhow::Result<Vec<StudentRow>>;
    fn insert_attendance(&self, record: &NewAttendance) -> anyhow::Result<()>;
    fn attendance_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, AttendanceStatus)>>;
}

pub trait AuthService {
    fn current_identity(&self) -> anyhow::Result<Option<Identity>>;
    /// `Ok(None)` means the credentials were rejected.
    fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Option<Identity>>;
    fn sign_out(&self) -> anyhow::Result<()>;
    fn update_password(&self, new_password: &str) -> anyhow::Result<()>;
    fn sign_up(&self, account: &NewAccount) -> anyhow::Result<Identity>;
}

pub trait FileStorage {
    fn upload(&self, bucket: &str, path: &str, content_type: &str, bytes: &[u8])
        -> anyhow::Result<()>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

pub struct SqliteBackend {
    conn: Connection,
    public_url_base: String,
}

impl SqliteBackend {
    pub fn new(conn: Connection, public_url_base: impl Into<String>) -> Self {
        Self {
            conn,
            public_url_base: public_url_base.into(),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn set_public_url_base(&mut self, base: impl Into<String>) {
        self.public_url_base = base.into();
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl DataService for SqliteBackend {
    fn fetch_profile(&self, user_id: &str) -> anyhow::Result<ProfileRow> {
        self.conn
            .query_row(
                "SELECT id, email, first_name, last_name, phone, avatar_url, role, updated_at
                 FROM profiles WHERE id = ?",
                [user_id],
                |r| {
                    Ok(ProfileRow {
                        id: r.get(0)?,
                        email: r.get(1)?,
                        first_name: r.get(2)?,
                        last_name: r.get(3)?,
                        phone: r.get(4)?,
                        avatar_url: r.get(5)?,
                        role: r.get(6)?,
                        updated_at: r.get(7)?,
                    })
                },
            )
            .optional()
            .context("profiles lookup failed")?
            .ok_or_else(|| anyhow!("profile not found: {}", user_id))
    }

    fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> anyhow::Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE profiles SET
                   first_name = ?,
                   last_name = ?,
                   phone = ?,
                   avatar_url = COALESCE(?, avatar_url),
                   updated_at = ?
                 WHERE id = ?",
                (
                    &update.first_name,
                    &update.last_name,
                    &update.phone,
                    &update.avatar_url,
                    &update.updated_at,
                    user_id,
                ),
            )
            .context("profiles update failed")?;
        if changed == 0 {
            return Err(anyhow!("profile not found: {}", user_id));
        }
        Ok(())
    }

    fn set_role(&self, user_id: &str, role: Role) -> anyhow::Result<()> {
        let changed = self.conn.execute(
            "UPDATE profiles SET role = ?, updated_at = ? WHERE id = ?",
            (role.as_str(), now_rfc3339(), user_id),
        )?;
        if changed == 0 {
            return Err(anyhow!("profile not found: {}", user_id));
        }
        Ok(())
    }

    fn count_students(&self) -> anyhow::Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
        Ok(n)
    }

    fn insert_student(&self, student: &NewStudent) -> anyhow::Result<StudentRow> {
        let id = Uuid::new_v4().to_string();
        let sort_order: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students",
            [],
            |r| r.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO students(id, first_name, last_name, student_no, sort_order, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &id,
                &student.first_name,
                &student.last_name,
                &student.student_no,
                sort_order,
                now_rfc3339(),
            ),
        )?;
        Ok(StudentRow {
            id,
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
            student_no: student.student_no.clone(),
            sort_order,
        })
    }

    fn list_students(&self) -> anyhow::Result<Vec<StudentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, last_name, student_no, sort_order
             FROM students
             ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(StudentRow {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    student_no: r.get(3)?,
                    sort_order: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_attendance(&self, record: &NewAttendance) -> anyhow::Result<()> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM students WHERE id = ?",
                [&record.student_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(anyhow!("student not found: {}", record.student_id));
        }
        self.conn.execute(
            "INSERT INTO attendance_records(id, student_id, date, status, recorded_by, created_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               status = excluded.status,
               recorded_by = excluded.recorded_by",
            (
                Uuid::new_v4().to_string(),
                &record.student_id,
                record.date.format("%Y-%m-%d").to_string(),
                record.status.as_str(),
                &record.recorded_by,
                now_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn attendance_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, AttendanceStatus)>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, status FROM attendance_records
             WHERE date >= ? AND date <= ?
             ORDER BY date",
        )?;
        let raw = stmt
            .query_map(
                (
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string(),
                ),
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(raw.len());
        for (date, status) in raw {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("bad attendance date {}", date))?;
            let status = AttendanceStatus::parse(&status)
                .ok_or_else(|| anyhow!("bad attendance status {}", status))?;
            out.push((date, status));
        }
        Ok(out)
    }
}

impl SqliteBackend {
    fn identity_by_id(&self, user_id: &str) -> anyhow::Result<Option<Identity>> {
        let v = self
            .conn
            .query_row("SELECT id, email FROM users WHERE id = ?", [user_id], |r| {
                Ok(Identity {
                    id: r.get(0)?,
                    email: r.get(1)?,
                })
            })
            .optional()?;
        Ok(v)
    }
}

impl AuthService for SqliteBackend {
    fn current_identity(&self) -> anyhow::Result<Option<Identity>> {
        let user_id: Option<String> = self
            .conn
            .query_row("SELECT user_id FROM auth_session WHERE slot = 1", [], |r| {
                r.get(0)
            })
            .optional()?;
        match user_id {
            Some(id) => self.identity_by_id(&id),
            None => Ok(None),
        }
    }

    fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Option<Identity>> {
        let row: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT id, email, password_salt, password_hash FROM users WHERE email = ?",
                [email.trim().to_ascii_lowercase()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((id, email, salt, hash)) = row else {
            return Ok(None);
        };
        if password_digest(&salt, password) != hash {
            return Ok(None);
        }
        self.conn.execute(
            "INSERT INTO auth_session(slot, user_id, signed_in_at) VALUES(1, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET
               user_id = excluded.user_id,
               signed_in_at = excluded.signed_in_at",
            (&id, now_rfc3339()),
        )?;
        Ok(Some(Identity { id, email }))
    }

    fn sign_out(&self) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM auth_session WHERE slot = 1", [])?;
        Ok(())
    }

    fn update_password(&self, new_password: &str) -> anyhow::Result<()> {
        let Some(identity) = self.current_identity()? else {
            return Err(anyhow!("no active session"));
        };
        let salt = Uuid::new_v4().simple().to_string();
        self.conn.execute(
            "UPDATE users SET password_salt = ?, password_hash = ? WHERE id = ?",
            (&salt, password_digest(&salt, new_password), &identity.id),
        )?;
        Ok(())
    }

    fn sign_up(&self, account: &NewAccount) -> anyhow::Result<Identity> {
        let email = account.email.trim().to_ascii_lowercase();
        let id = Uuid::new_v4().to_string();
        let salt = Uuid::new_v4().simple().to_string();
        let created_at = now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO users(id, email, password_salt, password_hash, created_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                &id,
                &email,
                &salt,
                password_digest(&salt, &account.password),
                &created_at,
            ),
        )
        .with_context(|| format!("failed to create account {}", email))?;
        tx.execute(
            "INSERT INTO profiles(id, email, first_name, last_name, role, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &id,
                &email,
                &account.first_name,
                &account.last_name,
                account.role.map(Role::as_str),
                &created_at,
            ),
        )?;
        tx.commit()?;
        Ok(Identity { id, email })
    }
}

impl FileStorage for SqliteBackend {
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO storage_objects(bucket, path, content_type, bytes, uploaded_at)
                 VALUES(?, ?, ?, ?, ?)",
                (bucket, path, content_type, bytes, now_rfc3339()),
            )
            .with_context(|| format!("upload failed for {}/{}", bucket, path))?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_url_base.trim_end_matches('/'),
            bucket,
            path
        )
    }
}
