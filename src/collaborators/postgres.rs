//! PostgreSQL collaborators over the platform's existing tables.
//!
//! - `users (uin, password, role, "group")`
//! - `lessons (lessonid, teacheruin, starttime, endtime, "group", ...)`
//! - `attendance (lesson_id, subject_id, status, source, decided_at, decided_by, last_auto_check_in)`
//!
//! A lesson's roster is every student whose group matches the lesson's group.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use rollcall_models::{
    AttendanceRecord, Credential, LessonId, LessonSchedule, Role, SubjectId,
};

use super::{AttendancePersist, CredentialLookup, ScheduleLookup};

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(FromRow)]
struct CredentialRow {
    uin: String,
    password: String,
    role: String,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = anyhow::Error;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        Ok(Credential {
            subject_id: SubjectId::parse(row.uin)?,
            secret_hash: row.password,
            role: row.role.parse::<Role>()?,
        })
    }
}

#[async_trait::async_trait]
impl CredentialLookup for PgCredentialStore {
    async fn find_by_subject(&self, subject_id: &SubjectId) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT uin, password, role FROM users WHERE uin = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.db)
        .await
        .context("Failed to fetch credential")?;

        row.map(Credential::try_from).transpose()
    }

    async fn replace_secret_hash(
        &self,
        subject_id: &SubjectId,
        secret_hash: &str,
    ) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE users SET password = $2 WHERE uin = $1")
            .bind(subject_id)
            .bind(secret_hash)
            .execute(&self.db)
            .await
            .context("Failed to replace password hash")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("no credential for {}", subject_id);
        }
        Ok(())
    }

    async fn insert(&self, credential: &Credential) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO users (uin, password, role) VALUES ($1, $2, $3) ON CONFLICT (uin) DO NOTHING",
        )
        .bind(&credential.subject_id)
        .bind(&credential.secret_hash)
        .bind(credential.role.as_str())
        .execute(&self.db)
        .await
        .context("Failed to insert credential")?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
pub struct PgScheduleLookup {
    db: PgPool,
}

impl PgScheduleLookup {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(FromRow)]
struct LessonRow {
    lesson_id: String,
    teacher_uin: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

#[async_trait::async_trait]
impl ScheduleLookup for PgScheduleLookup {
    async fn find_lesson(&self, lesson_id: &LessonId) -> anyhow::Result<Option<LessonSchedule>> {
        let lesson = sqlx::query_as::<_, LessonRow>(
            r#"SELECT lessonid::text AS lesson_id,
                      teacheruin AS teacher_uin,
                      starttime::timestamptz AS start_time,
                      endtime::timestamptz AS end_time
               FROM lessons
               WHERE lessonid::text = $1"#,
        )
        .bind(lesson_id)
        .fetch_optional(&self.db)
        .await
        .context("Failed to fetch lesson")?;

        let Some(lesson) = lesson else {
            return Ok(None);
        };

        let roster: Vec<String> = sqlx::query_scalar(
            r#"SELECT u.uin
               FROM users u
               JOIN lessons l ON l."group" = u."group"
               WHERE l.lessonid::text = $1 AND u.role = 'student'"#,
        )
        .bind(lesson_id)
        .fetch_all(&self.db)
        .await
        .context("Failed to fetch lesson roster")?;

        Ok(Some(LessonSchedule {
            lesson_id: LessonId::parse(lesson.lesson_id)?,
            teacher_id: SubjectId::parse(lesson.teacher_uin)?,
            start_time: lesson.start_time,
            end_time: lesson.end_time,
            roster: roster
                .into_iter()
                .map(SubjectId::parse)
                .collect::<Result<_, _>>()?,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct PgAttendanceStore {
    db: PgPool,
}

impl PgAttendanceStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    lesson_id: String,
    subject_id: String,
    status: String,
    source: String,
    decided_at: DateTime<Utc>,
    decided_by: Option<String>,
    last_auto_check_in: Option<DateTime<Utc>>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = anyhow::Error;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            lesson_id: LessonId::parse(row.lesson_id)?,
            subject_id: SubjectId::parse(row.subject_id)?,
            status: row.status.parse()?,
            source: row.source.parse()?,
            decided_at: row.decided_at,
            decided_by: row.decided_by.map(SubjectId::parse).transpose()?,
            last_auto_check_in: row.last_auto_check_in,
        })
    }
}

#[async_trait::async_trait]
impl AttendancePersist for PgAttendanceStore {
    async fn persist(&self, record: &AttendanceRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO attendance
                   (lesson_id, subject_id, status, source, decided_at, decided_by, last_auto_check_in)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (lesson_id, subject_id) DO UPDATE SET
                   status = EXCLUDED.status,
                   source = EXCLUDED.source,
                   decided_at = EXCLUDED.decided_at,
                   decided_by = EXCLUDED.decided_by,
                   last_auto_check_in = EXCLUDED.last_auto_check_in"#,
        )
        .bind(&record.lesson_id)
        .bind(&record.subject_id)
        .bind(record.status.as_str())
        .bind(record.source.as_str())
        .bind(record.decided_at)
        .bind(record.decided_by.as_ref())
        .bind(record.last_auto_check_in)
        .execute(&self.db)
        .await
        .context("Failed to persist attendance record")?;

        Ok(())
    }

    async fn load(&self, lesson_id: &LessonId) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(
            r#"SELECT lesson_id, subject_id, status, source, decided_at, decided_by, last_auto_check_in
               FROM attendance
               WHERE lesson_id = $1"#,
        )
        .bind(lesson_id)
        .fetch_all(&self.db)
        .await
        .context("Failed to load attendance records")?;

        rows.into_iter().map(AttendanceRecord::try_from).collect()
    }
}
