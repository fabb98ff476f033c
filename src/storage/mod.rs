use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

// ─── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ChatRow {
    pub id: String,
    pub user_id: String,
    pub start_time: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    /// "user" | "ai"
    pub sender: String,
    pub text: String,
    /// JSON array of source references; `[]` for user messages.
    pub sources: String,
    /// NULL until the user rates the message (-1 | 0 | 1).
    pub feedback_rating: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct QuizRow {
    pub id: String,
    pub user_id: String,
    /// JSON array of question objects, exactly as returned by the quiz flow.
    pub questions: String,
    /// JSON array of the topic strings this quiz was generated from.
    pub topics: String,
    /// NULL until the quiz is graded.
    pub score: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct FeedbackRow {
    pub id: String,
    pub user_id: String,
    /// "chat" | "quiz" | "general"
    pub kind: String,
    /// Message or quiz id the feedback refers to; NULL for general feedback.
    pub related_id: Option<String>,
    pub chat_id: Option<String>,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReportRow {
    pub id: String,
    pub generated_at: String,
    pub period_start: String,
    pub total_entries: i64,
    pub negative_entries: i64,
    pub downvote_threshold: i64,
    /// JSON array of related ids that met the downvote threshold.
    pub flagged: String,
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds; queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("aviatord.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap, Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        let stmts = [
            "CREATE TABLE IF NOT EXISTS chats (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                start_time  TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                chat_id         TEXT NOT NULL,
                sender          TEXT NOT NULL,
                text            TEXT NOT NULL,
                sources         TEXT NOT NULL DEFAULT '[]',
                feedback_rating INTEGER,
                created_at      TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat_id, created_at)",
            "CREATE TABLE IF NOT EXISTS context_summaries (
                user_id     TEXT PRIMARY KEY,
                summary     TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS weak_topics (
                user_id     TEXT PRIMARY KEY,
                topics      TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS quizzes (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                questions   TEXT NOT NULL,
                topics      TEXT NOT NULL,
                score       INTEGER,
                created_at  TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS feedback (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                kind        TEXT NOT NULL,
                related_id  TEXT,
                chat_id     TEXT,
                rating      INTEGER NOT NULL,
                comment     TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_feedback_created ON feedback (created_at)",
            "CREATE TABLE IF NOT EXISTS reports (
                id                  TEXT PRIMARY KEY,
                generated_at        TEXT NOT NULL,
                period_start        TEXT NOT NULL,
                total_entries       INTEGER NOT NULL,
                negative_entries    INTEGER NOT NULL,
                downvote_threshold  INTEGER NOT NULL,
                flagged             TEXT NOT NULL
            )",
        ];
        for stmt in stmts {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .context("failed to apply schema")?;
        }
        Ok(())
    }

    // ─── Chats & messages ───────────────────────────────────────────────────

    pub async fn create_chat(&self, user_id: &str) -> Result<ChatRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        with_timeout(async {
            sqlx::query("INSERT INTO chats (id, user_id, start_time) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(user_id)
                .bind(&now)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await?;
        self.get_chat(user_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chat not found after insert"))
    }

    /// Fetch a chat, scoped to its owner; another user's chat id comes back None.
    pub async fn get_chat(&self, user_id: &str, id: &str) -> Result<Option<ChatRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM chats WHERE id = ? AND user_id = ?")
                    .bind(id)
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM chats WHERE user_id = ? ORDER BY start_time DESC")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn insert_message(
        &self,
        chat_id: &str,
        sender: &str,
        text: &str,
        sources_json: &str,
    ) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        with_timeout(async {
            sqlx::query(
                "INSERT INTO messages (id, chat_id, sender, text, sources, feedback_rating, created_at)
                 VALUES (?, ?, ?, ?, ?, NULL, ?)",
            )
            .bind(&id)
            .bind(chat_id)
            .bind(sender)
            .bind(text)
            .bind(sources_json)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;
        with_timeout(async {
            sqlx::query_as("SELECT * FROM messages WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| anyhow::anyhow!("message not found after insert"))
        })
        .await
    }

    /// The `limit` most recent messages of a chat, oldest first, the order
    /// the model expects conversation history in.
    pub async fn recent_messages(&self, chat_id: &str, limit: i64) -> Result<Vec<MessageRow>> {
        let mut rows: Vec<MessageRow> = with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(chat_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at ASC")
                    .bind(chat_id)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    /// Set the feedback rating on a message. Returns false when no such
    /// message exists (the caller decides whether that is fatal).
    pub async fn set_message_feedback(
        &self,
        chat_id: &str,
        message_id: &str,
        rating: i64,
    ) -> Result<bool> {
        with_timeout(async {
            let result =
                sqlx::query("UPDATE messages SET feedback_rating = ? WHERE id = ? AND chat_id = ?")
                    .bind(rating)
                    .bind(message_id)
                    .bind(chat_id)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    // ─── Context summaries & weak topics ────────────────────────────────────

    pub async fn get_context_summary(&self, user_id: &str) -> Result<Option<String>> {
        with_timeout(async {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT summary FROM context_summaries WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(s,)| s))
        })
        .await
    }

    pub async fn set_context_summary(&self, user_id: &str, summary: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_timeout(async {
            sqlx::query(
                "INSERT INTO context_summaries (user_id, summary, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET summary = excluded.summary,
                                                    updated_at = excluded.updated_at",
            )
            .bind(user_id)
            .bind(summary)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_weak_topics(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        let raw: Option<String> = with_timeout(async {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT topics FROM weak_topics WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(t,)| t))
        })
        .await?;
        match raw {
            None => Ok(None),
            Some(json) => {
                let topics: Vec<String> = serde_json::from_str(&json)
                    .context("weak_topics row holds malformed JSON")?;
                Ok(if topics.is_empty() { None } else { Some(topics) })
            }
        }
    }

    pub async fn set_weak_topics(&self, user_id: &str, topics: &[String]) -> Result<()> {
        let json = serde_json::to_string(topics)?;
        let now = Utc::now().to_rfc3339();
        with_timeout(async {
            sqlx::query(
                "INSERT INTO weak_topics (user_id, topics, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET topics = excluded.topics,
                                                    updated_at = excluded.updated_at",
            )
            .bind(user_id)
            .bind(&json)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    // ─── Quizzes ────────────────────────────────────────────────────────────

    pub async fn insert_quiz(
        &self,
        user_id: &str,
        questions_json: &str,
        topics: &[String],
    ) -> Result<QuizRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let topics_json = serde_json::to_string(topics)?;
        with_timeout(async {
            sqlx::query(
                "INSERT INTO quizzes (id, user_id, questions, topics, score, created_at)
                 VALUES (?, ?, ?, ?, NULL, ?)",
            )
            .bind(&id)
            .bind(user_id)
            .bind(questions_json)
            .bind(&topics_json)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;
        with_timeout(async {
            sqlx::query_as("SELECT * FROM quizzes WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| anyhow::anyhow!("quiz not found after insert"))
        })
        .await
    }

    // ─── Feedback & reports ─────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_feedback(
        &self,
        user_id: &str,
        kind: &str,
        related_id: Option<&str>,
        chat_id: Option<&str>,
        rating: i64,
        comment: &str,
    ) -> Result<FeedbackRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        with_timeout(async {
            sqlx::query(
                "INSERT INTO feedback (id, user_id, kind, related_id, chat_id, rating, comment, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(user_id)
            .bind(kind)
            .bind(related_id)
            .bind(chat_id)
            .bind(rating)
            .bind(comment)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;
        with_timeout(async {
            sqlx::query_as("SELECT * FROM feedback WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| anyhow::anyhow!("feedback not found after insert"))
        })
        .await
    }

    /// All feedback submitted after `cutoff` (RFC 3339 comparison).
    pub async fn feedback_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<FeedbackRow>> {
        let cutoff = cutoff.to_rfc3339();
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM feedback WHERE created_at > ?")
                    .bind(&cutoff)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    /// Delete feedback older than `days`. Returns the number of rows removed.
    pub async fn prune_feedback(&self, days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        with_timeout(async {
            let result = sqlx::query("DELETE FROM feedback WHERE created_at < ?")
                .bind(&cutoff)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    /// Upsert a report row; re-running the analysis within the same day
    /// replaces that day's report instead of duplicating it.
    pub async fn upsert_report(&self, report: &ReportRow) -> Result<()> {
        with_timeout(async {
            sqlx::query(
                "INSERT OR REPLACE INTO reports
                 (id, generated_at, period_start, total_entries, negative_entries, downvote_threshold, flagged)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&report.id)
            .bind(&report.generated_at)
            .bind(&report.period_start)
            .bind(report.total_entries)
            .bind(report.negative_entries)
            .bind(report.downvote_threshold)
            .bind(&report.flagged)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        with_timeout(async {
            Ok(sqlx::query_as("SELECT * FROM reports WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?)
        })
        .await
    }
}
