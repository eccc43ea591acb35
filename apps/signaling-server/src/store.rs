use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use call_proto::signaling::{CallStatus, IceCandidate};

use crate::error::SignalError;
use crate::models::Call;

/// Most candidates retained per side of a call; renegotiation storms drop
/// the oldest entries first.
pub const MAX_ICE_CANDIDATES: usize = 30;
/// Finished calls older than this are deleted as a side effect of status
/// updates.
pub const CALL_RETENTION_DAYS: i64 = 3;

const CALL_COLUMNS: &str = "id, caller_id, receiver_id, status, created_at, answered_at, \
                            ended_at, offer_sdp, answer_sdp, caller_ice, receiver_ice";

#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: String,
    caller_id: String,
    receiver_id: String,
    status: String,
    created_at: String,
    answered_at: Option<String>,
    ended_at: Option<String>,
    offer_sdp: Option<String>,
    answer_sdp: Option<String>,
    caller_ice: Option<String>,
    receiver_ice: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct PresenceRow {
    is_online: i64,
    last_seen: String,
}

#[derive(Clone)]
pub struct SignalingStore {
    pool: SqlitePool,
}

impl SignalingStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, SignalError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SignalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calls (
                id TEXT PRIMARY KEY,
                caller_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                answered_at TEXT,
                ended_at TEXT,
                offer_sdp TEXT,
                answer_sdp TEXT,
                caller_ice TEXT,
                receiver_ice TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_calls_receiver_pending ON calls(receiver_id, status, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calls_ended_at ON calls(ended_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS presence (
                user_id TEXT PRIMARY KEY,
                is_online INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Seed an entry in the user directory this subsystem validates
    /// identities against. Account management itself lives elsewhere.
    pub async fn insert_user(&self, id: Uuid, username: &str) -> Result<(), SignalError> {
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(username)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn user_exists(&self, id: Uuid) -> Result<bool, SignalError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(found > 0)
    }

    pub async fn create_call(
        &self,
        caller_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Call, SignalError> {
        if caller_id == receiver_id {
            return Err(SignalError::InvalidParticipants);
        }
        if !self.user_exists(caller_id).await? || !self.user_exists(receiver_id).await? {
            return Err(SignalError::UnknownUser);
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO calls (id, caller_id, receiver_id, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(caller_id.to_string())
        .bind(receiver_id.to_string())
        .bind(CallStatus::Pending.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.call_scoped(&id, caller_id)
            .await?
            .ok_or(SignalError::NotFound)
    }

    /// Apply a status transition on behalf of a participant.
    ///
    /// Every update is guarded by the participant scope and the legal source
    /// status, so a repeated accept, a transition out of a terminal status,
    /// or a racing second writer matches zero rows and the current row is
    /// returned unchanged. Entering a terminal status stamps `ended_at` and
    /// clears both SDP strings and both ICE buffers in the same statement.
    pub async fn set_call_status(
        &self,
        call_id: Uuid,
        status: CallStatus,
        user_id: Uuid,
    ) -> Result<Call, SignalError> {
        let id = call_id.to_string();
        let uid = user_id.to_string();
        let now = Utc::now().to_rfc3339();

        match status {
            CallStatus::Accepted => {
                sqlx::query(
                    "UPDATE calls SET status = ?, answered_at = ? \
                     WHERE id = ? AND (caller_id = ? OR receiver_id = ?) AND status = 'pending'",
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(&id)
                .bind(&uid)
                .bind(&uid)
                .execute(&self.pool)
                .await?;
            }
            CallStatus::Rejected | CallStatus::Missed => {
                sqlx::query(
                    "UPDATE calls SET status = ?, ended_at = ?, offer_sdp = NULL, \
                     answer_sdp = NULL, caller_ice = NULL, receiver_ice = NULL \
                     WHERE id = ? AND (caller_id = ? OR receiver_id = ?) AND status = 'pending'",
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(&id)
                .bind(&uid)
                .bind(&uid)
                .execute(&self.pool)
                .await?;
            }
            CallStatus::Completed => {
                sqlx::query(
                    "UPDATE calls SET status = ?, ended_at = ?, offer_sdp = NULL, \
                     answer_sdp = NULL, caller_ice = NULL, receiver_ice = NULL \
                     WHERE id = ? AND (caller_id = ? OR receiver_id = ?) AND status = 'accepted'",
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(&id)
                .bind(&uid)
                .bind(&uid)
                .execute(&self.pool)
                .await?;
            }
            // No transition leads back to pending.
            CallStatus::Pending => {}
        }

        // Housekeeping rides along on status traffic; a failure here must
        // not fail the update that triggered it.
        if let Err(err) = self.prune_finished_calls().await {
            tracing::warn!("failed to prune finished calls: {err}");
        }

        self.call_scoped(&id, user_id)
            .await?
            .ok_or(SignalError::NotFound)
    }

    /// Store offer and/or answer SDP for a non-terminal call. Either
    /// participant may write either field; the field semantics are advisory
    /// and peers do resend.
    pub async fn set_negotiation_payload(
        &self,
        call_id: Uuid,
        user_id: Uuid,
        offer_sdp: Option<String>,
        answer_sdp: Option<String>,
    ) -> Result<Call, SignalError> {
        let id = call_id.to_string();
        let uid = user_id.to_string();

        sqlx::query(
            "UPDATE calls SET offer_sdp = COALESCE(?, offer_sdp), \
             answer_sdp = COALESCE(?, answer_sdp) \
             WHERE id = ? AND (caller_id = ? OR receiver_id = ?) \
             AND status NOT IN ('rejected', 'missed', 'completed')",
        )
        .bind(offer_sdp)
        .bind(answer_sdp)
        .bind(&id)
        .bind(&uid)
        .bind(&uid)
        .execute(&self.pool)
        .await?;

        self.call_scoped(&id, user_id)
            .await?
            .ok_or(SignalError::NotFound)
    }

    /// Append one candidate to the requester's side of the call.
    ///
    /// The requester must be a participant; the write touches only that
    /// side's column so the two buffers never clobber each other. The
    /// update re-checks the status so an append racing a terminal
    /// transition loses and reports the call as gone instead of
    /// resurrecting cleared payload.
    pub async fn append_ice_candidate(
        &self,
        call_id: Uuid,
        user_id: Uuid,
        candidate: IceCandidate,
    ) -> Result<(), SignalError> {
        let id = call_id.to_string();
        let query = format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = ?");
        let row = sqlx::query_as::<_, CallRow>(&query)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SignalError::NotFound)?;

        let uid = user_id.to_string();
        if row.caller_id != uid && row.receiver_id != uid {
            return Err(SignalError::NotFound);
        }
        if CallStatus::parse(&row.status).is_some_and(CallStatus::is_terminal) {
            return Err(SignalError::NotFound);
        }

        let is_caller = row.caller_id == uid;
        let existing = if is_caller {
            row.caller_ice.as_deref()
        } else {
            row.receiver_ice.as_deref()
        };
        let merged = merge_candidate(decode_ice_buffer(existing), candidate);
        let encoded = serde_json::to_string(&merged)?;

        let column = if is_caller { "caller_ice" } else { "receiver_ice" };
        let query = format!(
            "UPDATE calls SET {column} = ? WHERE id = ? \
             AND status NOT IN ('rejected', 'missed', 'completed')"
        );
        let result = sqlx::query(&query)
            .bind(encoded)
            .bind(&id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SignalError::NotFound);
        }
        Ok(())
    }

    /// Latest pending call where the user is the receiver. Older pending
    /// calls for the same receiver stay invisible to polling clients until
    /// the newest one resolves.
    pub async fn pending_call_for(&self, user_id: Uuid) -> Result<Option<Call>, SignalError> {
        let query = format!(
            "SELECT {CALL_COLUMNS} FROM calls \
             WHERE receiver_id = ? AND status = 'pending' \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, CallRow>(&query)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Self::row_to_call))
    }

    /// Fetch a call only if the user participates in it; anything else
    /// reads as absent.
    pub async fn call_for_participant(
        &self,
        call_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Call>, SignalError> {
        self.call_scoped(&call_id.to_string(), user_id).await
    }

    async fn call_scoped(&self, call_id: &str, user_id: Uuid) -> Result<Option<Call>, SignalError> {
        let uid = user_id.to_string();
        let query = format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE id = ? AND (caller_id = ? OR receiver_id = ?)"
        );
        let row = sqlx::query_as::<_, CallRow>(&query)
            .bind(call_id)
            .bind(&uid)
            .bind(&uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Self::row_to_call))
    }

    /// Delete calls that ended more than `CALL_RETENTION_DAYS` ago.
    pub async fn prune_finished_calls(&self) -> Result<u64, SignalError> {
        let cutoff = (Utc::now() - Duration::days(CALL_RETENTION_DAYS)).to_rfc3339();
        let result = sqlx::query("DELETE FROM calls WHERE ended_at IS NOT NULL AND ended_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Record a liveness heartbeat. Unknown users are a no-op so deleted
    /// accounts never grow presence rows.
    pub async fn heartbeat(&self, user_id: Uuid) -> Result<bool, SignalError> {
        self.write_presence(user_id, true).await
    }

    /// Explicitly mark a user offline, e.g. on logout, without waiting for
    /// the staleness window to lapse.
    pub async fn mark_offline(&self, user_id: Uuid) -> Result<bool, SignalError> {
        self.write_presence(user_id, false).await
    }

    async fn write_presence(&self, user_id: Uuid, is_online: bool) -> Result<bool, SignalError> {
        if !self.user_exists(user_id).await? {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO presence (user_id, is_online, last_seen) VALUES (?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
                 is_online = excluded.is_online, \
                 last_seen = excluded.last_seen",
        )
        .bind(user_id.to_string())
        .bind(if is_online { 1i64 } else { 0i64 })
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    /// Online iff a presence row exists, is flagged online, and was
    /// refreshed within the window. Staleness is computed here, at query
    /// time; there is no background sweep.
    pub async fn is_online(&self, user_id: Uuid, timeout_seconds: i64) -> Result<bool, SignalError> {
        let row = sqlx::query_as::<_, PresenceRow>(
            "SELECT is_online, last_seen FROM presence WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        if row.is_online == 0 {
            return Ok(false);
        }
        Ok(seen_within(&row.last_seen, Utc::now(), timeout_seconds))
    }

    fn row_to_call(row: CallRow) -> Call {
        Call {
            id: row.id,
            caller_id: row.caller_id,
            receiver_id: row.receiver_id,
            status: CallStatus::parse(&row.status).unwrap_or(CallStatus::Pending),
            created_at: row.created_at,
            answered_at: row.answered_at,
            ended_at: row.ended_at,
            offer_sdp: row.offer_sdp,
            answer_sdp: row.answer_sdp,
            caller_ice: decode_ice_buffer(row.caller_ice.as_deref()),
            receiver_ice: decode_ice_buffer(row.receiver_ice.as_deref()),
        }
    }
}

fn decode_ice_buffer(raw: Option<&str>) -> Vec<IceCandidate> {
    raw.and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

/// Append `incoming` unless a structurally equal candidate is already
/// buffered, then cap the buffer at `MAX_ICE_CANDIDATES`, dropping the
/// oldest entries first.
fn merge_candidate(mut buffer: Vec<IceCandidate>, incoming: IceCandidate) -> Vec<IceCandidate> {
    if !buffer.contains(&incoming) {
        buffer.push(incoming);
    }
    if buffer.len() > MAX_ICE_CANDIDATES {
        let excess = buffer.len() - MAX_ICE_CANDIDATES;
        buffer.drain(..excess);
    }
    buffer
}

fn seen_within(last_seen: &str, now: DateTime<Utc>, timeout_seconds: i64) -> bool {
    match DateTime::parse_from_rfc3339(last_seen) {
        Ok(seen) => (now - seen.with_timezone(&Utc)).num_seconds() < timeout_seconds,
        Err(_) => false,
    }
}
