use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

// Natural-key indexes below are intentionally NOT unique. Duplicate rows are
// tolerated and converged by `reconcile` + `janitor`, never rejected here.

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL,
                username_normalized TEXT NOT NULL,
                password            TEXT NOT NULL,
                created_at          INTEGER NOT NULL
            );
            CREATE INDEX idx_users_username ON users(username_normalized);

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                token_hash  TEXT NOT NULL,
                expires_at  INTEGER NOT NULL,
                created_at  INTEGER NOT NULL
            );
            CREATE INDEX idx_sessions_token ON sessions(token_hash);
            CREATE INDEX idx_sessions_expiry ON sessions(expires_at);

            CREATE TABLE auth_accounts (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                provider            TEXT NOT NULL,
                provider_account_id TEXT NOT NULL,
                last_used_at        INTEGER NOT NULL,
                created_at          INTEGER NOT NULL
            );
            CREATE INDEX idx_auth_accounts_provider
                ON auth_accounts(provider, provider_account_id);

            CREATE TABLE rate_limits (
                id           TEXT PRIMARY KEY,
                action       TEXT NOT NULL,
                key          TEXT NOT NULL,
                window_start INTEGER NOT NULL,
                count        INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );
            CREATE INDEX idx_rate_limits_key ON rate_limits(action, key);
            CREATE INDEX idx_rate_limits_updated ON rate_limits(updated_at);

            CREATE TABLE friendships (
                id          TEXT PRIMARY KEY,
                user_low    TEXT NOT NULL,
                user_high   TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );
            CREATE INDEX idx_friendships_pair ON friendships(user_low, user_high);
            CREATE INDEX idx_friendships_high ON friendships(user_high);

            CREATE TABLE servers (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                owner_id    TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE channels (
                id              TEXT PRIMARY KEY,
                server_id       TEXT NOT NULL,
                name            TEXT NOT NULL,
                name_normalized TEXT NOT NULL,
                creator_id      TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX idx_channels_server_name ON channels(server_id, name_normalized);

            CREATE TABLE memberships (
                id          TEXT PRIMARY KEY,
                server_id   TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );
            CREATE INDEX idx_memberships_server_user ON memberships(server_id, user_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                channel_id  TEXT NOT NULL,
                author_id   TEXT NOT NULL,
                body        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );
            CREATE INDEX idx_messages_channel ON messages(channel_id, created_at);

            CREATE TABLE deletion_operations (
                id                  TEXT PRIMARY KEY,
                target_kind         TEXT NOT NULL,
                target_id           TEXT NOT NULL,
                requester_id        TEXT NOT NULL,
                server_id           TEXT NOT NULL,
                channel_id          TEXT,
                status              TEXT NOT NULL,
                deleted_messages    INTEGER NOT NULL DEFAULT 0,
                deleted_channels    INTEGER NOT NULL DEFAULT 0,
                deleted_memberships INTEGER NOT NULL DEFAULT 0,
                deleted_servers     INTEGER NOT NULL DEFAULT 0,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL,
                completed_at        INTEGER
            );
            CREATE INDEX idx_deletions_target_status
                ON deletion_operations(target_id, status, updated_at);
            CREATE INDEX idx_deletions_target_updated
                ON deletion_operations(target_id, updated_at);

            CREATE TABLE scheduled_tasks (
                id            TEXT PRIMARY KEY,
                kind          TEXT NOT NULL,
                payload       TEXT NOT NULL,
                run_at        INTEGER NOT NULL,
                attempts      INTEGER NOT NULL DEFAULT 0,
                locked_until  INTEGER,
                state         TEXT NOT NULL DEFAULT 'pending',
                last_error    TEXT,
                created_at    INTEGER NOT NULL
            );
            CREATE INDEX idx_scheduled_due ON scheduled_tasks(state, run_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
