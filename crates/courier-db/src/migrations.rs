use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                online      INTEGER NOT NULL DEFAULT 0,
                last_seen   TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE friendships (
                id            TEXT PRIMARY KEY,
                requester_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                addressee_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status        TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                CHECK (requester_id != addressee_id)
            );

            -- At most one pending/accepted row per unordered pair
            CREATE UNIQUE INDEX idx_friendships_active_pair
                ON friendships(min(requester_id, addressee_id), max(requester_id, addressee_id))
                WHERE status IN ('pending', 'accepted');

            CREATE INDEX idx_friendships_addressee
                ON friendships(addressee_id, status);

            CREATE INDEX idx_friendships_requester
                ON friendships(requester_id, status);

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                sender_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content       TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'sent' CHECK (status IN ('sent', 'delivered', 'read')),
                created_at    TEXT NOT NULL,
                delivered_at  TEXT,
                read_at       TEXT
            );

            CREATE INDEX idx_messages_pair
                ON messages(sender_id, receiver_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
