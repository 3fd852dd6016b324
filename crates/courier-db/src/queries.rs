use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use courier_types::models::{
    Friendship, FriendshipStatus, Message, MessageStatus, PendingRequest, User,
};

use crate::Database;
use crate::models::{FriendshipRow, MessageRow, UserRow, format_ts};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &User, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, online, last_seen, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    user.username,
                    password_hash,
                    user.online,
                    user.last_seen.map(format_ts),
                    format_ts(user.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Returns the user and its password hash.
    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<(User, String)>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<(User, String)>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn search_users(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users
                 WHERE id != ?1 AND username LIKE ?2 ESCAPE '\\'
                 ORDER BY username
                 LIMIT ?3",
                UserRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![exclude.to_string(), pattern, limit], UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|r| r.into_user().map(|(user, _)| user))
                .collect()
        })
    }

    pub fn set_presence(&self, id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET online = ?2, last_seen = ?3 WHERE id = ?1",
                params![id.to_string(), online, format_ts(at)],
            )?;
            Ok(())
        })
    }

    // -- Friendships --

    /// Check and insert run under the writer lock, so two racing requests
    /// for the same pair cannot both succeed.
    pub fn insert_friendship_if_absent(&self, friendship: &Friendship) -> Result<bool> {
        self.with_conn_mut(|conn| {
            if query_active_friendship(conn, friendship.requester_id, friendship.addressee_id)?
                .is_some()
            {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO friendships (id, requester_id, addressee_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    friendship.id.to_string(),
                    friendship.requester_id.to_string(),
                    friendship.addressee_id.to_string(),
                    friendship.status.as_str(),
                    format_ts(friendship.created_at),
                    format_ts(friendship.updated_at),
                ],
            )?;
            Ok(true)
        })
    }

    pub fn get_friendship(&self, id: Uuid) -> Result<Option<Friendship>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM friendships WHERE id = ?1", FriendshipRow::COLUMNS);
            conn.query_row(&sql, [id.to_string()], FriendshipRow::from_row)
                .optional()?
                .map(FriendshipRow::into_friendship)
                .transpose()
        })
    }

    pub fn get_friendship_between(&self, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
        self.with_conn(|conn| query_active_friendship(conn, a, b))
    }

    pub fn resolve_friendship(
        &self,
        id: Uuid,
        status: FriendshipStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE friendships SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id.to_string(), status.as_str(), format_ts(at)],
            )?;
            Ok(changed == 1)
        })
    }

    /// Accepted relationships of `user_id`, joined with the other side.
    pub fn get_accepted_friendships(&self, user_id: Uuid) -> Result<Vec<(Friendship, User)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.requester_id, f.addressee_id, f.status, f.created_at, f.updated_at,
                        u.id, u.username, u.password, u.online, u.last_seen, u.created_at
                 FROM friendships f
                 JOIN users u ON u.id = CASE WHEN f.requester_id = ?1
                                             THEN f.addressee_id ELSE f.requester_id END
                 WHERE (f.requester_id = ?1 OR f.addressee_id = ?1) AND f.status = 'accepted'",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        FriendshipRow::from_row(row)?,
                        UserRow {
                            id: row.get(6)?,
                            username: row.get(7)?,
                            password: row.get(8)?,
                            online: row.get(9)?,
                            last_seen: row.get(10)?,
                            created_at: row.get(11)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(f, u)| -> Result<(Friendship, User)> {
                    Ok((f.into_friendship()?, u.into_user()?.0))
                })
                .collect()
        })
    }

    pub fn get_friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN requester_id = ?1 THEN addressee_id ELSE requester_id END
                 FROM friendships
                 WHERE (requester_id = ?1 OR addressee_id = ?1) AND status = 'accepted'",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids.iter()
                .map(|id| id.parse::<Uuid>().map_err(anyhow::Error::from))
                .collect()
        })
    }

    pub fn get_pending_requests(&self, addressee_id: Uuid) -> Result<Vec<PendingRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.created_at,
                        u.id, u.username, u.password, u.online, u.last_seen, u.created_at
                 FROM friendships f
                 JOIN users u ON u.id = f.requester_id
                 WHERE f.addressee_id = ?1 AND f.status = 'pending'
                 ORDER BY f.created_at",
            )?;
            let rows = stmt
                .query_map([addressee_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        UserRow {
                            id: row.get(2)?,
                            username: row.get(3)?,
                            password: row.get(4)?,
                            online: row.get(5)?,
                            last_seen: row.get(6)?,
                            created_at: row.get(7)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, created_at, requester)| -> Result<PendingRequest> {
                    Ok(PendingRequest {
                        id: id.parse()?,
                        requester: requester.into_user()?.0,
                        created_at: crate::models::parse_ts(&created_at)?,
                    })
                })
                .collect()
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, status, created_at, delivered_at, read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.content,
                    message.status.as_str(),
                    format_ts(message.created_at),
                    message.delivered_at.map(format_ts),
                    message.read_at.map(format_ts),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MessageRow::COLUMNS);
            conn.query_row(&sql, [id.to_string()], MessageRow::from_row)
                .optional()?
                .map(MessageRow::into_message)
                .transpose()
        })
    }

    /// Single conditional write; a message past `sent` is left alone.
    pub fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = ?2, delivered_at = ?3
                 WHERE id = ?1 AND status = ?4",
                params![
                    id.to_string(),
                    MessageStatus::Delivered.as_str(),
                    format_ts(at),
                    MessageStatus::Sent.as_str(),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let ts = format_ts(at);
            let changed = conn.execute(
                "UPDATE messages
                 SET status = ?2, read_at = ?3, delivered_at = COALESCE(delivered_at, ?3)
                 WHERE id = ?1 AND status != ?2",
                params![id.to_string(), MessageStatus::Read.as_str(), ts],
            )?;
            Ok(changed == 1)
        })
    }

    /// Oldest first; rowid breaks ties between equal timestamps.
    pub fn get_conversation(&self, a: Uuid, b: Uuid, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?3 OFFSET ?4",
                MessageRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![a.to_string(), b.to_string(), limit, offset],
                    MessageRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<(User, String)>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", UserRow::COLUMNS, column);
    conn.query_row(&sql, [value], UserRow::from_row)
        .optional()?
        .map(UserRow::into_user)
        .transpose()
}

fn query_active_friendship(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
    let sql = format!(
        "SELECT {} FROM friendships
         WHERE ((requester_id = ?1 AND addressee_id = ?2) OR (requester_id = ?2 AND addressee_id = ?1))
           AND status IN ('pending', 'accepted')
         LIMIT 1",
        FriendshipRow::COLUMNS
    );
    conn.query_row(&sql, [a.to_string(), b.to_string()], FriendshipRow::from_row)
        .optional()?
        .map(FriendshipRow::into_friendship)
        .transpose()
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
