//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the courier-types models so the schema can change
//! independently. Timestamps are RFC 3339 UTC with fixed microsecond
//! precision, so text order is time order.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use courier_types::models::{Friendship, Message, User};

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub online: bool,
    pub last_seen: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub const COLUMNS: &'static str = "id, username, password, online, last_seen, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            online: row.get(3)?,
            last_seen: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn into_user(self) -> Result<(User, String)> {
        let user = User {
            id: parse_id(&self.id)?,
            username: self.username,
            online: self.online,
            last_seen: self.last_seen.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
        };
        Ok((user, self.password))
    }
}

pub struct FriendshipRow {
    pub id: String,
    pub requester_id: String,
    pub addressee_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl FriendshipRow {
    pub const COLUMNS: &'static str =
        "id, requester_id, addressee_id, status, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            requester_id: row.get(1)?,
            addressee_id: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn into_friendship(self) -> Result<Friendship> {
        Ok(Friendship {
            id: parse_id(&self.id)?,
            requester_id: parse_id(&self.requester_id)?,
            addressee_id: parse_id(&self.addressee_id)?,
            status: self.status.parse()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub status: String,
    pub created_at: String,
    pub delivered_at: Option<String>,
    pub read_at: Option<String>,
}

impl MessageRow {
    pub const COLUMNS: &'static str =
        "id, sender_id, receiver_id, content, status, created_at, delivered_at, read_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            content: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            delivered_at: row.get(6)?,
            read_at: row.get(7)?,
        })
    }

    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            sender_id: parse_id(&self.sender_id)?,
            receiver_id: parse_id(&self.receiver_id)?,
            content: self.content,
            status: self.status.parse()?,
            created_at: parse_ts(&self.created_at)?,
            delivered_at: self.delivered_at.as_deref().map(parse_ts).transpose()?,
            read_at: self.read_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = parse_ts("2026-01-02T03:04:05.000001Z").unwrap();
        let later = parse_ts("2026-01-02T03:04:05.100000Z").unwrap();
        assert!(format_ts(earlier) < format_ts(later));
        assert_eq!(parse_ts(&format_ts(later)).unwrap(), later);
    }

    #[test]
    fn corrupt_timestamp_is_an_error() {
        assert!(parse_ts("2026-01-02 03:04:05").is_err());
    }
}
