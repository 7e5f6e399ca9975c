use crate::models::{KnownIpRow, UserRow};
use crate::{Database, now_millis};
use anyhow::{Result, anyhow};
use canvas_types::api::Row;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement};
use serde_json::Value;
use tracing::{debug, error};

impl Database {
    // -- Users --

    /// Find or create the user owning `token` and return its id.
    ///
    /// A brand new user gets no known-IP row; the IP is only recorded from
    /// the second authentication onwards.
    pub fn authenticate_user(&mut self, token: &str, ip: &str) -> Result<i64> {
        let now = now_millis();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing = query_user_id_by_token(&tx, token)?;
            let Some(int_id) = existing else {
                let int_id: i64 = tx.query_row(
                    "INSERT INTO Users (token, lastJoined, pixelsPlaced, playTimeSeconds)
                     VALUES (?1, ?2, 0, 0) RETURNING intId",
                    rusqlite::params![token, now],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                debug!("Created user {} on first authentication", int_id);
                return Ok(int_id);
            };

            tx.execute(
                "UPDATE Users SET lastJoined = ?1 WHERE intId = ?2",
                rusqlite::params![now, int_id],
            )?;

            let updated = tx.execute(
                "UPDATE KnownIps SET lastUsed = ?1 WHERE userIntId = ?2 AND ip = ?3",
                rusqlite::params![now, int_id, ip],
            )?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO KnownIps (userIntId, ip, lastUsed) VALUES (?1, ?2, ?3)",
                    rusqlite::params![int_id, ip, now],
                )?;
            }

            tx.commit()?;
            Ok(int_id)
        })
    }

    /// Unconditional update; an unknown id is a silent no-op.
    pub fn set_user_chat_name(&self, int_id: i64, name: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE Users SET chatName = ?1 WHERE intId = ?2",
                rusqlite::params![name, int_id],
            )?;
            Ok(())
        })
    }

    pub fn get_user_chat_name(&self, int_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let name: Option<Option<String>> = conn
                .query_row(
                    "SELECT chatName FROM Users WHERE intId = ?1",
                    [int_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(name.flatten())
        })
    }

    pub fn get_user(&self, int_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, int_id))
    }

    pub fn get_known_ips(&self, int_id: i64) -> Result<Vec<KnownIpRow>> {
        self.with_conn(|conn| query_known_ips(conn, int_id))
    }

    // -- Chat --

    /// Highest committed live chat id, or 0. Queued inserts are not visible.
    pub fn max_live_chat_id(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let id = conn.query_row(
                "SELECT COALESCE(MAX(messageId), 0) FROM LiveChatMessages",
                [],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    pub fn max_place_chat_id(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let id = conn.query_row(
                "SELECT COALESCE(MAX(messageId), 0) FROM PlaceChatMessages",
                [],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    // -- Raw queries --

    /// Run an arbitrary statement and return every row.
    ///
    /// Failures are logged and reported as `None`; callers cannot tell them
    /// apart from anything else that produced no rows.
    pub fn exec(&self, sql: &str, params: &Value) -> Option<Vec<Row>> {
        match self.with_conn(|conn| run_statement(conn, sql, params)) {
            Ok(rows) => Some(rows),
            Err(e) => {
                error!("exec failed for {:?}: {:#}", sql, e);
                None
            }
        }
    }
}

fn query_user_id_by_token(conn: &Connection, token: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT intId FROM Users WHERE token = ?1",
        [token],
        |row| row.get(0),
    )
    .optional()
}

fn query_user_by_id(conn: &Connection, int_id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT intId, chatName, token, lastJoined, pixelsPlaced, playTimeSeconds
         FROM Users WHERE intId = ?1",
    )?;

    let row = stmt
        .query_row([int_id], |row| {
            Ok(UserRow {
                int_id: row.get(0)?,
                chat_name: row.get(1)?,
                token: row.get(2)?,
                last_joined: row.get(3)?,
                pixels_placed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                play_time_seconds: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            })
        })
        .optional()?;

    Ok(row)
}

fn query_known_ips(conn: &Connection, int_id: i64) -> Result<Vec<KnownIpRow>> {
    let mut stmt = conn.prepare(
        "SELECT userIntId, ip, lastUsed FROM KnownIps WHERE userIntId = ?1 ORDER BY ip",
    )?;

    let rows = stmt
        .query_map([int_id], |row| {
            Ok(KnownIpRow {
                user_int_id: row.get(0)?,
                ip: row.get(1)?,
                last_used: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn run_statement(conn: &Connection, sql: &str, params: &Value) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    bind_params(&mut stmt, params)?;

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
        }
        out.push(record);
    }

    Ok(out)
}

fn bind_params(stmt: &mut Statement<'_>, params: &Value) -> Result<()> {
    match params {
        Value::Null => {}
        Value::Array(values) => {
            for (idx, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, json_to_sql(value))?;
            }
        }
        Value::Object(named) => {
            for (key, value) in named {
                let idx = named_parameter_index(stmt, key)?
                    .ok_or_else(|| anyhow!("statement has no parameter named {}", key))?;
                stmt.raw_bind_parameter(idx, json_to_sql(value))?;
            }
        }
        scalar => stmt.raw_bind_parameter(1, json_to_sql(scalar))?,
    }
    Ok(())
}

/// Keys may be given with or without their `:`, `@` or `$` prefix.
fn named_parameter_index(stmt: &Statement<'_>, key: &str) -> Result<Option<usize>> {
    if key.starts_with([':', '@', '$']) {
        return Ok(stmt.parameter_index(key)?);
    }
    for prefix in [':', '@', '$'] {
        if let Some(idx) = stmt.parameter_index(&format!("{}{}", prefix, key))? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // nested structures are stored as their JSON text
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
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
