/// Database row types — these map directly to SQLite rows.
/// Distinct from canvas-types wire models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub int_id: i64,
    pub chat_name: Option<String>,
    pub token: String,
    pub last_joined: Option<i64>,
    pub pixels_placed: i64,
    pub play_time_seconds: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnownIpRow {
    pub user_int_id: i64,
    pub ip: String,
    pub last_used: Option<i64>,
}
