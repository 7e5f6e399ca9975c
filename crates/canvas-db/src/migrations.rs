use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Create every table if it is missing. Safe to run on every start.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS Users (
            intId           INTEGER PRIMARY KEY,
            chatName        TEXT,
            token           TEXT NOT NULL,
            lastJoined      INTEGER,
            pixelsPlaced    INTEGER,
            playTimeSeconds INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_users_token
            ON Users(token);

        CREATE TABLE IF NOT EXISTS KnownIps (
            userIntId   INTEGER NOT NULL,
            ip          TEXT NOT NULL,
            lastUsed    INTEGER,
            PRIMARY KEY (userIntId, ip),
            FOREIGN KEY (userIntId) REFERENCES Users(intId)
        );

        CREATE TABLE IF NOT EXISTS LiveChatMessages (
            messageId   INTEGER PRIMARY KEY,
            sendDate    INTEGER,
            channel     TEXT,
            message     TEXT,
            senderIntId INTEGER,
            repliesTo   INTEGER,
            FOREIGN KEY (repliesTo) REFERENCES LiveChatMessages(messageId),
            FOREIGN KEY (senderIntId) REFERENCES Users(intId)
        );

        CREATE TABLE IF NOT EXISTS LiveChatReactions (
            messageId   INTEGER,
            reaction    TEXT,
            senderIntId INTEGER,
            FOREIGN KEY (messageId) REFERENCES LiveChatMessages(messageId),
            FOREIGN KEY (senderIntId) REFERENCES Users(intId)
        );

        CREATE TABLE IF NOT EXISTS PlaceChatMessages (
            messageId   INTEGER PRIMARY KEY,
            sendDate    INTEGER,
            message     TEXT,
            senderIntId INTEGER,
            x           INTEGER,
            y           INTEGER,
            FOREIGN KEY (senderIntId) REFERENCES Users(intId)
        );

        -- One row per user: userIntId is UNIQUE, so there is no ban history
        CREATE TABLE IF NOT EXISTS Bans (
            banId           INTEGER PRIMARY KEY,
            userIntId       INTEGER UNIQUE,
            startDate       INTEGER,
            finishDate      INTEGER,
            moderatorIntId  INTEGER,
            reason          TEXT,
            userAppeal      TEXT,
            appealRejected  INTEGER,
            FOREIGN KEY (userIntId) REFERENCES Users(intId),
            FOREIGN KEY (moderatorIntId) REFERENCES Users(intId)
        );

        CREATE TABLE IF NOT EXISTS Mutes (
            muteId          INTEGER PRIMARY KEY,
            startDate       INTEGER,
            finishDate      INTEGER,
            userIntId       INTEGER UNIQUE,
            moderatorIntId  INTEGER,
            reason          TEXT,
            userAppeal      TEXT,
            appealRejected  INTEGER,
            FOREIGN KEY (userIntId) REFERENCES Users(intId),
            FOREIGN KEY (moderatorIntId) REFERENCES Users(intId)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        assert_eq!(
            table_names(&conn),
            vec![
                "Bans",
                "KnownIps",
                "LiveChatMessages",
                "LiveChatReactions",
                "Mutes",
                "PlaceChatMessages",
                "Users",
            ]
        );
    }

    #[test]
    fn rerun_keeps_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO Users (token, lastJoined, pixelsPlaced, playTimeSeconds) VALUES ('t', 1, 0, 0)",
            [],
        )
        .unwrap();

        run(&conn).unwrap();

        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM Users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn one_ban_row_per_user() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute("INSERT INTO Bans (userIntId, reason) VALUES (1, 'spam')", [])
            .unwrap();

        let second = conn.execute("INSERT INTO Bans (userIntId, reason) VALUES (1, 'again')", []);
        assert!(second.is_err());
    }
}
