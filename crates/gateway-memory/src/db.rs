use rusqlite::{Connection, Result};

/// Open the database at `path`, applying the pragmas the shared-mutex design
/// relies on: `busy_timeout=5000`, `journal_mode=WAL`. The caller holds the
/// single `Connection` behind a mutex (`max_open_conns=1`).
pub fn open(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    init_db(&conn)?;
    Ok(conn)
}

/// Initialise memory tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_memory_entries_table(conn)?;
    create_fts_index(conn)?;
    create_embedding_cache_table(conn)?;
    Ok(())
}

fn create_memory_entries_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_entries (
            key         TEXT PRIMARY KEY,
            content     TEXT NOT NULL,
            category    TEXT NOT NULL DEFAULT 'core',
            embedding   BLOB,
            created_at  TEXT NOT NULL,
            session_key TEXT,
            channel     TEXT,
            sender      TEXT,
            message_id  TEXT,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memory_entries_updated_at
            ON memory_entries(updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_memory_entries_category
            ON memory_entries(category);
        CREATE INDEX IF NOT EXISTS idx_memory_entries_session_key
            ON memory_entries(session_key);
        CREATE INDEX IF NOT EXISTS idx_memory_entries_channel_sender
            ON memory_entries(channel, sender);",
    )
}

/// `memory_entries_fts` in true content-linked mode: the FTS index carries no
/// copy of the text, it points back at `memory_entries` by rowid, and the
/// three triggers below keep it in sync on every insert/delete/update.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memory_entries_fts
            USING fts5(key, content, content='memory_entries', content_rowid='rowid');

        CREATE TRIGGER IF NOT EXISTS memory_entries_ai AFTER INSERT ON memory_entries BEGIN
            INSERT INTO memory_entries_fts(rowid, key, content)
            VALUES (new.rowid, new.key, new.content);
        END;

        CREATE TRIGGER IF NOT EXISTS memory_entries_ad AFTER DELETE ON memory_entries BEGIN
            INSERT INTO memory_entries_fts(memory_entries_fts, rowid, key, content)
            VALUES ('delete', old.rowid, old.key, old.content);
        END;

        CREATE TRIGGER IF NOT EXISTS memory_entries_au AFTER UPDATE ON memory_entries BEGIN
            INSERT INTO memory_entries_fts(memory_entries_fts, rowid, key, content)
            VALUES ('delete', old.rowid, old.key, old.content);
            INSERT INTO memory_entries_fts(rowid, key, content)
            VALUES (new.rowid, new.key, new.content);
        END;",
    )
}

fn create_embedding_cache_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS embedding_cache (
            content_hash TEXT PRIMARY KEY,
            embedding    BLOB NOT NULL,
            created_at   TEXT NOT NULL,
            accessed_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_embedding_cache_accessed_at
            ON embedding_cache(accessed_at);",
    )
}
