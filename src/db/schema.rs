/// Tables, indexes and the triggers keeping `messageindex` in step with `message`.
///
/// `message_id` is an INTEGER PRIMARY KEY, so it doubles as the rowid that the
/// external-content FTS5 table points at.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS message (
        message_id INTEGER PRIMARY KEY,
        author_id TEXT NOT NULL,
        channel_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        attachment_url TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_message_channel ON message (channel_id, message_id);
    CREATE INDEX IF NOT EXISTS idx_message_author ON message (author_id);

    CREATE TABLE IF NOT EXISTS messageday (
        date TEXT PRIMARY KEY,
        count INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS identity (
        author_id TEXT PRIMARY KEY,
        real_author_id INTEGER NOT NULL
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS messageindex USING fts5 (
        content,
        content = 'message',
        content_rowid = 'message_id',
        tokenize = 'trigram'
    );

    CREATE TRIGGER IF NOT EXISTS message_ai AFTER INSERT ON message BEGIN
        INSERT INTO messageindex (rowid, content) VALUES (new.message_id, new.content);
    END;

    CREATE TRIGGER IF NOT EXISTS message_ad AFTER DELETE ON message BEGIN
        INSERT INTO messageindex (messageindex, rowid, content)
        VALUES ('delete', old.message_id, old.content);
    END;

    CREATE TRIGGER IF NOT EXISTS message_au AFTER UPDATE ON message BEGIN
        INSERT INTO messageindex (messageindex, rowid, content)
        VALUES ('delete', old.message_id, old.content);
        INSERT INTO messageindex (rowid, content) VALUES (new.message_id, new.content);
    END;
";
