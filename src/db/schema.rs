pub const SCHEMA_V1: &str = r#"
BEGIN;

-- User:
CREATE TABLE
    IF NOT EXISTS users (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        name TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        email TEXT,
        password_hash TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_login_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

-- Телефон уникален глобально; email уникален среди не-NULL значений.
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_phone ON users (phone_number);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)
WHERE
    email IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_users_name ON users (name);

-- Contact:
-- phone_number специально НЕ внешний ключ: контакт можно завести
-- на номер, который никогда не регистрировался.
CREATE TABLE
    IF NOT EXISTS contacts (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        owner_id BLOB NOT NULL CHECK (length (owner_id) = 16) REFERENCES users (id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        email TEXT,
        is_registered INTEGER NOT NULL DEFAULT 0,
        registered_user_id BLOB CHECK (
            registered_user_id IS NULL
            OR length (registered_user_id) = 16
        ),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

CREATE UNIQUE INDEX IF NOT EXISTS idx_contacts_owner_phone ON contacts (owner_id, phone_number);

CREATE INDEX IF NOT EXISTS idx_contacts_phone ON contacts (phone_number);

CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts (name);

-- SpamReport:
-- Одна жалоба на пару (номер, автор); повторная вставка упирается
-- в уникальный индекс и отдаётся наверх как Conflict.
CREATE TABLE
    IF NOT EXISTS spam_reports (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        phone_number TEXT NOT NULL,
        reported_by BLOB NOT NULL CHECK (length (reported_by) = 16) REFERENCES users (id) ON DELETE CASCADE,
        reason TEXT NOT NULL CHECK (
            reason IN ('robocall', 'scam', 'telemarketing', 'harassment', 'other')
        ),
        description TEXT,
        is_resolved INTEGER NOT NULL DEFAULT 0,
        resolved_at INTEGER,
        resolved_by BLOB CHECK (
            resolved_by IS NULL
            OR length (resolved_by) = 16
        ),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_phone_reporter ON spam_reports (phone_number, reported_by);

CREATE INDEX IF NOT EXISTS idx_reports_phone ON spam_reports (phone_number);

CREATE INDEX IF NOT EXISTS idx_reports_created_at ON spam_reports (created_at);

CREATE INDEX IF NOT EXISTS idx_reports_resolved ON spam_reports (is_resolved);

-- Session:
CREATE TABLE
    IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        user_id BLOB NOT NULL CHECK (length (user_id) = 16) REFERENCES users (id) ON DELETE CASCADE,
        issued_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id);

------------------------------------------------------------------
-- Устанавливаем user_version = 1
PRAGMA user_version = 1;

COMMIT;
"#;
