pub const SCHEMA: &str = r#"
-- Users carry the role that gates private playgrounds
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'sponsor', 'pro', 'admin')),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Sessions are opaque credentials bound to a user
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- lookup segment of the raw token
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- Playgrounds hold identity and visibility; files live in commits
CREATE TABLE IF NOT EXISTS playgrounds (
    hash TEXT PRIMARY KEY,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    fork_hash TEXT,                    -- no FK: forks outlive their source
    privacy TEXT NOT NULL DEFAULT 'public' CHECK (privacy IN ('private', 'secret', 'public')),
    name TEXT,
    description TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT                    -- set for anonymous playgrounds, enforced elsewhere
);

-- Immutable snapshots; seq breaks timestamp ties in insertion order
CREATE TABLE IF NOT EXISTS commits (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    playground_hash TEXT NOT NULL REFERENCES playgrounds(hash) ON DELETE CASCADE,
    parent_id TEXT,
    message TEXT NOT NULL,
    files TEXT NOT NULL,               -- JSON array of {path, content}
    active_file TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    timestamp INTEGER NOT NULL,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS stars (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    playground_hash TEXT NOT NULL REFERENCES playgrounds(hash) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, playground_hash)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_lookup ON sessions(token_lookup);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_playgrounds_user ON playgrounds(user_id);
CREATE INDEX IF NOT EXISTS idx_playgrounds_privacy ON playgrounds(privacy);
CREATE INDEX IF NOT EXISTS idx_commits_playground ON commits(playground_hash, timestamp);
CREATE INDEX IF NOT EXISTS idx_stars_playground ON stars(playground_hash);
"#;
