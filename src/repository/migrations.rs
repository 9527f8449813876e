pub const COMMANDS: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS commands (
      id INTEGER PRIMARY KEY NOT NULL,
      command TEXT NOT NULL UNIQUE,
      created_at INTEGER NOT NULL
    );"#,
    r#"CREATE INDEX IF NOT EXISTS created_at_index ON commands (created_at, id);"#,
    r#"
    CREATE TABLE IF NOT EXISTS sequences (
      name TEXT PRIMARY KEY NOT NULL,
      value INTEGER NOT NULL
    );"#,
    r#"
    INSERT OR IGNORE INTO sequences (name, value)
    SELECT 'commands', COALESCE(MAX(id), 0) FROM commands;"#,
];
