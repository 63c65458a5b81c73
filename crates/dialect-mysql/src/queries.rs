pub(crate) const CURRENT_SCHEMA_QUERY: &str = "SELECT DATABASE()";

// Binds the resolved current schema; the schema is never interpolated into
// the statement text.
pub(crate) const TABLE_NAMES_QUERY: &str = "\
SELECT t.table_name
FROM information_schema.tables AS t
WHERE t.table_schema = ?
  AND t.table_type = 'BASE TABLE'
ORDER BY t.table_name;
";

pub(crate) const PRIMARY_KEYS_QUERY: &str = "\
SELECT c.COLUMN_NAME
FROM information_schema.COLUMNS AS c
WHERE c.TABLE_SCHEMA = ?
  AND c.TABLE_NAME = ?
  AND c.COLUMN_KEY = 'PRI'
ORDER BY c.COLUMN_NAME;
";
