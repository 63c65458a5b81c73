pub(crate) const CURRENT_SCHEMA_QUERY: &str = "SELECT current_schema()";

pub(crate) const TABLE_NAMES_QUERY: &str = "\
SELECT tablename
FROM pg_catalog.pg_tables
WHERE schemaname = $1
ORDER BY tablename;
";

pub(crate) const PRIMARY_KEYS_QUERY: &str = "\
SELECT kcu.column_name
FROM information_schema.table_constraints AS tc
JOIN information_schema.key_column_usage AS kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND tc.table_schema = $1
  AND tc.table_name = $2
ORDER BY kcu.column_name;
";
