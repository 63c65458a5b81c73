// Deterministic ORDER BY clauses keep introspection output stable across
// SQLite builds.

pub(crate) const TABLE_NAMES_QUERY: &str = "\
SELECT sm.name
FROM sqlite_master AS sm
WHERE sm.type = 'table' AND sm.name NOT LIKE 'sqlite_%'
ORDER BY sm.name;
";

pub(crate) const PRIMARY_KEYS_QUERY: &str = "\
SELECT ti.name
FROM pragma_table_info(?1) AS ti
WHERE ti.pk <> 0
ORDER BY ti.name;
";
