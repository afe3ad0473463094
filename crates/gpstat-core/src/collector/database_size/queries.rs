//! SQL for the database size scraper.
//!
//! All statements target Greenplum's `gp_toolkit` schema or standard
//! statistics views and are read-only.

use crate::collector::conn::Query;

/// Every database with its on-disk size in MB.
pub const DATABASE_SIZE: Query = Query {
    name: "database_size",
    sql: "SELECT sodddatname AS database_name, \
          sodddatsize / (1024 * 1024) AS database_size_mb \
          FROM gp_toolkit.gp_size_of_database",
};

/// Number of user tables in the current database.
pub const TABLE_COUNT: Query = Query {
    name: "table_count",
    sql: "SELECT count(*) AS total FROM information_schema.tables \
          WHERE table_schema NOT IN ('gp_toolkit', 'information_schema', 'pg_catalog')",
};

/// Bloat diagnostics for the current database, most severe first.
///
/// The raw `bdidiag` message is returned; severity is classified from it
/// while scanning.
pub const BLOAT_TABLES: Query = Query {
    name: "bloat_tables",
    sql: r#"
        SELECT
            current_database(),
            bdinspname,
            bdirelname,
            bdirelpages,
            bdiexppages,
            bdidiag
        FROM gp_toolkit.gp_bloat_diag
        ORDER BY
            CASE
                WHEN position('significant' IN bdidiag) > 0 THEN 2
                WHEN position('moderate' IN bdidiag) > 0 THEN 1
                ELSE 0
            END DESC
    "#,
};

/// Cluster-wide buffer cache hit percentage. NULL when no block was touched.
pub const HIT_CACHE_RATE: Query = Query {
    name: "hit_cache_rate",
    sql: "SELECT sum(blks_hit) / NULLIF(sum(blks_read) + sum(blks_hit), 0) * 100 \
          FROM pg_stat_database",
};

/// Cluster-wide transaction commit percentage. NULL when no transaction ended.
pub const TX_COMMIT_RATE: Query = Query {
    name: "tx_commit_rate",
    sql: "SELECT sum(xact_commit) / NULLIF(sum(xact_commit) + sum(xact_rollback), 0) * 100 \
          FROM pg_stat_database",
};
