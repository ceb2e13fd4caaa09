//! SQL for the watchlist and page tables (MediaWiki column names).

/// Highest watchlist row id, NULL for an empty table.
pub const MAX_WATCHLIST_ID: &str = "SELECT CAST(MAX(wl_id) AS BIGINT) FROM watchlist";

/// Watchers per (namespace, title) for one `[start, end)` id window.
///
/// The ORDER BY is load-bearing: the merge walks batches in key order and
/// GROUP BY alone guarantees nothing about output order.
pub const GROUPED_WINDOW: &str = "\
    SELECT CAST(COUNT(*) AS BIGINT) AS cnt,
           CAST(wl_namespace AS INTEGER) AS ns,
           CAST(wl_title AS VARCHAR) AS title
    FROM watchlist
    WHERE wl_id >= ? AND wl_id < ?
    GROUP BY wl_namespace, wl_title
    ORDER BY ns, title";

/// Whether a page row exists for a (namespace, title) pair.
pub const PAGE_EXISTS: &str = "\
    SELECT EXISTS (
      SELECT 1 FROM page
      WHERE page_namespace = ? AND page_title = ?
    )";

/// Session settings applied after opening the database.
pub fn session_settings(memory_limit: Option<&str>, threads: usize) -> String {
    let mut stmts = format!("SET threads = {threads};");
    if let Some(limit) = memory_limit {
        stmts.push_str(&format!(" SET memory_limit = '{}';", limit.replace('\'', "''")));
    }
    stmts
}
