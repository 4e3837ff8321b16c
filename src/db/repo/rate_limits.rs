//! Fixed-window counters shared by every process using the database.

use super::Repository;
use crate::domain::TimeMs;

impl Repository {
    /// Count one hit against `key` and return `(count, window_start)` for the
    /// current window.
    ///
    /// A window older than `window_ms` is reset in the same statement, so the
    /// read-modify-write is a single atomic upsert.
    pub async fn hit_rate_limit(
        &self,
        key: &str,
        window_ms: i64,
        now: TimeMs,
    ) -> Result<(i64, TimeMs), sqlx::Error> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO rate_limit_counters (key, window_start, count)
            VALUES (?1, ?2, 1)
            ON CONFLICT(key) DO UPDATE SET
                count = CASE
                    WHEN ?2 - rate_limit_counters.window_start >= ?3 THEN 1
                    ELSE rate_limit_counters.count + 1
                END,
                window_start = CASE
                    WHEN ?2 - rate_limit_counters.window_start >= ?3 THEN ?2
                    ELSE rate_limit_counters.window_start
                END
            RETURNING count, window_start
            "#,
        )
        .bind(key)
        .bind(now.as_ms())
        .bind(window_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.0, TimeMs::new(row.1)))
    }
}
