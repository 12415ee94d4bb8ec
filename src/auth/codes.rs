//! One-time codes: short numeric credentials scoped to an email address.
//!
//! Verification and reset codes share a table but live in disjoint `kind`
//! namespaces. Consumption is a single conditional UPDATE so that of two
//! racing callers exactly one succeeds; expired rows can never match even
//! before they are physically deleted.

use rand::Rng;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Verification,
    Reset,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Verification => "verification",
            CodeKind::Reset => "reset",
        }
    }
}

/// Four digits, leading zeros preserved.
fn generate_code() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

/// Issue a fresh code for (email, kind). Prior still-live codes for the pair
/// are retired so only the newest code can be consumed; rows already past
/// expiry are dropped while we are here.
pub async fn issue(
    db: &PgPool,
    ttl_minutes: i64,
    email: &str,
    kind: CodeKind,
) -> anyhow::Result<String> {
    let code = generate_code();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);

    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM one_time_codes WHERE email = $1 AND kind = $2 AND expires_at <= now()")
        .bind(email)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE one_time_codes SET used = TRUE WHERE email = $1 AND kind = $2 AND NOT used")
        .bind(email)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO one_time_codes (email, kind, code, expires_at) VALUES ($1, $2, $3, $4)")
        .bind(email)
        .bind(kind.as_str())
        .bind(&code)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    debug!(%email, kind = kind.as_str(), "one-time code issued");
    Ok(code)
}

/// Consume-once: flips the matching unused, unexpired row to used in one
/// statement. `false` covers no-match, already-used and expired identically.
pub async fn consume(
    db: &PgPool,
    email: &str,
    kind: CodeKind,
    code: &str,
) -> anyhow::Result<bool> {
    let row = sqlx::query(
        "UPDATE one_time_codes SET used = TRUE \
         WHERE email = $1 AND kind = $2 AND code = $3 \
           AND NOT used AND expires_at > now() \
         RETURNING id",
    )
    .bind(email)
    .bind(kind.as_str())
    .bind(code)
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

/// Cascade used when the owning user is deleted. Generic over the executor
/// so it can join the caller's transaction.
pub async fn delete_all_for<'e, E>(db: E, email: &str) -> anyhow::Result<u64>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM one_time_codes WHERE email = $1")
        .bind(email)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_four_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn leading_zeros_are_preserved_as_text() {
        // Codes are text, not numbers: 7 must render as "0007".
        assert_eq!(format!("{:04}", 7), "0007");
        assert_eq!(format!("{:04}", 0), "0000");
        assert_eq!(format!("{:04}", 9999), "9999");
    }

    #[test]
    fn kinds_map_to_disjoint_namespaces() {
        assert_ne!(CodeKind::Verification.as_str(), CodeKind::Reset.as_str());
    }

    // Store-level invariants, run against a throwaway Postgres database.

    #[sqlx::test(migrations = "./migrations")]
    async fn consume_succeeds_exactly_once(db: PgPool) {
        let code = issue(&db, 10, "alice@example.com", CodeKind::Verification)
            .await
            .unwrap();
        assert!(consume(&db, "alice@example.com", CodeKind::Verification, &code)
            .await
            .unwrap());
        assert!(!consume(&db, "alice@example.com", CodeKind::Verification, &code)
            .await
            .unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn racing_consumers_cannot_both_win(db: PgPool) {
        let code = issue(&db, 10, "bob@example.com", CodeKind::Verification)
            .await
            .unwrap();
        let (a, b) = tokio::join!(
            consume(&db, "bob@example.com", CodeKind::Verification, &code),
            consume(&db, "bob@example.com", CodeKind::Verification, &code),
        );
        let wins = [a.unwrap(), b.unwrap()].iter().filter(|ok| **ok).count();
        assert_eq!(wins, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_code_never_consumes_even_while_still_stored(db: PgPool) {
        // Negative TTL writes a row already past expiry but not yet purged.
        let code = issue(&db, -1, "carol@example.com", CodeKind::Reset)
            .await
            .unwrap();
        assert!(!consume(&db, "carol@example.com", CodeKind::Reset, &code)
            .await
            .unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn new_issuance_retires_prior_codes(db: PgPool) {
        let first = issue(&db, 10, "dave@example.com", CodeKind::Verification)
            .await
            .unwrap();
        // Re-roll the rare collision so the two codes are distinct strings.
        let mut second = issue(&db, 10, "dave@example.com", CodeKind::Verification)
            .await
            .unwrap();
        while second == first {
            second = issue(&db, 10, "dave@example.com", CodeKind::Verification)
                .await
                .unwrap();
        }
        assert!(!consume(&db, "dave@example.com", CodeKind::Verification, &first)
            .await
            .unwrap());
        assert!(consume(&db, "dave@example.com", CodeKind::Verification, &second)
            .await
            .unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn kind_mismatch_never_consumes(db: PgPool) {
        let code = issue(&db, 10, "erin@example.com", CodeKind::Verification)
            .await
            .unwrap();
        assert!(!consume(&db, "erin@example.com", CodeKind::Reset, &code)
            .await
            .unwrap());
        assert!(consume(&db, "erin@example.com", CodeKind::Verification, &code)
            .await
            .unwrap());
    }
}
