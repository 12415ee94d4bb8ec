use serde::Deserialize;
use time::OffsetDateTime;

use crate::auth::repo::Tier;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for changing a user's subscription tier.
#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub tier: Tier,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, 50);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn set_tier_parses_rfc3339_expiry() {
        let req: SetTierRequest =
            serde_json::from_str(r#"{"tier":"pro","expires_at":"2026-12-31T00:00:00Z"}"#).unwrap();
        assert_eq!(req.tier, Tier::Pro);
        assert_eq!(req.expires_at.unwrap().year(), 2026);

        let bare: SetTierRequest = serde_json::from_str(r#"{"tier":"none"}"#).unwrap();
        assert!(bare.expires_at.is_none());
    }
}
