use crate::cache::token::TokenRecord;
use crate::helpers::time::now_u64;

/// Minimum remaining lifetime for a cached token to be handed out.
pub const GRACE_SECONDS: u64 = 300;

/// Check if the record can still be used for at least `GRACE_SECONDS`.
pub fn is_valid(record: &TokenRecord) -> bool {
    is_valid_at(record, now_u64())
}

pub fn is_valid_at(record: &TokenRecord, now: u64) -> bool {
    record
        .expires_at()
        .map(|expires_at| now.saturating_add(GRACE_SECONDS) < expires_at)
        .unwrap_or(false)
}
