/// ACM rejects idempotency tokens longer than this.
pub const MAX_IDEMPOTENCY_TOKEN_LEN: usize = 32;

/// Derives the certificate request token for `domain_name`.
///
/// Non-word characters are dropped and `_token_<generation>` appended; the
/// domain part is truncated so the token fits [`MAX_IDEMPOTENCY_TOKEN_LEN`].
/// Same inputs always give the same token, so a retried request is
/// deduplicated while bumping `generation` lets a FAILED certificate be
/// replaced by a fresh request.
pub fn idempotency_token(domain_name: &str, generation: u32) -> String {
    let suffix = format!("_token_{generation}");
    let budget = MAX_IDEMPOTENCY_TOKEN_LEN.saturating_sub(suffix.len());
    let stem: String = domain_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(budget)
        .collect();
    format!("{stem}{suffix}")
}
