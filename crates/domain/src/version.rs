//! Snapshot version stamping.

/// The next version for a document whose current version is `base`.
///
/// Versions are wall-clock milliseconds, but the contract is only that they
/// strictly increase per document; clock skew or rapid successive writes
/// fall back to `base + 1`.
pub fn next_version(now_ms: i64, base: i64) -> i64 {
    if now_ms > base {
        now_ms
    } else {
        base + 1
    }
}
