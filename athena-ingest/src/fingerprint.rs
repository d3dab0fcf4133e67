//! Event fingerprinting: blake3 over the identity-defining fields with a
//! bucketed timestamp, so near-simultaneous repeats collide on purpose.

use athena_core::types::EventDraft;

/// Collapse whitespace and case so trivial formatting differences don't
/// defeat dedup.
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Timestamp bucket index for the configured bucket width.
pub fn bucket_timestamp(timestamp_us: i64, bucket_secs: u64) -> i64 {
    let bucket_us = (bucket_secs as i64).max(1) * 1_000_000;
    timestamp_us.div_euclid(bucket_us)
}

/// 256-bit fingerprint over `(event_type, normalized_description,
/// context.file, context.function, bucketed_timestamp)`.
pub fn compute(draft: &EventDraft, bucket_secs: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(draft.event_type.as_str().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalize_description(&draft.description).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(draft.context.file.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(draft.context.function.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(
        &bucket_timestamp(draft.timestamp.timestamp_micros(), bucket_secs).to_le_bytes(),
    );
    hasher.finalize().to_hex().to_string()
}
