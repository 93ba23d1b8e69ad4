//! Bucketing hash implementation.

/// 32-bit FNV-1a over the raw bytes of `data`.
fn fnv1a32(data: &str) -> u32 {
    const INIT: u32 = 0x811c9dc5;
    const PRIME: u32 = 16777619;

    data.bytes()
        .fold(INIT, |hash, byte| (hash ^ byte as u32).wrapping_mul(PRIME))
}

/// Hash `value` under `seed` into a bucket position in `[0, 1)`.
///
/// Two wire-compatible variants exist: version 1 hashes `value ++ seed` and keeps three decimal
/// digits; version 2 hashes `seed ++ value`, re-hashes the decimal string of the result, and keeps
/// four digits. Any other version returns `None`.
pub(crate) fn bucket_hash(seed: &str, value: &str, version: i64) -> Option<f64> {
    match version {
        1 => Some((fnv1a32(&format!("{value}{seed}")) % 1000) as f64 / 1000.0),
        2 => {
            let first = fnv1a32(&format!("{seed}{value}"));
            Some((fnv1a32(&first.to_string()) % 10000) as f64 / 10000.0)
        }
        _ => None,
    }
}
