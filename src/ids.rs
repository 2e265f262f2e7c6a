//! Locally generated identifiers. Practically unique, not globally unique.

use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 8;

/// `<unix millis>-<8 base36 chars>`, used for journal entries and chat messages.
pub fn timestamped_id(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.timestamp_millis(), random_suffix())
}

/// `<prefix>_<8 base36 chars>_<unix millis in base36>`, used by the community feed.
pub fn prefixed_id(prefix: &str, now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    format!("{prefix}_{}_{}", random_suffix(), to_base36(millis))
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
