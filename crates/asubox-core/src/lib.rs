pub mod config;
pub mod error;
pub mod ident;
pub mod observability;
pub mod policy;

pub use error::{Error, Result};

use chrono::{SecondsFormat, Utc};

/// Resolve the asubox data root (~/.asubox). Storage, sandbox and the
/// metadata database live under it unless overridden via env.
pub fn data_root() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".asubox")
}

/// Current UTC time as RFC 3339 with fixed millisecond precision.
/// All persisted timestamps use this format so SQL string comparison
/// orders them correctly.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// RFC 3339 timestamp `days` days from now, same precision as [`now_ts`].
pub fn ts_in_days(days: i64) -> String {
    (Utc::now() + chrono::Duration::days(days)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_sortable_as_strings() {
        let a = now_ts();
        let b = ts_in_days(1);
        assert!(a < b);
        assert_eq!(a.len(), b.len());
    }
}
