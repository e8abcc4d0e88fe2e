//! Control name normalisation
//!
//! Drivers report human-readable control names ("White Balance Temperature, Auto").
//! Clients address controls through a stable machine identifier derived from that
//! name ("white_balance_temperature_auto"), so the mapping must be deterministic.

/// Longest raw name accepted; drivers bound names to 31 bytes, anything past this is garbage.
pub const MAX_NAME_LEN: usize = 127;

const SEPARATOR: char = '_';

/// Derive the canonical identifier for a raw control name.
///
/// ASCII alphanumerics are kept and lowercased; every run of other characters becomes a
/// single `_` between kept characters. Returns `None` when the name is unreasonably long.
pub fn normalize(raw_name: &str) -> Option<String> {
    if raw_name.len() > MAX_NAME_LEN {
        return None;
    }

    let mut out = String::with_capacity(raw_name.len());
    let mut pending_separator = false;

    for ch in raw_name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push(SEPARATOR);
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_names() {
        assert_eq!(normalize("Brightness").as_deref(), Some("brightness"));
        assert_eq!(normalize("Auto Exposure").as_deref(), Some("auto_exposure"));
        assert_eq!(normalize("Gain  (dB)!!").as_deref(), Some("gain_db"));
    }

    #[test]
    fn test_no_leading_trailing_or_double_separator() {
        for raw in [
            "  Leading space",
            "Trailing!!",
            "White Balance Temperature, Auto",
            "--a--b--",
            "Power Line Frequency",
            "",
            "!!!",
        ] {
            let id = normalize(raw).expect("short names normalise");
            assert!(!id.starts_with('_'), "{raw:?} -> {id:?}");
            assert!(!id.ends_with('_'), "{raw:?} -> {id:?}");
            assert!(!id.contains("__"), "{raw:?} -> {id:?}");
        }
        assert_eq!(normalize("--a--b--").as_deref(), Some("a_b"));
        assert_eq!(normalize("!!!").as_deref(), Some(""));
    }

    #[test]
    fn test_idempotent() {
        for raw in ["Focus, Absolute", "Exposure Time (Absolute)", "h264_level", "ÄÖ Gain"] {
            let once = normalize(raw).unwrap();
            assert_eq!(normalize(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_non_ascii_treated_as_separator() {
        assert_eq!(normalize("Gain µV").as_deref(), Some("gain_v"));
    }

    #[test]
    fn test_too_long_rejected() {
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(normalize(&long).is_none());
        let edge = "a".repeat(MAX_NAME_LEN);
        assert_eq!(normalize(&edge).map(|s| s.len()), Some(MAX_NAME_LEN));
    }
}
