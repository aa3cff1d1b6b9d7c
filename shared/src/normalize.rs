/// Canonical join key for a division name.
///
/// Every character that is not an ASCII letter or digit is dropped and the
/// rest is uppercased, so `"Thunder Bay, District"` and `"thunderbaydistrict"`
/// collide on `"THUNDERBAYDISTRICT"`. Census rows and boundary features are
/// linked through this key alone.
pub fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Same as [`normalize_key`], with an absent name mapping to the empty key.
pub fn normalize_optional_key(name: Option<&str>) -> String {
    name.map(normalize_key).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{normalize_key, normalize_optional_key};

    #[test]
    fn punctuation_spacing_and_case_collapse_to_one_key() {
        assert_eq!(normalize_key("Thunder Bay, District"), "THUNDERBAYDISTRICT");
        assert_eq!(normalize_key("THUNDERBAY DISTRICT"), "THUNDERBAYDISTRICT");
        assert_eq!(normalize_key("thunderbaydistrict"), "THUNDERBAYDISTRICT");
    }

    #[test]
    fn absent_name_is_empty_key() {
        assert_eq!(normalize_optional_key(None), "");
        assert_eq!(normalize_optional_key(Some("Bruce")), "BRUCE");
    }

    #[test]
    fn non_ascii_letters_are_dropped() {
        assert_eq!(normalize_key("Stormont, Dundas and Glengarry"), "STORMONTDUNDASANDGLENGARRY");
        assert_eq!(normalize_key("Prescott-et-Russell (É)"), "PRESCOTTETRUSSELL");
        assert_eq!(normalize_key("  \t"), "");
    }

    #[test]
    fn digits_survive() {
        assert_eq!(normalize_key("Division No. 23"), "DIVISIONNO23");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "",
            "Thunder Bay, District",
            "Lennox & Addington",
            "Greater Sudbury / Grand Sudbury",
            "Kenora  District",
            "ÉÀü 12-ab",
            "already NORMAL",
        ];

        for sample in samples {
            let once = normalize_key(sample);
            assert_eq!(normalize_key(&once), once, "not idempotent for {sample:?}");
        }
    }
}
