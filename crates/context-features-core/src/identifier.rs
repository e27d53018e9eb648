//! Feature-name rule shared by registration and the offline SQL builder.
//!
//! Feature names become SQL table and column identifiers, which cannot be
//! bound as parameters.

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid identifier regex"));

/// `true` for ASCII letters, digits and underscores not starting with a digit.
#[inline]
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_whitelist() {
        for ok in ["user_clicks", "_private", "A1", "x"] {
            assert!(is_valid_identifier(ok), "{} should be valid", ok);
        }
        for bad in [
            "1bad",
            "",
            "has space",
            "semi;colon",
            "drop table x--",
            "quote\"d",
            "dash-ed",
            "unicodé",
            "trailing\n",
        ] {
            assert!(!is_valid_identifier(bad), "{:?} should be invalid", bad);
        }
    }
}
