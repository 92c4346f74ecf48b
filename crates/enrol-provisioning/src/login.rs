//! Login-name derivation

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Lower-cased ASCII alphanumerics of `name`, with diacritics stripped
fn fold(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// First name followed by the first character of the last name.
///
/// No collision handling: two people deriving the same login is left to the
/// caller.
pub fn derive_login(first_name: &str, last_name: &str) -> String {
    let mut login = fold(first_name);
    if let Some(initial) = fold(last_name).chars().next() {
        login.push(initial);
    }
    login
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(derive_login("Émilie", "Dupont"), "emilied");
        assert_eq!(derive_login("François", "Çelik"), "francoisc");
    }

    #[test]
    fn test_empty_last_name() {
        assert_eq!(derive_login("Jean", ""), "jean");
        assert_eq!(derive_login("Jean", "  "), "jean");
    }

    #[test]
    fn test_drops_spaces_and_punctuation() {
        assert_eq!(derive_login("Jean-Luc", "O'Neil"), "jeanluco");
        assert_eq!(derive_login(" Marie Anne ", "Dupont"), "marieanned");
    }

    #[test]
    fn test_last_name_initial_skips_leading_punctuation() {
        assert_eq!(derive_login("Marie", "'Ébert"), "mariee");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(derive_login("Jean", "Dupont"), derive_login("Jean", "Dupont"));
        assert_eq!(derive_login("Jean", "Dupont"), "jeand");
    }
}
