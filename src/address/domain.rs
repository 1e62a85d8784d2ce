use unicode_normalization::UnicodeNormalization;

/// Canonical domain: trimmed, NFC, lowercase, IDNA-ASCII.
///
/// When IDNA conversion fails the lowercase NFC form is returned instead, so
/// the function never fails and `normalize_domain(normalize_domain(d))` equals
/// `normalize_domain(d)`.
pub fn normalize_domain(domain: &str) -> String {
    let folded: String = clean(domain).to_lowercase().nfc().collect();
    let folded = clean(&folded).to_string();
    if folded.is_empty() {
        return folded;
    }

    match idna::domain_to_ascii(&folded) {
        Ok(ascii) => {
            let ascii = clean(&ascii);
            if ascii.is_empty() {
                folded
            } else {
                ascii.to_string()
            }
        }
        Err(_) => folded,
    }
}

/// Strips surrounding whitespace and the trailing root dot(s).
fn clean(value: &str) -> &str {
    value
        .trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Lowercases an exchange name and drops the trailing root dot.
pub(crate) fn normalize_host(host: &str) -> String {
    clean(host).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_encodes() {
        assert_eq!(normalize_domain("  Example.COM. "), "example.com");
        assert_eq!(normalize_domain("bücher.de"), "xn--bcher-kva.de");
        assert_eq!(normalize_domain("BÜCHER.de"), "xn--bcher-kva.de");
    }

    #[test]
    fn composes_before_encoding() {
        // "u" + combining diaeresis
        assert_eq!(normalize_domain("bu\u{308}cher.de"), "xn--bcher-kva.de");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_domain(""), "");
        assert_eq!(normalize_domain(" . "), "");
    }

    #[test]
    fn host_normalization_trims_root() {
        assert_eq!(normalize_host("Mail.EXAMPLE.com."), "mail.example.com");
        assert_eq!(normalize_host("."), "");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[a-zA-Z0-9äöüéÀ .\\-]{0,40}") {
            let once = normalize_domain(&raw);
            prop_assert_eq!(normalize_domain(&once), once.clone());
        }
    }
}
