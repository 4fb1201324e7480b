//! IRC case-mapping (`rfc1459`), used wherever IRC nicks and channel names
//! become identities.

/// Lowercase one character under the `rfc1459` mapping, where `[]\~` are the
/// uppercase forms of `{}|^`.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => c.to_ascii_lowercase(),
        _ => c,
    }
}

pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive comparison under the `rfc1459` mapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .chars()
            .zip(b.chars())
            .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_brackets_and_ascii() {
        assert_eq!(irc_to_lower("#Rust[Dev]"), "#rust{dev}");
        assert_eq!(irc_to_lower("Nick\\Away~"), "nick|away^");
    }

    #[test]
    fn eq_ignores_case_mapping() {
        assert!(irc_eq("#Chan[1]", "#chan{1}"));
        assert!(!irc_eq("#chan", "#chan2"));
    }
}
