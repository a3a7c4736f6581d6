//! IRC case mapping.
//!
//! Nicks and channel names compare under `rfc1459` rules: ASCII letters fold
//! to lowercase and `[]\~` fold to `{}|^`.

/// Fold one character to its rfc1459 lowercase form.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a nick or channel name into the key it is tracked under.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Whether two nicks or channel names are the same under rfc1459.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .chars()
            .zip(b.chars())
            .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}
