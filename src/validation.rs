//! Nickname and channel-name grammar validation (spec §4.3, §6).

fn is_nick_first_char(c: char) -> bool {
    c.is_ascii_alphabetic() || "[]\\`_^{|}".contains(c)
}

fn is_nick_rest_char(c: char) -> bool {
    is_nick_first_char(c) || c.is_ascii_digit() || c == '-'
}

/// Length 1-30; first char from the IRC special-char set; subsequent chars
/// additionally allow digits and `-`.
pub fn is_valid_nickname(nick: &str) -> bool {
    if nick.is_empty() || nick.chars().count() > 30 {
        return false;
    }
    let mut chars = nick.chars();
    match chars.next() {
        Some(c) if is_nick_first_char(c) => {}
        _ => return false,
    }
    chars.all(is_nick_rest_char)
}

/// Starts with `#`, length 2-50, remaining chars `[A-Za-z0-9_-]` plus `/` to
/// separate an optional record id.
pub fn is_valid_channel_name(name: &str) -> bool {
    if !name.starts_with('#') {
        return false;
    }
    let len = name.chars().count();
    if !(2..=50).contains(&len) {
        return false;
    }
    name.chars()
        .skip(1)
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_boundaries() {
        assert!(!is_valid_nickname(""));
        assert!(is_valid_nickname("a"));
        assert!(is_valid_nickname(&"a".repeat(30)));
        assert!(!is_valid_nickname(&"a".repeat(31)));
        assert!(!is_valid_nickname("1abc"));
        assert!(is_valid_nickname("[alice]"));
        assert!(is_valid_nickname("alice-2"));
    }

    #[test]
    fn channel_name_boundaries() {
        assert!(!is_valid_channel_name("#"));
        assert!(is_valid_channel_name("#u"));
        assert!(is_valid_channel_name(&format!("#{}", "a".repeat(49))));
        assert!(!is_valid_channel_name(&format!("#{}", "a".repeat(50))));
        assert!(is_valid_channel_name("#users/42"));
        assert!(!is_valid_channel_name("users"));
    }
}
