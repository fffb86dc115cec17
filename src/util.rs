use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_on_char_boundary("h\u{e9}llo", 2), "h");
        assert_eq!(truncate_on_char_boundary("short", 64), "short");
    }

    #[test]
    fn test_unix_now_is_after_2020() {
        assert!(unix_now_secs() > 1_577_836_800);
    }
}
