//! Width handling for fixed-length text types

/// Truncate to at most `width` bytes without splitting a character
pub fn fit_bytes(mut text: String, width: usize) -> String {
    if text.len() > width {
        let mut end = width;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Truncate to at most `width` characters
pub fn fit_chars(text: String, width: usize) -> String {
    if text.chars().count() > width {
        text.chars().take(width).collect()
    } else {
        text
    }
}
