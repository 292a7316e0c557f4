// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/// Find the largest valid UTF-8 char boundary at or before `index` in `s`.
/// This prevents panics when slicing strings at arbitrary byte offsets.
#[inline]
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// Smallest valid UTF-8 char boundary at or after `index` in `s`.
#[inline]
pub fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i < s.len() && !s.is_char_boundary(i) {
            i += 1;
        }
        i
    }
}

/// Leading excerpt of at most `max_bytes`, marked when truncated
pub fn excerpt(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let end = floor_char_boundary(s, max_bytes);
    format!("{}...", &s[..end])
}

/// Excerpt of `s` centered on the byte range `start..end`, widened by `radius` on both sides
pub fn window(s: &str, start: usize, end: usize, radius: usize) -> &str {
    let from = floor_char_boundary(s, start.saturating_sub(radius));
    let to = ceil_char_boundary(s, end.saturating_add(radius));
    &s[from..to]
}
