//! Case-insensitive text helpers shared by matching and highlighting.

/// Byte range of the first case-insensitive occurrence of `needle` in
/// `text`. `needle` must already be lower-cased. Ranges always fall on
/// char boundaries of `text`.
pub fn find_ignore_case(text: &str, needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return None;
    }
    'start: for (start, _) in text.char_indices() {
        let mut matched = 0;
        for (offset, ch) in text[start..].char_indices() {
            for lower in ch.to_lowercase() {
                if matched == needle.len() || lower != needle[matched] {
                    continue 'start;
                }
                matched += 1;
            }
            if matched == needle.len() {
                return Some((start, start + offset + ch.len_utf8()));
            }
        }
    }
    None
}

/// Whether `needle` occurs in `haystack` at a word start, i.e. at the
/// beginning or right after a non-alphanumeric char. Both sides must
/// already be lower-cased.
pub fn contains_word_prefix(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.match_indices(needle).any(|(pos, _)| {
        haystack[..pos].chars().next_back().map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Wraps the first occurrence of `keyword` in `<em>` tags.
pub fn highlight_first(text: &str, keyword: &str) -> Option<String> {
    let (start, end) = find_ignore_case(text, keyword)?;
    Some(format!("{}<em>{}</em>{}", &text[..start], &text[start..end], &text[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_occurrence_ignoring_case() {
        assert_eq!(find_ignore_case("Green Tea, green tea", "green"), Some((0, 5)));
        assert_eq!(find_ignore_case("abc", "d"), None);
        assert_eq!(find_ignore_case("abc", ""), None);
    }

    #[test]
    fn ranges_respect_multibyte_text() {
        let text = "Crème BRÛLÉE";
        let (start, end) = find_ignore_case(text, "brûlée").expect("match");
        assert_eq!(&text[start..end], "BRÛLÉE");
    }

    #[test]
    fn highlight_wraps_only_first_match() {
        assert_eq!(
            highlight_first("Tea and more tea", "tea").as_deref(),
            Some("<em>Tea</em> and more tea")
        );
        assert_eq!(highlight_first("coffee", "tea"), None);
    }

    #[test]
    fn word_prefix_requires_boundary() {
        assert!(contains_word_prefix("{\"name\":\"teapot\"}", "tea"));
        assert!(contains_word_prefix("green tea", "tea"));
        assert!(!contains_word_prefix("steam", "tea"));
    }
}
