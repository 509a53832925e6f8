//! HTML escaping for `<%= %>` output.

use std::borrow::Cow;

/// Encode the five characters that are significant in HTML text and
/// attribute values. Borrows when there is nothing to replace.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    escape_into(text, &mut out);
    Cow::Owned(out)
}

/// Append the escaped form of `text` to `out`.
pub fn escape_into(text: &str, out: &mut String) {
    let mut last = 0;
    for (i, c) in text.char_indices() {
        let entity = match c {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' => "&quot;",
            '\'' => "&#39;",
            _ => continue,
        };
        out.push_str(&text[last..i]);
        out.push_str(entity);
        last = i + 1;
    }
    out.push_str(&text[last..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_the_reserved_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn clean_text_is_borrowed() {
        assert!(matches!(escape_html("plain ✓ text"), Cow::Borrowed(_)));
    }

    #[test]
    fn entities_are_escaped_again() {
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
    }
}
