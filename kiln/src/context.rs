//! The data a template renders against.

use serde_json::Value;

use crate::script::is_reserved_word;

/// Read-only view over the parsed data document.
///
/// When the data is an object its top-level keys are visible to the template
/// as bare names. The whole document is always reachable as `locals`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    data: Value,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(Value::Object(Default::default()))
    }
}

impl RenderContext {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// Parse a JSON document. Duplicate keys resolve to the last occurrence.
    /// Strings must be valid Unicode, so an unpaired `\ud800`-style escape
    /// is rejected.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self::new)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// A top-level key of the data object.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.as_object().and_then(|object| object.get(name))
    }

    /// Names bound implicitly, in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data
            .as_object()
            .into_iter()
            .flat_map(|object| object.keys().map(String::as_str))
    }

    /// Resolve a bare name the way the template sees it.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(value) => Some(value),
            None if name == "locals" => Some(&self.data),
            None => None,
        }
    }

    /// Resolve a plain access path such as `user.name`, `items[0]` or
    /// `meta["og:title"]`.
    ///
    /// Returns `None` both when `path` is not a plain access path and when
    /// some step does not resolve; callers fall back to full evaluation for
    /// those, which also produces the right error.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let segments = parse_path(path.trim())?;
        let (root, rest) = segments.split_first()?;
        let Segment::Key(root) = root else {
            return None;
        };
        if is_reserved_word(root) {
            return None;
        }

        let mut current = self.resolve(root)?;
        for segment in rest {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(object)) => object.get(*key)?,
                (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
                (Segment::Index(index), Value::Object(object)) => {
                    object.get(&index.to_string())?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let (root, mut rest) = split_ident(path)?;
    segments.push(Segment::Key(root));

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let (key, tail) = split_ident(after)?;
            segments.push(Segment::Key(key));
            rest = tail;
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']')?;
            let inner = after[..close].trim();
            segments.push(bracket_segment(inner)?);
            rest = &after[close + 1..];
        } else {
            return None;
        }
    }
    Some(segments)
}

fn bracket_segment(inner: &str) -> Option<Segment<'_>> {
    if let Some(quoted) = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
    {
        if quoted.contains(['\\', '"', '\'']) {
            return None;
        }
        return Some(Segment::Key(quoted));
    }
    if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
        return inner.parse().ok().map(Segment::Index);
    }
    None
}

fn split_ident(text: &str) -> Option<(&str, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return None;
    }
    let end = chars
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    Some(text.split_at(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RenderContext {
        RenderContext::new(json!({
            "user": { "name": "Ada", "tags": ["a", "b"] },
            "meta": { "og:title": "Hi" },
            "count": 3
        }))
    }

    #[test]
    fn plain_paths_resolve() {
        let ctx = context();
        assert_eq!(ctx.lookup("user.name"), Some(&json!("Ada")));
        assert_eq!(ctx.lookup(" user.tags[1] "), Some(&json!("b")));
        assert_eq!(ctx.lookup("meta[\"og:title\"]"), Some(&json!("Hi")));
        assert_eq!(ctx.lookup("locals.count"), Some(&json!(3)));
    }

    #[test]
    fn anything_else_defers_to_the_evaluator() {
        let ctx = context();
        assert_eq!(ctx.lookup("user.missing"), None);
        assert_eq!(ctx.lookup("count + 1"), None);
        assert_eq!(ctx.lookup("user.tags.length"), None);
        assert_eq!(ctx.lookup("this"), None);
        assert_eq!(ctx.lookup("user[idx]"), None);
    }

    #[test]
    fn non_object_data_binds_no_names() {
        let ctx = RenderContext::from_json("[1, 2]").unwrap();
        assert_eq!(ctx.names().count(), 0);
        assert_eq!(ctx.lookup("locals[0]"), Some(&json!(1)));
    }

    #[test]
    fn unpaired_surrogate_escapes_are_rejected() {
        let err = RenderContext::from_json(r#"{"s": "\ud800"}"#).unwrap_err();
        assert!(err.is_syntax(), "{err}");
        let paired = RenderContext::from_json(r#"{"s": "\ud83d\ude00"}"#).unwrap();
        assert_eq!(paired.get("s"), Some(&json!("😀")));
    }

    #[test]
    fn duplicate_keys_keep_the_last_value() {
        let ctx = RenderContext::from_json(r#"{"a": 1, "a": 2}"#).unwrap();
        assert_eq!(ctx.get("a"), Some(&json!(2)));
    }
}
