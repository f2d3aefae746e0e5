//! Small shared helpers for tool result formatting.

/// Truncate to `max` bytes on a char boundary with an explicit,
/// model-visible marker. The marker is how the model learns the content
/// continues (and may ask to search the remainder).
pub fn truncate_marked(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}\n\n...truncated...", &s[..end])
}

/// Required string argument from the model's argument object.
pub(crate) fn str_arg(args: &serde_json::Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("missing required argument: {key}"))
}

/// Required integer argument.
pub(crate) fn u64_arg(args: &serde_json::Value, key: &str) -> Result<u64, String> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| format!("missing required argument: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(truncate_marked("hello", 10), "hello");
    }

    #[test]
    fn long_strings_get_the_marker() {
        let out = truncate_marked(&"x".repeat(100), 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.ends_with("...truncated..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        let out = truncate_marked(s, 2);
        assert!(out.ends_with("...truncated..."));
    }

    #[test]
    fn str_arg_rejects_blank() {
        let args = serde_json::json!({"query": "  "});
        assert!(str_arg(&args, "query").is_err());
        let args = serde_json::json!({"query": "25.1309"});
        assert_eq!(str_arg(&args, "query").unwrap(), "25.1309");
    }
}
