//! Helpers for pulling JSON out of planner text

/// Remove markdown code fences (```json / ```) and surrounding whitespace
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Outermost span between `open` and the last `close`, for output that wraps
/// the payload in prose
pub fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  [1, 2] "), "[1, 2]");
    }

    #[test]
    fn test_outer_span() {
        let text = "Sure! Here is the plan: {\"tasks\": [{\"id\": \"a\"}]} Let me know.";
        assert_eq!(outer_span(text, '{', '}'), Some("{\"tasks\": [{\"id\": \"a\"}]}"));
        assert_eq!(outer_span("no json here", '{', '}'), None);
        assert_eq!(outer_span("} backwards {", '{', '}'), None);
    }
}
