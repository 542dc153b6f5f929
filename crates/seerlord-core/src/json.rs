//! JSON extraction from model output

/// Extract the first balanced JSON object from model output.
///
/// Tolerates code-fence wrappers and prose before/after; respects string
/// literals so braces inside values do not unbalance the scan.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let text = r#"Here it is: {"name": "X", "nested": {"a": 1}} trailing"#;
        assert_eq!(
            extract_json_object(text).unwrap(),
            r#"{"name": "X", "nested": {"a": 1}}"#
        );
    }

    #[test]
    fn test_fenced_object() {
        let text = "```json\n{\"name\": \"X\"}\n```";
        assert_eq!(extract_json_object(text).unwrap(), "{\"name\": \"X\"}");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"prompt": "use {task} and } literally"}"#;
        assert_eq!(extract_json_object(text).unwrap(), text);
    }

    #[test]
    fn test_escaped_quotes() {
        let text = r#"{"quote": "she said \"}\" loudly"}"#;
        assert_eq!(extract_json_object(text).unwrap(), text);
    }

    #[test]
    fn test_unbalanced_or_absent() {
        assert!(extract_json_object("{\"name\": \"X\"").is_none());
        assert!(extract_json_object("no json here").is_none());
    }
}
