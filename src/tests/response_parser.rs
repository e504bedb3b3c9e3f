// Unit Tests for Structured Output Parsing
//
// UNIT UNDER TEST: parse_structured, extract_json_object
//
// BUSINESS RESPONSIBILITY:
//   - Recovers a JSON object from model output wrapped in commentary or fences
//   - Reports a MalformedResponse when no object can be recovered
//
// TEST COVERAGE:
//   - Clean JSON, fenced JSON and JSON surrounded by prose
//   - Braces inside string literals
//   - Text without any object, unbalanced objects and non-object JSON

use crate::error::ManagerError;
use crate::response_parser::{extract_json_object, parse_structured};
use serde_json::json;

#[cfg(test)]
mod extraction_tests {
    use super::*;

    #[test]
    fn test_extracts_object_surrounded_by_noise() {
        // Arrange
        let text = r#"noise {"formelements":[],"chatoutput":[{"type":"intro","text":"hi"}]} trailing"#;

        // Act
        let extracted = extract_json_object(text);

        // Assert
        assert_eq!(
            extracted,
            Some(r#"{"formelements":[],"chatoutput":[{"type":"intro","text":"hi"}]}"#)
        );
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_the_object() {
        // Arrange
        let text = r#"answer: {"text": "use } and { freely", "n": 1} done"#;

        // Act
        let extracted = extract_json_object(text);

        // Assert
        assert_eq!(extracted, Some(r#"{"text": "use } and { freely", "n": 1}"#));
    }

    #[test]
    fn test_escaped_quotes_are_tracked() {
        // Arrange
        let text = r#"{"text": "say \"}\" now"} tail"#;

        // Act & Assert
        assert_eq!(extract_json_object(text), Some(r#"{"text": "say \"}\" now"}"#));
    }

    #[test]
    fn test_no_brace_yields_none() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_unbalanced_object_yields_none() {
        assert_eq!(extract_json_object(r#"{"open": {"never": "closed"}"#), None);
    }
}

#[cfg(test)]
mod parse_structured_tests {
    use super::*;

    #[test]
    fn test_parses_clean_json() {
        // Arrange & Act
        let value = parse_structured(r#"{"a": 1}"#).expect("clean json parses");

        // Assert
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_parses_code_fenced_json() {
        // Arrange
        let text = "```json\n{\"a\": [1, 2]}\n```";

        // Act
        let value = parse_structured(text).expect("fenced json parses");

        // Assert
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_parses_json_inside_prose() {
        // Arrange
        let text = "Sure! Here is the result: {\"ok\": true}. Let me know if you need more.";

        // Act
        let value = parse_structured(text).expect("embedded json parses");

        // Assert
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn test_text_without_object_is_malformed() {
        // Act
        let result = parse_structured("I cannot help with that.");

        // Assert
        assert!(matches!(result, Err(ManagerError::MalformedResponse { .. })));
    }

    #[test]
    fn test_json_array_is_not_accepted_as_object() {
        // Act
        let result = parse_structured("[1, 2, 3]");

        // Assert
        assert!(result.is_err());
    }
}
