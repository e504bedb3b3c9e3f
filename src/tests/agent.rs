// Unit Tests for the Form-Filling Agent
//
// UNIT UNDER TEST: AgentPurpose, normalize_chat_output, clean_documentation
//
// BUSINESS RESPONSIBILITY:
//   - Builds the agent prompt from form elements, language and documentation
//   - Turns model output into a well-formed agent answer
//   - Never lets the model invent form elements the caller did not offer
//
// TEST COVERAGE:
//   - JSON recovery from noisy model output
//   - Chat output normalized to exactly intro and outro
//   - Form element filtering against offered ids
//   - Fallback answer for unusable output
//   - Documentation cleanup and truncation
//   - Template placeholders typed by the user are not expanded

use crate::config::ManagerSettings;
use crate::purposes::{
    clean_documentation, fallback_answer, normalize_chat_output, AgentPurpose, Purpose,
    AGENT_FALLBACK_MESSAGE, DOCUMENTATION_CHAR_BUDGET,
};
use crate::tests::helpers::raw;
use serde_json::{json, Value};

fn agent_offering(ids: &[&str]) -> AgentPurpose {
    let mut agent = AgentPurpose::new(&ManagerSettings::default()).expect("agent builds");
    let elements: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "type": "text", "label": format!("Field {id}")}))
        .collect();
    agent
        .sanitize_request_options(&raw(json!({"formelements": elements})))
        .expect("valid agent options");
    agent
}

fn parse(answer: &str) -> Value {
    serde_json::from_str(answer).expect("agent answer is JSON")
}

#[cfg(test)]
mod format_output_tests {
    use super::*;

    #[test]
    fn test_json_is_recovered_from_noisy_output() {
        // Arrange
        let agent = agent_offering(&[]);
        let output = r#"noise {"formelements":[],"chatoutput":[{"type":"intro","text":"hi"}]} trailing"#;

        // Act
        let answer = parse(&agent.format_output(output.to_string()));

        // Assert
        assert_eq!(
            answer,
            json!({
                "formelements": [],
                "chatoutput": [
                    {"type": "intro", "text": "hi"},
                    {"type": "outro", "text": ""}
                ]
            })
        );
    }

    #[test]
    fn test_only_offered_elements_survive() {
        // Arrange
        let agent = agent_offering(&["a", "b"]);
        let output = json!({
            "formelements": [
                {"id": "a", "value": "first"},
                {"id": "c", "value": "invented"}
            ],
            "chatoutput": [
                {"type": "intro", "text": "Here you go"},
                {"type": "outro", "text": "Done"}
            ]
        })
        .to_string();

        // Act
        let answer = parse(&agent.format_output(output));

        // Assert
        let ids: Vec<&str> = answer["formelements"]
            .as_array()
            .expect("formelements array")
            .iter()
            .filter_map(|e| e["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(answer["chatoutput"][1]["text"], "Done");
    }

    #[test]
    fn test_offered_ids_are_remembered_from_sanitization() {
        // Arrange & Act
        let agent = agent_offering(&["a", "b"]);

        // Assert
        assert_eq!(agent.offered_ids().len(), 2);
        assert!(agent.offered_ids().contains("b"));
    }

    #[test]
    fn test_unparsable_output_yields_fallback() {
        // Arrange
        let agent = agent_offering(&["a"]);

        // Act
        let answer = parse(&agent.format_output("I am not sure what you mean.".to_string()));

        // Assert
        assert_eq!(answer, fallback_answer());
        assert_eq!(answer["chatoutput"][0]["text"], AGENT_FALLBACK_MESSAGE);
    }

    #[test]
    fn test_extra_top_level_keys_are_preserved() {
        // Arrange
        let agent = agent_offering(&[]);
        let output = r#"{"formelements": [], "chatoutput": [], "confidence": "high"}"#;

        // Act
        let answer = parse(&agent.format_output(output.to_string()));

        // Assert
        assert_eq!(answer["confidence"], "high");
    }
}

#[cfg(test)]
mod chat_output_tests {
    use super::*;

    #[test]
    fn test_normalize_orders_intro_before_outro_and_drops_extras() {
        // Arrange
        let chatoutput = json!([
            {"type": "outro", "text": "bye"},
            {"type": "aside", "text": "ignored"},
            {"type": "intro", "text": "hello"}
        ]);

        // Act
        let normalized = normalize_chat_output(Some(&chatoutput));

        // Assert
        assert_eq!(
            normalized,
            json!([
                {"type": "intro", "text": "hello"},
                {"type": "outro", "text": "bye"}
            ])
        );
    }

    #[test]
    fn test_normalize_missing_output_gives_empty_slots() {
        assert_eq!(
            normalize_chat_output(None),
            json!([
                {"type": "intro", "text": ""},
                {"type": "outro", "text": ""}
            ])
        );
    }
}

#[cfg(test)]
mod prompt_tests {
    use super::*;

    #[tokio::test]
    async fn test_prompt_contains_user_text_elements_and_language() {
        // Arrange
        let mut agent = AgentPurpose::new(&ManagerSettings::default()).expect("agent builds");
        let options = agent
            .sanitize_request_options(&raw(json!({
                "formelements": [{"id": "name", "type": "text"}],
                "lang": "de"
            })))
            .expect("valid options");

        // Act
        let prompt = agent.format_prompt_text("Create a quiz", &options).await;

        // Assert
        assert!(prompt.contains("Create a quiz"));
        assert!(prompt.contains(r#""id":"name""#));
        assert!(prompt.contains(r#""de""#));
        assert!(!prompt.contains("{{"));
    }

    #[tokio::test]
    async fn test_placeholders_in_user_text_are_kept_verbatim() {
        // Arrange
        let mut agent = AgentPurpose::new(&ManagerSettings::default()).expect("agent builds");
        let options = agent
            .sanitize_request_options(&raw(json!({
                "formelements": [{"id": "name", "type": "text"}],
                "lang": "de"
            })))
            .expect("valid options");

        // Act
        let prompt = agent
            .format_prompt_text("literal {{formelements}} and {{lang}}", &options)
            .await;

        // Assert
        assert!(prompt.contains("literal {{formelements}} and {{lang}}"));
        assert_eq!(prompt.matches(r#""id":"name""#).count(), 1);
    }

    #[test]
    fn test_agent_rejects_undeclared_options() {
        // Arrange
        let mut agent = AgentPurpose::new(&ManagerSettings::default()).expect("agent builds");

        // Act & Assert
        assert!(agent
            .sanitize_request_options(&raw(json!({"temperature": 0.2})))
            .is_err());
    }
}

#[cfg(test)]
mod documentation_tests {
    use super::*;

    #[test]
    fn test_clean_documentation_drops_chrome_and_markup() {
        // Arrange
        let html = r#"<html><head><style>body { color: red; }</style>
            <script>alert("x")</script></head>
            <body><nav>Home | About</nav><h1>Quiz   settings</h1>
            <p>Set the <b>time limit</b>.</p><footer>Copyright</footer></body></html>"#;

        // Act
        let text = clean_documentation(html);

        // Assert
        assert_eq!(text, "Quiz settings Set the time limit .");
    }

    #[test]
    fn test_clean_documentation_truncates_to_budget() {
        // Arrange
        let html = format!("<p>{}</p>", "x".repeat(DOCUMENTATION_CHAR_BUDGET * 2));

        // Act
        let text = clean_documentation(&html);

        // Assert
        assert_eq!(text.chars().count(), DOCUMENTATION_CHAR_BUDGET);
    }
}
