//! Classifying a chat prompt as a filter request, a question, or both

use serde::{Deserialize, Serialize};

use crate::extraction::response::clean_json_payload;

/// What the user wants from a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub filter: bool,
    #[serde(default)]
    pub question: bool,
}

impl Default for Intent {
    /// Unclassifiable prompts are answered as questions
    fn default() -> Self {
        Self {
            filter: false,
            question: true,
        }
    }
}

pub fn intent_prompt(request: &str, columns: &[String]) -> String {
    format!(
        r#"You are a data assistant.
The user is asking a question about a table with these columns: {columns:?}

User Query: "{request}"

Analyze the user's intent.
1. Does the user want to FILTER/SELECT a subset of data? (e.g., "Show me red ones", "Filter by status Open", "Remove X")
2. Does the user want to ask a QUESTION about the data? (e.g., "Why are they red?", "Summarize this", "What is the count?", "Explain the findings")

Respond with a JSON object exactly like this:
{{"filter": true, "question": false}}"#
    )
}

/// Decode the classifier output; anything unreadable falls back to the default
pub fn parse_intent(raw: &str) -> Intent {
    match serde_json::from_str::<Intent>(clean_json_payload(raw)) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::debug!("Unreadable intent response ({}), treating as a question", e);
            Intent::default()
        }
    }
}
