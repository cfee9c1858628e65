//! Natural-language filtering and question answering over a table

use serde::Serialize;
use std::sync::Arc;

use crate::config::TabularConfig;
use crate::providers::{GenerateRequest, LlmProvider};

use super::chat::ChatMessage;
use super::expr::{apply, parse_query};
use super::intent::{intent_prompt, parse_intent, Intent};
use super::table::DataTable;

/// Explanation used when no expression was applied
pub const NO_EXPRESSION_EXPLANATION: &str = "No filtering code was generated.";

/// Result of the filter loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOutcome {
    pub table: DataTable,
    /// The expression that produced `table`; `None` when every attempt failed
    pub expression: Option<String>,
    pub attempts: usize,
    pub notice: Option<String>,
}

fn filter_prompt(table: &DataTable, request: &str, sample_rows: usize) -> String {
    format!(
        r#"You are a data expert.
Given a table with columns:
{dtypes}

And sample data:
{sample}
Write a SINGLE LINE filter expression for this user request:
"{request}"

The expression language:
  [SELECT column, column] [WHERE condition]
  Conditions combine comparisons with AND, OR, NOT and parentheses.
  Comparisons: ==, !=, <, <=, >, >=, CONTAINS, STARTSWITH, ENDSWITH, IN ('a', 'b'), IS NULL, IS NOT NULL.
  Quote text values with single quotes. Write column names containing spaces as `Column Name`.
Example: WHERE Status == 'Open'

IMPORTANT:
- Return ONLY the expression. No markdown formatting.
- Use CONTAINS for case-insensitive text search."#,
        dtypes = table.dtypes_summary(),
        sample = table.head_markdown(sample_rows),
    )
}

/// Reduce model output to the expression line: fences, wrapping backticks and a trailing ';' removed
pub fn clean_expression(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))
        .unwrap_or("");

    let line = line.trim_end_matches(';').trim();
    match line.strip_prefix('`').and_then(|l| l.strip_suffix('`')) {
        Some(inner) if !inner.contains('`') => inner.trim().to_string(),
        _ => line.to_string(),
    }
}

/// Drives the model for intent, filtering, explanation and answers
#[derive(Clone)]
pub struct QueryEngine {
    llm: Arc<dyn LlmProvider>,
    config: TabularConfig,
}

impl QueryEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, config: TabularConfig) -> Self {
        Self { llm, config }
    }

    /// Classify a prompt; failures count as a question
    pub async fn classify(&self, request: &str, columns: &[String]) -> Intent {
        match self
            .llm
            .generate(GenerateRequest::text(intent_prompt(request, columns)))
            .await
        {
            Ok(text) => parse_intent(&text),
            Err(e) => {
                tracing::warn!("Intent classification failed: {}", e);
                Intent::default()
            }
        }
    }

    /// Ask for a filter expression and apply it, retrying with the error on failure.
    ///
    /// Never returns the unfiltered table on failure: exhaustion yields an empty
    /// table, no expression and a notice.
    pub async fn filter(&self, table: &DataTable, request: &str) -> FilterOutcome {
        let base_prompt = filter_prompt(table, request, self.config.sample_rows);
        let max_attempts = self.config.max_filter_retries.saturating_add(1);
        let mut prompt = base_prompt.clone();

        for attempt in 1..=max_attempts {
            let (line, error) = match self.llm.generate(GenerateRequest::text(prompt.clone())).await {
                Ok(text) => {
                    let line = clean_expression(&text);
                    tracing::info!("Generated filter (attempt {}): {}", attempt, line);
                    match parse_query(&line).and_then(|query| apply(&query, table)) {
                        Ok(result) => {
                            return FilterOutcome {
                                table: result,
                                expression: Some(line),
                                attempts: attempt,
                                notice: None,
                            }
                        }
                        Err(e) => (line, e.to_string()),
                    }
                }
                Err(e) => (String::new(), e.to_string()),
            };

            tracing::warn!("Filter attempt {} failed: {}", attempt, error);
            prompt = format!(
                "{}\n\nThe previous expression:\n{}\n\nFailed with this error:\n{}\n\nPlease fix the expression.",
                base_prompt, line, error
            );
        }

        FilterOutcome {
            table: DataTable::empty(),
            expression: None,
            attempts: max_attempts,
            notice: Some(format!(
                "Failed to generate a valid filter after {} attempts.",
                max_attempts
            )),
        }
    }

    /// One plain-English sentence describing the applied expression
    pub async fn explain(&self, expression: Option<&str>) -> String {
        let expression = match expression {
            Some(e) if !e.trim().is_empty() => e,
            _ => return NO_EXPRESSION_EXPLANATION.to_string(),
        };

        let prompt = format!(
            "Explain the following table filter expression in one sentence in plain English. Expression:\n{}",
            expression
        );
        match self.llm.generate(GenerateRequest::text(prompt)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => format!("Error generating explanation: {}", e),
        }
    }

    /// Answer a question from the table contents and the chat history
    pub async fn answer(&self, table: &DataTable, question: &str, history: &[ChatMessage]) -> String {
        if table.is_empty() {
            return format!("No relevant data found to answer the question: '{}'", question);
        }

        let data_context = match table.to_csv_string() {
            Ok(csv) => csv,
            Err(e) => return format!("Error generating answer: {}", e),
        };
        let history_context: String = history
            .iter()
            .map(|m| format!("{}: {}\n", m.role.label(), m.content))
            .collect();

        let prompt = format!(
            "Answer the following question based on the provided data context and history.\n\n\
             Data Context (CSV):\n{}\n\
             History:\n{}\n\
             Question:\n{}",
            data_context, history_context, question
        );

        match self.llm.generate(GenerateRequest::text(prompt)).await {
            Ok(text) => text,
            Err(e) => format!("Error generating answer: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tabular::chat::Role;
    use crate::testing::ScriptedLlm;

    fn table() -> DataTable {
        DataTable::from_csv_bytes(b"Name,Status\nAlpha,Open\nBeta,Closed\nGamma,Open\n").unwrap()
    }

    fn engine(llm: Arc<ScriptedLlm>) -> QueryEngine {
        QueryEngine::new(llm, TabularConfig::default())
    }

    #[test]
    fn test_clean_expression() {
        assert_eq!(clean_expression("```sql\nWHERE a == 1;\n```"), "WHERE a == 1");
        assert_eq!(clean_expression("`WHERE a == 1`"), "WHERE a == 1");
        assert_eq!(clean_expression("WHERE `Issue Date` IS NULL"), "WHERE `Issue Date` IS NULL");
        assert_eq!(clean_expression("\n\n"), "");
    }

    #[tokio::test]
    async fn test_filter_retries_with_error_context() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond("WHERE Colour == 'red'")
                .respond("WHERE Status == 'Open'"),
        );
        let outcome = engine(llm.clone()).filter(&table(), "open ones").await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.expression.as_deref(), Some("WHERE Status == 'Open'"));
        assert_eq!(outcome.table.len(), 2);

        let requests = llm.requests();
        assert!(requests[0].prompt.contains("| Name | Status |"));
        assert!(requests[1].prompt.contains("WHERE Colour == 'red'"));
        assert!(requests[1].prompt.contains("Unknown column 'Colour'"));
    }

    #[tokio::test]
    async fn test_filter_exhaustion_yields_empty_table() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond("")
                .fail(Error::llm("rate limited"))
                .respond("filtered_df = df[df['Status'] == 'Open']")
                .respond("WHERE Status == 'Open'"),
        );
        let outcome = engine(llm.clone()).filter(&table(), "open ones").await;

        assert_eq!(outcome.attempts, 3);
        assert!(outcome.expression.is_none());
        assert!(outcome.table.is_empty());
        assert!(outcome.notice.is_some());
        assert_eq!(llm.requests().len(), 3);
        assert_eq!(llm.remaining(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_retry_setting_does_not_overflow() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond("WHERE (((")
                .respond("WHERE Status == 'Open'"),
        );
        let config = TabularConfig {
            max_filter_retries: usize::MAX,
            ..TabularConfig::default()
        };
        let outcome = QueryEngine::new(llm, config).filter(&table(), "open ones").await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.table.len(), 2);
    }

    #[tokio::test]
    async fn test_deeply_nested_output_is_retried() {
        let nested = format!("WHERE {}Status == 'Open'", "NOT ".repeat(50_000));
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond(nested)
                .respond("WHERE Status == 'Open'"),
        );
        let outcome = engine(llm.clone()).filter(&table(), "open ones").await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.table.len(), 2);
        assert!(llm.requests()[1].prompt.contains("nested deeper than"));
    }

    #[tokio::test]
    async fn test_classify_defaults_on_failure() {
        let llm = Arc::new(ScriptedLlm::new().fail(Error::llm("down")));
        let intent = engine(llm).classify("why?", &["Name".to_string()]).await;
        assert_eq!(intent, Intent::default());
    }

    #[tokio::test]
    async fn test_explain_and_answer_fallbacks() {
        let llm = Arc::new(ScriptedLlm::new().fail(Error::llm("down")));
        let engine = engine(llm.clone());

        assert_eq!(engine.explain(None).await, NO_EXPRESSION_EXPLANATION);
        assert_eq!(
            engine.answer(&DataTable::empty(), "How many?", &[]).await,
            "No relevant data found to answer the question: 'How many?'"
        );
        assert!(engine
            .answer(&table(), "How many?", &[])
            .await
            .starts_with("Error generating answer:"));
        // only the last call reached the provider
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_includes_history() {
        let llm = Arc::new(ScriptedLlm::new().respond("Two rows are open."));
        let engine = engine(llm.clone());
        let history = vec![ChatMessage::text(Role::User, "show open ones")];

        let answer = engine.answer(&table(), "How many?", &history).await;
        assert_eq!(answer, "Two rows are open.");

        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("Name,Status\nAlpha,Open"));
        assert!(prompt.contains("User: show open ones"));
        assert!(prompt.ends_with("Question:\nHow many?"));
    }
}
