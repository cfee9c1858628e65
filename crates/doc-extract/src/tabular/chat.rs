//! CSV query sessions and the chat turn flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filter::{FilterOutcome, QueryEngine};
use super::intent::Intent;
use super::table::DataTable;

/// Notice shown when a chat filter matches nothing
pub const EMPTY_FILTER_NOTICE: &str = "Filter returned no results.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in the answer prompt history
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    /// Filter logic notice
    Info,
    /// A table snapshot
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<DataTable>,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            kind: MessageKind::Text,
            content: content.into(),
            table: None,
        }
    }

    fn info(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            kind: MessageKind::Info,
            content: content.into(),
            table: None,
        }
    }

    fn table(table: DataTable) -> Self {
        Self {
            role: Role::Assistant,
            kind: MessageKind::Table,
            content: format!("[table: {} rows]", table.len()),
            table: Some(table),
        }
    }
}

/// The first-step filter applied to the uploaded table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilter {
    pub request: String,
    pub expression: Option<String>,
    pub explanation: String,
    pub attempts: usize,
    pub notice: Option<String>,
    pub table: DataTable,
}

/// Outcome of one chat turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub intent: Intent,
    /// Filter run during this turn, if the prompt asked for one
    pub filter: Option<FilterOutcome>,
    pub explanation: Option<String>,
    pub answer: Option<String>,
    pub notice: Option<String>,
    /// Rows in the chat table after the turn
    pub rows: usize,
}

/// One uploaded CSV and its query state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvSession {
    pub id: Uuid,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    /// Table as uploaded
    pub table: DataTable,
    pub filter: Option<AppliedFilter>,
    /// Table the chat operates on; narrowed by chat filters
    pub chat_table: DataTable,
    pub messages: Vec<ChatMessage>,
}

impl CsvSession {
    pub fn new(filename: impl Into<String>, table: DataTable) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            created_at: Utc::now(),
            chat_table: table.clone(),
            table,
            filter: None,
            messages: Vec::new(),
        }
    }

    /// Filter the uploaded table. Resets the chat, which then works on the result.
    pub async fn apply_filter(&mut self, engine: &QueryEngine, request: &str) -> &AppliedFilter {
        let outcome = engine.filter(&self.table, request).await;
        let explanation = engine.explain(outcome.expression.as_deref()).await;

        tracing::info!(
            "Session {} filter kept {} of {} rows",
            self.id,
            outcome.table.len(),
            self.table.len()
        );

        self.messages.clear();
        self.chat_table = outcome.table.clone();
        self.filter.insert(AppliedFilter {
            request: request.to_string(),
            expression: outcome.expression,
            explanation,
            attempts: outcome.attempts,
            notice: outcome.notice,
            table: outcome.table,
        })
    }

    /// One chat turn: classify, optionally narrow the chat table, optionally answer
    pub async fn chat(&mut self, engine: &QueryEngine, prompt: &str) -> TurnOutcome {
        let history = self.messages.clone();
        self.messages.push(ChatMessage::text(Role::User, prompt));

        let intent = engine.classify(prompt, self.chat_table.columns()).await;
        let mut outcome = TurnOutcome {
            intent,
            filter: None,
            explanation: None,
            answer: None,
            notice: None,
            rows: self.chat_table.len(),
        };

        if intent.filter {
            let filtered = engine.filter(&self.chat_table, prompt).await;
            if filtered.table.is_empty() {
                outcome.notice = Some(filtered.notice.clone().unwrap_or_else(|| EMPTY_FILTER_NOTICE.to_string()));
            } else {
                let explanation = engine.explain(filtered.expression.as_deref()).await;
                self.chat_table = filtered.table.clone();
                self.messages
                    .push(ChatMessage::info(format!("**Filter Logic:** {}", explanation)));
                self.messages.push(ChatMessage::table(self.chat_table.clone()));
                outcome.explanation = Some(explanation);
            }
            outcome.filter = Some(filtered);
        }

        if intent.question {
            let answer = engine.answer(&self.chat_table, prompt, &history).await;
            self.messages.push(ChatMessage::text(Role::Assistant, answer.clone()));
            outcome.answer = Some(answer);
        }

        outcome.rows = self.chat_table.len();
        outcome
    }
}
