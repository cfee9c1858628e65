//! CSV query workflow: tables, filter expressions, intent and chat sessions

pub mod chat;
pub mod expr;
pub mod filter;
pub mod intent;
pub mod table;

pub use chat::{AppliedFilter, ChatMessage, CsvSession, MessageKind, Role, TurnOutcome};
pub use filter::{FilterOutcome, QueryEngine};
pub use intent::Intent;
pub use table::{ColumnType, DataTable};
