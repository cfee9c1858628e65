//! Per-document structured extraction

use std::sync::Arc;

use crate::error::Result;
use crate::ingestion::StagedDocument;
use crate::providers::{GenerateRequest, LlmProvider, UploadedDocument};
use crate::types::{RichRecord, Schema};

use super::prompts::extraction_prompt;
use super::response::parse_records;
use super::schema::{build_response_schema, ExtractMode};

/// Records produced for one document, plus the failure notice if any
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutput {
    pub records: Vec<RichRecord>,
    pub error: Option<String>,
}

impl ExtractionOutput {
    /// Error-marker output: one record with "Error" in every schema column
    pub fn failed(schema: &Schema, filename: &str, message: impl Into<String>) -> Self {
        Self {
            records: vec![RichRecord::error(schema.columns(), filename)],
            error: Some(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs schema-constrained extraction against the LLM provider
#[derive(Clone)]
pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Upload a staged document once; the handle is reused for every extraction call
    pub async fn upload(&self, staged: &StagedDocument) -> Result<UploadedDocument> {
        self.llm.upload_document(staged.filename(), staged.path()).await
    }

    /// Extract `schema` from an uploaded document.
    ///
    /// Never fails: provider errors and malformed output become error-marker
    /// records with the message in `error`. Single mode always yields exactly
    /// one record; multi mode yields zero or more.
    pub async fn extract(
        &self,
        document: &UploadedDocument,
        filename: &str,
        schema: &Schema,
        extra_instruction: Option<&str>,
        mode: ExtractMode,
    ) -> ExtractionOutput {
        match self
            .try_extract(document, filename, schema, extra_instruction, mode)
            .await
        {
            Ok(records) => ExtractionOutput {
                records,
                error: None,
            },
            Err(e) => {
                let message = format!("Extraction failed for {}: {}", filename, e);
                tracing::warn!("{}", message);
                ExtractionOutput::failed(schema, filename, message)
            }
        }
    }

    async fn try_extract(
        &self,
        document: &UploadedDocument,
        filename: &str,
        schema: &Schema,
        extra_instruction: Option<&str>,
        mode: ExtractMode,
    ) -> Result<Vec<RichRecord>> {
        let request = GenerateRequest::structured(
            extraction_prompt(extra_instruction),
            document.clone(),
            build_response_schema(schema, mode),
        );

        let text = self.llm.generate(request).await?;
        tracing::debug!("{} returned {} chars for {}", self.llm.name(), text.len(), filename);

        parse_records(&text, mode, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::ScriptedLlm;
    use crate::types::{SchemaField, ERROR_MARKER};

    fn uploaded() -> UploadedDocument {
        UploadedDocument {
            name: "files/1".to_string(),
            uri: "mem://files/1".to_string(),
            mime_type: "application/pdf".to_string(),
            display_name: "report.pdf".to_string(),
        }
    }

    fn schema() -> Schema {
        Schema::from_fields(&[
            SchemaField::new("Status", "Open or Closed?"),
            SchemaField::new("Grade", "Grade"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_extract_sends_schema_and_prompt() {
        let llm = Arc::new(ScriptedLlm::new().respond(
            r#"```json
            {"Status": {"answer": "Open", "source_quote": "Status: Open", "page_number": 2},
             "Grade": {"answer": "Minor", "source_quote": "Grade: Minor", "page_number": 2}}
            ```"#,
        ));
        let extractor = Extractor::new(llm.clone());

        let output = extractor
            .extract(&uploaded(), "report.pdf", &schema(), Some("Be precise."), ExtractMode::Single)
            .await;

        assert!(!output.is_failed());
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].get("Grade").unwrap().answer_text(), "Minor");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.ends_with("Be precise."));
        assert_eq!(requests[0].document.as_ref().unwrap().uri, "mem://files/1");
        assert_eq!(requests[0].response_schema.as_ref().unwrap()["type"], "OBJECT");
    }

    #[tokio::test]
    async fn test_extract_failure_yields_error_markers() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .fail(Error::llm("quota exceeded"))
                .respond("not json at all"),
        );
        let extractor = Extractor::new(llm);

        for mode in [ExtractMode::Single, ExtractMode::Multi] {
            let output = extractor
                .extract(&uploaded(), "bad.pdf", &schema(), None, mode)
                .await;
            assert!(output.is_failed());
            assert_eq!(output.records.len(), 1);
            assert_eq!(output.records[0].filename, "bad.pdf");
            assert_eq!(output.records[0].get("Status").unwrap().answer_text(), ERROR_MARKER);
            assert!(output.error.unwrap().contains("bad.pdf"));
        }
    }
}
