//! Batch extraction over a set of documents

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ingestion::{SourceDocument, StagedDocument};
use crate::providers::UploadedDocument;
use crate::types::{RichRecord, Schema, SchemaField, Section};

use super::expansion::expand;
use super::extractor::{ExtractionOutput, Extractor};
use super::flatten::{flatten_records, FlatRecord};
use super::schema::ExtractMode;

/// A section with its validated sub-schema
#[derive(Debug, Clone)]
pub struct PlannedSection {
    pub section: Section,
    pub schema: Schema,
}

/// Frozen inputs for one run
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub main: Schema,
    pub sections: Vec<PlannedSection>,
    pub scan_sections: bool,
}

impl ExtractionPlan {
    /// Validate the main schema and every section schema
    pub fn new(main_fields: &[SchemaField], sections: &[Section], scan_sections: bool) -> Result<Self> {
        let main = Schema::from_fields(main_fields)?;
        let sections = sections
            .iter()
            .map(|section| {
                Ok(PlannedSection {
                    schema: Schema::from_fields(&section.schema)?,
                    section: section.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            main,
            sections,
            scan_sections,
        })
    }
}

/// Failure notice for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentError {
    pub filename: String,
    pub message: String,
}

/// Accumulated records of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResults {
    pub main: Vec<RichRecord>,
    /// Section key -> records, in section order
    pub sections: IndexMap<String, Vec<RichRecord>>,
    pub errors: Vec<DocumentError>,
}

impl ExtractionResults {
    fn for_plan(plan: &ExtractionPlan) -> Self {
        let sections = if plan.scan_sections {
            plan.sections
                .iter()
                .map(|s| (s.section.key.clone(), Vec::new()))
                .collect()
        } else {
            IndexMap::new()
        };
        Self {
            sections,
            ..Default::default()
        }
    }

    pub fn main_table(&self) -> Vec<FlatRecord> {
        flatten_records(&self.main)
    }

    pub fn section_table(&self, key: &str) -> Option<Vec<FlatRecord>> {
        self.sections.get(key).map(|records| flatten_records(records))
    }

    fn record_error(&mut self, filename: &str, error: Option<String>) {
        if let Some(message) = error {
            self.errors.push(DocumentError {
                filename: filename.to_string(),
                message,
            });
        }
    }
}

/// Progress of a batch after one document
#[derive(Debug, Clone, Copy)]
pub struct DocumentProgress<'a> {
    /// 1-based index of the finished document
    pub completed: usize,
    pub total: usize,
    pub filename: &'a str,
}

/// Receives the partial snapshot after every document
pub trait BatchObserver: Send {
    fn on_document(&mut self, progress: DocumentProgress<'_>, snapshot: &ExtractionResults);
}

impl<F> BatchObserver for F
where
    F: FnMut(DocumentProgress<'_>, &ExtractionResults) + Send,
{
    fn on_document(&mut self, progress: DocumentProgress<'_>, snapshot: &ExtractionResults) {
        self(progress, snapshot)
    }
}

/// Sequential per-document extraction driver
#[derive(Clone)]
pub struct Orchestrator {
    extractor: Extractor,
}

impl Orchestrator {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Process every document in order. Per-document failures become error
    /// records plus a notice; the batch always runs to the end.
    pub async fn run(
        &self,
        plan: &ExtractionPlan,
        documents: &[SourceDocument],
        observer: &mut dyn BatchObserver,
    ) -> ExtractionResults {
        let mut results = ExtractionResults::for_plan(plan);
        let total = documents.len();

        tracing::info!(
            "Starting extraction of {} document(s), scan_sections={}",
            total,
            plan.scan_sections
        );

        for (index, document) in documents.iter().enumerate() {
            tracing::info!("Processing {} ({}/{})", document.filename, index + 1, total);
            self.process_document(plan, document, &mut results).await;

            observer.on_document(
                DocumentProgress {
                    completed: index + 1,
                    total,
                    filename: &document.filename,
                },
                &results,
            );
        }

        tracing::info!(
            "Extraction finished: {} main row(s), {} error(s)",
            results.main.len(),
            results.errors.len()
        );
        results
    }

    async fn process_document(
        &self,
        plan: &ExtractionPlan,
        document: &SourceDocument,
        results: &mut ExtractionResults,
    ) {
        let filename = document.filename.as_str();

        // Dropping `staged` at the end of this scope removes the temp file
        let staged = match document.validate_pdf().and_then(|_| StagedDocument::stage(document)) {
            Ok(staged) => staged,
            Err(e) => return self.fail_document(plan, filename, e.to_string(), results),
        };

        let uploaded = match self.extractor.upload(&staged).await {
            Ok(uploaded) => uploaded,
            Err(e) => {
                let message = format!("Upload failed for {}: {}", filename, e);
                tracing::warn!("{}", message);
                return self.fail_document(plan, filename, message, results);
            }
        };

        let main = self
            .extractor
            .extract(&uploaded, filename, &plan.main, None, ExtractMode::Single)
            .await;
        results.record_error(filename, main.error);
        results.main.extend(main.records);

        if !plan.scan_sections {
            return;
        }

        for planned in &plan.sections {
            let output = self.extract_section(&uploaded, filename, planned).await;
            results.record_error(filename, output.error);
            results
                .sections
                .entry(planned.section.key.clone())
                .or_default()
                .extend(output.records);
        }
    }

    /// Array-mode extraction, falling back to one merged object that is expanded
    async fn extract_section(
        &self,
        uploaded: &UploadedDocument,
        filename: &str,
        planned: &PlannedSection,
    ) -> ExtractionOutput {
        let array_instruction = planned.section.array_instruction();
        let output = self
            .extractor
            .extract(
                uploaded,
                filename,
                &planned.schema,
                Some(&array_instruction),
                ExtractMode::Multi,
            )
            .await;

        if output.is_failed() || !output.records.is_empty() {
            return output;
        }

        tracing::info!(
            "No {} records listed in {}, requesting merged values",
            planned.section.key,
            filename
        );

        let fallback_instruction = planned.section.fallback_instruction();
        let mut fallback = self
            .extractor
            .extract(
                uploaded,
                filename,
                &planned.schema,
                Some(&fallback_instruction),
                ExtractMode::Single,
            )
            .await;

        if fallback.is_failed() {
            return fallback;
        }

        let columns = planned.schema.column_names();
        fallback.records = fallback
            .records
            .iter()
            .flat_map(|record| expand(record, &columns, &planned.section.split_columns, filename))
            .collect();
        fallback
    }

    fn fail_document(
        &self,
        plan: &ExtractionPlan,
        filename: &str,
        message: String,
        results: &mut ExtractionResults,
    ) {
        results
            .main
            .push(RichRecord::error(plan.main.columns(), filename));

        if plan.scan_sections {
            for planned in &plan.sections {
                results
                    .sections
                    .entry(planned.section.key.clone())
                    .or_default()
                    .push(RichRecord::error(planned.schema.columns(), filename));
            }
        }

        results.record_error(filename, Some(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::ScriptedLlm;
    use crate::types::section::default_sections;
    use crate::types::ERROR_MARKER;
    use std::sync::Arc;

    fn pdf(name: &str) -> SourceDocument {
        SourceDocument::new(name, b"%PDF-1.4 test".to_vec())
    }

    fn plan(scan_sections: bool) -> ExtractionPlan {
        let mut sections = default_sections();
        sections.truncate(1);
        for section in &mut sections {
            section.schema = vec![
                SchemaField::new("NC number", "NC numbers"),
                SchemaField::new("Grade", "Grades"),
            ];
        }
        ExtractionPlan::new(
            &[SchemaField::new("Status", "Open or Closed?")],
            &sections,
            scan_sections,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_rejects_invalid_section_schema() {
        let mut sections = default_sections();
        sections[1].schema.push(SchemaField::new("filename", "q"));
        let plan = ExtractionPlan::new(&[SchemaField::new("A", "q")], &sections, true);
        assert!(matches!(plan, Err(Error::InvalidSchema(_))));
    }

    #[tokio::test]
    async fn test_run_main_only_and_observer_snapshots() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond(r#"{"Status": {"answer": "Open", "source_quote": "Status: Open", "page_number": 2}}"#)
                .fail(Error::llm("boom")),
        );
        let orchestrator = Orchestrator::new(Extractor::new(llm.clone()));

        let mut seen = Vec::new();
        let mut observer = |progress: DocumentProgress<'_>, snapshot: &ExtractionResults| {
            seen.push((progress.completed, progress.total, snapshot.main.len()));
        };

        let results = orchestrator
            .run(&plan(false), &[pdf("a.pdf"), pdf("b.pdf")], &mut observer)
            .await;

        assert_eq!(seen, vec![(1, 2, 1), (2, 2, 2)]);
        assert_eq!(results.main.len(), 2);
        assert_eq!(results.main[0].get("Status").unwrap().answer_text(), "Open");
        assert!(results.main[1].is_error());
        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].filename, "b.pdf");
        assert!(results.sections.is_empty());
        assert_eq!(llm.uploads(), vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_section_fallback_is_expanded() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond(r#"{"Status": {"answer": "Closed", "source_quote": "Closed", "page_number": 1}}"#)
                .respond("[]")
                .respond(
                    r#"{"NC number": {"answer": "NC-1; NC-2", "source_quote": "NC-1 NC-2", "page_number": 5},
                        "Grade": {"answer": "Minor", "source_quote": "Minor", "page_number": 5}}"#,
                ),
        );
        let orchestrator = Orchestrator::new(Extractor::new(llm.clone()));

        let results = orchestrator
            .run(&plan(true), &[pdf("audit.pdf")], &mut |_: DocumentProgress<'_>, _: &ExtractionResults| {})
            .await;

        let rows = results.section_table("audit_nc").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell("NC number"), "NC-2");
        assert_eq!(rows[1].cell("Grade"), "Minor");
        assert_eq!(rows[1].cell("filename"), "audit.pdf");

        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].prompt.contains("JSON ARRAY"));
        assert!(requests[2].prompt.contains("';' separated values"));
        // one upload shared by all three calls
        assert_eq!(llm.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_document_marks_every_table() {
        let llm = Arc::new(ScriptedLlm::new());
        let orchestrator = Orchestrator::new(Extractor::new(llm.clone()));

        let results = orchestrator
            .run(
                &plan(true),
                &[SourceDocument::new("notes.txt", b"plain".to_vec())],
                &mut |_: DocumentProgress<'_>, _: &ExtractionResults| {},
            )
            .await;

        assert!(results.main[0].is_error());
        assert_eq!(
            results.sections["audit_nc"][0].get("Grade").unwrap().answer_text(),
            ERROR_MARKER
        );
        assert_eq!(results.errors.len(), 1);
        assert!(llm.requests().is_empty());
    }
}
