//! Testing utilities: a scripted in-memory LLM provider and a small PDF builder.
//!
//! Lets the orchestrator, the CSV query loop and the HTTP API be exercised
//! without network calls.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;

use crate::error::{Error, Result};
use crate::providers::{GenerateRequest, LlmProvider, UploadedDocument};

/// LLM provider that replays queued responses in order and records every call
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    uploads: Mutex<Vec<String>>,
    fail_uploads: bool,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful generation
    pub fn respond(self, text: impl Into<String>) -> Self {
        self.responses.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a failed generation
    pub fn fail(self, error: Error) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    /// Make every upload fail
    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Queue a response after construction (e.g. when shared behind an `Arc`)
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().push_back(Ok(text.into()));
    }

    /// All generation requests received so far
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    /// Display names of every uploaded document
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn upload_document(&self, display_name: &str, path: &Path) -> Result<UploadedDocument> {
        if self.fail_uploads {
            return Err(Error::llm(format!("upload rejected for {}", display_name)));
        }
        if !path.exists() {
            return Err(Error::internal(format!(
                "staged file missing: {}",
                path.display()
            )));
        }

        let mut uploads = self.uploads.lock();
        uploads.push(display_name.to_string());
        let name = format!("files/scripted-{}", uploads.len());

        Ok(UploadedDocument {
            uri: format!("mem://{}", name),
            name,
            mime_type: "application/pdf".to_string(),
            display_name: display_name.to_string(),
        })
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::llm("no scripted response left")))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

/// Font size used by [`text_pdf`]
pub const PDF_FONT_SIZE: i64 = 12;

/// Build a PDF with one page per entry; lines are separated by `\n` and set in Courier
pub fn text_pdf(pages: &[&str]) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for text in pages {
        let mut operations = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let baseline = 720 - (i as i64) * 20;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), PDF_FONT_SIZE.into()]));
            operations.push(Operation::new("Td", vec![72.into(), baseline.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| Error::internal(format!("Failed to encode page content: {}", e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| Error::internal(format!("Failed to write PDF: {}", e)))?;
    Ok(buf)
}
