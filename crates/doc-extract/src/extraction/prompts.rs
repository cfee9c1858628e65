//! Prompt templates for document extraction

/// Base instruction sent with every document
pub const EXTRACTION_PROMPT: &str =
    "Extract information according to JSON schema. Provide Answer, Exact Source Quote, and Page Number.";

/// Base prompt with an optional section instruction appended
pub fn extraction_prompt(extra_instruction: Option<&str>) -> String {
    match extra_instruction.map(str::trim).filter(|s| !s.is_empty()) {
        Some(extra) => format!("{} {}", EXTRACTION_PROMPT, extra),
        None => EXTRACTION_PROMPT.to_string(),
    }
}
