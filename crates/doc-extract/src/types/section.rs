//! Multi-record section profiles and the shipped defaults

use serde::{Deserialize, Serialize};

use super::schema::SchemaField;

/// Rules appended to every non-conformity instruction
pub const NC_BOUNDARY_RULES: &str = r#"
CRITICAL RULES FOR NON-CONFORMITY EXTRACTION:

- A new Non-Conformity (NC) may ONLY start when an explicit anchor is detected:
  "Indicator:", "NC number:", or a numbered NC section header.

- STOP extracting the current NC immediately when the NEXT NC anchor appears,
  even if it is on the SAME PAGE.

- DO NOT carry forward, infer, reuse, or merge information from a previous NC.

- Each NC is an isolated record.
  If a field is missing for an NC, return null or empty string.

- DO NOT include Observations, Conclusions, or other sections
  unless they are explicitly inside the NC table.
"#;

/// Columns that hold one value per non-conformity and get split during expansion
pub const NC_SPLIT_COLUMNS: &[&str] = &[
    "NC number",
    "Client name",
    "Indicator",
    "Grade",
    "Status",
    "Issue Date",
    "Closed date",
];

const NC_COLUMNS: &[(&str, &str)] = &[
    ("NC number", "List every NC number recorded. If none, return 'None'."),
    ("Client name", "List the client name(s) associated with the NCs. Use 'Unknown' if not stated."),
    ("Indicator", "Copy the referenced Indicator in the standard for each NC."),
    ("Grade", "State the grade (Major, Minor, Critical, Non-critical, Opportunities for Improvement etc.) for each NC."),
    ("Status", "Open or Closed. Open if there is no closed date, closed if there is one."),
    ("Issue Date", "Provide the date each NC was issued. Use the format (DD-MM-YYYY)."),
    ("Closed date", "Provide the date each NC was closed. Use the format (DD-MM-YYYY)."),
    ("Scope Definition", "Summarize the scope definition or description for each NC."),
];

const MAIN_COLUMNS: &[(&str, &str)] = &[
    ("CH ID", "Unique ID (to be generated)"),
    ("Report", "Name of the audit report"),
    ("Audit ID", "Unique code for the audit report"),
    ("Certificate holder", "Full name from RSPO certificate"),
    ("Certified Mill Name", "Name of the mill"),
    ("Certified Mill's Location/Address", "Address of the mill"),
    ("Country", "Country"),
    ("Province", "Province"),
];

/// Export file name of the main results table
pub const MAIN_EXPORT_FILE: &str = "extracted.csv";

/// An independently configured extraction profile for multi-record sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Stable identifier (used in routes and result maps)
    pub key: String,
    /// Display title
    pub title: String,
    /// Instruction for array-mode extraction
    pub instruction_array: String,
    /// Instruction for the single-object fallback
    pub instruction_fallback: String,
    /// CSV export file name
    pub file_name: String,
    /// User-editable sub-schema
    pub schema: Vec<SchemaField>,
    /// Columns split on ';' or newline during expansion
    #[serde(default = "default_split_columns")]
    pub split_columns: Vec<String>,
}

impl Section {
    /// Array-mode instruction with the boundary rules appended
    pub fn array_instruction(&self) -> String {
        format!("{}\n\n{}", self.instruction_array, NC_BOUNDARY_RULES)
    }

    /// Fallback instruction with the boundary rules appended
    pub fn fallback_instruction(&self) -> String {
        format!("{}\n\n{}", self.instruction_fallback, NC_BOUNDARY_RULES)
    }

    pub fn is_split_column(&self, column: &str) -> bool {
        self.split_columns.iter().any(|c| c == column)
    }
}

fn default_split_columns() -> Vec<String> {
    NC_SPLIT_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn fields(pairs: &[(&str, &str)]) -> Vec<SchemaField> {
    pairs.iter().map(|(c, q)| SchemaField::new(*c, *q)).collect()
}

/// Default main schema rows
pub fn default_main_schema() -> Vec<SchemaField> {
    fields(MAIN_COLUMNS)
}

/// Default non-conformity sub-schema rows
pub fn default_nc_schema() -> Vec<SchemaField> {
    fields(NC_COLUMNS)
}

fn nc_array_instruction(heading: &str) -> String {
    format!(
        "Focus strictly on Section {heading}.\n\n\
         Extract ONLY Non-Conformity tables that belong to this section.\n\n\
         Each NC MUST:\n\
         - Start at an explicit anchor (Indicator or NC number)\n\
         - End before the next NC anchor or next section header\n\n\
         Return a JSON ARRAY where each element represents exactly ONE NC."
    )
}

/// The two shipped non-conformity sections
pub fn default_sections() -> Vec<Section> {
    vec![
        Section {
            key: "audit_nc".to_string(),
            title: "4.3.1 Non-Conformities Identified during this Audit".to_string(),
            instruction_array: nc_array_instruction(
                "4.3.1 Non-Conformities Identified during this Audit",
            ),
            instruction_fallback:
                "Focus strictly on Section 4.3.1. Return a JSON object with ';' separated values."
                    .to_string(),
            file_name: "non_conformities_current_audit.csv".to_string(),
            schema: default_nc_schema(),
            split_columns: default_split_columns(),
        },
        Section {
            key: "previous_nc".to_string(),
            title: "4.3.2 Non-Conformities Identified during the last ASA".to_string(),
            instruction_array: nc_array_instruction(
                "4.3.2 Non-Conformities Identified during the last ASA",
            ),
            instruction_fallback:
                "Focus strictly on Section 4.3.2. Return a JSON object with ';' separated values."
                    .to_string(),
            file_name: "non_conformities_last_asa.csv".to_string(),
            schema: default_nc_schema(),
            split_columns: default_split_columns(),
        },
    ]
}
