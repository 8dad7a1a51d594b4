//! Document hand-off from the file-ingestion collaborator.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tool::Arguments;

/// An already-materialized document: an identifier and its text segments.
///
/// The content is opaque here; it is only reshaped into tool arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub document_id: String,
    /// Ordered text segments.
    pub extracted_chunks: Vec<String>,
}

impl DocumentDescriptor {
    /// Builds the arguments of a vector-store ingestion tool.
    ///
    /// Chunks keep their order, one `{text}` entry each.
    pub fn to_ingest_arguments(&self, session_id: &str) -> Arguments {
        let documents: Vec<Value> = self
            .extracted_chunks
            .iter()
            .map(|chunk| json!({ "text": chunk }))
            .collect();

        let mut arguments = Arguments::new();
        arguments.insert("session_id".into(), json!(session_id));
        arguments.insert("filename".into(), json!(self.document_id));
        arguments.insert("documents".into(), Value::Array(documents));
        arguments
    }
}
