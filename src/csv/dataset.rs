//! Named tables that can be combined into one export

use super::column::{ColumnDescriptor, infer_columns};
use super::options::EncodeOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named set of rows with the columns used to encode them
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Section name, written as a name line in multi-dataset output
    #[serde(default)]
    pub name: String,

    /// Row objects
    pub rows: Vec<Value>,

    /// Column order; inferred from the first row when empty
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,

    /// Per-dataset override of the encode options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<EncodeOptions>,
}

impl Dataset {
    /// Create a dataset
    pub fn new(name: impl Into<String>, rows: Vec<Value>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            rows,
            columns,
            options: None,
        }
    }

    /// Override the encode options for this dataset only
    #[must_use]
    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// The declared columns, or columns inferred from the first object row
    pub fn effective_columns(&self) -> Vec<ColumnDescriptor> {
        if self.columns.is_empty() {
            infer_columns(&self.rows)
        } else {
            self.columns.clone()
        }
    }
}
