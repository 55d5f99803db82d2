//! Query-related data models.

use serde_json::Value as JsonValue;

/// One result row: column name to value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Everything a single statement produced.
#[derive(Debug, Clone, Default)]
pub struct StatementOutput {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    /// Generated id reported with the statement result, when the backend has one.
    pub last_insert_id: Option<String>,
}

impl StatementOutput {
    /// First column of the first row rendered as text.
    pub fn scalar(&self) -> Option<String> {
        let value = self.rows.first()?.values().next()?;
        match value {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), value);
        row
    }

    #[test]
    fn test_scalar_number_and_string() {
        let output = StatementOutput {
            rows: vec![row(json!(42))],
            ..Default::default()
        };
        assert_eq!(output.scalar().as_deref(), Some("42"));

        let output = StatementOutput {
            rows: vec![row(json!("17"))],
            ..Default::default()
        };
        assert_eq!(output.scalar().as_deref(), Some("17"));
    }

    #[test]
    fn test_scalar_empty_or_null() {
        assert_eq!(StatementOutput::default().scalar(), None);
        let output = StatementOutput {
            rows: vec![row(JsonValue::Null)],
            ..Default::default()
        };
        assert_eq!(output.scalar(), None);
    }
}
