//! Plain entities loaded from stored-procedure result rows

use serde::{Deserialize, Serialize};
use sqlgate_core::{QueryResult, Result, Row, RowCursor, SqlgateError, Value};

/// A line of business
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessLine {
    pub code: i16,
    pub name: String,
    pub description: Option<String>,
}

impl BusinessLine {
    /// Load from a result row with `code`, `name` and `description` columns
    pub fn from_row(row: &Row) -> Result<Self> {
        let code = row
            .get_by_name("code")
            .and_then(Value::as_i64)
            .ok_or_else(|| SqlgateError::Query("missing 'code' column".to_string()))?;
        let code = i16::try_from(code)
            .map_err(|_| SqlgateError::Query(format!("'code' value {code} out of range")))?;
        let name = row
            .get_by_name("name")
            .and_then(Value::as_str)
            .ok_or_else(|| SqlgateError::Query("missing 'name' column".to_string()))?
            .to_string();
        let description = row
            .get_by_name("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            code,
            name,
            description,
        })
    }
}

/// Collection of business lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessLines(pub Vec<BusinessLine>);

impl BusinessLines {
    /// Load every row of a buffered result
    pub fn from_result(result: &QueryResult) -> Result<Self> {
        let lines = result
            .rows
            .iter()
            .map(BusinessLine::from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(lines))
    }

    /// Drain a cursor into a collection
    pub async fn from_cursor(cursor: &mut dyn RowCursor) -> Result<Self> {
        let mut lines = Vec::new();
        while let Some(row) = cursor.next().await? {
            lines.push(BusinessLine::from_row(&row)?);
        }
        Ok(Self(lines))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BusinessLine> {
        self.0.iter()
    }
}

impl IntoIterator for BusinessLines {
    type Item = BusinessLine;
    type IntoIter = std::vec::IntoIter<BusinessLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_core::ColumnMeta;

    fn line_row(code: i16, name: &str, description: Option<&str>) -> Row {
        Row::new(
            vec![
                "code".to_string(),
                "name".to_string(),
                "description".to_string(),
            ],
            vec![
                Value::Int16(code),
                Value::String(name.to_string()),
                description
                    .map(|d| Value::String(d.to_string()))
                    .unwrap_or(Value::Null),
            ],
        )
    }

    #[test]
    fn from_row_reads_named_columns() {
        let line = BusinessLine::from_row(&line_row(7, "Marine", Some("Cargo and hull"))).unwrap();
        assert_eq!(line.code, 7);
        assert_eq!(line.name, "Marine");
        assert_eq!(line.description.as_deref(), Some("Cargo and hull"));
    }

    #[test]
    fn null_description_maps_to_none() {
        let line = BusinessLine::from_row(&line_row(2, "Fire", None)).unwrap();
        assert_eq!(line.description, None);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let row = Row::new(vec!["name".to_string()], vec![Value::String("Fire".into())]);
        assert!(BusinessLine::from_row(&row).is_err());
    }

    #[test]
    fn out_of_range_code_is_an_error() {
        let row = Row::new(
            vec!["code".to_string(), "name".to_string()],
            vec![Value::Int32(40_000), Value::String("Fire".into())],
        );
        let err = BusinessLine::from_row(&row).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn from_result_loads_every_row() {
        let result = QueryResult {
            columns: vec![
                ColumnMeta {
                    name: "code".to_string(),
                    ..Default::default()
                },
                ColumnMeta {
                    name: "name".to_string(),
                    ..Default::default()
                },
                ColumnMeta {
                    name: "description".to_string(),
                    ..Default::default()
                },
            ],
            rows: vec![line_row(1, "Fire", None), line_row(2, "Marine", Some("x"))],
            affected_rows: 0,
            execution_time_ms: 0,
        };

        let lines = BusinessLines::from_result(&result).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.0[1].name, "Marine");
    }
}
