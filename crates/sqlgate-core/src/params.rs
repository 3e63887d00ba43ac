//! Stored-procedure parameter descriptors and sets
//!
//! A [`ParameterSet`] is the discovered signature of one stored procedure.
//! The descriptor metadata (name, direction, declared type) is fixed once
//! discovered; only the per-call `value` slot is ever assigned. Cached
//! templates keep every value unset, and every caller works on a private
//! deep copy, so concurrent executions never share mutable parameter state.

use crate::{Result, SqlgateError, Value};
use serde::{Deserialize, Serialize};

/// Direction of a stored-procedure parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterDirection {
    In,
    Out,
    InOut,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether a value flows into the procedure through this parameter
    pub fn accepts_input(&self) -> bool {
        matches!(self, ParameterDirection::In | ParameterDirection::InOut)
    }
}

/// One formal parameter of a stored procedure.
///
/// Metadata comes from the backend's system catalog; `value` is the only
/// field assigned per call. An unset (`None`) value on an In/InOut parameter
/// binds as an explicit SQL NULL rather than being omitted, so server-side
/// parameter defaults never kick in by accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name without the backend's sigil (`@`, `$`, ...)
    pub name: String,
    /// Direction as declared in the catalog
    pub direction: ParameterDirection,
    /// Declared type name, backend-specific (e.g. `int`, `nvarchar`)
    pub data_type: String,
    /// Maximum size in bytes/characters, where the catalog reports one
    pub size: Option<i64>,
    /// Numeric precision
    pub precision: Option<i32>,
    /// Numeric scale
    pub scale: Option<i32>,
    /// Result-column name this parameter is sourced from, if mapped
    pub source_column: Option<String>,
    /// Per-call value; `None` means unset
    pub value: Option<Value>,
}

impl ParameterDescriptor {
    /// Create an input parameter descriptor with no value assigned
    pub fn input(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new(name, ParameterDirection::In, data_type)
    }

    /// Create a descriptor with the given direction and no value assigned
    pub fn new(
        name: impl Into<String>,
        direction: ParameterDirection,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type: data_type.into(),
            size: None,
            precision: None,
            scale: None,
            source_column: None,
            value: None,
        }
    }

    /// The value this parameter binds as: the assigned value, or an explicit
    /// NULL for unset input-capable parameters.
    pub fn bound_value(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}

/// Composite cache key for one discovered procedure signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Data-source identity (driver + host + database)
    pub data_source: String,
    /// Procedure name exactly as the caller addresses it
    pub procedure: String,
    /// Whether the return-value descriptor is part of the set
    pub include_return: bool,
}

impl CacheKey {
    pub fn new(data_source: impl Into<String>, procedure: impl Into<String>, include_return: bool) -> Self {
        Self {
            data_source: data_source.into(),
            procedure: procedure.into(),
            include_return,
        }
    }
}

/// Ordered parameter list for one stored procedure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: Vec<ParameterDescriptor>,
}

impl ParameterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from descriptors, preserving order
    pub fn from_descriptors(parameters: Vec<ParameterDescriptor>) -> Self {
        Self { parameters }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ParameterDescriptor> {
        self.parameters.get(index)
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Append a descriptor
    pub fn push(&mut self, descriptor: ParameterDescriptor) {
        self.parameters.push(descriptor);
    }

    /// Number of parameters excluding the return-value descriptor
    pub fn input_len(&self) -> usize {
        self.parameters
            .iter()
            .filter(|p| p.direction != ParameterDirection::ReturnValue)
            .count()
    }

    /// Remove the return-value descriptor, if present
    pub fn strip_return_value(&mut self) {
        self.parameters
            .retain(|p| p.direction != ParameterDirection::ReturnValue);
    }

    /// Normalize every descriptor's value to unset
    pub fn clear_values(&mut self) {
        for p in &mut self.parameters {
            p.value = None;
        }
    }

    /// Whether any descriptor has a value assigned
    pub fn has_values(&self) -> bool {
        self.parameters.iter().any(|p| p.value.is_some())
    }

    /// Assign positional values to the non-return parameters, by ordinal.
    ///
    /// Values are matched to declaration order, never by name; the caller is
    /// responsible for knowing the procedure's declared parameter order. The
    /// count must equal the number of non-return parameters exactly.
    pub fn bind_values(&mut self, values: &[Value]) -> Result<()> {
        let expected = self.input_len();
        if values.len() != expected {
            return Err(SqlgateError::Usage(format!(
                "parameter count mismatch: procedure declares {} parameter(s), {} value(s) supplied",
                expected,
                values.len()
            )));
        }

        let mut values = values.iter();
        for descriptor in &mut self.parameters {
            if descriptor.direction == ParameterDirection::ReturnValue {
                continue;
            }
            // Exact count checked above, so the iterator cannot run dry
            if let Some(value) = values.next() {
                descriptor.value = Some(value.clone());
            }
        }
        Ok(())
    }

    /// Map caller-given source-column names onto the non-return parameters,
    /// by ordinal position (CreateCommand support).
    pub fn map_source_columns(&mut self, source_columns: &[&str]) -> Result<()> {
        let expected = self.input_len();
        if source_columns.len() != expected {
            return Err(SqlgateError::Usage(format!(
                "source column count mismatch: procedure declares {} parameter(s), {} column(s) supplied",
                expected,
                source_columns.len()
            )));
        }

        let mut columns = source_columns.iter();
        for descriptor in &mut self.parameters {
            if descriptor.direction == ParameterDirection::ReturnValue {
                continue;
            }
            if let Some(column) = columns.next() {
                descriptor.source_column = Some(column.to_string());
            }
        }
        Ok(())
    }

    /// Bound values for execution, in declaration order, excluding the
    /// return-value descriptor. Unset input parameters surface as NULL.
    pub fn bound_values(&self) -> Vec<Value> {
        self.parameters
            .iter()
            .filter(|p| p.direction != ParameterDirection::ReturnValue)
            .map(|p| p.bound_value())
            .collect()
    }
}

impl IntoIterator for ParameterSet {
    type Item = ParameterDescriptor;
    type IntoIter = std::vec::IntoIter<ParameterDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_count_set() -> ParameterSet {
        let mut set = ParameterSet::new();
        set.push(ParameterDescriptor::new(
            "RETURN_VALUE",
            ParameterDirection::ReturnValue,
            "int",
        ));
        set.push(ParameterDescriptor::input("CustomerId", "int"));
        set.push(ParameterDescriptor::input("Region", "nvarchar"));
        set
    }

    #[test]
    fn bind_values_assigns_by_ordinal_skipping_return() {
        let mut set = order_count_set();
        set.bind_values(&[Value::Int32(42), Value::String("south".into())])
            .unwrap();

        assert_eq!(set.get(0).unwrap().value, None);
        assert_eq!(set.get(1).unwrap().value, Some(Value::Int32(42)));
        assert_eq!(set.get(2).unwrap().value, Some(Value::String("south".into())));
    }

    #[test]
    fn bind_values_rejects_count_mismatch() {
        let mut set = order_count_set();
        let too_few = set.bind_values(&[Value::Int32(1)]);
        assert!(matches!(too_few, Err(SqlgateError::Usage(_))));

        let too_many = set.bind_values(&[
            Value::Int32(1),
            Value::Int32(2),
            Value::Int32(3),
        ]);
        assert!(matches!(too_many, Err(SqlgateError::Usage(_))));
    }

    #[test]
    fn unset_input_binds_as_explicit_null() {
        let descriptor = ParameterDescriptor::input("Region", "nvarchar");
        assert_eq!(descriptor.bound_value(), Value::Null);
    }

    #[test]
    fn strip_return_value_removes_only_return_descriptor() {
        let mut set = order_count_set();
        set.strip_return_value();
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|p| p.direction != ParameterDirection::ReturnValue));
    }

    #[test]
    fn clear_values_resets_every_slot() {
        let mut set = order_count_set();
        set.bind_values(&[Value::Int32(1), Value::Null]).unwrap();
        set.clear_values();
        assert!(!set.has_values());
    }

    #[test]
    fn map_source_columns_is_ordinal() {
        let mut set = order_count_set();
        set.map_source_columns(&["customer_id", "region"]).unwrap();
        assert_eq!(set.get(1).unwrap().source_column.as_deref(), Some("customer_id"));
        assert_eq!(set.get(2).unwrap().source_column.as_deref(), Some("region"));
        assert_eq!(set.get(0).unwrap().source_column, None);
    }

    #[test]
    fn bound_values_excludes_return_and_nulls_unset() {
        let mut set = order_count_set();
        set.bind_values(&[Value::Int32(42), Value::String("south".into())])
            .unwrap();
        set.parameters[2].value = None;

        assert_eq!(
            set.bound_values(),
            vec![Value::Int32(42), Value::Null]
        );
    }
}
