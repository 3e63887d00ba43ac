//! Tests for stored-procedure parameter discovery

use crate::parameters::rows_to_descriptors;
use sqlgate_core::{ParameterDirection, Row, Value};

fn catalog_row(name: &str, data_type: &str, max_length: i64, is_output: bool) -> Row {
    Row::new(
        vec![
            "param_name".to_string(),
            "data_type".to_string(),
            "max_length".to_string(),
            "precision".to_string(),
            "scale".to_string(),
            "is_output".to_string(),
            "ordinal".to_string(),
        ],
        vec![
            Value::String(name.to_string()),
            Value::String(data_type.to_string()),
            Value::Int16(max_length as i16),
            Value::Int32(0),
            Value::Int32(0),
            Value::Bool(is_output),
            Value::Int32(1),
        ],
    )
}

#[test]
fn test_descriptors_strip_at_sigil() {
    let rows = vec![catalog_row("@CustomerId", "int", 4, false)];
    let set = rows_to_descriptors(&rows, false);

    assert_eq!(set.len(), 1);
    let p = set.get(0).unwrap();
    assert_eq!(p.name, "CustomerId");
    assert_eq!(p.data_type, "int");
    assert_eq!(p.direction, ParameterDirection::In);
    assert_eq!(p.size, Some(4));
    assert_eq!(p.value, None);
}

#[test]
fn test_output_parameters_become_in_out() {
    let rows = vec![catalog_row("@Total", "int", 4, true)];
    let set = rows_to_descriptors(&rows, false);
    assert_eq!(set.get(0).unwrap().direction, ParameterDirection::InOut);
}

#[test]
fn test_return_value_synthesized_first_when_requested() {
    let rows = vec![catalog_row("@CustomerId", "int", 4, false)];
    let set = rows_to_descriptors(&rows, true);

    assert_eq!(set.len(), 2);
    let ret = set.get(0).unwrap();
    assert_eq!(ret.name, "RETURN_VALUE");
    assert_eq!(ret.direction, ParameterDirection::ReturnValue);
    assert_eq!(set.input_len(), 1);
}

#[test]
fn test_zero_parameter_procedure_yields_empty_or_return_only() {
    let without = rows_to_descriptors(&[], false);
    assert!(without.is_empty());

    let with = rows_to_descriptors(&[], true);
    assert_eq!(with.len(), 1);
    assert_eq!(with.input_len(), 0);
}
