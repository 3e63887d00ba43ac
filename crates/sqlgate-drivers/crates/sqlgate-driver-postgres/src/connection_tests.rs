//! Tests for PostgreSQL connection module

use crate::connection::{render_command, split_procedure_name};
use sqlgate_core::{Command, ParameterDescriptor, ParameterSet};

#[test]
fn test_split_procedure_name() {
    assert_eq!(
        split_procedure_name("archive_orders"),
        ("public".to_string(), "archive_orders".to_string())
    );
    assert_eq!(
        split_procedure_name("billing.archive_orders"),
        ("billing".to_string(), "archive_orders".to_string())
    );
    assert_eq!(
        split_procedure_name("\"billing\".\"archive_orders\""),
        ("billing".to_string(), "archive_orders".to_string())
    );
}

#[test]
fn test_render_call_without_parameters() {
    let cmd = Command::stored_procedure("archive_orders").unwrap();
    assert_eq!(render_command(&cmd), "CALL \"public\".\"archive_orders\"()");
}

#[test]
fn test_render_call_with_positional_placeholders() {
    let mut params = ParameterSet::new();
    params.push(ParameterDescriptor::input("customer_id", "integer"));
    params.push(ParameterDescriptor::input("region", "text"));

    let cmd = Command::stored_procedure("billing.archive_orders")
        .unwrap()
        .with_parameters(params);
    assert_eq!(
        render_command(&cmd),
        "CALL \"billing\".\"archive_orders\"($1, $2)"
    );
}

#[test]
fn test_render_text_command_is_passthrough() {
    let cmd = Command::text("SELECT now()").unwrap();
    assert_eq!(render_command(&cmd), "SELECT now()");
}
