//! Stored-procedure parameter discovery through the SQL Server catalog

use crate::connection::{TiberiusClient, run_query};
use sqlgate_core::{
    Command, ParameterDescriptor, ParameterDirection, ParameterSet, Result, Row, SqlgateError,
    Value,
};
use tokio::sync::Mutex;

const EXISTENCE_QUERY: &str = "SELECT OBJECT_ID(@P1, N'P') AS object_id";

const PARAMETERS_QUERY: &str = "SELECT
        p.name AS param_name,
        TYPE_NAME(p.user_type_id) AS data_type,
        p.max_length,
        p.precision,
        p.scale,
        p.is_output,
        p.parameter_id AS ordinal
     FROM sys.parameters p
     WHERE p.object_id = OBJECT_ID(@P1) AND p.parameter_id > 0
     ORDER BY p.parameter_id";

/// Query the catalog for a procedure's formal parameters.
///
/// A procedure with no declared parameters yields no catalog rows, so a
/// separate existence probe distinguishes "zero parameters" from "no such
/// procedure". The latter is a discovery failure and must never be cached.
pub(crate) async fn derive_parameters(
    client: &Mutex<TiberiusClient>,
    procedure: &str,
    include_return: bool,
) -> Result<ParameterSet> {
    let existence = catalog_command(EXISTENCE_QUERY, procedure)?;
    let result = run_query(client, &existence).await?;
    let found = result.scalar().map(|v| !v.is_null()).unwrap_or(false);
    if !found {
        return Err(SqlgateError::Discovery(format!(
            "stored procedure '{}' does not exist",
            procedure
        )));
    }

    let catalog = catalog_command(PARAMETERS_QUERY, procedure)?;
    let result = run_query(client, &catalog).await?;

    tracing::debug!(
        procedure = procedure,
        parameters = result.row_count(),
        "derived stored procedure parameters"
    );

    Ok(rows_to_descriptors(&result.rows, include_return))
}

fn catalog_command(sql: &str, procedure: &str) -> Result<Command> {
    let mut params = ParameterSet::new();
    let mut name = ParameterDescriptor::input("P1", "nvarchar");
    name.value = Some(Value::String(procedure.to_string()));
    params.push(name);
    Ok(Command::text(sql)?.with_parameters(params))
}

/// Build a parameter set from catalog rows, in declaration order.
///
/// SQL Server does not list the integer return value in `sys.parameters`
/// for procedures, so when requested it is synthesized as the first
/// descriptor, matching how command builders derive procedure signatures.
pub(crate) fn rows_to_descriptors(rows: &[Row], include_return: bool) -> ParameterSet {
    let mut set = ParameterSet::new();

    if include_return {
        set.push(ParameterDescriptor::new(
            "RETURN_VALUE",
            ParameterDirection::ReturnValue,
            "int",
        ));
    }

    for row in rows {
        let name = row
            .get_by_name("param_name")
            .and_then(|v| v.as_str())
            .map(|s| s.trim_start_matches('@').to_string())
            .unwrap_or_default();
        let data_type = row
            .get_by_name("data_type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let is_output = row
            .get_by_name("is_output")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        // OUTPUT procedure parameters always accept input as well
        let direction = if is_output {
            ParameterDirection::InOut
        } else {
            ParameterDirection::In
        };

        let mut descriptor = ParameterDescriptor::new(name, direction, data_type);
        descriptor.size = row.get_by_name("max_length").and_then(|v| v.as_i64());
        descriptor.precision = row
            .get_by_name("precision")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        descriptor.scale = row
            .get_by_name("scale")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        set.push(descriptor);
    }

    set
}
