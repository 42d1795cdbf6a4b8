//! Output parser.
//!
//! Every extraction rule for xe stdout lives here, keyed by the operation's
//! [`OutputKind`]. Parser failures ([`Error::Parse`], [`Error::NotFound`]) are
//! kept separate from process failures so callers can tell "xe failed" from
//! "xe succeeded but said something unexpected".

use crate::catalog::{Operation, OutputKind};
use crate::error::{Error, Result};
use crate::types::{ExecutionResult, Identifier, Output, ParameterValue, StatusReport, StructuredValue};
use std::collections::BTreeMap;

/// Line prefixes xe uses for errors it reports on an exit code of 0.
const ERROR_TOKENS: &[&str] = &["Error code:", "Error:"];

/// Parse the result of a successful run of `operation`.
pub fn parse(operation: &Operation, result: &ExecutionResult) -> Result<Output> {
    if let Some(line) = find_error_token(operation.output, result) {
        return Err(Error::Parse {
            operation: operation.name.to_string(),
            message: format!("error reported despite exit code 0: {line}"),
            result: result.clone(),
        });
    }

    match operation.output {
        OutputKind::IdentifierLookup { what } => {
            parse_identifier_lookup(operation, what, result).map(Output::Identifier)
        }
        OutputKind::BareIdentifier => parse_bare_identifier(operation, result).map(Output::Identifier),
        OutputKind::ParameterValue => Ok(Output::Value(parse_parameter_value(&result.stdout))),
        OutputKind::Success => Ok(Output::Success),
        OutputKind::Status => Ok(Output::Status(parse_status(&result.stdout))),
    }
}

/// Outputs that carry data only have their stderr scanned: a parameter
/// value or a name may itself start with `Error:`.
fn find_error_token(kind: OutputKind, result: &ExecutionResult) -> Option<&str> {
    let stdout = match kind {
        OutputKind::Success | OutputKind::Status => result.stdout.as_str(),
        OutputKind::IdentifierLookup { .. }
        | OutputKind::BareIdentifier
        | OutputKind::ParameterValue => "",
    };
    stdout
        .lines()
        .chain(result.stderr.lines())
        .map(str::trim_start)
        .find(|line| ERROR_TOKENS.iter().any(|t| line.starts_with(t)))
}

/// Collect the values of every `uuid`-bearing `key : value` line.
///
/// xe prints records as `uuid ( RO)    : 6c4f...`; the value is everything
/// after the first colon, trimmed.
pub fn uuid_values(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .filter(|line| line.contains("uuid"))
        .filter_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_identifier_lookup(
    operation: &Operation,
    what: &str,
    result: &ExecutionResult,
) -> Result<Identifier> {
    let values = uuid_values(&result.stdout);
    match values.as_slice() {
        [] => Err(Error::NotFound {
            operation: operation.name.to_string(),
            what: what.to_string(),
            result: result.clone(),
        }),
        [single] => Identifier::parse(single).ok_or_else(|| Error::Parse {
            operation: operation.name.to_string(),
            message: format!("`{single}` is not a valid identifier"),
            result: result.clone(),
        }),
        many => Err(Error::AmbiguousState {
            operation: operation.name.to_string(),
            message: format!("{} {what}s match: {}", many.len(), many.join(", ")),
            result: Some(result.clone()),
        }),
    }
}

fn parse_bare_identifier(operation: &Operation, result: &ExecutionResult) -> Result<Identifier> {
    let tokens: Vec<&str> = result
        .stdout
        .split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    match tokens.as_slice() {
        [] => Err(Error::Parse {
            operation: operation.name.to_string(),
            message: "no identifier in output".to_string(),
            result: result.clone(),
        }),
        [single] => Identifier::parse(single).ok_or_else(|| Error::Parse {
            operation: operation.name.to_string(),
            message: format!("`{single}` is not a valid identifier"),
            result: result.clone(),
        }),
        many => Err(Error::AmbiguousState {
            operation: operation.name.to_string(),
            message: format!("expected one identifier, got {}: {}", many.len(), many.join(", ")),
            result: Some(result.clone()),
        }),
    }
}

/// Build raw and structured views of a `vm-param-get` value.
pub fn parse_parameter_value(stdout: &str) -> ParameterValue {
    let raw = stdout.trim();
    ParameterValue {
        raw: raw.to_string(),
        structured: structure(raw),
    }
}

fn structure(raw: &str) -> Option<StructuredValue> {
    let delimiter = if raw.contains(';') {
        ';'
    } else if raw.contains(',') {
        ','
    } else {
        return None;
    };

    let items: Vec<&str> = raw
        .split(delimiter)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();

    if !items.is_empty() && items.iter().all(|item| item.contains(':')) {
        let map: BTreeMap<String, String> = items
            .iter()
            .filter_map(|item| item.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        return Some(StructuredValue::Mapping(map));
    }

    Some(StructuredValue::Sequence(
        items.into_iter().map(str::to_string).collect(),
    ))
}

fn parse_status(stdout: &str) -> StatusReport {
    let raw = stdout.trim();
    StatusReport {
        raw: raw.to_string(),
        values: raw
            .split_whitespace()
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GET_VM_PARAM, IMPORT_VM, RESOLVE_SR_BY_NAME, SET_VM_IDENTITY, START_VM};
    use crate::error::ErrorKind;

    fn ok(stdout: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code: 0,
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_uuid_line() {
        let out = parse(
            &RESOLVE_SR_BY_NAME,
            &ok("uuid ( RO)                : 3f5a9c1e-0b7d-4c2e-9a61-8f2d3b4c5e6f\n\n\n"),
        )
        .unwrap();
        assert_eq!(
            out.as_identifier().map(Identifier::as_str),
            Some("3f5a9c1e-0b7d-4c2e-9a61-8f2d3b4c5e6f")
        );
    }

    #[test]
    fn test_uuid_lines_ignore_other_fields() {
        let stdout = "uuid ( RO)                : S1\n          name-label ( RW): Local storage\n";
        assert_eq!(uuid_values(stdout), vec!["S1"]);
    }

    #[test]
    fn test_zero_uuid_lines_is_not_found() {
        let err = parse(&RESOLVE_SR_BY_NAME, &ok("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("storage repository"));
    }

    #[test]
    fn test_multiple_uuid_lines_is_ambiguous() {
        let err = parse(
            &RESOLVE_SR_BY_NAME,
            &ok("uuid ( RO) : S1\n\n\nuuid ( RO) : S2\n"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousState);
        assert!(err.to_string().contains("S1, S2"));
    }

    #[test]
    fn test_bare_identifier() {
        let out = parse(&IMPORT_VM, &ok("  V-123\n")).unwrap();
        assert_eq!(out.to_variable(), "V-123");

        let err = parse(&IMPORT_VM, &ok("\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let err = parse(&IMPORT_VM, &ok("V1,V2\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousState);
    }

    #[test]
    fn test_parameter_value_sequence() {
        let out = parse(&GET_VM_PARAM, &ok("net1,net2\n")).unwrap();
        let Output::Value(value) = out else {
            panic!("expected a parameter value");
        };
        assert_eq!(value.raw, "net1,net2");
        assert_eq!(
            value.as_sequence(),
            Some(&["net1".to_string(), "net2".to_string()][..])
        );
    }

    #[test]
    fn test_parameter_value_mapping() {
        let value = parse_parameter_value("0/ip: 10.0.0.5; 0/ipv6/0: fe80::1\n");
        let map = value.as_mapping().unwrap();
        assert_eq!(map.get("0/ip").map(String::as_str), Some("10.0.0.5"));
        assert_eq!(map.get("0/ipv6/0").map(String::as_str), Some("fe80::1"));
    }

    #[test]
    fn test_parameter_value_scalar() {
        let value = parse_parameter_value("vm1\n");
        assert_eq!(value.raw, "vm1");
        assert!(value.structured.is_none());
    }

    #[test]
    fn test_parameter_value_starting_with_error_token() {
        let out = parse(&GET_VM_PARAM, &ok("Error: disk alert relay VM\n")).unwrap();
        assert_eq!(out.to_variable(), "Error: disk alert relay VM");

        let result = ExecutionResult {
            stdout: "Error: disk alert relay VM\n".into(),
            stderr: "Error code: HANDLE_INVALID\n".into(),
            ..Default::default()
        };
        let err = parse(&GET_VM_PARAM, &result).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_success_with_error_token_is_parse_error() {
        assert_eq!(parse(&SET_VM_IDENTITY, &ok("")).unwrap(), Output::Success);

        let result = ExecutionResult {
            stderr: "Error code: HANDLE_INVALID\n".into(),
            ..Default::default()
        };
        let err = parse(&SET_VM_IDENTITY, &result).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.result().map(|r| r.stderr.as_str()), Some("Error code: HANDLE_INVALID\n"));
    }

    #[test]
    fn test_status_values() {
        let out = parse(&START_VM, &ok("power-state running domid 7")).unwrap();
        let Output::Status(status) = out else {
            panic!("expected a status report");
        };
        assert_eq!(status.values, vec!["running", "7"]);
        assert_eq!(status.raw, "power-state running domid 7");
    }
}
