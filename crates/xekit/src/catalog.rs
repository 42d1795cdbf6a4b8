//! Operation registry.
//!
//! Each logical operation is a static [`Operation`] descriptor: which xe
//! subcommand it runs, which parameters it takes and how they map to
//! `key=value` tokens, how its output is parsed, and whether it is safe to
//! retry. Descriptors carry no state, so a [`Registry`] can be shared freely
//! between threads once built.

use crate::error::{Error, Result};
use crate::types::ExecutionResult;
use std::collections::BTreeMap;

/// Names of the operations in the standard catalog.
pub mod names {
    pub const RESOLVE_SR_BY_NAME: &str = "resolve-sr-by-name";
    pub const IMPORT_VM: &str = "import-vm";
    pub const SET_VM_IDENTITY: &str = "set-vm-identity";
    pub const START_VM: &str = "start-vm";
    pub const GET_VM_PARAM: &str = "get-vm-param";
    pub const SET_VM_PARAM: &str = "set-vm-param";
    pub const ADD_VM_PARAM: &str = "add-vm-param";
    pub const REMOVE_VM_PARAM: &str = "remove-vm-param";
    pub const CLEAR_VM_PARAM: &str = "clear-vm-param";
}

/// How a parameter turns into an argument token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `key=value` with a fixed key
    Keyed(&'static str),
    /// `<other>=value`, where the key is the value of another parameter
    KeyedBy(&'static str),
    /// No token of its own; supplies the key for a `KeyedBy` parameter
    KeyOnly,
}

/// One parameter accepted by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Caller-facing parameter name (e.g. `sr_name`)
    pub name: &'static str,
    /// Token produced for it
    pub token: Token,
}

impl ParamSpec {
    pub const fn keyed(name: &'static str, key: &'static str) -> Self {
        Self {
            name,
            token: Token::Keyed(key),
        }
    }

    pub const fn keyed_by(name: &'static str, key_param: &'static str) -> Self {
        Self {
            name,
            token: Token::KeyedBy(key_param),
        }
    }

    pub const fn key_only(name: &'static str) -> Self {
        Self {
            name,
            token: Token::KeyOnly,
        }
    }
}

/// Parser contract for an operation's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `uuid ( RO) : <id>` lines; exactly one must be present
    IdentifierLookup {
        /// Object being looked up, for error messages
        what: &'static str,
    },
    /// The whole stdout is one identifier
    BareIdentifier,
    /// The whole stdout is a parameter value
    ParameterValue,
    /// Content is ignored; success means no error token
    Success,
    /// Free-form status text
    Status,
}

/// Whether an operation changes hypervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Read,
    Write,
}

/// Static descriptor of one logical operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operation {
    /// Logical name (e.g. `import-vm`)
    pub name: &'static str,
    /// xe subcommand, always the first argument
    pub subcommand: &'static str,
    /// One-line description
    pub summary: &'static str,
    /// Parameters that must be present and non-empty
    pub required: &'static [ParamSpec],
    /// Parameters that may be omitted
    pub optional: &'static [ParamSpec],
    /// Literal tokens appended after the parameters
    pub fixed: &'static [&'static str],
    /// How stdout is parsed
    pub output: OutputKind,
    /// Safe to repeat after an ambiguous failure
    pub idempotent: bool,
    /// Read or write
    pub effect: Effect,
    /// Results may be reused within one plan run
    pub cacheable: bool,
    /// Non-zero exits whose output contains every token of any group mean
    /// the desired state already holds
    pub satisfied_when: &'static [&'static [&'static str]],
}

impl Operation {
    /// Look up a parameter spec by caller-facing name.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.required
            .iter()
            .chain(self.optional)
            .find(|p| p.name == name)
    }

    /// All parameter names in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required.iter().chain(self.optional).map(|p| p.name)
    }

    /// Whether this operation mutates the hypervisor.
    pub fn is_write(&self) -> bool {
        self.effect == Effect::Write
    }

    /// Whether a failed run is an explicitly known "already done" case.
    pub fn is_already_satisfied(&self, result: &ExecutionResult) -> bool {
        self.satisfied_when.iter().any(|group| {
            !group.is_empty()
                && group
                    .iter()
                    .all(|token| result.stderr.contains(token) || result.stdout.contains(token))
        })
    }
}

pub static RESOLVE_SR_BY_NAME: Operation = Operation {
    name: names::RESOLVE_SR_BY_NAME,
    subcommand: "sr-list",
    summary: "Find the UUID of the storage repository with a given name-label",
    required: &[ParamSpec::keyed("sr_name", "name-label")],
    optional: &[],
    fixed: &["params=uuid"],
    output: OutputKind::IdentifierLookup {
        what: "storage repository",
    },
    idempotent: true,
    effect: Effect::Read,
    cacheable: true,
    satisfied_when: &[],
};

pub static IMPORT_VM: Operation = Operation {
    name: names::IMPORT_VM,
    subcommand: "vm-import",
    summary: "Import a VM image into a storage repository",
    required: &[
        ParamSpec::keyed("filename", "filename"),
        ParamSpec::keyed("sr_uuid", "sr-uuid"),
    ],
    optional: &[],
    fixed: &[],
    output: OutputKind::BareIdentifier,
    idempotent: false,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[],
};

pub static SET_VM_IDENTITY: Operation = Operation {
    name: names::SET_VM_IDENTITY,
    subcommand: "vm-param-set",
    summary: "Set a VM's name-label and name-description",
    required: &[
        ParamSpec::keyed("vm_uuid", "uuid"),
        ParamSpec::keyed("name_label", "name-label"),
        ParamSpec::keyed("name_description", "name-description"),
    ],
    optional: &[],
    fixed: &[],
    output: OutputKind::Success,
    idempotent: true,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[],
};

pub static START_VM: Operation = Operation {
    name: names::START_VM,
    subcommand: "vm-start",
    summary: "Start a halted VM",
    required: &[ParamSpec::keyed("uuid", "uuid")],
    optional: &[],
    fixed: &[],
    output: OutputKind::Status,
    idempotent: false,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[
        &["VM_BAD_POWER_STATE", "actual: running"],
        &["power state", "actual: running"],
    ],
};

pub static GET_VM_PARAM: Operation = Operation {
    name: names::GET_VM_PARAM,
    subcommand: "vm-param-get",
    summary: "Read one VM parameter",
    required: &[
        ParamSpec::keyed("uuid", "uuid"),
        ParamSpec::keyed("param_name", "param-name"),
    ],
    optional: &[ParamSpec::keyed("param_key", "param-key")],
    fixed: &[],
    output: OutputKind::ParameterValue,
    idempotent: true,
    effect: Effect::Read,
    cacheable: false,
    satisfied_when: &[],
};

pub static SET_VM_PARAM: Operation = Operation {
    name: names::SET_VM_PARAM,
    subcommand: "vm-param-set",
    summary: "Set one VM parameter",
    required: &[
        ParamSpec::keyed("uuid", "uuid"),
        ParamSpec::key_only("param_name"),
        ParamSpec::keyed_by("value", "param_name"),
    ],
    optional: &[],
    fixed: &[],
    output: OutputKind::Success,
    idempotent: true,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[],
};

pub static ADD_VM_PARAM: Operation = Operation {
    name: names::ADD_VM_PARAM,
    subcommand: "vm-param-add",
    summary: "Add a key to a map parameter of a VM",
    required: &[
        ParamSpec::keyed("uuid", "uuid"),
        ParamSpec::keyed("param_name", "param-name"),
        ParamSpec::key_only("param_key"),
        ParamSpec::keyed_by("value", "param_key"),
    ],
    optional: &[],
    fixed: &[],
    output: OutputKind::Success,
    idempotent: false,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[],
};

pub static REMOVE_VM_PARAM: Operation = Operation {
    name: names::REMOVE_VM_PARAM,
    subcommand: "vm-param-remove",
    summary: "Remove a key from a map or set parameter of a VM",
    required: &[
        ParamSpec::keyed("uuid", "uuid"),
        ParamSpec::keyed("param_name", "param-name"),
        ParamSpec::keyed("param_key", "param-key"),
    ],
    optional: &[],
    fixed: &[],
    output: OutputKind::Success,
    idempotent: true,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[],
};

pub static CLEAR_VM_PARAM: Operation = Operation {
    name: names::CLEAR_VM_PARAM,
    subcommand: "vm-param-clear",
    summary: "Clear a VM parameter",
    required: &[
        ParamSpec::keyed("uuid", "uuid"),
        ParamSpec::keyed("param_name", "param-name"),
    ],
    optional: &[],
    fixed: &[],
    output: OutputKind::Success,
    idempotent: true,
    effect: Effect::Write,
    cacheable: false,
    satisfied_when: &[],
};

/// Maps operation names to descriptors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    operations: BTreeMap<&'static str, Operation>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every operation of the standard catalog.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for op in [
            &RESOLVE_SR_BY_NAME,
            &IMPORT_VM,
            &SET_VM_IDENTITY,
            &START_VM,
            &GET_VM_PARAM,
            &SET_VM_PARAM,
            &ADD_VM_PARAM,
            &REMOVE_VM_PARAM,
            &CLEAR_VM_PARAM,
        ] {
            registry.register(*op);
        }
        registry
    }

    /// Add or replace an operation, returning the one it replaced.
    pub fn register(&mut self, operation: Operation) -> Option<Operation> {
        self.operations.insert(operation.name, operation)
    }

    /// Look up an operation by name.
    pub fn resolve(&self, name: &str) -> Result<&Operation> {
        self.operations
            .get(name)
            .ok_or_else(|| Error::UnknownOperation {
                name: name.to_string(),
            })
    }

    /// All operations, sorted by name.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_standard_catalog_contents() {
        let registry = Registry::standard();
        assert_eq!(registry.len(), 9);
        for name in [
            names::RESOLVE_SR_BY_NAME,
            names::IMPORT_VM,
            names::SET_VM_IDENTITY,
            names::START_VM,
            names::GET_VM_PARAM,
        ] {
            assert!(registry.resolve(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn test_resolve_unknown_operation() {
        let registry = Registry::standard();
        for name in ["", "vm-destroy", "IMPORT-VM", "import-vm "] {
            let err = registry.resolve(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnknownOperation);
        }
    }

    #[test]
    fn test_idempotency_flags() {
        let registry = Registry::standard();
        let idempotent = |n| registry.resolve(n).unwrap().idempotent;
        assert!(idempotent(names::GET_VM_PARAM));
        assert!(idempotent(names::RESOLVE_SR_BY_NAME));
        assert!(!idempotent(names::IMPORT_VM));
        assert!(!idempotent(names::START_VM));
    }

    #[test]
    fn test_non_idempotent_operations_are_writes() {
        for op in Registry::standard().operations() {
            if !op.idempotent {
                assert!(op.is_write(), "{} is non-idempotent but read-only", op.name);
            }
        }
    }

    #[test]
    fn test_start_vm_already_running_is_satisfied() {
        let result = ExecutionResult {
            exit_code: 1,
            stderr: "The operation could not be performed because the VM was not in the right power state.\nexpected: halted\nactual: running\n".into(),
            ..Default::default()
        };
        assert!(START_VM.is_already_satisfied(&result));

        let other = ExecutionResult {
            exit_code: 1,
            stderr: "The uuid you supplied was invalid.".into(),
            ..Default::default()
        };
        assert!(!START_VM.is_already_satisfied(&other));
        assert!(!IMPORT_VM.is_already_satisfied(&result));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = Registry::new();
        assert!(registry.register(START_VM).is_none());
        assert!(registry.register(START_VM).is_some());
        assert_eq!(registry.len(), 1);
    }
}
