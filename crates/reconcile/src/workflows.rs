//! Canned workflows
//!
//! Plans for the two supported jobs: importing and starting a VM, and
//! reading or changing one VM parameter.

use crate::plan::{Plan, Step};
use std::fmt;
use std::str::FromStr;
use xekit::{Error, Params, Result, names};

/// Variable names the import workflow captures.
pub mod vars {
    pub const SR_UUID: &str = "sr_uuid";
    pub const VM_UUID: &str = "vm_uuid";
    pub const VM_NAME_REPORT: &str = "vm_name_report";
    pub const VM_START: &str = "vm_start";
    pub const VM_PARAM: &str = "vm_param";
}

/// Build the import → rename → start plan.
///
/// Takes the named parameters `filename`, `name_label`, `name_description`
/// and `sr_name`, all required.
pub fn vm_import_plan(params: &Params) -> Result<Plan> {
    const WORKFLOW: &str = "vm-import";
    let filename = required(params, WORKFLOW, "filename")?;
    let name_label = required(params, WORKFLOW, "name_label")?;
    let name_description = required(params, WORKFLOW, "name_description")?;
    let sr_name = required(params, WORKFLOW, "sr_name")?;
    reject_unknown(params, WORKFLOW, &["filename", "name_label", "name_description", "sr_name"])?;

    Ok(Plan::new(WORKFLOW)
        .input("filename", filename)
        .input("name_label", name_label)
        .input("name_description", name_description)
        .input("sr_name", sr_name)
        .step(
            Step::new(names::RESOLVE_SR_BY_NAME)
                .input("sr_name", "sr_name")
                .output(vars::SR_UUID),
        )
        .step(
            Step::new(names::IMPORT_VM)
                .input("filename", "filename")
                .variable("sr_uuid", vars::SR_UUID)
                .output(vars::VM_UUID),
        )
        .step(
            Step::new(names::SET_VM_IDENTITY)
                .variable("vm_uuid", vars::VM_UUID)
                .input("name_label", "name_label")
                .input("name_description", "name_description")
                .output(vars::VM_NAME_REPORT),
        )
        .step(
            Step::new(names::START_VM)
                .variable("uuid", vars::VM_UUID)
                .output(vars::VM_START),
        ))
}

/// What to do with a VM parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamAction {
    Get,
    Set,
    Add,
    Remove,
    Clear,
}

impl ParamAction {
    /// Operation this action runs
    pub fn operation(self) -> &'static str {
        match self {
            Self::Get => names::GET_VM_PARAM,
            Self::Set => names::SET_VM_PARAM,
            Self::Add => names::ADD_VM_PARAM,
            Self::Remove => names::REMOVE_VM_PARAM,
            Self::Clear => names::CLEAR_VM_PARAM,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Clear => "clear",
        }
    }

    fn accepts(self) -> &'static [&'static str] {
        match self {
            Self::Get => &["param_key"],
            Self::Set => &["value"],
            Self::Add => &["param_key", "value"],
            Self::Remove => &["param_key"],
            Self::Clear => &[],
        }
    }
}

impl FromStr for ParamAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            "clear" => Ok(Self::Clear),
            other => Err(Error::Validation {
                operation: "vm-param".to_string(),
                parameter: "action".to_string(),
                message: format!("unknown action `{other}` (expected get, set, add, remove or clear)"),
            }),
        }
    }
}

impl fmt::Display for ParamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a single-step plan acting on one VM parameter.
///
/// Takes `uuid`, `action` and `param_name`, plus `param_key` and `value`
/// where the action needs them. The step's output is captured as
/// `vm_param`.
pub fn vm_param_plan(params: &Params) -> Result<Plan> {
    const WORKFLOW: &str = "vm-param";
    let action: ParamAction = required(params, WORKFLOW, "action")?.parse()?;
    let uuid = required(params, WORKFLOW, "uuid")?;
    let param_name = required(params, WORKFLOW, "param_name")?;

    let mut allowed = vec!["action", "uuid", "param_name"];
    allowed.extend_from_slice(action.accepts());
    reject_unknown(params, WORKFLOW, &allowed)?;

    let mut plan = Plan::new(format!("{WORKFLOW}-{action}"))
        .input("uuid", uuid)
        .input("param_name", param_name);
    let mut step = Step::new(action.operation())
        .input("uuid", "uuid")
        .input("param_name", "param_name")
        .output(vars::VM_PARAM);

    for extra in action.accepts() {
        if let Some(value) = params.get(*extra) {
            plan = plan.input(extra, value.clone());
            step = step.input(extra, extra);
        }
    }

    Ok(plan.step(step))
}

fn required<'p>(params: &'p Params, workflow: &str, name: &str) -> Result<&'p str> {
    match params.get(name).map(String::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(invalid(workflow, name, "is empty")),
        None => Err(invalid(workflow, name, "is required")),
    }
}

fn reject_unknown(params: &Params, workflow: &str, allowed: &[&str]) -> Result<()> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(invalid(workflow, unknown, "not accepted by this workflow")),
        None => Ok(()),
    }
}

fn invalid(workflow: &str, parameter: &str, message: &str) -> Error {
    Error::Validation {
        operation: workflow.to_string(),
        parameter: parameter.to_string(),
        message: message.to_string(),
    }
}
