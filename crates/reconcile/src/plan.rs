//! Reconciliation plans
//!
//! A plan is an ordered list of steps. Each step names a registered
//! operation, binds every parameter to a literal, a plan input, or a variable
//! captured from an earlier step, and may capture its own output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xekit::{Error, Params, Registry, Result};

/// Where a step parameter takes its value from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", content = "name", rename_all = "lowercase")]
pub enum Binding {
    /// A fixed value
    Literal(String),
    /// A named plan input
    Input(String),
    /// The output captured by an earlier step
    Variable(String),
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Registered operation name
    pub operation: String,
    /// Parameter bindings, keyed by parameter name
    pub params: BTreeMap<String, Binding>,
    /// Variable that receives this step's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Step {
    /// Create a step with no bindings
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: BTreeMap::new(),
            output: None,
        }
    }

    /// Bind a parameter to a literal value
    pub fn literal(self, param: &str, value: impl Into<String>) -> Self {
        self.bind(param, Binding::Literal(value.into()))
    }

    /// Bind a parameter to a plan input
    pub fn input(self, param: &str, input: &str) -> Self {
        self.bind(param, Binding::Input(input.to_string()))
    }

    /// Bind a parameter to an earlier step's output
    pub fn variable(self, param: &str, variable: &str) -> Self {
        self.bind(param, Binding::Variable(variable.to_string()))
    }

    /// Capture this step's output as `variable`
    pub fn output(mut self, variable: &str) -> Self {
        self.output = Some(variable.to_string());
        self
    }

    fn bind(mut self, param: &str, binding: Binding) -> Self {
        self.params.insert(param.to_string(), binding);
        self
    }

    /// Resolve bindings into concrete parameters.
    ///
    /// Unbound variables are rendered as `<name>` placeholders when
    /// `placeholders` is set, and are an error otherwise.
    pub fn resolve(
        &self,
        inputs: &BTreeMap<String, String>,
        variables: &BTreeMap<String, String>,
        placeholders: bool,
    ) -> Result<Params> {
        let mut params = Params::new();
        for (name, binding) in &self.params {
            let value = match binding {
                Binding::Literal(value) => value.clone(),
                Binding::Input(input) => inputs
                    .get(input)
                    .cloned()
                    .ok_or_else(|| invalid(&self.operation, name, format!("input `{input}` is not set")))?,
                Binding::Variable(var) => match variables.get(var) {
                    Some(value) => value.clone(),
                    None if placeholders => format!("<{var}>"),
                    None => {
                        return Err(invalid(
                            &self.operation,
                            name,
                            format!("variable `{var}` has no value"),
                        ));
                    }
                },
            };
            params.insert(name.clone(), value);
        }
        Ok(params)
    }
}

/// An ordered sequence of steps with named inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique id, matched against checkpoints on resume
    pub id: String,
    /// Workflow name (e.g. `vm-import`)
    pub name: String,
    /// Named input values
    pub inputs: BTreeMap<String, String>,
    /// Steps, executed strictly in order
    pub steps: Vec<Step>,
}

impl Plan {
    /// Create an empty plan with a time-based id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = format!("{name}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%9f"));
        Self {
            id,
            name,
            inputs: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set an input value
    pub fn input(mut self, name: &str, value: impl Into<String>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    /// Append a step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Operation names in step order.
    ///
    /// Checkpoints record this so a checkpoint cannot be resumed against a
    /// plan with different steps.
    pub fn fingerprint(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.operation.clone()).collect()
    }

    /// Check the plan against `registry` before anything runs.
    ///
    /// Fails with [`Error::UnknownOperation`] for unregistered operations and
    /// with [`Error::Validation`] for parameters the operation does not accept,
    /// missing inputs, variables no earlier step defines, and variables
    /// defined twice.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        let mut defined: Vec<&str> = Vec::new();

        for step in &self.steps {
            let operation = registry.resolve(&step.operation)?;

            for (name, binding) in &step.params {
                if operation.param(name).is_none() {
                    return Err(invalid(&step.operation, name, "not accepted by this operation"));
                }
                match binding {
                    Binding::Literal(_) => {}
                    Binding::Input(input) if !self.inputs.contains_key(input) => {
                        return Err(invalid(
                            &step.operation,
                            name,
                            format!("bound to undefined input `{input}`"),
                        ));
                    }
                    Binding::Input(_) => {}
                    Binding::Variable(var) if !defined.contains(&var.as_str()) => {
                        return Err(invalid(
                            &step.operation,
                            name,
                            format!("bound to variable `{var}` before any step defines it"),
                        ));
                    }
                    Binding::Variable(_) => {}
                }
            }

            for spec in operation.required {
                if !step.params.contains_key(spec.name) {
                    return Err(invalid(&step.operation, spec.name, "is required"));
                }
            }

            if let Some(var) = &step.output {
                if defined.contains(&var.as_str()) {
                    return Err(invalid(
                        &step.operation,
                        var,
                        format!("variable `{var}` is defined by more than one step"),
                    ));
                }
                defined.push(var);
            }
        }
        Ok(())
    }
}

fn invalid(operation: &str, parameter: &str, message: impl Into<String>) -> Error {
    Error::Validation {
        operation: operation.to_string(),
        parameter: parameter.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xekit::{ErrorKind, names};

    fn registry() -> Registry {
        Registry::standard()
    }

    #[test]
    fn test_validate_accepts_threaded_variables() {
        let plan = Plan::new("t")
            .input("sr", "Local storage")
            .step(Step::new(names::RESOLVE_SR_BY_NAME).input("sr_name", "sr").output("sr_uuid"))
            .step(
                Step::new(names::IMPORT_VM)
                    .literal("filename", "x.ova")
                    .variable("sr_uuid", "sr_uuid"),
            );
        plan.validate(&registry()).unwrap();
    }

    #[test]
    fn test_validate_unknown_operation() {
        let plan = Plan::new("t").step(Step::new("vm-destroy"));
        let err = plan.validate(&registry()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOperation);
    }

    #[test]
    fn test_validate_variable_used_before_definition() {
        let plan = Plan::new("t")
            .step(Step::new(names::START_VM).variable("uuid", "vm_uuid"))
            .step(
                Step::new(names::IMPORT_VM)
                    .literal("filename", "x.ova")
                    .literal("sr_uuid", "S")
                    .output("vm_uuid"),
            );
        let err = plan.validate(&registry()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("vm_uuid"));
    }

    #[test]
    fn test_validate_missing_input_and_param() {
        let plan = Plan::new("t").step(Step::new(names::RESOLVE_SR_BY_NAME).input("sr_name", "nope"));
        assert_eq!(plan.validate(&registry()).unwrap_err().kind(), ErrorKind::Validation);

        let plan = Plan::new("t").step(Step::new(names::START_VM));
        assert!(plan.validate(&registry()).unwrap_err().to_string().contains("uuid"));

        let plan = Plan::new("t").step(Step::new(names::START_VM).literal("uuid", "V").literal("force", "true"));
        assert!(plan.validate(&registry()).unwrap_err().to_string().contains("force"));
    }

    #[test]
    fn test_resolve_placeholders() {
        let step = Step::new(names::START_VM).variable("uuid", "vm_uuid");
        let empty = BTreeMap::new();

        let params = step.resolve(&empty, &empty, true).unwrap();
        assert_eq!(params.get("uuid").map(String::as_str), Some("<vm_uuid>"));

        assert!(step.resolve(&empty, &empty, false).is_err());
    }

    #[test]
    fn test_plan_serde() {
        let plan = Plan::new("t")
            .with_id("t-1")
            .step(Step::new(names::START_VM).variable("uuid", "vm_uuid"));
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["steps"][0]["params"]["uuid"]["from"], "variable");
        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
