//! # xekit
//!
//! Typed, injection-safe access to the XenServer `xe` command-line tool.
//!
//! This crate provides:
//! - A catalog of logical operations ([`Operation`], [`Registry`])
//! - Argument vector construction with parameter validation ([`builder`])
//! - Process execution with timeouts behind the [`Executor`] trait
//! - Parsing of xe's semi-structured output into typed records ([`parser`])
//! - An error taxonomy that tells transient failures from ambiguous ones
//!
//! ## Example
//!
//! ```no_run
//! use xekit::Client;
//!
//! let client = Client::new().expect("xe not available");
//!
//! let sr = client.resolve_sr_by_name("Local storage").expect("lookup failed");
//! let vm = client.import_vm("/srv/images/web.ova", &sr).expect("import failed");
//! println!("imported {vm}");
//! ```
//!
//! ## Retry Logic
//!
//! Timeouts and spawn failures of idempotent operations can be retried with
//! exponential backoff. Non-idempotent operations are never retried; their
//! transient failures surface as [`ErrorKind::AmbiguousState`].
//!
//! ```no_run
//! use xekit::{Client, Params, RetryConfig};
//! use std::time::Duration;
//!
//! let client = Client::new().unwrap();
//! let config = RetryConfig::new(3, Duration::from_secs(2), 2.0);
//!
//! let params = Params::from([("sr_name".to_string(), "Local storage".to_string())]);
//! client.invoke_with_retry("resolve-sr-by-name", &params, &config).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod parser;
pub mod retry;
pub mod types;

pub use builder::ArgumentVector;
pub use catalog::{Effect, Operation, OutputKind, Registry, names};
pub use error::{Error, ErrorKind, Result};
pub use executor::Executor;
pub use types::{
    ExecutionResult, Identifier, Output, ParameterValue, Params, RetryConfig, StatusReport,
    StructuredValue,
};

use executor::process::ProcessExecutor;
use std::time::Duration;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// High-level client for xe operations.
///
/// The client pairs an executor with an operation registry and a timeout.
/// It holds no per-call state and can be shared between threads.
pub struct Client {
    executor: Box<dyn Executor>,
    registry: Registry,
    timeout: Duration,
}

impl Client {
    /// Create a new Client using the xe binary found on this host.
    ///
    /// Returns an error if xe is not installed.
    pub fn new() -> Result<Self> {
        let executor = ProcessExecutor::find()?;
        Ok(Self::with_executor(Box::new(executor)))
    }

    /// Create a client with a custom executor (useful for testing).
    pub fn with_executor(executor: Box<dyn Executor>) -> Self {
        Self {
            executor,
            registry: Registry::standard(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the operation registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The operation registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The per-invocation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Program name of the underlying executor.
    pub fn program(&self) -> &str {
        self.executor.program()
    }

    // =========================================================================
    // Low-level pipeline
    // =========================================================================

    /// Resolve `name` and build its argument vector.
    pub fn prepare(&self, name: &str, params: &Params) -> Result<(&Operation, ArgumentVector)> {
        let operation = self.registry.resolve(name)?;
        let args = builder::build(operation, params)?;
        Ok((operation, args))
    }

    /// Run a built argument vector once.
    ///
    /// A completed run with a non-zero exit code fails with
    /// [`Error::NonZeroExit`] carrying the full result.
    pub fn run(&self, args: &ArgumentVector) -> Result<ExecutionResult> {
        let result = self.executor.run(args, self.timeout)?;
        if result.exited_cleanly() {
            Ok(result)
        } else {
            Err(Error::NonZeroExit {
                command: args.subcommand().to_string(),
                result,
            })
        }
    }

    /// Run one operation once and parse its output.
    ///
    /// Transient failures of non-idempotent operations are reported as
    /// [`Error::AmbiguousState`].
    pub fn invoke(&self, name: &str, params: &Params) -> Result<Output> {
        let (operation, args) = self.prepare(name, params)?;
        self.run_parsed(operation, &args)
            .map_err(|e| ambiguous_unless_idempotent(operation, e))
    }

    /// Run one operation, retrying transient failures if it is idempotent.
    pub fn invoke_with_retry(
        &self,
        name: &str,
        params: &Params,
        config: &RetryConfig,
    ) -> Result<Output> {
        let (operation, args) = self.prepare(name, params)?;
        if !operation.idempotent {
            return self
                .run_parsed(operation, &args)
                .map_err(|e| e.into_ambiguous(operation.name));
        }
        retry::with_retry(config, Some(&retry::LogCallback), |_| {
            self.run_parsed(operation, &args)
        })
    }

    fn run_parsed(&self, operation: &Operation, args: &ArgumentVector) -> Result<Output> {
        let result = self.run(args)?;
        parser::parse(operation, &result)
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    /// Find the UUID of the storage repository named `name`.
    pub fn resolve_sr_by_name(&self, name: &str) -> Result<Identifier> {
        let params = params([("sr_name", name)]);
        self.invoke(names::RESOLVE_SR_BY_NAME, &params)
            .and_then(|out| expect_identifier(names::RESOLVE_SR_BY_NAME, out))
    }

    /// Import a VM image into a storage repository.
    pub fn import_vm(&self, filename: &str, sr_uuid: &Identifier) -> Result<Identifier> {
        let params = params([("filename", filename), ("sr_uuid", sr_uuid.as_str())]);
        self.invoke(names::IMPORT_VM, &params)
            .and_then(|out| expect_identifier(names::IMPORT_VM, out))
    }

    /// Set a VM's name-label and name-description.
    pub fn set_vm_identity(
        &self,
        vm_uuid: &Identifier,
        name_label: &str,
        name_description: &str,
    ) -> Result<()> {
        let params = params([
            ("vm_uuid", vm_uuid.as_str()),
            ("name_label", name_label),
            ("name_description", name_description),
        ]);
        self.invoke(names::SET_VM_IDENTITY, &params).map(|_| ())
    }

    /// Start a VM.
    pub fn start_vm(&self, uuid: &Identifier) -> Result<StatusReport> {
        let params = params([("uuid", uuid.as_str())]);
        match self.invoke(names::START_VM, &params)? {
            Output::Status(report) => Ok(report),
            other => Ok(StatusReport {
                raw: other.to_variable(),
                values: Vec::new(),
            }),
        }
    }

    /// Read one VM parameter, optionally a single key of a map parameter.
    pub fn get_vm_param(
        &self,
        uuid: &Identifier,
        param_name: &str,
        param_key: Option<&str>,
    ) -> Result<ParameterValue> {
        let mut params = params([("uuid", uuid.as_str()), ("param_name", param_name)]);
        if let Some(key) = param_key {
            params.insert("param_key".to_string(), key.to_string());
        }
        match self.invoke(names::GET_VM_PARAM, &params)? {
            Output::Value(value) => Ok(value),
            other => Ok(ParameterValue::scalar(other.to_variable())),
        }
    }
}

fn params<const N: usize>(pairs: [(&str, &str); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn expect_identifier(operation: &str, output: Output) -> Result<Identifier> {
    match output {
        Output::Identifier(id) => Ok(id),
        other => Err(Error::AmbiguousState {
            operation: operation.to_string(),
            message: format!("expected an identifier, got `{}`", other.to_variable()),
            result: None,
        }),
    }
}

fn ambiguous_unless_idempotent(operation: &Operation, error: Error) -> Error {
    if operation.idempotent {
        error
    } else {
        error.into_ambiguous(operation.name)
    }
}
