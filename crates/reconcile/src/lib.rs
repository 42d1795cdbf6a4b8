//! # Reconcile
//!
//! Resumable multi-step plans over xe operations.
//!
//! ## Core Concepts
//!
//! - **Plan**: ordered steps, each an operation with parameter bindings
//! - **Engine**: runs steps in order, retrying idempotent ones on transient
//!   failures and halting everything else
//! - **PlanCheckpoint**: progress of a run, serializable so a halted plan can
//!   be resumed later without repeating completed steps
//! - **Report**: the caller-facing summary (changed flag, facts, identifiers)
//!
//! ## Example
//!
//! ```no_run
//! use reconcile::{CancelToken, Engine, EngineOptions, NoProgress, summarize, workflows};
//! use xekit::{Client, Params};
//!
//! let client = Client::new()?;
//! let params = Params::from([
//!     ("filename".to_string(), "/srv/images/web.ova".to_string()),
//!     ("name_label".to_string(), "web01".to_string()),
//!     ("name_description".to_string(), "frontend".to_string()),
//!     ("sr_name".to_string(), "Local storage".to_string()),
//! ]);
//! let plan = workflows::vm_import_plan(&params)?;
//!
//! let engine = Engine::new(&client, EngineOptions::default());
//! let result = engine.execute(&plan, &mut NoProgress, &CancelToken::new())?;
//! let report = summarize(&result);
//! println!("changed: {}, vm: {:?}", report.changed, report.identifiers.get("vm_uuid"));
//! # Ok::<(), xekit::Error>(())
//! ```

pub mod checkpoint;
pub mod context;
pub mod engine;
pub mod plan;
pub mod report;
pub mod types;
pub mod workflows;

// Re-export main types at crate root
pub use checkpoint::PlanCheckpoint;
pub use context::{CancelToken, NoProgress, ProgressCallback};
pub use engine::{Engine, execute_many};
pub use plan::{Binding, Plan, Step};
pub use report::{ErrorReport, Report, summarize};
pub use types::{
    AttemptRecord, EngineOptions, PlanResult, PlanState, StepFailure, StepRecord, StepStatus,
};
pub use workflows::{ParamAction, vm_import_plan, vm_param_plan};
