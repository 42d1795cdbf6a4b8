//! Execution engine - runs plans step by step with retry and checkpoints

use crate::checkpoint::PlanCheckpoint;
use crate::context::{CancelToken, NoProgress, ProgressCallback};
use crate::plan::{Plan, Step};
use crate::types::{
    AttemptRecord, EngineOptions, PlanResult, PlanState, StepFailure, StepRecord, StepStatus,
};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Instant;
use xekit::retry::{self, LogCallback};
use xekit::{
    ArgumentVector, Client, Error, ExecutionResult, Operation, Output, Result, StatusReport,
    builder, parser,
};

/// Runs plans against one client.
///
/// The engine holds no per-run state; everything a run needs lives on the
/// stack of [`Engine::execute`] or in the checkpoint it is given.
pub struct Engine<'a> {
    client: &'a Client,
    options: EngineOptions,
}

impl<'a> Engine<'a> {
    /// Create an engine over `client`
    pub fn new(client: &'a Client, options: EngineOptions) -> Self {
        Self { client, options }
    }

    /// Execution options in effect
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run a plan from its first step.
    ///
    /// Returns `Err` only when the plan itself is invalid; step failures are
    /// reported in the [`PlanResult`] along with the checkpoint to resume from.
    pub fn execute(
        &self,
        plan: &Plan,
        progress: &mut dyn ProgressCallback,
        cancel: &CancelToken,
    ) -> Result<PlanResult> {
        plan.validate(self.client.registry())?;
        self.run(plan, PlanCheckpoint::new(plan), progress, cancel)
    }

    /// Continue a halted plan after its last completed step.
    ///
    /// Completed steps are never re-run; their captured outputs are reused.
    /// A checkpoint taken from a different plan fails with
    /// [`Error::Validation`].
    pub fn resume(
        &self,
        plan: &Plan,
        checkpoint: PlanCheckpoint,
        progress: &mut dyn ProgressCallback,
        cancel: &CancelToken,
    ) -> Result<PlanResult> {
        plan.validate(self.client.registry())?;
        checkpoint.ensure_matches(plan)?;
        self.run(plan, checkpoint, progress, cancel)
    }

    fn run(
        &self,
        plan: &Plan,
        mut checkpoint: PlanCheckpoint,
        progress: &mut dyn ProgressCallback,
        cancel: &CancelToken,
    ) -> Result<PlanResult> {
        let first = checkpoint.next_step();
        log::info!(
            "plan {}: {} steps, starting at step {}{}",
            plan.id,
            plan.steps.len(),
            first + 1,
            if self.options.dry_run { " (dry run)" } else { "" }
        );
        progress.on_plan_start(plan, first);

        let mut records = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate().take(first) {
            let operation = self.client.registry().resolve(&step.operation)?;
            let mut record = StepRecord::new(
                index,
                &step.operation,
                operation.is_write(),
                StepStatus::PreviouslyCompleted,
            );
            record.output = step
                .output
                .as_ref()
                .and_then(|var| checkpoint.variables.get(var).cloned());
            records.push(record);
        }

        if self.options.dry_run {
            return self.dry_run(plan, checkpoint, records, progress);
        }

        let mut cache: HashMap<ArgumentVector, Output> = HashMap::new();
        let mut failure = None;
        let mut aborted = false;

        for (index, step) in plan.steps.iter().enumerate().skip(first) {
            if cancel.is_cancelled() {
                log::warn!("plan {}: cancelled before step {}", plan.id, index + 1);
                aborted = true;
                break;
            }

            let operation = self.client.registry().resolve(&step.operation)?;
            log::debug!(
                "plan {}: -> {} ({})",
                plan.id,
                PlanState::Running { step: index },
                step.operation
            );

            let mut record =
                StepRecord::new(index, &step.operation, operation.is_write(), StepStatus::Failed);
            let outcome = self.run_step(
                plan,
                index,
                step,
                operation,
                &checkpoint,
                &mut cache,
                &mut record,
                progress,
            );

            match outcome {
                Ok((status, output)) => {
                    log::info!("plan {}: step {} {} {:?}", plan.id, index + 1, step.operation, status);
                    checkpoint.advance(index, step.output.as_deref(), &output);
                    record.status = status;
                    record.output = Some(output);
                    progress.on_step_complete(&record);
                    records.push(record);
                }
                Err(error) => {
                    log::error!("plan {}: step {} failed: {error}", plan.id, index + 1);
                    progress.on_step_complete(&record);
                    records.push(record);
                    failure = Some(StepFailure {
                        step: index,
                        operation: step.operation.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        let state = match (&failure, aborted) {
            (Some(f), _) => PlanState::Failed { step: f.step },
            (None, true) => PlanState::Aborted,
            (None, false) => PlanState::Succeeded,
        };
        Ok(self.finish(plan, state, records, checkpoint, failure, progress))
    }

    /// Build and run one step, returning its status and output.
    #[allow(clippy::too_many_arguments)]
    fn run_step(
        &self,
        plan: &Plan,
        index: usize,
        step: &Step,
        operation: &Operation,
        checkpoint: &PlanCheckpoint,
        cache: &mut HashMap<ArgumentVector, Output>,
        record: &mut StepRecord,
        progress: &mut dyn ProgressCallback,
    ) -> Result<(StepStatus, Output)> {
        let params = step.resolve(&plan.inputs, &checkpoint.values(), false)?;
        let args = builder::build(operation, &params)?;
        record.args = Some(args.clone());
        progress.on_step_start(index, step, &args);

        let use_cache = operation.cacheable && self.options.cache_lookups;
        if use_cache && let Some(output) = cache.get(&args) {
            log::debug!("{}: reusing cached result for {args}", operation.name);
            return Ok((StepStatus::Cached, output.clone()));
        }

        let attempts = &mut record.attempts;
        let outcome = if operation.idempotent {
            let max = self.options.retry.max_attempts.max(1);
            retry::with_retry(&self.options.retry, Some(&LogCallback), |attempt| {
                self.attempt(operation, &args, attempt, max, attempts)
            })
        } else {
            self.attempt(operation, &args, 1, 1, attempts)
                .map_err(|e| e.into_ambiguous(operation.name))
        };

        if use_cache && let Ok((_, output)) = &outcome {
            cache.insert(args, output.clone());
        }
        outcome
    }

    /// One process invocation, recorded whatever its outcome.
    fn attempt(
        &self,
        operation: &Operation,
        args: &ArgumentVector,
        attempt: u32,
        max: u32,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<(StepStatus, Output)> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let (exit_code, outcome) = match self.client.run(args) {
            Ok(result) => (
                Some(result.exit_code),
                parser::parse(operation, &result).map(|out| (StepStatus::Executed, out)),
            ),
            Err(Error::NonZeroExit { result, .. }) if operation.is_already_satisfied(&result) => (
                Some(result.exit_code),
                Ok((StepStatus::AlreadySatisfied, satisfied_output(&result))),
            ),
            Err(e) => {
                let code = match &e {
                    Error::NonZeroExit { result, .. } => Some(result.exit_code),
                    _ => None,
                };
                (code, Err(e))
            }
        };

        let record = AttemptRecord {
            attempt,
            started_at,
            duration: clock.elapsed(),
            exit_code,
            error: outcome.as_ref().err().map(Error::kind),
        };
        match &outcome {
            Ok((status, _)) => log::info!(
                "{} attempt {attempt}/{max}: ok ({status:?}, {:.2}s)",
                operation.name,
                record.duration.as_secs_f64()
            ),
            Err(e) => log::warn!("{} attempt {attempt}/{max}: {}", operation.name, e.kind()),
        }
        attempts.push(record);
        outcome
    }

    /// Build every remaining step's command without running anything.
    fn dry_run(
        &self,
        plan: &Plan,
        checkpoint: PlanCheckpoint,
        mut records: Vec<StepRecord>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<PlanResult> {
        let values = checkpoint.values();
        let mut failure = None;

        for (index, step) in plan.steps.iter().enumerate().skip(records.len()) {
            let operation = self.client.registry().resolve(&step.operation)?;
            let mut record =
                StepRecord::new(index, &step.operation, operation.is_write(), StepStatus::Planned);

            let built = step
                .resolve(&plan.inputs, &values, true)
                .and_then(|params| builder::build(operation, &params));
            match built {
                Ok(args) => {
                    progress.on_step_start(index, step, &args);
                    record.args = Some(args);
                    progress.on_step_complete(&record);
                    records.push(record);
                }
                Err(error) => {
                    record.status = StepStatus::Failed;
                    progress.on_step_complete(&record);
                    records.push(record);
                    failure = Some(StepFailure {
                        step: index,
                        operation: step.operation.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        let state = match &failure {
            Some(f) => PlanState::Failed { step: f.step },
            None => PlanState::Pending,
        };
        let mut result = self.finish(plan, state, records, checkpoint, failure, progress);
        result.checkpoint = None;
        Ok(result)
    }

    /// Pad the records with not-run steps and assemble the result.
    fn finish(
        &self,
        plan: &Plan,
        state: PlanState,
        mut records: Vec<StepRecord>,
        checkpoint: PlanCheckpoint,
        failure: Option<StepFailure>,
        progress: &mut dyn ProgressCallback,
    ) -> PlanResult {
        for (index, step) in plan.steps.iter().enumerate().skip(records.len()) {
            let write = self
                .client
                .registry()
                .resolve(&step.operation)
                .is_ok_and(Operation::is_write);
            records.push(StepRecord::new(index, &step.operation, write, StepStatus::NotRun));
        }

        log::info!("plan {}: {state}", plan.id);
        let result = PlanResult {
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            state,
            steps: records,
            variables: checkpoint.variables.clone(),
            checkpoint: (!state.is_success()).then_some(checkpoint),
            failure,
        };
        progress.on_plan_complete(&result);
        result
    }
}

/// Output recorded for a step whose desired state already held.
fn satisfied_output(result: &ExecutionResult) -> Output {
    let text = if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    Output::Status(StatusReport {
        raw: text.trim().to_string(),
        values: Vec::new(),
    })
}

/// Run independent plans concurrently on a bounded thread pool.
///
/// Each plan runs sequentially on one worker; results come back in the
/// order of `plans`.
pub fn execute_many(
    client: &Client,
    options: &EngineOptions,
    plans: &[Plan],
    jobs: usize,
    cancel: &CancelToken,
) -> anyhow::Result<Vec<Result<PlanResult>>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    let engine = Engine::new(client, options.clone());
    Ok(pool.install(|| {
        plans
            .par_iter()
            .map(|plan| engine.execute(plan, &mut NoProgress, cancel))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::summarize;
    use crate::workflows::{vm_import_plan, vm_param_plan};
    use std::sync::Arc;
    use std::time::Duration;
    use xekit::executor::scripted::{Reply, ScriptedExecutor};
    use xekit::{ErrorKind, Params, RetryConfig, names};

    fn scripted(executor: ScriptedExecutor) -> (Client, Arc<ScriptedExecutor>) {
        let executor = Arc::new(executor);
        (Client::with_executor(Box::new(Arc::clone(&executor))), executor)
    }

    fn options() -> EngineOptions {
        EngineOptions {
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                max_delay: Duration::from_millis(1),
            },
            ..Default::default()
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn import_plan() -> Plan {
        vm_import_plan(&params(&[
            ("filename", "x.ova"),
            ("name_label", "vm1"),
            ("name_description", "test"),
            ("sr_name", "Local storage"),
        ]))
        .unwrap()
    }

    fn happy_xe() -> ScriptedExecutor {
        ScriptedExecutor::new()
            .on("sr-list", Reply::stdout("uuid ( RO)                : S\n\n\n"))
            .on("vm-import", Reply::stdout("V\n"))
            .on("vm-param-set", Reply::stdout(""))
            .on("vm-start", Reply::stdout(""))
    }

    fn run(client: &Client, plan: &Plan, options: EngineOptions) -> PlanResult {
        Engine::new(client, options)
            .execute(plan, &mut NoProgress, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_import_scenario() {
        let (client, xe) = scripted(happy_xe());
        let result = run(&client, &import_plan(), options());
        let report = summarize(&result);

        assert_eq!(report.state, PlanState::Succeeded);
        assert!(report.changed);
        assert_eq!(report.identifiers.len(), 2);
        assert_eq!(report.identifiers["sr_uuid"], "S");
        assert_eq!(report.identifiers["vm_uuid"], "V");
        assert_eq!(report.facts["vm_name_report"], "Success");
        assert!(report.error.is_none());
        assert!(report.checkpoint.is_none());

        let calls = xe.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[2].as_slice(),
            ["vm-param-set", "uuid=V", "name-label=vm1", "name-description=test"]
        );
        assert_eq!(calls[3].as_slice(), ["vm-start", "uuid=V"]);
    }

    #[test]
    fn test_idempotent_timeout_retried_max_attempts() {
        let (client, xe) = scripted(ScriptedExecutor::new().on("sr-list", Reply::timeout()));
        let result = run(&client, &import_plan(), options());

        assert_eq!(result.state, PlanState::Failed { step: 0 });
        assert_eq!(xe.count("sr-list"), 3);
        assert_eq!(result.steps[0].attempts.len(), 3);
        assert!(result.steps[0].attempts.iter().all(|a| a.error == Some(ErrorKind::Timeout)));
        assert_eq!(
            result.failure.as_ref().map(|f| f.error.kind()),
            Some(ErrorKind::Timeout)
        );
        assert_eq!(result.steps[1].status, StepStatus::NotRun);
    }

    #[test]
    fn test_retry_then_success() {
        let (client, xe) = client_with_flaky_identity();
        let result = run(&client, &import_plan(), options());
        assert_eq!(result.state, PlanState::Succeeded);
        assert_eq!(xe.count("vm-param-set"), 2);
        assert_eq!(result.steps[2].attempts.len(), 2);
        assert!(result.steps[2].attempts[1].is_success());
        assert_eq!(result.total_attempts(), 5);

        let report = summarize(&result);
        assert_eq!(report.attempts, 5);
        assert_eq!(report.steps_done(), 4);
    }

    fn client_with_flaky_identity() -> (Client, Arc<ScriptedExecutor>) {
        scripted(
            ScriptedExecutor::new()
                .on("sr-list", Reply::stdout("uuid ( RO) : S\n"))
                .on("vm-import", Reply::stdout("V\n"))
                .on("vm-param-set", Reply::timeout())
                .on("vm-param-set", Reply::stdout(""))
                .on("vm-start", Reply::stdout("")),
        )
    }

    #[test]
    fn test_non_idempotent_timeout_is_ambiguous() {
        let (client, xe) = scripted(
            ScriptedExecutor::new()
                .on("sr-list", Reply::stdout("uuid ( RO) : S\n"))
                .on("vm-import", Reply::timeout()),
        );
        let result = run(&client, &import_plan(), options());
        let report = summarize(&result);

        assert_eq!(result.state, PlanState::Failed { step: 1 });
        assert_eq!(xe.count("vm-import"), 1);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::AmbiguousState);
        assert_eq!(error.kind_name, "AmbiguousStateError");

        let checkpoint = report.checkpoint.unwrap();
        assert_eq!(checkpoint.last_completed_step, Some(0));
        assert!(!report.changed);
    }

    #[test]
    fn test_non_idempotent_spawn_failure_is_ambiguous() {
        let (client, xe) = scripted(
            ScriptedExecutor::new()
                .on("sr-list", Reply::stdout("uuid ( RO) : S\n"))
                .on("vm-import", Reply::SpawnFailure),
        );
        let result = run(&client, &import_plan(), options());

        assert_eq!(result.state, PlanState::Failed { step: 1 });
        assert_eq!(xe.count("vm-import"), 1);
        assert_eq!(result.steps[1].attempts.len(), 1);
        assert_eq!(result.steps[1].attempts[0].error, Some(ErrorKind::Spawn));

        let report = summarize(&result);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::AmbiguousState);
        assert_eq!(error.exit_code, None);
        assert_eq!(report.checkpoint.unwrap().last_completed_step, Some(0));
    }

    #[test]
    fn test_not_found_halts_without_retry() {
        let (client, xe) = scripted(ScriptedExecutor::new().on("sr-list", Reply::stdout("\n")));
        let result = run(&client, &import_plan(), options());

        assert_eq!(result.state, PlanState::Failed { step: 0 });
        assert_eq!(xe.count("sr-list"), 1);
        assert_eq!(xe.count("vm-import"), 0);
        assert_eq!(
            result.failure.as_ref().map(|f| f.error.kind()),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(result.steps[1].status, StepStatus::NotRun);
    }

    #[test]
    fn test_parse_error_halts_without_retry() {
        let (client, xe) = scripted(
            ScriptedExecutor::new()
                .on("sr-list", Reply::stdout("uuid ( RO) : S\n"))
                .on("vm-import", Reply::stdout("V\n"))
                .on("vm-param-set", Reply::stdout("Error code: HANDLE_INVALID\n")),
        );
        let result = run(&client, &import_plan(), options());

        assert_eq!(result.state, PlanState::Failed { step: 2 });
        assert_eq!(xe.count("vm-param-set"), 1);
        assert_eq!(xe.count("vm-start"), 0);

        let report = summarize(&result);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Parse);
        assert_eq!(error.stdout.as_deref(), Some("Error code: HANDLE_INVALID\n"));
        assert_eq!(report.checkpoint.unwrap().last_completed_step, Some(1));
    }

    #[test]
    fn test_resume_skips_completed_steps() {
        let plan = import_plan();
        let (client, _) = scripted(
            ScriptedExecutor::new()
                .on("sr-list", Reply::stdout("uuid ( RO) : S\n"))
                .on("vm-import", Reply::stdout("V\n"))
                .on("vm-param-set", Reply::failure(1, "Error code: HANDLE_INVALID")),
        );
        let halted = run(&client, &plan, options());
        assert_eq!(halted.state, PlanState::Failed { step: 2 });

        let checkpoint =
            PlanCheckpoint::from_json(&halted.checkpoint.unwrap().to_json().unwrap()).unwrap();
        assert_eq!(checkpoint.last_completed_step, Some(1));

        let (client, xe) = scripted(happy_xe());
        let resumed = Engine::new(&client, options())
            .resume(&plan, checkpoint, &mut NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(resumed.state, PlanState::Succeeded);
        assert_eq!(xe.count("sr-list"), 0);
        assert_eq!(xe.count("vm-import"), 0);
        assert_eq!(xe.calls()[0].as_slice()[1], "uuid=V");
        assert_eq!(resumed.steps[0].status, StepStatus::PreviouslyCompleted);
        assert!(resumed.steps.iter().all(|s| s.status.is_done()));
        assert_eq!(resumed.total_attempts(), 2);

        let report = summarize(&resumed);
        assert_eq!(report.identifiers["vm_uuid"], "V");
        assert_eq!(report.identifiers["sr_uuid"], "S");
    }

    #[test]
    fn test_resume_with_foreign_checkpoint() {
        let plan = import_plan().with_id("a");
        let other = import_plan().with_id("b");
        let (client, xe) = scripted(happy_xe());

        let err = Engine::new(&client, options())
            .resume(&plan, PlanCheckpoint::new(&other), &mut NoProgress, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(xe.calls().is_empty());
    }

    #[test]
    fn test_get_only_plan_is_unchanged() {
        let (client, _) = scripted(ScriptedExecutor::new().on("vm-param-get", Reply::stdout("net1,net2\n")));
        let plan = vm_param_plan(&params(&[
            ("uuid", "U"),
            ("action", "get"),
            ("param_name", "networks"),
        ]))
        .unwrap();

        let report = summarize(&run(&client, &plan, options()));
        assert!(!report.changed);
        assert_eq!(report.facts["vm_param"], "net1,net2");
        assert_eq!(report.facts["vm_param_structured"], serde_json::json!(["net1", "net2"]));
    }

    #[test]
    fn test_already_running_vm_is_satisfied() {
        let (client, _) = scripted(
            ScriptedExecutor::new().on(
                "vm-start",
                Reply::failure(
                    1,
                    "The operation could not be performed because the VM was not in the right power state.\nexpected: halted\nactual: running\n",
                ),
            ),
        );
        let plan = Plan::new("start").step(Step::new(names::START_VM).literal("uuid", "V"));

        let result = run(&client, &plan, options());
        assert_eq!(result.state, PlanState::Succeeded);
        assert_eq!(result.steps[0].status, StepStatus::AlreadySatisfied);
        assert!(!result.changed());
    }

    #[test]
    fn test_non_zero_exit_halts_without_retry() {
        let (client, xe) = scripted(ScriptedExecutor::new().on("sr-list", Reply::failure(1, "boom")));
        let result = run(&client, &import_plan(), options());
        assert_eq!(xe.count("sr-list"), 1);
        let report = summarize(&result);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::NonZeroExit);
        assert_eq!(error.exit_code, Some(1));
        assert_eq!(error.stderr.as_deref(), Some("boom"));
    }

    struct CancelAfter {
        steps: usize,
        token: CancelToken,
    }

    impl ProgressCallback for CancelAfter {
        fn on_plan_start(&mut self, _: &Plan, _: usize) {}
        fn on_step_start(&mut self, _: usize, _: &Step, _: &ArgumentVector) {}
        fn on_step_complete(&mut self, record: &StepRecord) {
            if record.index + 1 == self.steps {
                self.token.cancel();
            }
        }
        fn on_plan_complete(&mut self, _: &PlanResult) {}
    }

    #[test]
    fn test_cancellation_between_steps() {
        let (client, xe) = scripted(happy_xe());
        let token = CancelToken::new();
        let mut progress = CancelAfter {
            steps: 2,
            token: token.clone(),
        };

        let result = Engine::new(&client, options())
            .execute(&import_plan(), &mut progress, &token)
            .unwrap();

        assert_eq!(result.state, PlanState::Aborted);
        assert_eq!(xe.calls().len(), 2);
        let checkpoint = result.checkpoint.unwrap();
        assert_eq!(checkpoint.last_completed_step, Some(1));
        assert_eq!(result.steps[2].status, StepStatus::NotRun);
    }

    #[test]
    fn test_dry_run_builds_placeholders() {
        let (client, xe) = scripted(happy_xe());
        let result = run(
            &client,
            &import_plan(),
            EngineOptions {
                dry_run: true,
                ..options()
            },
        );

        assert!(xe.calls().is_empty());
        assert_eq!(result.state, PlanState::Pending);
        assert!(result.steps.iter().all(|s| s.status == StepStatus::Planned));
        let import = result.steps[1].args.as_ref().unwrap();
        assert_eq!(import.as_slice(), ["vm-import", "filename=x.ova", "sr-uuid=<sr_uuid>"]);
        assert!(!result.changed());
    }

    #[test]
    fn test_lookup_cache() {
        let plan = Plan::new("twice")
            .step(Step::new(names::RESOLVE_SR_BY_NAME).literal("sr_name", "a").output("first"))
            .step(Step::new(names::RESOLVE_SR_BY_NAME).literal("sr_name", "a").output("second"));

        let (client, xe) = scripted(happy_xe());
        let result = run(&client, &plan, options());
        assert_eq!(xe.count("sr-list"), 1);
        assert_eq!(result.steps[1].status, StepStatus::Cached);

        let (client, xe) = scripted(happy_xe());
        run(
            &client,
            &plan,
            EngineOptions {
                cache_lookups: false,
                ..options()
            },
        );
        assert_eq!(xe.count("sr-list"), 2);
    }

    #[test]
    fn test_execute_many_keeps_order() {
        let (client, xe) = scripted(happy_xe());
        let plans = vec![import_plan().with_id("one"), import_plan().with_id("two")];

        let results = execute_many(&client, &options(), &plans, 2, &CancelToken::new()).unwrap();
        let ids: Vec<_> = results
            .iter()
            .map(|r| r.as_ref().map(|r| r.plan_id.as_str()).unwrap())
            .collect();
        assert_eq!(ids, ["one", "two"]);
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|r| r.state.is_success())));
        assert_eq!(xe.count("vm-import"), 2);
    }
}
