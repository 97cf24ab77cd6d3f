//! Execution engine - runs deployments, regions and modules
//!
//! The serial path threads one [`Context`] through every step. Parallel
//! regions and parallel module groups run on a rayon pool, each worker on
//! its own [`Context::fork`]; a batch always waits for every worker and
//! then reports the first failure in submission order.

use crate::account::validate_account_credentials;
use crate::context::Context;
use crate::credentials::{CredentialProvider, post_deploy_assume_role, pre_deploy_assume_role};
use crate::driver::{DriverFactory, DriverKind, invoke};
use crate::error::{Error, Result};
use crate::model::{Deployment, EnvVarsConfig, Module};
use crate::options::{class_path, effective_options};
use crate::reversal::reverse_deployments;
use crate::selection::{Prompt, select_deployments, select_modules};
use crate::source::{SourceFetcher, resolve_module_root};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::num::NonZeroUsize;

/// Options for an orchestration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Worker threads for parallel batches; 1 disables concurrency
    pub max_concurrency: usize,
    /// `--tag` query; empty means no tag filtering
    pub tags: Vec<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            tags: Vec::new(),
        }
    }
}

/// Orchestrates deployments against injected collaborators
pub struct Engine<'a> {
    credentials: &'a dyn CredentialProvider,
    drivers: &'a dyn DriverFactory,
    sources: &'a dyn SourceFetcher,
    tags: Vec<String>,
    pool: Option<ThreadPool>,
}

impl<'a> Engine<'a> {
    /// Create an engine; a worker pool is only built when concurrency > 1
    pub fn new(
        credentials: &'a dyn CredentialProvider,
        drivers: &'a dyn DriverFactory,
        sources: &'a dyn SourceFetcher,
        options: ExecuteOptions,
    ) -> Result<Self> {
        let pool = if options.max_concurrency > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.max_concurrency)
                .thread_name(|i| format!("runway-worker-{i}"))
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            credentials,
            drivers,
            sources,
            tags: options.tags,
            pool,
        })
    }

    /// Select, order and run deployments for `ctx.command`
    ///
    /// Destroy asks for confirmation first (unless in CI mode) and runs
    /// everything in reverse order.
    pub fn execute(
        &self,
        mut deployments: Vec<Deployment>,
        ctx: &mut Context,
        prompt: &mut dyn Prompt,
    ) -> Result<()> {
        for (i, deployment) in deployments.iter_mut().enumerate() {
            if deployment.name.is_empty() {
                deployment.name = Deployment::default_name(i);
            }
        }

        let command = ctx.command;
        let ci = ctx.is_ci();

        if command.is_destructive() {
            log::warn!("WARNING!");
            log::warn!("Runway is running in DESTROY mode.");
            log::warn!("Any/all deployment(s) selected will be irrecoverably DESTROYED.");
            if !ci && !prompt.confirm("Proceed?")? {
                return Err(Error::Cancelled);
            }
        }

        let selected = select_deployments(deployments, &self.tags, command, ci, prompt)?;
        let mut to_run = Vec::with_capacity(selected.len());
        for deployment in selected {
            to_run.push(select_modules(
                deployment,
                &self.tags,
                command,
                ci,
                &ctx.env_name,
                prompt,
            )?);
        }

        if command.is_destructive() {
            to_run = reverse_deployments(to_run);
        }

        self.run(&to_run, ctx)
    }

    /// Run already-selected deployments in order
    pub fn run(&self, deployments: &[Deployment], ctx: &mut Context) -> Result<()> {
        log::info!("");
        log::info!("Found {} deployment(s)", deployments.len());

        for deployment in deployments {
            self.process_deployment(deployment, ctx)?;
        }
        Ok(())
    }

    /// Pool to use for a parallel batch, if concurrency is allowed
    fn concurrent(&self, ctx: &Context) -> Option<&ThreadPool> {
        if ctx.is_ci() { self.pool.as_ref() } else { None }
    }

    fn sequential_reason(ctx: &Context) -> &'static str {
        if ctx.is_ci() {
            "Concurrent execution is disabled (max concurrency is 1)"
        } else {
            "Not running in CI mode"
        }
    }

    fn process_deployment(&self, deployment: &Deployment, ctx: &mut Context) -> Result<()> {
        log::info!("");
        log::info!(
            "======= Processing deployment '{}' ===========================",
            deployment.name
        );

        if deployment.modules.is_empty() {
            log::warn!("No modules found for deployment \"{}\"", deployment.name);
            if !self.tags.is_empty() {
                log::warn!(
                    "Missing modules could be caused by an invalid value passed to the \"--tag\" argument: {:?}",
                    self.tags
                );
            }
            return Ok(());
        }

        if !deployment.has_regions() {
            log::error!("No region configured for deployment \"{}\"", deployment.name);
            return Err(Error::NoRegions(deployment.name.clone()));
        }

        if !deployment.env_vars.is_empty() {
            let overlay = deployment.env_vars.resolve(&ctx.env_name, &ctx.env_root);
            if !overlay.is_empty() {
                log::info!(
                    "OS environment variable overrides being applied this deployment: {}",
                    overlay.keys().cloned().collect::<Vec<_>>().join(", ")
                );
                ctx.merge_env_vars(&overlay);
            }
        }

        // Destroy mirrors deploy: parallel regions go first, then serial ones
        let destroying = ctx.command.is_destructive();
        let mut serial = deployment.regions.clone();
        let mut parallel = Vec::new();
        if !deployment.parallel_regions.is_empty() {
            if self.concurrent(ctx).is_some() {
                parallel.clone_from(&deployment.parallel_regions);
            } else {
                log::info!(
                    "{} - processing the regions sequentially...",
                    Self::sequential_reason(ctx)
                );
                if destroying {
                    serial.splice(0..0, deployment.parallel_regions.iter().cloned());
                } else {
                    serial.extend(deployment.parallel_regions.iter().cloned());
                }
            }
        }

        if destroying {
            self.run_parallel_regions(deployment, ctx, &parallel)?;
            self.run_serial_regions(deployment, ctx, &serial)
        } else {
            self.run_serial_regions(deployment, ctx, &serial)?;
            self.run_parallel_regions(deployment, ctx, &parallel)
        }
    }

    fn run_serial_regions(
        &self,
        deployment: &Deployment,
        ctx: &mut Context,
        regions: &[String],
    ) -> Result<()> {
        if regions.is_empty() {
            return Ok(());
        }
        log::info!(
            "Attempting to deploy '{}' to region(s): {}",
            ctx.env_name,
            regions.join(", ")
        );
        for region in regions {
            log::info!("");
            log::info!("======= Processing region {region} ===========================");
            self.execute_region(deployment, ctx, region)?;
        }
        Ok(())
    }

    fn run_parallel_regions(
        &self,
        deployment: &Deployment,
        ctx: &Context,
        regions: &[String],
    ) -> Result<()> {
        if let Some(pool) = self.concurrent(ctx).filter(|_| !regions.is_empty()) {
            log::info!("Processing parallel regions {}", regions.join(", "));
            log::info!("(output will be interwoven)");
            run_batch(pool, regions, |region| {
                let mut region_ctx = ctx.fork();
                self.execute_region(deployment, &mut region_ctx, region)
            })?;
        }
        Ok(())
    }

    /// One region: assume role, validate account, run modules, revert
    ///
    /// The revert runs whatever the outcome of the earlier steps.
    fn execute_region(&self, deployment: &Deployment, ctx: &mut Context, region: &str) -> Result<()> {
        ctx.set_region(region);

        let outcome = self.assume_and_process(deployment, ctx);

        if let Some(assume_role) = &deployment.assume_role {
            post_deploy_assume_role(assume_role, ctx);
        }
        outcome
    }

    fn assume_and_process(&self, deployment: &Deployment, ctx: &mut Context) -> Result<()> {
        if let Some(assume_role) = &deployment.assume_role {
            pre_deploy_assume_role(self.credentials, assume_role, ctx)?;
        }
        if deployment.has_account_constraint() {
            validate_account_credentials(self.credentials, deployment, ctx)?;
        }
        for module in &deployment.modules {
            self.process_module(module, deployment, ctx)?;
        }
        Ok(())
    }

    fn process_module(&self, module: &Module, deployment: &Deployment, ctx: &Context) -> Result<()> {
        if !module.is_group() {
            return self.deploy_module(module, deployment, ctx);
        }

        let paths = module
            .child_modules
            .iter()
            .map(|child| child.path.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        if let Some(pool) = self.concurrent(ctx) {
            log::info!("Processing parallel modules [{paths}]");
            log::info!("(output will be interwoven)");
            run_batch(pool, &module.child_modules, |child| {
                self.process_module(child, deployment, &ctx.fork())
            })
        } else {
            log::info!(
                "{} - processing the following parallel modules sequentially...",
                Self::sequential_reason(ctx)
            );
            for child in &module.child_modules {
                self.process_module(child, deployment, ctx)?;
            }
            Ok(())
        }
    }

    fn deploy_module(&self, module: &Module, deployment: &Deployment, ctx: &Context) -> Result<()> {
        let module_root = resolve_module_root(&module.path, &ctx.env_root, self.sources)?;

        log::info!("");
        log::info!(
            "---- Processing module '{}' for '{}' in {} --------------",
            module.path,
            ctx.env_name,
            ctx.region()
        );

        let options = effective_options(deployment, module, &module_root)?;
        log::debug!("Module options: {options:?}");

        let mut overlay = match options.get("env_vars") {
            Some(value) => EnvVarsConfig::from_value(value)?.resolve(&ctx.env_name, &ctx.env_root),
            None => Default::default(),
        };
        overlay.extend(module.env_vars.resolve(&ctx.env_name, &ctx.env_root));

        let module_ctx;
        let ctx = if overlay.is_empty() {
            ctx
        } else {
            log::info!(
                "OS environment variable overrides being applied to this module: {}",
                overlay.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            let mut forked = ctx.fork();
            forked.merge_env_vars(&overlay);
            module_ctx = forked;
            &module_ctx
        };

        let kind = DriverKind::determine(&module_root, class_path(&options))?;
        let driver = self
            .drivers
            .create(kind, ctx, &module_root, &options)
            .map_err(|source| Error::Driver {
                module: module.path.clone(),
                command: ctx.command.to_string(),
                region: ctx.region().to_string(),
                source,
            })?;

        invoke(driver.as_ref(), ctx.command, &module.path, ctx.region())
    }
}

/// Run `f` over `items` on `pool`, waiting for every worker
///
/// Returns the first error in submission order. Later failures are only
/// logged.
fn run_batch<T, F>(pool: &ThreadPool, items: &[T], f: F) -> Result<()>
where
    T: Sync,
    F: Fn(&T) -> Result<()> + Sync,
{
    let results: Vec<Result<()>> = pool.install(|| items.par_iter().map(&f).collect());

    let mut first = None;
    for result in results {
        if let Err(err) = result {
            if first.is_none() {
                first = Some(err);
            } else {
                log::error!("{err}");
            }
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Command;
    use crate::credentials::{AssumeRoleRequest, BaseCredentials, Credentials};
    use crate::driver::ModuleDriver;
    use crate::model::{AssumeRoleConfig, EnvScoped, EnvVarValue, EnvVars};
    use crate::selection::{Choice, Menu};
    use crate::source::LocalOnly;
    use serde_yaml::{Mapping, Value};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Call {
        path: String,
        region: String,
        command: Command,
        env: EnvVars,
    }

    struct RecordingDriver {
        call: Call,
        fail: bool,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingDriver {
        fn record(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(self.call.clone());
            if self.fail {
                anyhow::bail!("{} exited with status 1", self.call.path);
            }
            Ok(())
        }
    }

    impl ModuleDriver for RecordingDriver {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn plan(&self) -> anyhow::Result<()> {
            self.record()
        }

        fn deploy(&self) -> anyhow::Result<()> {
            self.record()
        }

        fn destroy(&self) -> anyhow::Result<()> {
            self.record()
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        failing: Vec<String>,
        failing_regions: Vec<String>,
    }

    impl Recorder {
        fn failing(paths: &[&str]) -> Self {
            Self {
                failing: paths.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn failing_in(regions: &[&str]) -> Self {
            Self {
                failing_regions: regions.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn visits(&self) -> Vec<(String, String)> {
            self.calls()
                .into_iter()
                .map(|call| (call.path, call.region))
                .collect()
        }
    }

    impl DriverFactory for Recorder {
        fn create(
            &self,
            _kind: DriverKind,
            ctx: &Context,
            _module_root: &Path,
            options: &Mapping,
        ) -> anyhow::Result<Box<dyn ModuleDriver>> {
            let path = options
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Box::new(RecordingDriver {
                fail: self.failing.contains(&path)
                    || self.failing_regions.iter().any(|r| r == ctx.region()),
                call: Call {
                    path,
                    region: ctx.region().to_string(),
                    command: ctx.command,
                    env: ctx.env_vars.clone(),
                },
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct FakeAws {
        account: String,
    }

    impl Default for FakeAws {
        fn default() -> Self {
            Self {
                account: "123456789012".into(),
            }
        }
    }

    impl CredentialProvider for FakeAws {
        fn assume_role(
            &self,
            request: &AssumeRoleRequest,
            _base: &BaseCredentials,
        ) -> anyhow::Result<Credentials> {
            Ok(Credentials {
                access_key_id: format!("ASSUMED-{}", request.region),
                secret_access_key: "secret".into(),
                session_token: "token".into(),
            })
        }

        fn caller_account_id(
            &self,
            _region: &str,
            _base: &BaseCredentials,
        ) -> anyhow::Result<Option<String>> {
            Ok(Some(self.account.clone()))
        }

        fn account_aliases(
            &self,
            _region: &str,
            _base: &BaseCredentials,
        ) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct Answers {
        confirm: bool,
        asked: usize,
    }

    impl Prompt for Answers {
        fn choose_one(&mut self, _menu: &Menu) -> Result<Choice> {
            self.asked += 1;
            Ok(Choice::All)
        }

        fn confirm(&mut self, _prompt: &str) -> Result<bool> {
            self.asked += 1;
            Ok(self.confirm)
        }
    }

    fn answers(confirm: bool) -> Answers {
        Answers { confirm, asked: 0 }
    }

    fn module(path: &str) -> Module {
        Module {
            class_path: Some("terraform".into()),
            ..Module::new(path)
        }
    }

    fn context(command: Command, ci: bool) -> Context {
        let mut vars = EnvVars::from([("AWS_ACCESS_KEY_ID".to_string(), "base".to_string())]);
        if ci {
            vars.insert("CI".into(), "1".into());
        }
        Context::new("dev", "/work", command, vars)
    }

    fn engine<'a>(aws: &'a FakeAws, recorder: &'a Recorder, jobs: usize, tags: &[&str]) -> Engine<'a> {
        Engine::new(
            aws,
            recorder,
            &LocalOnly,
            ExecuteOptions {
                max_concurrency: jobs,
                tags: tags.iter().map(ToString::to_string).collect(),
            },
        )
        .unwrap()
    }

    fn visit(path: &str, region: &str) -> (String, String) {
        (path.to_string(), region.to_string())
    }

    #[test]
    fn test_tag_app_runs_only_app() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let deployment = Deployment::new(
            "d1",
            vec![
                module("./app").with_tags(&["app"]),
                module("./db").with_tags(&["db"]),
                Module::bare("./legacy"),
            ],
            &["us-east-1"],
        );
        let mut prompt = answers(false);

        engine(&aws, &recorder, 1, &["app"])
            .execute(vec![deployment], &mut context(Command::Deploy, false), &mut prompt)
            .unwrap();

        assert_eq!(recorder.visits(), vec![visit("./app", "us-east-1")]);
        assert_eq!(recorder.calls()[0].command, Command::Deploy);
        assert_eq!(prompt.asked, 0);
    }

    #[test]
    fn test_parallel_batch_waits_for_all() {
        let (aws, recorder) = (FakeAws::default(), Recorder::failing(&["b"]));
        let deployment = Deployment::new(
            "d1",
            vec![Module::group(vec![module("a"), module("b"), module("c")])],
            &["us-east-1"],
        );

        let err = engine(&aws, &recorder, 3, &[])
            .execute(vec![deployment], &mut context(Command::Deploy, true), &mut answers(false))
            .unwrap_err();

        assert!(matches!(err, Error::Driver { ref module, .. } if module == "b"));
        let mut visited: Vec<String> = recorder.calls().into_iter().map(|c| c.path).collect();
        visited.sort();
        assert_eq!(visited, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parallel_batch_reports_first_failure_in_order() {
        let (aws, recorder) = (FakeAws::default(), Recorder::failing(&["c", "a"]));
        let deployment = Deployment::new(
            "d1",
            vec![Module::group(vec![module("a"), module("b"), module("c")])],
            &["us-east-1"],
        );

        let err = engine(&aws, &recorder, 3, &[])
            .execute(vec![deployment], &mut context(Command::Deploy, true), &mut answers(false))
            .unwrap_err();

        assert!(matches!(err, Error::Driver { ref module, .. } if module == "a"));
        assert_eq!(recorder.calls().len(), 3);
    }

    #[test]
    fn test_sequential_fallback_without_ci() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let mut deployment = Deployment::new(
            "d1",
            vec![Module::group(vec![module("a"), module("b")])],
            &["us-east-1"],
        );
        deployment.parallel_regions = vec!["us-west-2".into(), "eu-west-1".into()];

        engine(&aws, &recorder, 4, &[])
            .run(&[deployment], &mut context(Command::Plan, false))
            .unwrap();

        assert_eq!(
            recorder.visits(),
            vec![
                visit("a", "us-east-1"),
                visit("b", "us-east-1"),
                visit("a", "us-west-2"),
                visit("b", "us-west-2"),
                visit("a", "eu-west-1"),
                visit("b", "eu-west-1"),
            ]
        );
    }

    #[test]
    fn test_sequential_fallback_without_pool() {
        let (aws, recorder) = (FakeAws::default(), Recorder::failing(&["a"]));
        let deployment = Deployment::new(
            "d1",
            vec![Module::group(vec![module("a"), module("b")])],
            &["us-east-1"],
        );

        let err = engine(&aws, &recorder, 1, &[])
            .run(&[deployment], &mut context(Command::Deploy, true))
            .unwrap_err();

        // sequential groups stop at the first failure
        assert!(matches!(err, Error::Driver { .. }));
        assert_eq!(recorder.visits(), vec![visit("a", "us-east-1")]);
    }

    #[test]
    fn test_module_env_vars_do_not_leak() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let mut first = module("first");
        first.env_vars = EnvVarsConfig(BTreeMap::from([(
            "*".to_string(),
            BTreeMap::from([("APP".to_string(), EnvVarValue::Literal("first".into()))]),
        )]));
        let mut deployment = Deployment::new("d1", vec![first, module("second")], &["us-east-1"]);
        deployment.env_vars = EnvVarsConfig(BTreeMap::from([(
            "dev".to_string(),
            BTreeMap::from([("STAGE".to_string(), EnvVarValue::Literal("dev".into()))]),
        )]));

        let mut ctx = context(Command::Deploy, true);
        engine(&aws, &recorder, 1, &[])
            .run(&[deployment], &mut ctx)
            .unwrap();

        let calls = recorder.calls();
        assert_eq!(calls[0].env["APP"], "first");
        assert!(!calls[1].env.contains_key("APP"));
        assert_eq!(calls[0].env["STAGE"], "dev");
        assert_eq!(calls[1].env["STAGE"], "dev");
        assert!(!ctx.env_vars.contains_key("APP"));
        assert_eq!(ctx.env_vars["STAGE"], "dev");
    }

    #[test]
    fn test_parallel_regions_use_forked_contexts() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let mut deployment = Deployment::new("d1", vec![module("app")], &[]);
        deployment.parallel_regions = vec!["us-east-1".into(), "us-west-2".into()];
        deployment.assume_role = Some(AssumeRoleConfig::arn("arn:aws:iam::123456789012:role/ci"));

        let mut ctx = context(Command::Deploy, true);
        engine(&aws, &recorder, 2, &[])
            .run(&[deployment], &mut ctx)
            .unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            assert_eq!(call.env["AWS_REGION"], call.region);
            assert_eq!(call.env["AWS_ACCESS_KEY_ID"], format!("ASSUMED-{}", call.region));
        }
        assert!(ctx.env_region.is_none());
        assert_eq!(ctx.env_vars["AWS_ACCESS_KEY_ID"], "base");
    }

    #[test]
    fn test_serial_regions_run_before_parallel_batch() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let mut deployment = Deployment::new("d1", vec![module("app")], &["eu-west-1"]);
        deployment.parallel_regions = vec!["us-east-1".into()];

        engine(&aws, &recorder, 2, &[])
            .run(&[deployment], &mut context(Command::Deploy, true))
            .unwrap();

        assert_eq!(
            recorder.visits(),
            vec![visit("app", "eu-west-1"), visit("app", "us-east-1")]
        );
    }

    #[test]
    fn test_destroy_mirrors_mixed_region_order() {
        let aws = FakeAws::default();
        let mut deployment = Deployment::new("d1", vec![module("app")], &["r1"]);
        deployment.parallel_regions = vec!["p1".into(), "p2".into()];

        let deploy = Recorder::default();
        engine(&aws, &deploy, 1, &[])
            .execute(
                vec![deployment.clone()],
                &mut context(Command::Deploy, true),
                &mut answers(true),
            )
            .unwrap();
        assert_eq!(
            deploy.visits(),
            vec![visit("app", "r1"), visit("app", "p1"), visit("app", "p2")]
        );

        let destroy = Recorder::default();
        engine(&aws, &destroy, 1, &[])
            .execute(
                vec![deployment.clone()],
                &mut context(Command::Destroy, true),
                &mut answers(true),
            )
            .unwrap();
        assert_eq!(
            destroy.visits(),
            vec![visit("app", "p2"), visit("app", "p1"), visit("app", "r1")]
        );

        // with a pool the parallel batch still finishes before serial regions
        let concurrent = Recorder::default();
        engine(&aws, &concurrent, 2, &[])
            .execute(
                vec![deployment],
                &mut context(Command::Destroy, true),
                &mut answers(true),
            )
            .unwrap();
        let visits = concurrent.visits();
        assert_eq!(visits.len(), 3);
        assert_eq!(visits[2], visit("app", "r1"));
    }

    #[test]
    fn test_parallel_region_failure_waits_for_siblings() {
        let (aws, recorder) = (FakeAws::default(), Recorder::failing_in(&["us-west-2"]));
        let mut deployment = Deployment::new("d1", vec![module("app")], &[]);
        deployment.parallel_regions =
            vec!["us-east-1".into(), "us-west-2".into(), "eu-west-1".into()];

        let err = engine(&aws, &recorder, 3, &[])
            .run(&[deployment], &mut context(Command::Deploy, true))
            .unwrap_err();

        assert!(matches!(err, Error::Driver { ref region, .. } if region == "us-west-2"));
        let mut regions: Vec<String> = recorder.calls().into_iter().map(|c| c.region).collect();
        regions.sort();
        assert_eq!(regions, ["eu-west-1", "us-east-1", "us-west-2"]);
    }

    #[test]
    fn test_account_mismatch_aborts_before_modules() {
        let aws = FakeAws {
            account: "999999999999".into(),
        };
        let recorder = Recorder::default();
        let mut deployment = Deployment::new("d1", vec![module("app")], &["us-east-1"]);
        deployment.account_id = Some(EnvScoped::All("123456789012".into()));

        let err = engine(&aws, &recorder, 1, &[])
            .run(&[deployment], &mut context(Command::Deploy, true))
            .unwrap_err();

        assert!(matches!(err, Error::AccountIdMismatch { .. }));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_revert_runs_after_failure() {
        let (aws, recorder) = (FakeAws::default(), Recorder::failing(&["app"]));
        let mut deployment = Deployment::new("d1", vec![module("app")], &["us-east-1"]);
        let mut assume_role = AssumeRoleConfig::arn("arn:aws:iam::123456789012:role/deploy");
        assume_role.post_deploy_env_revert = true;
        deployment.assume_role = Some(assume_role);

        let mut ctx = context(Command::Deploy, true);
        let result = engine(&aws, &recorder, 1, &[]).run(&[deployment], &mut ctx);

        assert!(result.is_err());
        assert_eq!(recorder.calls()[0].env["AWS_ACCESS_KEY_ID"], "ASSUMED-us-east-1");
        assert_eq!(ctx.env_vars["AWS_ACCESS_KEY_ID"], "base");
        assert!(!ctx.env_vars.contains_key("AWS_SESSION_TOKEN"));
    }

    #[test]
    fn test_destroy_runs_in_reverse() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let deployments = vec![
            Deployment::new("d1", vec![module("a1"), module("a2")], &["r1", "r2"]),
            Deployment::new("d2", vec![module("b")], &["r1"]),
        ];

        engine(&aws, &recorder, 1, &[])
            .execute(deployments, &mut context(Command::Destroy, true), &mut answers(false))
            .unwrap();

        assert_eq!(
            recorder.visits(),
            vec![
                visit("b", "r1"),
                visit("a2", "r2"),
                visit("a1", "r2"),
                visit("a2", "r1"),
                visit("a1", "r1"),
            ]
        );
        assert!(recorder.calls().iter().all(|c| c.command == Command::Destroy));
    }

    #[test]
    fn test_destroy_declined() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let deployments = vec![Deployment::new("d1", vec![module("a")], &["r1"])];
        let mut prompt = answers(false);

        let err = engine(&aws, &recorder, 1, &[])
            .execute(deployments, &mut context(Command::Destroy, false), &mut prompt)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(prompt.asked, 1);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_missing_regions_is_fatal() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let deployment = Deployment::new("d1", vec![module("a")], &[]);

        let err = engine(&aws, &recorder, 1, &[])
            .run(&[deployment], &mut context(Command::Deploy, true))
            .unwrap_err();
        assert!(matches!(err, Error::NoRegions(ref name) if name == "d1"));
    }

    #[test]
    fn test_empty_deployment_is_skipped() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let deployments = [
            Deployment::new("empty", vec![], &[]),
            Deployment::new("d2", vec![module("b")], &["r1"]),
        ];

        engine(&aws, &recorder, 1, &[])
            .run(&deployments, &mut context(Command::Deploy, true))
            .unwrap();
        assert_eq!(recorder.visits(), vec![visit("b", "r1")]);
    }

    #[test]
    fn test_default_deployment_names() {
        let (aws, recorder) = (FakeAws::default(), Recorder::default());
        let deployment = Deployment::new("", vec![module("a")], &[]);

        let err = engine(&aws, &recorder, 1, &[])
            .execute(vec![deployment], &mut context(Command::Deploy, true), &mut answers(false))
            .unwrap_err();
        assert!(matches!(err, Error::NoRegions(ref name) if name == "deployment_1"));
    }
}
