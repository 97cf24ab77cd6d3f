//! End-to-end runs against a module tree on disk

use orchestrator::{
    AssumeRoleRequest, BaseCredentials, Choice, Command, Context, CredentialProvider, Credentials,
    Deployment, DriverFactory, DriverKind, Engine, Error, ExecuteOptions, LocalOnly, Menu, Module,
    ModuleDriver, Prompt, MODULE_OPTIONS_FILE,
};
use serde_yaml::{Mapping, Value};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    kind: DriverKind,
    root: PathBuf,
    command: Command,
    region: String,
    options: Mapping,
}

#[derive(Default)]
struct Drivers {
    log: Arc<Mutex<Vec<Invocation>>>,
}

struct Driver {
    invocation: Invocation,
    log: Arc<Mutex<Vec<Invocation>>>,
}

impl Driver {
    fn record(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(self.invocation.clone());
        Ok(())
    }
}

impl ModuleDriver for Driver {
    fn name(&self) -> &'static str {
        self.invocation.kind.as_str()
    }

    fn plan(&self) -> anyhow::Result<()> {
        if self.invocation.kind == DriverKind::Serverless {
            return Err(orchestrator::Unsupported.into());
        }
        self.record()
    }

    fn deploy(&self) -> anyhow::Result<()> {
        self.record()
    }

    fn destroy(&self) -> anyhow::Result<()> {
        self.record()
    }
}

impl DriverFactory for Drivers {
    fn create(
        &self,
        kind: DriverKind,
        ctx: &Context,
        module_root: &Path,
        options: &Mapping,
    ) -> anyhow::Result<Box<dyn ModuleDriver>> {
        Ok(Box::new(Driver {
            invocation: Invocation {
                kind,
                root: module_root.to_path_buf(),
                command: ctx.command,
                region: ctx.region().to_string(),
                options: options.clone(),
            },
            log: Arc::clone(&self.log),
        }))
    }
}

impl Drivers {
    fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().unwrap().clone()
    }
}

struct NoAws;

impl CredentialProvider for NoAws {
    fn assume_role(
        &self,
        _request: &AssumeRoleRequest,
        _base: &BaseCredentials,
    ) -> anyhow::Result<Credentials> {
        anyhow::bail!("no credentials in tests")
    }

    fn caller_account_id(
        &self,
        _region: &str,
        _base: &BaseCredentials,
    ) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn account_aliases(
        &self,
        _region: &str,
        _base: &BaseCredentials,
    ) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct Script {
    choices: VecDeque<Choice>,
    menus: Vec<Menu>,
}

impl Prompt for Script {
    fn choose_one(&mut self, menu: &Menu) -> orchestrator::Result<Choice> {
        self.menus.push(menu.clone());
        self.choices
            .pop_front()
            .ok_or_else(|| Error::InvalidSelection(String::new()))
    }

    fn confirm(&mut self, _prompt: &str) -> orchestrator::Result<bool> {
        Ok(true)
    }
}

fn touch(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// app.tf (suffix), stacks (marker files), svc (kustomize overlays)
fn module_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("app.tf")).unwrap();
    touch(root, "stacks/network.yaml", "namespace: net\n");
    touch(root, "stacks/dev-us-east-1.env", "");
    touch(
        root,
        &format!("stacks/{MODULE_OPTIONS_FILE}"),
        "options:\n  from_file: true\n",
    );
    touch(root, "svc/overlays/dev/kustomization.yaml", "resources: []\n");
    touch(root, "api/serverless.yml", "service: api\n");
    touch(root, "api/package.json", "{}\n");
    temp
}

fn context(root: &Path, command: Command, ci: bool) -> Context {
    let mut vars = orchestrator::EnvVars::new();
    if ci {
        vars.insert("CI".into(), "true".into());
    }
    Context::new("dev", root, command, vars)
}

#[test]
fn test_detects_drivers_from_disk() {
    let temp = module_tree();
    let drivers = Drivers::default();
    let deployment = Deployment::new(
        "infra",
        vec![Module::new("app.tf"), Module::new("stacks"), Module::new("svc")],
        &["us-east-1"],
    );

    Engine::new(&NoAws, &drivers, &LocalOnly, ExecuteOptions::default())
        .unwrap()
        .execute(
            vec![deployment],
            &mut context(temp.path(), Command::Deploy, true),
            &mut Script::default(),
        )
        .unwrap();

    let invocations = drivers.invocations();
    let kinds: Vec<_> = invocations.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DriverKind::Terraform,
            DriverKind::CloudFormation,
            DriverKind::Kubernetes
        ]
    );
    assert_eq!(invocations[1].root, temp.path().join("stacks"));
    let options = invocations[1].options.get("options").unwrap();
    assert_eq!(options.get("from_file"), Some(&Value::Bool(true)));
}

#[test]
fn test_current_dir_module_runs_in_env_root() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "main.tf", "");
    let drivers = Drivers::default();

    Engine::new(&NoAws, &drivers, &LocalOnly, ExecuteOptions::default())
        .unwrap()
        .run(
            &[Deployment::new("root", vec![Module::bare("./")], &["eu-west-1"])],
            &mut context(temp.path(), Command::Plan, true),
        )
        .unwrap();

    let invocations = drivers.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].root, temp.path());
    assert_eq!(invocations[0].kind, DriverKind::Terraform);
    assert_eq!(invocations[0].region, "eu-west-1");
}

#[test]
fn test_menu_selection_drills_into_group() {
    let temp = module_tree();
    let drivers = Drivers::default();
    let deployments = vec![
        Deployment::new("first", vec![Module::new("app.tf")], &["us-east-1"]),
        Deployment::new(
            "second",
            vec![
                Module::new("svc"),
                Module::group(vec![Module::new("app.tf"), Module::new("stacks")]),
            ],
            &["us-west-2"],
        ),
    ];
    let mut script = Script {
        choices: VecDeque::from([Choice::Index(1), Choice::Index(1), Choice::Index(1)]),
        ..Script::default()
    };

    Engine::new(&NoAws, &drivers, &LocalOnly, ExecuteOptions::default())
        .unwrap()
        .execute(
            deployments,
            &mut context(temp.path(), Command::Deploy, false),
            &mut script,
        )
        .unwrap();

    let invocations = drivers.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].root, temp.path().join("stacks"));
    assert_eq!(invocations[0].region, "us-west-2");
    assert_eq!(script.menus.len(), 3);
    assert_eq!(script.menus[2].entries, vec!["app.tf", "stacks"]);
}

#[test]
fn test_missing_plan_is_fatal() {
    let temp = module_tree();
    let drivers = Drivers::default();

    let err = Engine::new(&NoAws, &drivers, &LocalOnly, ExecuteOptions::default())
        .unwrap()
        .run(
            &[Deployment::new("api", vec![Module::new("api")], &["us-east-1"])],
            &mut context(temp.path(), Command::Plan, true),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnsupportedCommand { driver: "serverless", .. }
    ));
}

#[test]
fn test_unknown_module_directory_is_fatal() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("docs")).unwrap();
    let drivers = Drivers::default();

    let err = Engine::new(&NoAws, &drivers, &LocalOnly, ExecuteOptions::default())
        .unwrap()
        .run(
            &[Deployment::new("d", vec![Module::new("docs")], &["us-east-1"])],
            &mut context(temp.path(), Command::Deploy, true),
        )
        .unwrap_err();

    assert!(matches!(err, Error::NoDriver(_)));
    assert!(drivers.invocations().is_empty());
}
