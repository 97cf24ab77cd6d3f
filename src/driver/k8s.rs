use super::ModuleSettings;
use anyhow::Result;
use orchestrator::ModuleDriver;
use std::path::PathBuf;

/// Kustomize overlays applied with kubectl, one overlay per environment
#[derive(Debug)]
pub struct Kubernetes {
    settings: ModuleSettings,
}

impl Kubernetes {
    pub fn new(settings: ModuleSettings) -> Self {
        Self { settings }
    }

    /// `overlays/<env>` relative to the module, if it has a kustomization
    fn overlay(&self) -> Option<PathBuf> {
        let overlay = PathBuf::from("overlays").join(&self.settings.env_name);
        self.settings
            .root
            .join(&overlay)
            .join("kustomization.yaml")
            .is_file()
            .then_some(overlay)
    }

    fn execute(&self, args: &[&str]) -> Result<()> {
        let Some(overlay) = self.overlay() else {
            log::info!(
                "Skipping {}; no overlays/{}/kustomization.yaml",
                self.settings.name,
                self.settings.env_name
            );
            return Ok(());
        };
        let overlay = overlay.to_string_lossy().into_owned();
        let mut args = args.to_vec();
        args.push(&overlay);
        self.settings.run("kubectl", &args)
    }
}

impl ModuleDriver for Kubernetes {
    fn name(&self) -> &'static str {
        "k8s"
    }

    fn plan(&self) -> Result<()> {
        self.execute(&["kustomize"])
    }

    fn deploy(&self) -> Result<()> {
        self.execute(&["apply", "-k"])
    }

    fn destroy(&self) -> Result<()> {
        self.execute(&["delete", "-k"])
    }
}
