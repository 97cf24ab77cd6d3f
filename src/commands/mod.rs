// Plan, deploy and destroy over the configured deployments
pub mod modules;
