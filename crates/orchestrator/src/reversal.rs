//! Destroy ordering
//!
//! Tearing down runs everything backwards: deployments, and within each
//! deployment its modules and both region lists.

use crate::model::Deployment;

/// Reverse deployment, module and region order for a destroy run
pub fn reverse_deployments(deployments: Vec<Deployment>) -> Vec<Deployment> {
    deployments
        .into_iter()
        .rev()
        .map(|mut deployment| {
            deployment.modules.reverse();
            deployment.regions.reverse();
            deployment.parallel_regions.reverse();
            deployment
        })
        .collect()
}
