//! Dry-run provisioning plan.

use anyhow::{Context, Result};
use guesswho_synth::{DryRunProvisioner, provision_assembly};
use std::path::Path;

use super::load_assembly;

pub async fn run(config: Option<&Path>) -> Result<()> {
    let assembly = load_assembly(config)?;
    let provisioner = DryRunProvisioner::new();

    let report = provision_assembly(&assembly, &provisioner)
        .await
        .context("Provisioning plan failed")?;

    for call in provisioner.calls()? {
        println!("  {}", call);
    }
    println!(
        "\nPlan: {} resources, {} grants, {} variables",
        report.resources, report.grants, report.variables
    );
    Ok(())
}
