//! Manifest synthesis command.

use anyhow::{Context, Result};
use std::path::Path;

use super::load_assembly;

pub fn run(config: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let assembly = load_assembly(config)?;
    let manifest = assembly.to_json_pretty()?;
    let fingerprint = assembly.fingerprint()?;

    match out {
        Some(path) => {
            std::fs::write(path, &manifest)
                .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
            println!("Wrote manifest to {}", path.display());
            println!("Fingerprint: {}", fingerprint);
        }
        None => {
            println!("{}", manifest);
            // stdout stays valid JSON
            eprintln!("Fingerprint: {}", fingerprint);
        }
    }

    Ok(())
}
