//! `automod check-config`: validate a policy file.

use anyhow::{Context, Result};
use automod_protocol::Policy;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    let policy = Policy::from_path(path)
        .with_context(|| format!("Policy file {} is not valid", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&policy)?);
    Ok(())
}
