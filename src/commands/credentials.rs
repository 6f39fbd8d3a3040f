//! Credentials command - report which keys are configured and where from

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use survivor_bot::config::{
    credential_keys, lookup_credential, read_credentials_file, CredentialOrigin,
};
use survivor_bot::exchange::auth::mask;
use survivor_bot::VenueKind;

use super::load_config;

pub fn run(config_path: Option<PathBuf>, venue: Option<VenueKind>) -> Result<()> {
    let config = load_config(config_path, venue)?;
    let settings = &config.exchange;

    let path = settings.credentials_path();
    let file = if Path::new(&path).exists() {
        Some(read_credentials_file(&path).context("Failed to read credentials file")?)
    } else {
        None
    };

    println!("\n{}", "=".repeat(60));
    println!("CREDENTIALS ({})", settings.venue);
    println!("{}", "=".repeat(60));
    println!(
        "  File: {} ({})",
        path,
        if file.is_some() { "found" } else { "not found" }
    );

    let env = |var: &str| std::env::var(var).ok();
    let mut missing = Vec::new();
    for key in credential_keys(settings.venue) {
        let (value, origin) = lookup_credential(&key, &env, file.as_ref());
        let source = match origin {
            CredentialOrigin::Environment => "env",
            CredentialOrigin::File => "file",
            CredentialOrigin::Missing => "MISSING",
        };
        let shown = value.as_deref().map(mask).unwrap_or_else(|| "-".to_string());
        println!("  {:<24} {:<8} {}", key.var, source, shown);

        if origin == CredentialOrigin::Missing {
            missing.push(key.var);
        }
    }
    println!("{}", "=".repeat(60));

    if !missing.is_empty() {
        bail!("Missing credentials: {}", missing.join(", "));
    }
    println!("All credentials present");
    Ok(())
}
