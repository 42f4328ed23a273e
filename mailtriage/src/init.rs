//! `mailtriage init`: write starter configuration and credentials.

use anyhow::{Context, Result};
use mailtriage_core::config::DEFAULT_CONFIG_TOML;
use mailtriage_core::schema::BASE_SCHEMA_JSON;
use mailtriage_core::Config;
use std::fs;
use std::path::Path;

/// What happened to one starter file.
#[derive(Debug, PartialEq, Eq)]
enum Written {
    Created,
    Replaced,
    Kept,
}

pub fn run(access_token: Option<&str>, force: bool) -> Result<()> {
    let config_dir = Config::config_dir();
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;

    let config_path = Config::config_path();
    let status = write_file(&config_path, DEFAULT_CONFIG_TOML, force)?;
    report("Config", &config_path, &status);

    // Paths may be overridden by the config we just kept
    let config = Config::load().context("failed to load configuration")?;

    let schema_path = config.schema_path();
    let status = write_file(&schema_path, BASE_SCHEMA_JSON, force)?;
    report("Schema", &schema_path, &status);

    let credentials_path = config.credentials_path();
    let credentials = credentials_json(access_token.unwrap_or(""));
    // A supplied token always replaces the stored one
    let status = write_file(&credentials_path, &credentials, force || access_token.is_some())?;
    restrict_permissions(&credentials_path)?;
    report("Credentials", &credentials_path, &status);

    if access_token.is_none() && status != Written::Kept {
        println!();
        println!("Store a Gmail access token with `mailtriage init --access-token <TOKEN>`");
        println!("or edit {} directly.", credentials_path.display());
    }

    tracing::info!(
        config = %config_path.display(),
        credentials = %credentials_path.display(),
        "Initialized configuration"
    );
    Ok(())
}

fn credentials_json(token: &str) -> String {
    let escaped = token.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{{\n  \"access_token\": \"{escaped}\"\n}}\n")
}

fn write_file(path: &Path, contents: &str, overwrite: bool) -> Result<Written> {
    let exists = path.exists();
    if exists && !overwrite {
        return Ok(Written::Kept);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(if exists { Written::Replaced } else { Written::Created })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn report(label: &str, path: &Path, status: &Written) {
    let verb = match status {
        Written::Created => "created",
        Written::Replaced => "replaced",
        Written::Kept => "exists, kept",
    };
    println!("{:<12} {} ({})", format!("{label}:"), path.display(), verb);
}
