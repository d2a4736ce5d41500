use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use envprof_formats::{to_docker_env, to_env_file, to_json, to_shell_export};
use envprof_integrations::{detect, exec};
use envprof_profiles::{AppDefaults, CategoryPolicy, ProfileManager};
use envprof_security as security;
use envprof_store::EnvStore;
use envprof_watcher::EnvWatcher;

const KEY_FILE_NAME: &str = ".envprof.key";

#[derive(Debug, Parser)]
#[command(
    name = "envprof",
    version,
    about = "Profile-based manager for environment variable sets"
)]
struct Cli {
    /// Profile root (default: $ENVPROF_HOME, then ~/.envprof).
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print one variable from a profile.
    Get {
        category: String,
        profile: String,
        key: String,
    },
    /// Create or update a profile from KEY=VALUE pairs.
    Set {
        category: String,
        profile: String,
        #[arg(required = true, value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// List categories, a category's profiles, or a profile's variables.
    List {
        category: Option<String>,
        profile: Option<String>,
        /// Print secret values instead of masking them.
        #[arg(long)]
        show_secrets: bool,
    },
    /// Delete a profile.
    Delete { category: String, profile: String },
    /// Compare two profiles of a category key by key.
    Diff {
        category: String,
        profile_a: String,
        profile_b: String,
    },
    /// Clone a profile, replacing the destination entirely.
    Copy {
        src_category: String,
        src_profile: String,
        dst_category: String,
        dst_profile: String,
    },
    /// Render a profile for another tool.
    Export {
        category: String,
        profile: String,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },
    /// Encrypt values in a profile in place.
    Encrypt {
        category: String,
        profile: String,
        /// Encrypt every value, not only sensitive-looking keys.
        #[arg(long)]
        all: bool,
        #[arg(long, value_name = "PATH")]
        key_file: Option<PathBuf>,
    },
    /// Decrypt previously encrypted values in a profile in place.
    Decrypt {
        category: String,
        profile: String,
        #[arg(long, value_name = "PATH")]
        key_file: Option<PathBuf>,
    },
    /// Detect an API key on the clipboard and save it as a profile.
    Grab {
        /// Category to file the key under (default: by provider).
        #[arg(long)]
        category: Option<String>,
        /// Profile name (default: the provider name).
        #[arg(long)]
        name: Option<String>,
        /// Variable name to store the key as (default: by provider).
        #[arg(long)]
        key: Option<String>,
        /// Show what would be saved without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a command with a profile merged into its environment.
    Run {
        category: String,
        profile: String,
        #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
    /// Poll for profile changes and print them until interrupted.
    Watch {
        #[arg(long, default_value_t = 2, value_name = "SECONDS")]
        interval: u64,
    },
    /// Show or change an application's default profile selections.
    Defaults {
        app: String,
        category: Option<String>,
        profile: Option<String>,
        /// Drop the selection for the given category.
        #[arg(long)]
        unset: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Shell,
    Docker,
    Env,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let home = resolve_home(cli.home.as_deref())?;

    match cli.command {
        Commands::Get {
            category,
            profile,
            key,
        } => {
            let pm = ProfileManager::new(&home);
            let Some(store) = pm.get(&category, &profile)? else {
                bail!("profile not found: {category}/{profile}");
            };
            match store.get(&key) {
                Some(value) => println!("{value}"),
                None => bail!("key {key} not set in {category}/{profile}"),
            }
        }
        Commands::Set {
            category,
            profile,
            vars,
        } => {
            let pairs = parse_pairs(&vars)?;
            let count = pairs.len();
            let pm = ProfileManager::new(&home);
            pm.set(&category, &profile, pairs)?;
            println!("saved {count} variables to {category}/{profile}");
        }
        Commands::List {
            category,
            profile,
            show_secrets,
        } => {
            let pm = ProfileManager::new(&home);
            match (category, profile) {
                (None, _) => {
                    for category in scan_categories(&home)? {
                        let count = pm.list_names(&category)?.len();
                        println!("{category} ({count} profiles)");
                    }
                }
                (Some(category), None) => {
                    for (name, store) in pm.list(&category)? {
                        let summary: Vec<String> = store
                            .iter()
                            .take(3)
                            .map(|(key, value)| {
                                format!("{key}={}", display_value(key, value, show_secrets))
                            })
                            .collect();
                        println!("{name}: {}", summary.join(", "));
                    }
                }
                (Some(category), Some(profile)) => {
                    let Some(store) = pm.get(&category, &profile)? else {
                        bail!("profile not found: {category}/{profile}");
                    };
                    for (key, value) in store.iter() {
                        println!("{key}={}", display_value(key, value, show_secrets));
                    }
                }
            }
        }
        Commands::Delete { category, profile } => {
            let pm = ProfileManager::new(&home);
            if !pm.delete(&category, &profile)? {
                bail!("profile not found: {category}/{profile}");
            }
            println!("deleted {category}/{profile}");
        }
        Commands::Diff {
            category,
            profile_a,
            profile_b,
        } => {
            let pm = ProfileManager::new(&home);
            for name in [&profile_a, &profile_b] {
                if !pm.exists(&category, name) {
                    bail!("profile not found: {category}/{name}");
                }
            }
            let diff = pm.diff(&category, &profile_a, &profile_b)?;
            if diff.is_empty() {
                println!("profiles match");
            }
            for (key, (left, right)) in &diff {
                println!(
                    "{key}: {} | {}",
                    left.as_deref().unwrap_or("<unset>"),
                    right.as_deref().unwrap_or("<unset>"),
                );
            }
        }
        Commands::Copy {
            src_category,
            src_profile,
            dst_category,
            dst_profile,
        } => {
            let mut pm = ProfileManager::new(&home);
            pm.copy(&src_category, &src_profile, &dst_category, &dst_profile)?;
            println!("copied {src_category}/{src_profile} to {dst_category}/{dst_profile}");
        }
        Commands::Export {
            category,
            profile,
            format,
        } => {
            let pm = ProfileManager::new(&home);
            let Some(store) = pm.get(&category, &profile)? else {
                bail!("profile not found: {category}/{profile}");
            };
            let data = store.as_map();
            let rendered = match format {
                ExportFormat::Json => to_json(&data),
                ExportFormat::Shell => to_shell_export(&data),
                ExportFormat::Docker => to_docker_env(&data),
                ExportFormat::Env => to_env_file(&data, Some(&format!("{category}/{profile}"))),
            };
            if rendered.ends_with('\n') {
                print!("{rendered}");
            } else {
                println!("{rendered}");
            }
        }
        Commands::Encrypt {
            category,
            profile,
            all,
            key_file,
        } => {
            let pm = ProfileManager::new(&home);
            let Some(mut store) = pm.get(&category, &profile)? else {
                bail!("profile not found: {category}/{profile}");
            };
            let key_path = key_file.unwrap_or_else(|| home.join(KEY_FILE_NAME));
            let creating = !key_path.exists();
            let key = security::load_or_create_key(&key_path)?;
            if creating {
                println!("generated encryption key at {}", key_path.display());
            }
            let encrypted = security::encrypt_map(&store.as_map(), &key, !all)?;
            store.update(encrypted);
            store.save()?;
            println!("encrypted {category}/{profile}");
        }
        Commands::Decrypt {
            category,
            profile,
            key_file,
        } => {
            let pm = ProfileManager::new(&home);
            let Some(mut store) = pm.get(&category, &profile)? else {
                bail!("profile not found: {category}/{profile}");
            };
            let key_path = key_file.unwrap_or_else(|| home.join(KEY_FILE_NAME));
            let key = security::load_key(&key_path)?;
            let decrypted = security::decrypt_map(&store.as_map(), &key)?;
            store.update(decrypted);
            store.save()?;
            println!("decrypted {category}/{profile}");
        }
        Commands::Grab {
            category,
            name,
            key,
            dry_run,
        } => {
            let mut clipboard =
                arboard::Clipboard::new().map_err(|err| anyhow::anyhow!("clipboard: {err}"))?;
            let text = clipboard
                .get_text()
                .map_err(|err| anyhow::anyhow!("clipboard: {err}"))?
                .trim()
                .to_string();
            if text.is_empty() {
                bail!("clipboard is empty");
            }
            let detected = detect::detect_by_prefix(&text);
            let (provider, default_var, default_category) = match &detected {
                Some(found) => (found.provider, found.env_var, found.category),
                None if detect::looks_like_api_key(&text) => ("unknown", "API_KEY", "tokens"),
                None => bail!("clipboard text does not look like an API key"),
            };
            let category = category.unwrap_or_else(|| default_category.to_string());
            let profile = name.unwrap_or_else(|| provider.to_string());
            let var = key.unwrap_or_else(|| default_var.to_string());
            let masked = security::mask_value(&text);
            if dry_run {
                println!(
                    "detected {provider} key {masked}; would save {var} to {category}/{profile}"
                );
                return Ok(());
            }
            let mut pairs = vec![(var.clone(), text)];
            if let Some(found) = &detected {
                pairs.push(("_SOURCE_DOMAIN".to_string(), found.domain.to_string()));
            }
            pairs.push(("_GRABBED_AT".to_string(), chrono::Utc::now().to_rfc3339()));
            let mut pm = ProfileManager::new(&home);
            pm.add_category(&category, CategoryPolicy::default())?;
            pm.set(&category, &profile, pairs)?;
            println!("saved {var} to {category}/{profile} ({masked})");
        }
        Commands::Run {
            category,
            profile,
            command,
        } => {
            let pm = ProfileManager::new(&home);
            if !pm.exists(&category, &profile) {
                bail!("profile not found: {category}/{profile}");
            }
            let data = pm.get_map(&category, &profile)?;
            let child_env = exec::build_env(true, [&data]);
            let status = exec::run_with_env(&command, &child_env)?;
            std::process::exit(status.code().unwrap_or(1));
        }
        Commands::Watch { interval } => {
            let mut watcher = EnvWatcher::new(&home)
                .with_interval(Duration::from_secs(interval.max(1)))
                .on_change(|category, profile, store: EnvStore| {
                    println!("changed: {category}/{profile} ({} variables)", store.len());
                });
            watcher.start();
            println!("watching {} (ctrl-c to stop)", home.display());
            tokio::signal::ctrl_c().await?;
            watcher.stop().await;
            println!("stopped");
        }
        Commands::Defaults {
            app,
            category,
            profile,
            unset,
        } => {
            if unset {
                let Some(category) = category else {
                    bail!("pass a category to --unset");
                };
                if profile.is_some() {
                    bail!("--unset does not take a profile");
                }
                AppDefaults::new(&app, &home)?.remove(&category)?;
                println!("unset {category} for {app}");
                return Ok(());
            }
            match (category, profile) {
                (None, _) => {
                    let defaults = AppDefaults::new(&app, &home)?;
                    let map = defaults.as_map();
                    if map.is_empty() {
                        println!("no defaults recorded for {app}");
                    }
                    for (category, profile) in &map {
                        println!("{category}={profile}");
                    }
                }
                (Some(category), None) => {
                    let defaults = AppDefaults::new(&app, &home)?;
                    match defaults.get(&category) {
                        Some(profile) => println!("{profile}"),
                        None => bail!("no default {category} profile for {app}"),
                    }
                }
                (Some(category), Some(profile)) => {
                    AppDefaults::new(&app, &home)?.set(&category, &profile)?;
                    println!("{app}: {category}={profile}");
                }
            }
        }
    }

    Ok(())
}

/// `--home` beats `ENVPROF_HOME` beats `~/.envprof`.
fn resolve_home(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = env::var_os("ENVPROF_HOME") {
        if !value.is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    match env::var_os("HOME") {
        Some(home) => Ok(PathBuf::from(home).join(".envprof")),
        None => bail!("cannot determine a home directory; pass --home"),
    }
}

fn parse_pairs(vars: &[String]) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(vars.len());
    for var in vars {
        let Some((key, value)) = var.split_once('=') else {
            bail!("invalid variable {var:?}: expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid variable {var:?}: empty key");
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

fn display_value(key: &str, value: &str, show_secrets: bool) -> String {
    if !show_secrets && security::is_sensitive_key(key) {
        security::mask_value(value)
    } else {
        value.to_string()
    }
}

/// Category directories actually on disk, sorted. Dot-directories and the
/// defaults directory are bookkeeping, not categories.
fn scan_categories(home: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(home) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut categories = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || name == "defaults" {
            continue;
        }
        categories.push(name.to_string());
    }
    categories.sort();
    Ok(categories)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
