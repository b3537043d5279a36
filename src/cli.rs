//! `wardctl`: the producer CLI. Writes/removes config files and writes
//! restart messages, the way a human (or a deploy script) talks to a
//! running supervisor.
//!
//! Grounded on `original_source/ncolony/ctllib.py`'s `Places` class
//! (`add`/`remove`/`restart`/`restartAll`/`addMessage`) and
//! `jdx-pitchfork/src/error.rs`'s fuzzy-matched "did you mean" suggestions,
//! reused here via `error::find_similar_name`. Table rendering and colored
//! output follow the teacher's `comfy-table`/`console` usage.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use console::style;
use miette::IntoDiagnostic;

use serde_json::Value;

use crate::error::find_similar_name;
use crate::message::{self, Message};
use crate::process_spec::ProcessSpec;

#[derive(Parser, Debug)]
#[command(name = "wardctl", about = "Control a running ward supervisor")]
pub struct Cli {
    /// Directory ward watches for process configs.
    #[arg(long, env = "WARD_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory ward polls for one-shot messages.
    #[arg(long, env = "WARD_MESSAGES_DIR")]
    pub messages_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add or replace a supervised process.
    Add {
        name: String,
        /// Command and arguments, e.g. `-- /usr/bin/myserver --port 8080`.
        #[arg(last = true, required = true)]
        args: Vec<String>,
        #[arg(long)]
        uid: Option<u32>,
        #[arg(long)]
        gid: Option<u32>,
        #[arg(long = "group", value_name = "GROUP")]
        groups: Vec<String>,
        /// Extra environment variable `KEY=VALUE`; may be repeated.
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// Name of an ambient environment variable to copy into the child;
        /// may be repeated.
        #[arg(long = "env-inherit", value_name = "NAME")]
        env_inherit: Vec<String>,
        /// Path to a JSON file of extra top-level keys (e.g. `beatcheck`,
        /// `httpcheck`) merged into the spec verbatim.
        #[arg(long)]
        extras: Option<PathBuf>,
    },
    /// Stop and forget a supervised process.
    Remove { name: String },
    /// List currently configured processes.
    List,
    /// Ask the supervisor to restart one process.
    Restart { name: String },
    /// Ask the supervisor to restart every process.
    RestartAll,
    /// Ask the supervisor to restart every process in a group.
    RestartGroup { group: String },
}

fn resolve_dir(explicit: Option<PathBuf>, default: &Path) -> PathBuf {
    explicit.unwrap_or_else(|| default.to_path_buf())
}

pub async fn run(cli: Cli) -> miette::Result<()> {
    let config_dir = resolve_dir(cli.config_dir, &crate::env::WARD_CONFIG_DIR);
    let messages_dir = resolve_dir(cli.messages_dir, &crate::env::WARD_MESSAGES_DIR);

    match cli.command {
        Command::Add {
            name,
            args,
            uid,
            gid,
            groups,
            env,
            env_inherit,
            extras,
        } => add(&config_dir, &name, args, uid, gid, groups, env, env_inherit, extras).await,
        Command::Remove { name } => remove(&config_dir, &name).await,
        Command::List => list(&config_dir).await,
        Command::Restart { name } => {
            check_name_exists(&config_dir, &name).await?;
            message::write_message(&messages_dir, &Message::Restart { name })
                .await
                .into_diagnostic()
        }
        Command::RestartAll => message::write_message(&messages_dir, &Message::RestartAll)
            .await
            .into_diagnostic(),
        Command::RestartGroup { group } => {
            message::write_message(&messages_dir, &Message::RestartGroup { group })
                .await
                .into_diagnostic()
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn add(
    config_dir: &Path,
    name: &str,
    args: Vec<String>,
    uid: Option<u32>,
    gid: Option<u32>,
    groups: Vec<String>,
    env: Vec<String>,
    env_inherit: Vec<String>,
    extras: Option<PathBuf>,
) -> miette::Result<()> {
    let mut body = serde_json::json!({"args": args});
    if let Some(uid) = uid {
        body["uid"] = uid.into();
    }
    if let Some(gid) = gid {
        body["gid"] = gid.into();
    }
    if !groups.is_empty() {
        body["group"] = groups.into();
    }
    if !env.is_empty() {
        let mut env_map = serde_json::Map::new();
        for pair in &env {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| miette::miette!("--env expects KEY=VALUE, got '{pair}'"))?;
            env_map.insert(key.to_string(), value.into());
        }
        body["env"] = Value::Object(env_map);
    }
    if !env_inherit.is_empty() {
        body["env_inherit"] = env_inherit.into();
    }
    if let Some(extras_path) = extras {
        let raw = tokio::fs::read(&extras_path).await.into_diagnostic()?;
        let extras_value: Value = serde_json::from_slice(&raw).into_diagnostic()?;
        let extras_obj = extras_value
            .as_object()
            .ok_or_else(|| miette::miette!("--extras file must contain a JSON object"))?;
        let body_obj = body.as_object_mut().expect("body is always a JSON object");
        for (key, value) in extras_obj {
            body_obj.insert(key.clone(), value.clone());
        }
    }

    tokio::fs::create_dir_all(config_dir).await.ok();
    let final_path = config_dir.join(name);
    let tmp_path = config_dir.join(format!("{name}.new"));
    tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(&body).unwrap()).await.into_diagnostic()?;
    tokio::fs::rename(&tmp_path, &final_path).await.into_diagnostic()?;

    println!("{} {name}", style("added").green());
    Ok(())
}

async fn remove(config_dir: &Path, name: &str) -> miette::Result<()> {
    check_name_exists(config_dir, name).await?;
    tokio::fs::remove_file(config_dir.join(name))
        .await
        .into_diagnostic()?;
    println!("{} {name}", style("removed").red());
    Ok(())
}

async fn list(config_dir: &Path) -> miette::Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["name", "args", "group"]);

    let mut entries = tokio::fs::read_dir(config_dir).await.into_diagnostic()?;
    while let Some(entry) = entries.next_entry().await.into_diagnostic()? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with('.') || name.ends_with(".new") {
            continue;
        }
        let raw = tokio::fs::read(entry.path()).await.into_diagnostic()?;
        match ProcessSpec::parse(name, &raw) {
            Ok(spec) => {
                table.add_row(vec![spec.name, spec.args.join(" "), spec.group.join(",")]);
            }
            Err(err) => {
                table.add_row(vec![name.to_string(), format!("<{err}>"), String::new()]);
            }
        }
    }

    println!("{table}");
    Ok(())
}

async fn check_name_exists(config_dir: &Path, name: &str) -> miette::Result<()> {
    if tokio::fs::metadata(config_dir.join(name)).await.is_ok() {
        return Ok(());
    }
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(config_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(entry_name) = entry.file_name().to_str() {
                names.push(entry_name.to_string());
            }
        }
    }
    let suggestion = find_similar_name(name, names.iter().map(String::as_str));
    let hint = suggestion
        .map(|s| format!(" ({s})"))
        .unwrap_or_default();
    Err(miette::miette!("no process named '{name}'{hint}"))
}
