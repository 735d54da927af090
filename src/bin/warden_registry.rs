//! warden-registry: offline channel-group and exemption maintenance.
//!
//! Usage:
//!   warden-registry list                                Show groups and authorized subjects
//!   warden-registry add-channel <group> <channel-id>    Add a channel to a group
//!   warden-registry remove-channel <group> <channel-id> Remove a channel from a group
//!   warden-registry authorize <subject-id>              Exempt a subject from remove sweeps
//!   warden-registry deauthorize <subject-id>            Drop a subject's exemption

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use warden::registry::{JsonFileStore, Registry};
use warden::types::{ChannelId, GroupName, SubjectId};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "list" => cmd_list().await,
        "add-channel" => cmd_add_channel(&args[2..]).await,
        "remove-channel" => cmd_remove_channel(&args[2..]).await,
        "authorize" => cmd_authorize(&args[2..]).await,
        "deauthorize" => cmd_deauthorize(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("warden-registry {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(error) = result {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"warden-registry - channel-group registry maintenance

USAGE:
    warden-registry <COMMAND> [ARGS]

COMMANDS:
    list                                 Show groups and authorized subjects
    add-channel <group> <channel-id>     Add a channel to a group (creates the group)
    remove-channel <group> <channel-id>  Remove a channel from a group
    authorize <subject-id>               Exempt a subject from remove sweeps
    deauthorize <subject-id>             Drop a subject's exemption
    version                              Show version information
    help                                 Show this help message

ENVIRONMENT:
    WARDEN_DATA_DIR    Directory holding channel_groups.json and authorized_users.json (default ".")
    WARDEN_ADMINS      Comma-separated administrator subject ids"#
    );
}

fn data_dir() -> PathBuf {
    std::env::var("WARDEN_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn admins_from_env() -> BTreeSet<SubjectId> {
    std::env::var("WARDEN_ADMINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|part| part.trim().parse::<i64>().ok())
                .map(SubjectId)
                .collect()
        })
        .unwrap_or_default()
}

async fn open_registry() -> Result<Registry> {
    let dir = data_dir();
    let store = Arc::new(JsonFileStore::in_dir(&dir));
    Registry::open(store, admins_from_env())
        .await
        .with_context(|| format!("cannot open registry in {}", dir.display()))
}

async fn cmd_list() -> Result<()> {
    let registry = open_registry().await?;
    let snapshot = registry.snapshot();

    if snapshot.groups.is_empty() {
        println!("No channel groups registered.");
    } else {
        println!("{:<20} {}", "Group", "Channels");
        println!("{}", "-".repeat(40));
        for (name, channels) in &snapshot.groups {
            let ids: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
            println!("{:<20} {}", name.as_str(), ids.join(", "));
        }
    }

    if !snapshot.authorized.is_empty() {
        let ids: Vec<String> = snapshot.authorized.iter().map(|s| s.to_string()).collect();
        println!();
        println!("Authorized subjects: {}", ids.join(", "));
    }
    Ok(())
}

async fn cmd_add_channel(args: &[String]) -> Result<()> {
    let (group, channel) = parse_group_channel(args, "add-channel")?;
    let registry = open_registry().await?;
    registry.add_channel(group.clone(), channel).await?;
    println!("Added {channel} to '{group}'.");
    Ok(())
}

async fn cmd_remove_channel(args: &[String]) -> Result<()> {
    let (group, channel) = parse_group_channel(args, "remove-channel")?;
    let registry = open_registry().await?;
    registry.remove_channel(&group, channel).await?;
    println!("Removed {channel} from '{group}'.");
    Ok(())
}

async fn cmd_authorize(args: &[String]) -> Result<()> {
    let subject = parse_subject(args, "authorize")?;
    let registry = open_registry().await?;
    if registry.authorize(subject).await? {
        println!("Subject {subject} is now exempt from remove sweeps.");
    } else {
        println!("Subject {subject} was already authorized.");
    }
    Ok(())
}

async fn cmd_deauthorize(args: &[String]) -> Result<()> {
    let subject = parse_subject(args, "deauthorize")?;
    let registry = open_registry().await?;
    if registry.deauthorize(subject).await? {
        println!("Subject {subject} is no longer exempt.");
    } else {
        println!("Subject {subject} was not authorized.");
    }
    Ok(())
}

fn parse_group_channel(args: &[String], command: &str) -> Result<(GroupName, ChannelId)> {
    if args.len() != 2 {
        bail!("usage: warden-registry {command} <group> <channel-id>");
    }
    let channel = args[1]
        .parse::<i64>()
        .with_context(|| format!("'{}' is not a numeric channel id", args[1]))?;
    Ok((GroupName::new(args[0].as_str()), ChannelId(channel)))
}

fn parse_subject(args: &[String], command: &str) -> Result<SubjectId> {
    if args.len() != 1 {
        bail!("usage: warden-registry {command} <subject-id>");
    }
    let subject = args[0]
        .parse::<i64>()
        .with_context(|| format!("'{}' is not a numeric subject id", args[0]))?;
    Ok(SubjectId(subject))
}
