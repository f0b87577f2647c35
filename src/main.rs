// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Mapkeep CLI entrypoint.
//!
//! Opens, re-saves and inspects map files through the same store the editor uses, so locks,
//! backups and version upgrades behave exactly as they do interactively.

use std::error::Error;
use std::path::{Path, PathBuf};

use mapkeep::config::{StoreConfig, WriteDurability};
use mapkeep::model::MapNode;
use mapkeep::store::{
    lock_record_path, Confirmation, FileManager, Frontend, LoadedMap, LockRecord, Notice,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "mapkeep=info";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [options] open <file>\n  {program} [options] resave <file>\n  {program} [options] save-as <file> <target>\n  {program} [options] lock-status <file>\n\nOptions:\n  --config <file>    read store settings from a JSON file\n  --backups <n>      number of numbered backups to keep (0 disables backups)\n  --durable-writes   opt into slower, best-effort durable persistence (fsync where supported)\n\nLog output goes to stderr; set RUST_LOG to adjust it (default `{DEFAULT_LOG_FILTER}`)."
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Open { file: String },
    Resave { file: String },
    SaveAs { file: String, target: String },
    LockStatus { file: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config: Option<String>,
    backups: Option<u32>,
    durable_writes: bool,
    command: Command,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut config = None;
    let mut backups = None;
    let mut durable_writes = false;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                if config.is_some() {
                    return Err(());
                }
                config = Some(args.next().ok_or(())?);
            }
            "--backups" => {
                if backups.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let count: u32 = raw.parse().map_err(|_| ())?;
                backups = Some(count);
            }
            "--durable-writes" => {
                if durable_writes {
                    return Err(());
                }
                durable_writes = true;
            }
            _ if arg.starts_with('-') => return Err(()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let verb = positional.next().ok_or(())?;
    let file = positional.next().ok_or(())?;
    let command = match verb.as_str() {
        "open" => Command::Open { file },
        "resave" => Command::Resave { file },
        "save-as" => Command::SaveAs {
            file,
            target: positional.next().ok_or(())?,
        },
        "lock-status" => Command::LockStatus { file },
        _ => return Err(()),
    };
    if positional.next().is_some() {
        return Err(());
    }

    Ok(CliOptions {
        config,
        backups,
        durable_writes,
        command,
    })
}

/// Prints notices to stderr and answers every question with the cautious default.
struct TerminalFrontend;

impl Frontend for TerminalFrontend {
    fn inform(&mut self, notice: &Notice) {
        eprintln!("mapkeep: {notice}");
    }

    fn error(&mut self, notice: &Notice) {
        eprintln!("mapkeep: error: {notice}");
    }

    fn status(&mut self, notice: &Notice) {
        eprintln!("mapkeep: {notice}");
    }

    fn confirm_conversion(&mut self, path: &Path) -> Confirmation {
        eprintln!(
            "mapkeep: {} has an unknown format version; reading it unconverted",
            path.display()
        );
        Confirmation::decline()
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn store_config(options: &CliOptions) -> Result<StoreConfig, Box<dyn Error>> {
    let mut config = match options.config.as_deref() {
        Some(path) => StoreConfig::load(Path::new(path))?,
        None => StoreConfig::default(),
    };
    if let Some(count) = options.backups {
        config.backup_count = count;
    }
    if options.durable_writes {
        config = config.with_durability(WriteDurability::Durable);
    }
    Ok(config)
}

fn print_tree(node: &MapNode, depth: usize) {
    println!("{:indent$}{}", "", node.plain_text(), indent = depth * 2);
    for child in node.children() {
        print_tree(child, depth + 1);
    }
}

/// Loads `file`, refusing placeholder documents for commands that write.
fn load_for_writing(
    manager: &mut FileManager,
    file: &str,
    frontend: &mut TerminalFrontend,
) -> Result<mapkeep::store::Document, Box<dyn Error>> {
    match manager.load(Path::new(file), frontend)? {
        LoadedMap::Intact(document) => Ok(document),
        LoadedMap::Degraded { message, .. } => Err(message.into()),
    }
}

fn lock_status(file: &str) -> Result<(), Box<dyn Error>> {
    let record_path = lock_record_path(Path::new(file))?;
    let contents = match std::fs::read(&record_path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            println!("{file}: unlocked");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_slice::<LockRecord>(&contents) {
        Ok(record) => {
            let age_secs = record.age().as_secs();
            println!(
                "{file}: locked by {} (pid {}, written {age_secs}s ago)",
                record.owner.display_name(),
                record.owner.pid
            );
        }
        Err(_) => println!("{file}: locked (unreadable record {})", record_path.display()),
    }
    Ok(())
}

fn run(options: CliOptions) -> Result<(), Box<dyn Error>> {
    let mut manager = FileManager::new(store_config(&options)?);
    let mut frontend = TerminalFrontend;

    match options.command {
        Command::Open { file } => {
            let loaded = manager.load(Path::new(&file), &mut frontend)?;
            let document = loaded.document();
            println!(
                "{file}: {} nodes{}",
                document.root().node_count(),
                if document.is_read_only() { ", read-only" } else { "" }
            );
            print_tree(document.root(), 0);
            manager.close(loaded.into_document())?;
        }
        Command::Resave { file } => {
            let mut document = load_for_writing(&mut manager, &file, &mut frontend)?;
            if document.is_read_only() {
                return Err(format!("{file} is read-only").into());
            }
            document.mark_modified();
            if !manager.save(&mut document, &mut frontend) {
                return Err(format!("could not save {file}").into());
            }
            manager.close(document)?;
        }
        Command::SaveAs { file, target } => {
            let mut document = load_for_writing(&mut manager, &file, &mut frontend)?;
            let target = PathBuf::from(target);
            if !manager.save_as(&mut document, &target, &mut frontend) {
                return Err(format!("could not save {}", target.display()).into());
            }
            manager.close(document)?;
        }
        Command::LockStatus { file } => lock_status(&file)?,
    }
    Ok(())
}

fn main() {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "mapkeep".to_owned());

    let options = match parse_options(args) {
        Ok(options) => options,
        Err(()) => {
            print_usage(&program);
            std::process::exit(2);
        }
    };

    init_logging();

    if let Err(err) = run(options) {
        eprintln!("mapkeep: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_options, Command};

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|arg| (*arg).to_owned())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_open_command() {
        let options = parse_options(args(&["open", "plan.mm"])).expect("parse options");
        assert_eq!(
            options.command,
            Command::Open {
                file: "plan.mm".to_owned()
            }
        );
        assert_eq!(options.config, None);
        assert_eq!(options.backups, None);
        assert!(!options.durable_writes);
    }

    #[test]
    fn parses_flags_in_any_position() {
        let options = parse_options(args(&[
            "--backups",
            "5",
            "resave",
            "plan.mm",
            "--durable-writes",
            "--config",
            "store.json",
        ]))
        .expect("parse options");
        assert_eq!(
            options.command,
            Command::Resave {
                file: "plan.mm".to_owned()
            }
        );
        assert_eq!(options.backups, Some(5));
        assert!(options.durable_writes);
        assert_eq!(options.config.as_deref(), Some("store.json"));
    }

    #[test]
    fn parses_save_as_with_target() {
        let options =
            parse_options(args(&["save-as", "plan.mm", "copy.mm"])).expect("parse options");
        assert_eq!(
            options.command,
            Command::SaveAs {
                file: "plan.mm".to_owned(),
                target: "copy.mm".to_owned(),
            }
        );
    }

    #[test]
    fn parses_lock_status() {
        let options = parse_options(args(&["lock-status", "plan.mm"])).expect("parse options");
        assert_eq!(
            options.command,
            Command::LockStatus {
                file: "plan.mm".to_owned()
            }
        );
    }

    #[test]
    fn rejects_missing_command_or_file() {
        parse_options(args(&[])).unwrap_err();
        parse_options(args(&["open"])).unwrap_err();
        parse_options(args(&["save-as", "plan.mm"])).unwrap_err();
    }

    #[test]
    fn rejects_unknown_args() {
        parse_options(args(&["--nope", "open", "plan.mm"])).unwrap_err();
        parse_options(args(&["frobnicate", "plan.mm"])).unwrap_err();
        parse_options(args(&["open", "plan.mm", "extra"])).unwrap_err();
    }

    #[test]
    fn rejects_bad_backup_count() {
        parse_options(args(&["--backups", "many", "open", "plan.mm"])).unwrap_err();
        parse_options(args(&["--backups"])).unwrap_err();
    }

    #[test]
    fn rejects_duplicate_flags() {
        parse_options(args(&["--durable-writes", "--durable-writes", "open", "plan.mm"]))
            .unwrap_err();
        parse_options(args(&["--backups", "1", "--backups", "2", "open", "plan.mm"]))
            .unwrap_err();
        parse_options(args(&["--config", "a", "--config", "b", "open", "plan.mm"]))
            .unwrap_err();
    }
}
