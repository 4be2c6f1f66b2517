use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use fileops_core::prelude::*;
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

const UNKNOWN_DELETION_DATE: &str = "????-??-?? ??:??:??";

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("cannot determine the working directory")]
    WorkingDirectory(#[source] std::io::Error),
    #[error("no trashed entry matches {0}")]
    NoMatch(String),
}

type CliResult<T> = std::result::Result<T, Error>;

struct Services {
    engine: OperationsEngine,
    trash: TrashCan,
}

impl Services {
    fn from_process() -> Self {
        let environment = Arc::new(ProcessEnvironment);
        let config = EngineConfig::from_environment(environment.as_ref());
        let drives = match &config.trash_volumes {
            Some(volumes) => MountTable::with_volumes(volumes.clone()),
            None => MountTable::new(),
        };

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let volumes = VolumeResolver::new(Arc::new(drives), fs.clone());
        let engine = OperationsEngine::new(fs, volumes, config);
        let trash = TrashCan::new(engine.clone(), environment, Arc::new(SystemClock));
        Self { engine, trash }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_env("FILEOPS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    debug!("starting {:?}", matches.subcommand_name());

    match run(&matches).await {
        Ok(status) => ExitCode::from(status.as_code()),
        Err(err) => {
            error!("{:?}", err);
            eprintln!("fileops: {err}");
            ExitCode::from(ExitStatusLike::Error.as_code())
        }
    }
}

fn cli() -> Command {
    let paths = |help: &'static str| {
        Arg::new("paths")
            .action(ArgAction::Append)
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help(help)
    };
    let volume = Arg::new("volume")
        .long("volume")
        .action(ArgAction::Set)
        .value_parser(value_parser!(PathBuf))
        .help("volume root to work on, defaults to the volume of the home trash");
    let on_conflict = Arg::new("on-conflict")
        .long("on-conflict")
        .action(ArgAction::Set)
        .value_parser(["prompt", "overwrite", "skip", "rename"])
        .default_value("prompt")
        .help("what to do with entries already present at the destination");
    let destination = Arg::new("destination")
        .action(ArgAction::Set)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("destination directory");

    Command::new("fileops")
        .about("copy, move, delete and trash files")
        .subcommand_required(true)
        .subcommands([
            Command::new("put")
                .about("move files to the trash")
                .arg(paths("files to trash")),
            Command::new("list").about("list trashed files").args([
                volume.clone(),
                Arg::new("all")
                    .long("all")
                    .action(ArgAction::SetTrue)
                    .help("list the trash of every mounted volume"),
                Arg::new("orphans")
                    .long("orphans")
                    .action(ArgAction::SetTrue)
                    .help("list entries missing their stored file or record"),
                Arg::new("size")
                    .long("size")
                    .action(ArgAction::SetTrue)
                    .help("print sizes instead of deletion dates"),
            ]),
            Command::new("restore")
                .about("restore trashed files to their original location")
                .arg(paths("original paths of the entries to restore")),
            Command::new("empty").about("permanently delete trashed files").args([
                volume.clone(),
                Arg::new("orphans-only")
                    .long("orphans-only")
                    .action(ArgAction::SetTrue)
                    .help("only purge orphaned entries"),
            ]),
            Command::new("rm")
                .about("permanently delete trashed files matching a name or original path")
                .args([
                    Arg::new("pattern")
                        .action(ArgAction::Set)
                        .required(true)
                        .help("base name or original path"),
                    volume,
                ]),
            Command::new("copy")
                .about("copy files into a directory")
                .args([paths("files to copy"), destination.clone(), on_conflict.clone()]),
            Command::new("move")
                .about("move files into a directory")
                .args([paths("files to move"), destination, on_conflict]),
            Command::new("rename").about("rename a file in place").args([
                Arg::new("path")
                    .action(ArgAction::Set)
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
                Arg::new("name").action(ArgAction::Set).required(true),
            ]),
            Command::new("delete")
                .about("permanently delete files, bypassing the trash")
                .arg(paths("files to delete")),
            Command::new("volumes").about("list mounted volumes"),
        ])
}

async fn run(matches: &ArgMatches) -> CliResult<ExitStatusLike> {
    let services = Services::from_process();
    let Some((name, args)) = matches.subcommand() else {
        return Ok(ExitStatusLike::Error);
    };

    match name {
        "put" => {
            let paths = absolute_paths(args, "paths")?;
            let report = services.trash.move_to_trash(paths, interruptible()).await?;
            Ok(print_report(&report))
        }
        "list" => {
            let listing = if args.get_flag("all") {
                services.trash.list_all_entries()?
            } else {
                let volume = volume_arg(&services, args)?;
                services.trash.list_entries(&volume)?
            };
            print_listing(&listing, args.get_flag("orphans"), args.get_flag("size"));
            Ok(ExitStatusLike::Ok)
        }
        "restore" => {
            let wanted = absolute_paths(args, "paths")?;
            let trashed = services.trash.list_all_entries()?.entries();
            let mut entries = Vec::new();
            for path in &wanted {
                let newest = trashed
                    .iter()
                    .filter(|entry| &entry.original_path == path)
                    .max_by_key(|entry| entry.deleted_at);
                match newest {
                    Some(entry) => entries.push(entry.clone()),
                    None => return Err(Error::NoMatch(path.display().to_string())),
                }
            }
            let report = services.trash.restore(entries, interruptible()).await?;
            Ok(print_report(&report))
        }
        "empty" => {
            let volume = volume_arg(&services, args)?;
            let report = if args.get_flag("orphans-only") {
                services.trash.purge_orphans(&volume, interruptible()).await?
            } else {
                services.trash.empty_trash(&volume, interruptible()).await?
            };
            Ok(print_report(&report))
        }
        "rm" => {
            let pattern = args.get_one::<String>("pattern").cloned().unwrap_or_default();
            let volume = volume_arg(&services, args)?;
            let matching: Vec<TrashEntry> = services
                .trash
                .list_entries(&volume)?
                .entries()
                .into_iter()
                .filter(|entry| matches_pattern(entry, &pattern))
                .collect();
            if matching.is_empty() {
                return Err(Error::NoMatch(pattern));
            }
            let report = services.trash.purge(matching, interruptible()).await?;
            Ok(print_report(&report))
        }
        "copy" | "move" => {
            let sources = absolute_paths(args, "paths")?;
            let destination = absolute(args.get_one::<PathBuf>("destination").cloned().unwrap_or_default())?;
            let request = OperationRequest::new(sources, destination)
                .resolve_conflicts_with(conflict_arg(args));
            let (channel, mut progress) = OperationChannel::new();
            let channel = channel.with_cancellation(interruptible().cancellation().clone());
            tokio::spawn(async move {
                while let Some(event) = progress.recv().await {
                    debug!("{:?}", event);
                }
            });
            let report = if name == "copy" {
                services.engine.copy(request, channel).await?
            } else {
                services.engine.move_to(request, channel).await?
            };
            Ok(print_report(&report))
        }
        "rename" => {
            let path = absolute(args.get_one::<PathBuf>("path").cloned().unwrap_or_default())?;
            let new_name = args.get_one::<String>("name").cloned().unwrap_or_default();
            let renamed = services.engine.rename(path, new_name).await?;
            println!("{}", renamed.display());
            Ok(ExitStatusLike::Ok)
        }
        "delete" => {
            let paths = absolute_paths(args, "paths")?;
            let report = services.engine.delete(paths, interruptible()).await?;
            Ok(print_report(&report))
        }
        "volumes" => {
            for volume in services.engine.volumes().list_volumes()? {
                println!(
                    "{}\t{}\t{} free of {}",
                    volume.root_directory.display(),
                    volume.name,
                    print_size(volume.free_space_bytes),
                    print_size(volume.total_space_bytes)
                );
            }
            Ok(ExitStatusLike::Ok)
        }
        _ => Ok(ExitStatusLike::Error),
    }
}

/// Channel cancelled by Ctrl-C.
fn interruptible() -> OperationChannel {
    let channel = OperationChannel::detached();
    let cancellation = channel.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted, cancelling");
            cancellation.cancel();
        }
    });
    channel
}

fn conflict_arg(args: &ArgMatches) -> ConflictResolution {
    match args.get_one::<String>("on-conflict").map(String::as_str) {
        Some("overwrite") => ConflictResolution::Overwrite,
        Some("skip") => ConflictResolution::Skip,
        Some("rename") => ConflictResolution::RenameWithSuffix,
        _ => ConflictResolution::Prompt,
    }
}

fn volume_arg(services: &Services, args: &ArgMatches) -> CliResult<PathBuf> {
    let volumes = services.engine.volumes();
    match args.get_one::<PathBuf>("volume") {
        Some(path) => Ok(volumes.root_for(&absolute(path.clone())?)?),
        None => {
            let ctx = services.trash.context()?;
            Ok(volumes.root_for(&ctx.data_home)?)
        }
    }
}

fn matches_pattern(entry: &TrashEntry, pattern: &str) -> bool {
    if pattern.starts_with('/') {
        return entry.original_path == Path::new(pattern);
    }
    entry
        .original_path
        .file_name()
        .is_some_and(|name| name.to_string_lossy() == pattern)
}

fn absolute_paths(args: &ArgMatches, id: &str) -> CliResult<Vec<PathBuf>> {
    args.get_many::<PathBuf>(id)
        .into_iter()
        .flatten()
        .map(|path| absolute(path.clone()))
        .collect()
}

fn absolute(path: PathBuf) -> CliResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(Error::WorkingDirectory)?;
    Ok(cwd.join(path))
}

fn print_listing(listing: &TrashListing, orphans: bool, size: bool) {
    for item in listing {
        match item {
            TrashListItem::Entry(entry) if !orphans => {
                let attribute = if size {
                    entry.size_bytes.map(print_size).unwrap_or_else(|| "?".to_string())
                } else {
                    entry
                        .deleted_at
                        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| UNKNOWN_DELETION_DATE.to_string())
                };
                println!("{} {}", attribute, entry.original_path.display());
            }
            TrashListItem::Orphaned(orphan) if orphans => {
                let path = orphan.trashed_path.as_ref().or(orphan.info_path.as_ref());
                match path {
                    Some(path) => println!("{} ({})", path.display(), orphan.reason),
                    None => println!("{} ({})", orphan.name, orphan.reason),
                }
            }
            _ => {}
        }
    }
}

fn print_report(report: &BatchReport) -> ExitStatusLike {
    for outcome in &report.outcomes {
        let source = outcome.source.display();
        match &outcome.status {
            OutcomeStatus::Succeeded { destination: Some(destination) } => {
                println!("{source} -> {}", destination.display())
            }
            OutcomeStatus::Succeeded { destination: None } => println!("{source}: done"),
            OutcomeStatus::Skipped(reason) => println!("{source}: skipped ({reason:?})"),
            OutcomeStatus::Conflict { existing } => println!(
                "{source}: {} already exists, rerun with --on-conflict",
                existing.display()
            ),
            OutcomeStatus::Failed(CoreError::CrossDeviceFallbackPartialFailure { copied_to, .. }) => eprintln!(
                "{source}: copied to {} but the original could not be removed, both now exist",
                copied_to.display()
            ),
            OutcomeStatus::Failed(err) => eprintln!("{source}: {err}"),
            OutcomeStatus::Cancelled => eprintln!("{source}: cancelled"),
            OutcomeStatus::NotStarted => eprintln!("{source}: not started"),
        }
    }
    ExitStatusLike::from_report(report)
}
