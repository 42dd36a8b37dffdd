//! Command line surface.
//!
//! The set of subcommands is built from the caller's [`Role`]: administrators
//! get the whole find / notify / remove cycle, everyone else only `list`,
//! scoped to their own files.

pub mod commands;
pub mod role;

pub use role::{Role, SUPPORT_GROUP};

use crate::config::ConfigManager;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgAction, Args, Command, FromArgMatches};
use std::ffi::OsString;

/// Target directory shared by every subcommand
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TargetArgs {
    /// Directory being cleaned up
    pub dirname: Utf8PathBuf,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PartitionArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Prefix prepended to every recorded path
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Options shared by `notify` and `remove`
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ScopedArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Check mode: preview without sending or deleting
    #[arg(long)]
    pub check: bool,

    /// Restrict to one user
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// List files excepted from deletion instead
    #[arg(long)]
    pub exceptions: bool,

    /// Only show when the scheduled deletion will occur
    #[arg(long)]
    pub check: bool,
}

/// `list` as offered to administrators
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AdminListArgs {
    #[command(flatten)]
    pub list: ListArgs,

    /// User name or numeric id to list (default: all users)
    #[arg(long)]
    pub user: Option<String>,
}

/// A parsed subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Init(TargetArgs),
    Find(PartitionArgs),
    Partition(PartitionArgs),
    Notify(ScopedArgs),
    Remove(ScopedArgs),
    Schedule(TargetArgs),
    List { args: ListArgs, user: Option<String> },
}

impl CliCommand {
    pub fn target(&self) -> &Utf8Path {
        match self {
            Self::Init(target) | Self::Schedule(target) => &target.dirname,
            Self::Find(args) | Self::Partition(args) => &args.target.dirname,
            Self::Notify(args) | Self::Remove(args) => &args.target.dirname,
            Self::List { args, .. } => &args.target.dirname,
        }
    }
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub verbose: bool,
    pub command: CliCommand,
}

impl Invocation {
    /// Rolling log directory for this run.
    ///
    /// Only administrators log to disk, and only once the target has been
    /// initialized.
    pub fn log_dir(&self, role: &Role) -> Option<Utf8PathBuf> {
        if !role.is_admin() {
            return None;
        }
        let manager = ConfigManager::new(self.command.target()).ok()?;
        manager.config_dir().is_dir().then(|| manager.log_dir())
    }
}

/// One registrable subcommand
struct CommandSpec {
    name: &'static str,
    about: &'static str,
    augment: fn(Command) -> Command,
}

fn available_commands(role: &Role) -> Vec<CommandSpec> {
    match role {
        Role::Admin => vec![
            CommandSpec {
                name: "list",
                about: "list files to be deleted",
                augment: AdminListArgs::augment_args,
            },
            CommandSpec {
                name: "init",
                about: "initialize configuration",
                augment: TargetArgs::augment_args,
            },
            CommandSpec {
                name: "find",
                about: "find files",
                augment: PartitionArgs::augment_args,
            },
            CommandSpec {
                name: "partition",
                about: "rebuild per-user file lists from the last find",
                augment: PartitionArgs::augment_args,
            },
            CommandSpec {
                name: "notify",
                about: "notify users",
                augment: ScopedArgs::augment_args,
            },
            CommandSpec {
                name: "remove",
                about: "remove files",
                augment: ScopedArgs::augment_args,
            },
            CommandSpec {
                name: "schedule",
                about: "print example crontab entries",
                augment: TargetArgs::augment_args,
            },
        ],
        Role::User { .. } => vec![CommandSpec {
            name: "list",
            about: "list your files to be deleted",
            augment: ListArgs::augment_args,
        }],
    }
}

/// Build the clap command tree for `role`
pub fn build_cli(role: &Role) -> Command {
    let root = Command::new(crate::APP_NAME)
        .version(crate::VERSION)
        .about("Expires files!")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            clap::Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        );

    available_commands(role).into_iter().fold(root, |root, spec| {
        root.subcommand((spec.augment)(Command::new(spec.name).about(spec.about)))
    })
}

/// Parse `args` against the commands available to `role`
pub fn parse_invocation<I, T>(role: &Role, args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_cli(role).try_get_matches_from(args)?;
    let verbose = matches.get_flag("verbose");

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| clap::Error::new(clap::error::ErrorKind::MissingSubcommand))?;

    let command = match (name, role) {
        ("list", Role::Admin) => {
            let parsed = AdminListArgs::from_arg_matches(sub)?;
            CliCommand::List {
                args: parsed.list,
                user: parsed.user,
            }
        }
        ("list", Role::User { .. }) => CliCommand::List {
            args: ListArgs::from_arg_matches(sub)?,
            user: None,
        },
        ("init", _) => CliCommand::Init(TargetArgs::from_arg_matches(sub)?),
        ("find", _) => CliCommand::Find(PartitionArgs::from_arg_matches(sub)?),
        ("partition", _) => CliCommand::Partition(PartitionArgs::from_arg_matches(sub)?),
        ("notify", _) => CliCommand::Notify(ScopedArgs::from_arg_matches(sub)?),
        ("remove", _) => CliCommand::Remove(ScopedArgs::from_arg_matches(sub)?),
        ("schedule", _) => CliCommand::Schedule(TargetArgs::from_arg_matches(sub)?),
        _ => return Err(clap::Error::new(clap::error::ErrorKind::InvalidSubcommand)),
    };

    Ok(Invocation { verbose, command })
}
