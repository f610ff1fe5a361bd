//! Clap derive structures for the `wayvpn` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wayvpn -- manage VPN profiles and subscriptions
#[derive(Debug, Parser)]
#[command(
    name = "wayvpn",
    version,
    about = "Manage wayvpn server profiles and subscriptions",
    long_about = "Inspect and edit the wayvpn profile catalog from the command line.\n\n\
        Parses server descriptors (vless, vmess, trojan, ss, wireguard),\n\
        manages local and subscription-backed profile groups, and shows\n\
        what the last session connected to.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "WAYVPN_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WAYVPN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a server descriptor and print the resulting profile
    Parse {
        /// Descriptor URI (vless://, vmess://, trojan://, ss://, wireguard://)
        uri: String,
    },

    /// Manage profile groups
    #[command(alias = "p")]
    Profiles(ProfilesArgs),

    /// Refresh and inspect subscriptions
    #[command(alias = "subs")]
    Subscriptions(SubscriptionsArgs),

    /// Inspect the remembered last session
    Session(SessionArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROFILES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: ProfilesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProfilesCommand {
    /// List profile groups
    #[command(alias = "ls")]
    List,

    /// Show the servers of one group (defaults to the active group)
    Show {
        /// Group ID
        group: Option<String>,
    },

    /// Create a local group from descriptors
    AddLocal {
        /// Group name
        name: String,

        /// Descriptor URIs to seed the group with
        #[arg(value_name = "URI")]
        uris: Vec<String>,

        /// Read additional descriptors from a file, one per line
        #[arg(long, short = 'f', value_name = "FILE")]
        from_file: Option<PathBuf>,
    },

    /// Create a group backed by a subscription URL
    AddRemote {
        /// Subscription URL
        url: String,

        /// Display name (defaults to the URL's host)
        #[arg(long, short = 'n')]
        name: Option<String>,
    },

    /// Import descriptors into an existing local group
    Import {
        /// Group ID
        group: String,

        /// Descriptor URIs
        #[arg(value_name = "URI")]
        uris: Vec<String>,

        /// Read additional descriptors from a file, one per line
        #[arg(long, short = 'f', value_name = "FILE")]
        from_file: Option<PathBuf>,
    },

    /// Delete a group
    #[command(alias = "rm")]
    Delete {
        /// Group ID
        group: String,
    },

    /// Make a group the active one
    Activate {
        /// Group ID
        group: String,
    },

    /// Rename a group
    Rename {
        /// Group ID
        group: String,

        /// New name
        name: String,
    },

    /// Records set aside because they failed validation
    Quarantine,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SUBSCRIPTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SubscriptionsArgs {
    #[command(subcommand)]
    pub command: SubscriptionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionsCommand {
    /// Re-fetch one subscription now
    Refresh {
        /// Subscription URL
        url: String,
    },

    /// Refresh every subscription older than 24 hours
    Sweep,

    /// Show when each subscription was last refreshed
    Status,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SESSION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Show the last server a session connected to
    Last,

    /// Forget the last session
    Clear,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
