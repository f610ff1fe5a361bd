//! Command dispatch: bridges CLI args -> profile store -> output formatting.

pub mod config_cmd;
pub mod parse;
pub mod profiles;
pub mod session;
pub mod subscriptions;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Catalog;
use crate::error::CliError;

/// Dispatch a store-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, catalog: &Catalog, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Profiles(args) => profiles::handle(catalog, args, global).await,
        Command::Subscriptions(args) => subscriptions::handle(catalog, args, global).await,
        Command::Session(args) => session::handle(catalog, args, global).await,
        // Parse, Config and Completions are handled before dispatch
        Command::Parse { .. } | Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
