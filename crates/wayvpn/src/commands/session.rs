//! Last-session command handlers.

use std::fmt::Write;

use wayvpn_core::LastSession;

use crate::cli::{GlobalOpts, SessionArgs, SessionCommand};
use crate::config::Catalog;
use crate::error::CliError;
use crate::output;

use super::{parse, util};

fn detail(last: &LastSession, in_catalog: bool, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Saved:     {}", last.saved_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(
        out,
        "Catalog:   {}",
        if in_catalog {
            output::status("present", true, color)
        } else {
            output::status("no longer in catalog", false, color)
        }
    );
    let _ = write!(out, "{}", parse::detail(&last.profile));
    out
}

pub async fn handle(catalog: &Catalog, args: SessionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match args.command {
        SessionCommand::Last => {
            let last = catalog.persistence.load_last().await.ok_or_else(|| CliError::NotFound {
                resource_type: "Session".into(),
                identifier: "last".into(),
                list_command: "profiles list".into(),
            })?;
            let in_catalog = catalog.store.find_server(&last.profile.id).is_some();
            let out = output::render_single(
                &global.output,
                &last,
                |l| detail(l, in_catalog, color),
                |l| l.profile.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SessionCommand::Clear => {
            if !util::confirm("Forget the last session?", "session clear", global.yes)? {
                return Ok(());
            }
            catalog.persistence.clear().await;
            output::notice("Last session cleared", global.quiet);
            Ok(())
        }
    }
}
