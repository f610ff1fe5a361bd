//! `wayvpn parse`: run one descriptor through the parser.

use std::fmt::Write;

use wayvpn_core::ServerProfile;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub fn handle(uri: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let profile = wayvpn_core::parse(uri)?;
    let out = output::render_single(&global.output, &profile, detail, |p| p.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Multi-line detail view shared with `profiles show` and `session last`.
pub fn detail(p: &ServerProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:      {}", p.name);
    let _ = writeln!(out, "ID:        {}", p.id);
    let _ = writeln!(out, "Protocol:  {}", p.protocol);
    let _ = writeln!(out, "Endpoint:  {}", p.endpoint());
    let _ = writeln!(out, "Source:    {}", p.source);
    if let Some(ref url) = p.subscription_url {
        let _ = writeln!(out, "From:      {url}");
    }
    if let Some(reachable) = p.reachable {
        let tested = p
            .last_tested
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "Reachable: {} {tested}",
            if reachable { "yes" } else { "no" }
        );
    }
    for (key, value) in &p.params {
        let _ = writeln!(out, "  {key} = {value}");
    }
    out.trim_end().to_owned()
}
