//! Profile group command handlers.

use std::fmt::Write;
use std::sync::Arc;

use tabled::Tabled;
use wayvpn_core::{GroupKind, ProfileGroup, Quarantined, ServerProfile};

use crate::cli::{GlobalOpts, ProfilesArgs, ProfilesCommand};
use crate::config::Catalog;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "")]
    active: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Servers")]
    servers: usize,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&Arc<ProfileGroup>> for GroupRow {
    fn from(g: &Arc<ProfileGroup>) -> Self {
        Self {
            active: if g.is_active { "*".into() } else { String::new() },
            id: g.id.clone(),
            name: g.name.clone(),
            kind: kind_label(&g.kind).into(),
            servers: g.servers.len(),
            updated: g.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Reachable")]
    reachable: String,
}

impl ServerRow {
    fn new(s: &ServerProfile, color: bool) -> Self {
        Self {
            id: util::short_id(&s.id),
            name: s.name.clone(),
            protocol: s.protocol.to_string(),
            endpoint: s.endpoint(),
            reachable: match s.reachable {
                Some(true) => output::status("yes", true, color),
                Some(false) => output::status("no", false, color),
                None => output::muted("untested", color),
            },
        }
    }
}

#[derive(Tabled)]
struct QuarantineRow {
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Record")]
    record: String,
}

impl From<&Quarantined> for QuarantineRow {
    fn from(q: &Quarantined) -> Self {
        let mut record = q.record.to_string();
        if record.chars().count() > 60 {
            record = record.chars().take(57).collect::<String>() + "...";
        }
        Self {
            reason: q.reason.clone(),
            record,
        }
    }
}

fn kind_label(kind: &GroupKind) -> &'static str {
    match kind {
        GroupKind::Local => "local",
        GroupKind::Remote { .. } => "remote",
    }
}

// ── Detail views ────────────────────────────────────────────────────

fn group_detail(g: &Arc<ProfileGroup>, color: bool) -> String {
    let mut out = String::new();
    let active = if g.is_active { " (active)" } else { "" };
    let _ = writeln!(out, "{}{active}", g.name);
    let _ = writeln!(out, "ID:      {}", g.id);
    match &g.kind {
        GroupKind::Local => {
            let _ = writeln!(out, "Kind:    local");
        }
        GroupKind::Remote { url } => {
            let _ = writeln!(out, "Kind:    remote");
            let _ = writeln!(out, "URL:     {url}");
        }
    }
    let _ = writeln!(out, "Updated: {}", g.updated_at.format("%Y-%m-%d %H:%M UTC"));
    if g.servers.is_empty() {
        let _ = write!(out, "\n{}", output::muted("(no servers)", color));
    } else {
        let rows: Vec<ServerRow> = g.servers.iter().map(|s| ServerRow::new(s, color)).collect();
        let _ = write!(out, "\n{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
    }
    out
}

fn created_summary(g: &Arc<ProfileGroup>) -> String {
    format!("{} ({}, {} servers)", g.name, g.id, g.servers.len())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(catalog: &Catalog, args: ProfilesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let store = &catalog.store;
    let color = output::should_color(&global.color);

    match args.command {
        ProfilesCommand::List => {
            let groups = store.groups();
            let out = output::render_list(
                &global.output,
                groups.as_slice(),
                |g| GroupRow::from(g),
                |g| g.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Show { group } => {
            let group = match group {
                Some(ref id) => util::resolve_group(store, id)?,
                None => store.active().ok_or_else(|| CliError::NotFound {
                    resource_type: "Active profile group".into(),
                    identifier: "(none)".into(),
                    list_command: "profiles list".into(),
                })?,
            };
            let out = output::render_single(
                &global.output,
                &group,
                |g| group_detail(g, color),
                |g| {
                    g.servers
                        .iter()
                        .map(|s| s.id.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::AddLocal {
            name,
            uris,
            from_file,
        } => {
            let descriptors = util::read_descriptors(uris, from_file.as_deref())?;
            let servers = util::parse_all(&descriptors)?;
            let group = store.add_local(&name, servers).await?;
            output::notice(&format!("Created local group {}", created_summary(&group)), global.quiet);
            print_id(&group, global);
            Ok(())
        }

        ProfilesCommand::AddRemote { url, name } => {
            let group = store.add_remote(&url, name.as_deref()).await?;
            output::notice(&format!("Stored remote group {}", created_summary(&group)), global.quiet);
            print_id(&group, global);
            Ok(())
        }

        ProfilesCommand::Import {
            group,
            uris,
            from_file,
        } => {
            let group = util::resolve_group(store, &group)?;
            let descriptors = util::read_descriptors(uris, from_file.as_deref())?;
            let report = match descriptors.as_slice() {
                [] => {
                    return Err(CliError::Validation {
                        field: "descriptors".into(),
                        reason: "nothing to import; pass URIs or --from-file".into(),
                    });
                }
                [single] => store.import(&group.id, single).await?,
                many => store.add_servers(&group.id, util::parse_all(many)?).await?,
            };
            output::notice(
                &format!(
                    "Imported into '{}': {} added, {} already present",
                    group.name, report.added, report.refreshed
                ),
                global.quiet,
            );
            Ok(())
        }

        ProfilesCommand::Delete { group } => {
            let group = util::resolve_group(store, &group)?;
            if !util::confirm(
                &format!("Delete group '{}' and its {} servers?", group.name, group.servers.len()),
                "profiles delete",
                global.yes,
            )? {
                return Ok(());
            }
            store.delete(&group.id).await?;
            output::notice(&format!("Deleted group '{}'", group.name), global.quiet);
            Ok(())
        }

        ProfilesCommand::Activate { group } => {
            let group = util::resolve_group(store, &group)?;
            let group = store.set_active(&group.id).await?;
            output::notice(&format!("Active group: {}", group.name), global.quiet);
            Ok(())
        }

        ProfilesCommand::Rename { group, name } => {
            let group = util::resolve_group(store, &group)?;
            let renamed = store.rename(&group.id, &name).await?;
            output::notice(
                &format!("Renamed '{}' to '{}'", group.name, renamed.name),
                global.quiet,
            );
            Ok(())
        }

        ProfilesCommand::Quarantine => {
            let records = store.quarantined().await?;
            let out = output::render_list(
                &global.output,
                &records,
                |q| QuarantineRow::from(q),
                |q| q.reason.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// The new group's id on stdout, so scripts can capture it.
fn print_id(group: &Arc<ProfileGroup>, global: &GlobalOpts) {
    let out = output::render_single(&global.output, group, |g| g.id.clone(), |g| g.id.clone())
        .unwrap_or_else(|_| group.id.clone());
    output::print_output(&out, global.quiet);
}
