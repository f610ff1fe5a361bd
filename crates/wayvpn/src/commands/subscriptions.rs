//! Subscription command handlers.

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;
use wayvpn_core::subscription::is_stale;

use crate::cli::{GlobalOpts, SubscriptionsArgs, SubscriptionsCommand};
use crate::config::Catalog;
use crate::error::CliError;
use crate::output;

// ── Rows ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SweepEntry {
    url: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Tabled)]
struct SweepRow {
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusEntry {
    url: String,
    group: String,
    servers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_refresh: Option<chrono::DateTime<Utc>>,
    stale: bool,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Servers")]
    servers: usize,
    #[tabled(rename = "Last refresh")]
    last_refresh: String,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    catalog: &Catalog,
    args: SubscriptionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let store = &catalog.store;
    let color = output::should_color(&global.color);

    match args.command {
        SubscriptionsCommand::Refresh { url } => {
            let group = store.refresh_subscription(&url).await?;
            output::notice(
                &format!("Refreshed '{}': {} servers", group.name, group.servers.len()),
                global.quiet,
            );
            Ok(())
        }

        SubscriptionsCommand::Sweep => {
            let report = store.refresh_stale_subscriptions().await;
            let failed = report.failed.len();

            let entries: Vec<SweepEntry> = report
                .refreshed
                .into_iter()
                .map(|url| SweepEntry {
                    url,
                    outcome: "refreshed",
                    error: None,
                })
                .chain(report.skipped.into_iter().map(|url| SweepEntry {
                    url,
                    outcome: "fresh",
                    error: None,
                }))
                .chain(report.failed.into_iter().map(|(url, e)| SweepEntry {
                    url,
                    outcome: "failed",
                    error: Some(e.to_string()),
                }))
                .collect();

            let out = output::render_list(
                &global.output,
                &entries,
                |e| SweepRow {
                    url: e.url.clone(),
                    outcome: match e.error {
                        Some(ref err) => output::status(&format!("failed: {err}"), false, color),
                        None => output::status(e.outcome, true, color),
                    },
                },
                |e| format!("{}\t{}", e.outcome, e.url),
            )?;
            output::print_output(&out, global.quiet);
            if failed > 0 {
                output::notice(
                    &format!("{failed} subscription(s) failed; they will be retried on the next sweep"),
                    global.quiet,
                );
            }
            Ok(())
        }

        SubscriptionsCommand::Status => {
            let meta = store.subscriptions().meta().await?;
            let now = Utc::now();
            let entries: Vec<StatusEntry> = store
                .groups()
                .iter()
                .filter_map(|g| {
                    let url = g.subscription_url()?;
                    let last = meta.get(url);
                    Some(StatusEntry {
                        url: url.to_owned(),
                        group: g.name.clone(),
                        servers: g.servers.len(),
                        last_refresh: last.map(|m| m.last_refresh),
                        stale: is_stale(last, now),
                    })
                })
                .collect();

            let out = output::render_list(
                &global.output,
                &entries,
                |e| StatusRow {
                    group: e.group.clone(),
                    url: e.url.clone(),
                    servers: e.servers,
                    last_refresh: match e.last_refresh {
                        Some(at) => output::status(
                            &at.format("%Y-%m-%d %H:%M UTC").to_string(),
                            !e.stale,
                            color,
                        ),
                        None => output::status("never", false, color),
                    },
                },
                |e| e.url.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
