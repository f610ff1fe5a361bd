//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use wayvpn_core::{ProfileGroup, ProfileStore, ServerProfile};

use crate::error::CliError;

/// Resolve a group by id, or by exact name when the name is unique.
pub fn resolve_group(store: &ProfileStore, identifier: &str) -> Result<Arc<ProfileGroup>, CliError> {
    if let Some(group) = store.get(identifier) {
        return Ok(group);
    }
    let groups = store.groups();
    let mut named = groups.iter().filter(|g| g.name == identifier);
    match (named.next(), named.next()) {
        (Some(group), None) => Ok(Arc::clone(group)),
        (Some(_), Some(_)) => Err(CliError::Validation {
            field: "group".into(),
            reason: format!("more than one group is named '{identifier}'; use its ID"),
        }),
        (None, _) => Err(CliError::group_not_found(identifier)),
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Descriptors from positional arguments followed by the lines of
/// `--from-file`. Blank lines and `#` / `//` comments are skipped.
pub fn read_descriptors(uris: Vec<String>, from_file: Option<&Path>) -> Result<Vec<String>, CliError> {
    let mut out: Vec<String> = uris
        .into_iter()
        .map(|u| u.trim().to_owned())
        .filter(|u| !u.is_empty())
        .collect();
    if let Some(path) = from_file {
        let contents = std::fs::read_to_string(path)?;
        out.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("//"))
                .map(str::to_owned),
        );
    }
    Ok(out)
}

/// Parse every descriptor, failing on the first one that does not parse.
pub fn parse_all(descriptors: &[String]) -> Result<Vec<ServerProfile>, CliError> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            wayvpn_core::parse(raw).map_err(|e| CliError::Validation {
                field: format!("descriptor {}", index + 1),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// First 8 characters of an id, for table columns.
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_merge_args_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.txt");
        std::fs::write(
            &path,
            "# exported\ntrojan://pw@b.example.com:443#b\n\n// note\n  trojan://pw@c.example.com:443#c  \n",
        )
        .unwrap();

        let all = read_descriptors(
            vec!["trojan://pw@a.example.com:443#a".into(), "  ".into()],
            Some(&path),
        )
        .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], "trojan://pw@c.example.com:443#c");

        let parsed = parse_all(&all).unwrap();
        assert_eq!(parsed[1].name, "b");
    }

    #[test]
    fn parse_all_names_the_failing_line() {
        let err = parse_all(&["trojan://pw@a.example.com:443".into(), "nope".into()]).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "descriptor 2"));
    }
}
