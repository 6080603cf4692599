//! Line-level parsing and rendering of the store file.

use std::collections::HashMap;
use std::fmt::Write as _;

use gatekeep_protocol::IdentityKey;

use crate::{CredentialRecord, StoreSettings, StoredSecret};

const TIMEOUT_DIRECTIVE: &str = "login time out:";
const TRUST_DIRECTIVE: &str = "ip cache time:";
const RECORDS_HEADER: &str = "registered players";
const FIELD_SEPARATOR: &str = " : ";

/// One recognized line of the store file.
#[derive(Debug, PartialEq)]
pub(crate) enum Line {
    Timeout(u64),
    TrustWindow(u64),
    Record(IdentityKey, CredentialRecord),
    /// Blank lines, the header, and anything else unrecognized.
    Ignored,
}

/// Why a line that looked like a directive or a record was skipped.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Malformed {
    Directive,
    TooFewFields,
    EmptyName,
    BrokenSecret,
}

/// Parses one raw line. `now` stamps records that carry no timestamp.
pub(crate) fn parse_line(raw: &str, now: u64) -> Result<Line, Malformed> {
    let line = raw.trim();

    if let Some(rest) = line.strip_prefix(TIMEOUT_DIRECTIVE) {
        return parse_directive(rest, "sec").map(Line::Timeout);
    }
    if let Some(rest) = line.strip_prefix(TRUST_DIRECTIVE) {
        return parse_directive(rest, "hrs").map(Line::TrustWindow);
    }
    if !line.contains(FIELD_SEPARATOR) {
        return Ok(Line::Ignored);
    }

    let parts: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if parts.len() < 3 {
        return Err(Malformed::TooFewFields);
    }

    let name = parts[0].trim();
    if name.is_empty() {
        return Err(Malformed::EmptyName);
    }

    let secret = unquote(parts[1]).trim();
    let secret = StoredSecret::parse(secret).ok_or(Malformed::BrokenSecret)?;
    let origin = parts[2].trim();

    let last_success_at = match parts.get(3) {
        // Unparseable timestamps fail closed: epoch 0 is never fresh.
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(%name, raw = raw.trim(), "unparseable timestamp, using 0");
            0
        }),
        None => now,
    };

    Ok(Line::Record(
        IdentityKey::new(name),
        CredentialRecord::new(secret, origin, last_success_at),
    ))
}

/// Renders the whole file. Records are sorted by name so the output is
/// stable between saves.
pub(crate) fn render(
    settings: &StoreSettings,
    records: &HashMap<IdentityKey, CredentialRecord>,
) -> String {
    let mut out = String::new();
    // Writing to a String never fails.
    let _ = writeln!(out, "{TIMEOUT_DIRECTIVE}{}sec", settings.challenge_timeout_secs);
    let _ = writeln!(out, "{TRUST_DIRECTIVE}{}hrs", settings.trust_window_hours);
    out.push('\n');
    out.push_str(RECORDS_HEADER);
    out.push('\n');

    let mut names: Vec<&IdentityKey> = records.keys().collect();
    names.sort();
    for name in names {
        let record = &records[name];
        let _ = writeln!(
            out,
            "{name}{FIELD_SEPARATOR}\"{}\"{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            record.secret, record.last_origin, record.last_success_at
        );
    }
    out
}

fn parse_directive(rest: &str, unit: &str) -> Result<u64, Malformed> {
    let value = rest.trim();
    let value = value.strip_suffix(unit).unwrap_or(value).trim();
    value.parse().map_err(|_| Malformed::Directive)
}

/// Strips one leading and one trailing double quote, if present.
fn unquote(field: &str) -> &str {
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}
