//! Fund metadata export: one row per fund grouping (fund + benchmark +
//! peer category), exploded into one [`RoleRow`] per member.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::domain::{Role, RoleRow};
use crate::error::AppError;
use crate::ingest::header::{build_header_map, tidy_name};
use crate::ingest::null_rules::NullRules;
use crate::io::sheet::{Cell, Sheet};

/// Prefix older exports use for the fund member (`share_isin`, ...).
const LEGACY_FUND_PREFIX: &str = "share_";

/// Separator inside multi-valued category codes (`C1;C2`).
const CODE_SEPARATOR: char = ';';

fn code_column(role: Role) -> String {
    format!("{}_mstarcode", role.as_str())
}

fn name_column(role: Role) -> String {
    format!("{}_name", role.as_str())
}

/// Normalize a metadata label, mapping the legacy `share_` prefix to `fund_`.
fn metadata_label(label: &str) -> String {
    let label = tidy_name(label);
    match label.strip_prefix(LEGACY_FUND_PREFIX) {
        Some(rest) => format!("{}_{rest}", Role::Fund.as_str()),
        None => label,
    }
}

struct Columns {
    fund_type: usize,
    isin: usize,
    codes: [usize; 3],
    names: [usize; 3],
}

impl Columns {
    fn resolve(header_map: &HashMap<String, usize>) -> Result<Self, AppError> {
        let lookup = |name: &str| {
            header_map.get(name).copied().ok_or_else(|| {
                AppError::structure(format!("Metadata export is missing required column `{name}`."))
            })
        };
        let mut codes = [0; 3];
        let mut names = [0; 3];
        for (i, role) in Role::ALL.into_iter().enumerate() {
            codes[i] = lookup(&code_column(role))?;
            names[i] = lookup(&name_column(role))?;
        }
        Ok(Self {
            fund_type: lookup("fund_type")?,
            isin: lookup("fund_isin")?,
            codes,
            names,
        })
    }
}

/// Explode the metadata sheet (header on its first row) into role rows.
///
/// `grouping_id` is the zero-based position of the grouping among the
/// non-blank data rows. Benchmark and category rows never carry an ISIN or
/// asset type; members without a usable code are dropped.
pub fn parse_metadata(sheet: &Sheet, rules: &NullRules) -> Result<Vec<RoleRow>, AppError> {
    let Some((header, data)) = sheet.rows().split_first() else {
        return Err(AppError::structure("Metadata export has no header row."));
    };

    let labels: Vec<String> = header
        .iter()
        .map(|cell| cell.as_text().map(|l| metadata_label(&l)).unwrap_or_default())
        .collect();
    let header_map = build_header_map(labels.iter().map(String::as_str));
    let columns = Columns::resolve(&header_map)?;

    let mut out = Vec::new();
    let mut dropped = 0usize;
    let groupings = data.iter().filter(|row| !row.iter().all(Cell::is_empty));

    for (grouping_id, row) in groupings.enumerate() {
        let text = |idx: usize| row.get(idx).and_then(Cell::as_text);

        let asset_type = rules.apply(text(columns.fund_type).map(|label| asset_type_from_label(&label)));
        let isin = rules.apply(text(columns.isin));

        for (i, role) in Role::ALL.into_iter().enumerate() {
            let raw_code = text(columns.codes[i]);
            let code = match role {
                Role::Category => Some(first_code(raw_code, grouping_id)?),
                Role::Fund | Role::Bench => raw_code,
            };
            let Some(fund_code) = rules.apply(code) else {
                dropped += 1;
                continue;
            };

            let (isin, asset_type) = if role.carries_share_attributes() {
                (isin.clone(), asset_type.clone())
            } else {
                (None, None)
            };

            out.push(RoleRow {
                grouping_id,
                role,
                isin,
                fund_code,
                name: rules.apply(text(columns.names[i])),
                asset_type,
            });
        }
    }

    debug!(dropped, "metadata members without a fund code");
    info!(role_rows = out.len(), "parsed metadata export");
    Ok(out)
}

/// `"Equity Fund"` -> `"equity_fund"`.
fn asset_type_from_label(label: &str) -> String {
    label.to_lowercase().replace(' ', "_")
}

/// First code of a `;`-separated composite category code.
fn first_code(raw: Option<String>, grouping_id: usize) -> Result<String, AppError> {
    raw.as_deref()
        .and_then(|codes| codes.split(CODE_SEPARATOR).next())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::structure(format!(
                "Metadata grouping {grouping_id}: cannot read a category code from {:?}.",
                raw.as_deref().unwrap_or_default()
            ))
        })
}
