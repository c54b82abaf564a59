use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::cache::token_store::TokenMap;
use crate::cache::validity::is_valid_at;
use crate::helpers::time::{now_u64, unix_to_rfc3339};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
    Tsv,
}

/// One stored token as shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRow {
    pub name: String,
    pub access_token: String,
    pub scope: String,
    pub creation_time: Option<u64>,
    pub expires_in: Option<u64>,
    pub valid: bool,
}

/// Rows sorted by name.
pub fn token_rows(tokens: &TokenMap) -> Vec<TokenRow> {
    let now = now_u64();
    tokens
        .iter()
        .map(|(name, record)| TokenRow {
            name: name.to_owned(),
            access_token: record.access_token.to_owned(),
            scope: record.scope.as_ref().map(|s| s.join(" ")).unwrap_or_default(),
            creation_time: record.creation_time,
            expires_in: record.expires_in,
            valid: is_valid_at(record, now),
        })
        .collect()
}

pub fn render(rows: &[TokenRow], format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(rows).map_err(|e| e.to_string()),
        OutputFormat::Tsv => Ok(render_tsv(rows)),
        OutputFormat::Text => Ok(render_table(rows)),
    }
}

fn render_tsv(rows: &[TokenRow]) -> String {
    let mut out = String::from("name\taccess_token\tscope\tcreation_time\texpires_in\tvalid\n");
    for row in rows {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            row.name,
            row.access_token,
            row.scope,
            opt(row.creation_time),
            opt(row.expires_in),
            row.valid
        ));
    }
    out
}

fn render_table(rows: &[TokenRow]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Access Token", "Scope", "Created", "Expires In", "Valid"]);

    for row in rows {
        table.add_row(vec![
            row.name.clone(),
            row.access_token.clone(),
            row.scope.clone(),
            row.creation_time
                .and_then(unix_to_rfc3339)
                .unwrap_or_else(|| "-".to_owned()),
            row.expires_in
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "-".to_owned()),
            if row.valid { "yes" } else { "no" }.to_owned(),
        ]);
    }
    table.to_string()
}

fn opt(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
