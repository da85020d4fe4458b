use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{BackendError, Exporter};
use crate::pipeline::entity::PipelineEntity;

const FIXED_COLUMNS: &[&str] = &["id", "stage", "match_score", "rating"];

/// In-process CSV exporter.
///
/// Columns: the fixed ones, then the union of display fields in sorted order.
pub struct CsvExporter;

#[async_trait]
impl Exporter for CsvExporter {
    async fn export(&self, entities: &[PipelineEntity]) -> Result<String, BackendError> {
        Ok(render_csv(entities))
    }
}

fn render_csv(entities: &[PipelineEntity]) -> String {
    let extra: BTreeSet<&str> = entities
        .iter()
        .flat_map(|e| e.display_fields.keys().map(String::as_str))
        .filter(|k| !FIXED_COLUMNS.contains(k))
        .collect();

    let mut out = String::new();
    let header: Vec<&str> = FIXED_COLUMNS.iter().copied().chain(extra.iter().copied()).collect();
    push_row(&mut out, header.iter().map(|h| h.to_string()));

    for entity in entities {
        let mut row = vec![
            entity.id.to_string(),
            entity.stage.to_string(),
            entity.match_score.map(|v| v.to_string()).unwrap_or_default(),
            entity.rating.map(|v| v.to_string()).unwrap_or_default(),
        ];
        row.extend(
            extra
                .iter()
                .map(|key| cell(entity.display_fields.get(*key))),
        );
        push_row(&mut out, row.into_iter());
    }

    out
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let escaped: Vec<String> = cells.map(|c| escape(&c)).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
