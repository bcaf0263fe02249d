// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting on rows already stored in the metrics tables.

use crate::db::{Row, TableSchema, Value};
use anyhow::{Context, Result};
use serde_json::{Map, Value as JsonValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Render stored rows in the requested format.
pub fn render(schema: &TableSchema, rows: &[Row], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(schema, rows)),
        OutputFormat::Json => {
            let json = to_json(schema, rows);
            serde_json::to_string_pretty(&json).context("failed to serialize rows as JSON")
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Date(d) => d.to_string(),
        Value::Text(s) => s.clone(),
        Value::Int(n) => format_number(*n),
        Value::Null => "-".to_string(),
    }
}

fn render_table(schema: &TableSchema, rows: &[Row]) -> String {
    let header: Vec<String> = schema.columns.iter().map(|c| c.name.to_string()).collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            body.iter()
                .filter_map(|row| row.get(i))
                .chain(std::iter::once(&header[i]))
                .map(|s| s.len())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                // Text columns are left-aligned, counts right-aligned.
                if i + 1 == cells.len() {
                    format!("{:>width$}", cell, width = width)
                } else {
                    format!("{:<width$}", cell, width = width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let total_width = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    let mut out = String::new();
    out.push_str(&format_line(header.as_slice()));
    out.push('\n');
    out.push_str(&"=".repeat(total_width));
    out.push('\n');
    for row in &body {
        out.push_str(&format_line(row.as_slice()));
        out.push('\n');
    }
    out
}

fn to_json(schema: &TableSchema, rows: &[Row]) -> JsonValue {
    let records = rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (column, value) in schema.columns.iter().zip(row) {
                let json = match value {
                    Value::Date(d) => JsonValue::String(d.to_string()),
                    Value::Text(s) => JsonValue::String(s.clone()),
                    Value::Int(n) => JsonValue::from(*n),
                    Value::Null => JsonValue::Null,
                };
                object.insert(column.name.to_string(), json);
            }
            JsonValue::Object(object)
        })
        .collect();
    JsonValue::Array(records)
}

fn format_number(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}
