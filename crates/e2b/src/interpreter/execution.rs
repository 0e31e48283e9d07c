use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::charts::Chart;

/// Result bundle of one `run_code` call.
#[derive(Debug, Default, Serialize)]
pub struct Execution {
    /// Ordered results: the main result plus display calls.
    pub results: Vec<ExecutionResult>,
    pub logs: Logs,
    /// Error raised by the evaluated code, if any. Never surfaced as an
    /// `Err` from `run_code`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Cell execution count reported by the kernel.
    pub execution_count: i32,
}

impl Execution {
    /// Text of the first result flagged as the main result, or `""`.
    pub fn text(&self) -> &str {
        self.results
            .iter()
            .find(|result| result.is_main_result)
            .map(|result| result.text.as_str())
            .unwrap_or("")
    }
}

/// stdout/stderr lines captured during an execution, in emission order.
#[derive(Debug, Default, Serialize)]
pub struct Logs {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Error raised by the evaluated user code.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{name}: {value}")]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    pub traceback: String,
}

/// One output of a code cell, in up to a dozen formats at once.
///
/// The kernel may populate any subset of the fields simultaneously, so this
/// is a record of optionals rather than a sum type.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub html: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub markdown: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub svg: String,
    /// Base64-encoded PNG.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub png: String,
    /// Base64-encoded JPEG.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jpeg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pdf: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub javascript: String,
    /// Structured data, e.g. a DataFrame rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    /// Chart extracted from a plotting library, when recognized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<Chart>,
    pub is_main_result: bool,
    /// Additional custom formats keyed by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ExecutionResult {
    /// Names of the formats populated on this result.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats = Vec::new();
        if !self.text.is_empty() {
            formats.push("text");
        }
        if !self.html.is_empty() {
            formats.push("html");
        }
        if !self.markdown.is_empty() {
            formats.push("markdown");
        }
        if !self.svg.is_empty() {
            formats.push("svg");
        }
        if !self.png.is_empty() {
            formats.push("png");
        }
        if !self.jpeg.is_empty() {
            formats.push("jpeg");
        }
        if !self.pdf.is_empty() {
            formats.push("pdf");
        }
        if !self.latex.is_empty() {
            formats.push("latex");
        }
        if self.json.is_some() {
            formats.push("json");
        }
        if !self.javascript.is_empty() {
            formats.push("javascript");
        }
        if self.data.is_some() {
            formats.push("data");
        }
        if self.chart.is_some() {
            formats.push("chart");
        }
        if let Some(extra) = &self.extra {
            formats.extend(extra.keys().map(String::as_str));
        }
        formats
    }
}

/// One streamed stdout/stderr line.
#[derive(Debug, Clone, Serialize)]
pub struct OutputMessage {
    pub line: String,
    /// Unix epoch nanoseconds.
    pub timestamp: i64,
    /// True for stderr.
    pub error: bool,
}

impl std::fmt::Display for OutputMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line)
    }
}

/// A Jupyter-style execution context: isolated stateful kernel.
#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub cwd: String,
}

/// Environment variables map used in interpreter requests.
pub type EnvVars = HashMap<String, String>;
