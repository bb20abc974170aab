//! 异常窗口：记录模型回复过程中出现的异常，提供查询、统计与修复建议
//!
//! 最多保留 50 条记录（淘汰最旧）；state 展示最近 5 条与按类型统计。

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::windows::args::{self, decode, NoArgs};
use crate::windows::{truncate_chars, OpResult, Window};

const MAX_RECORDS: usize = 50;
const RECENT_SHOWN: usize = 5;
const MESSAGE_PREVIEW: usize = 50;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DESCRIPTION: &str = "\
Error log for problems that came up while answering (bad output format, failed tools,
timeouts). Record what went wrong so you do not repeat it; ask for a fix suggestion by id.";

pub const ERROR_OPERATIONS: [&str; 5] = [
    "error_record",
    "error_query",
    "error_clear",
    "error_statistics",
    "error_suggest_fix",
];

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: u64,
    pub timestamp: String,
    pub error_type: String,
    pub error_message: String,
    pub context: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub total_errors: u64,
    pub errors_by_type: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ErrorRecordArgs {
    #[serde(default = "unknown_type")]
    pub error_type: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub context: Option<Value>,
}

fn unknown_type() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ErrorQueryArgs {
    #[serde(default = "all_types")]
    pub type_filter: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn all_types() -> String {
    "all".to_string()
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ErrorClearArgs {
    /// 只清理早于该时间（`%Y-%m-%d %H:%M:%S`）的记录；缺省清理全部
    #[serde(default)]
    pub before_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ErrorSuggestArgs {
    pub error_id: u64,
}

pub struct ErrorWindow {
    name: String,
    records: Vec<ErrorRecord>,
    stats: ErrorStats,
    next_id: u64,
}

impl ErrorWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            stats: ErrorStats::default(),
            next_id: 0,
        }
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    fn record(&mut self, args: ErrorRecordArgs) -> OpResult {
        let record = ErrorRecord {
            id: self.next_id,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            error_type: args.error_type,
            error_message: args.error_message,
            context: args.context.unwrap_or_else(|| Value::Object(Map::new())),
        };
        self.next_id += 1;
        self.stats.total_errors += 1;
        *self
            .stats
            .errors_by_type
            .entry(record.error_type.clone())
            .or_insert(0) += 1;

        let r = OpResult::ok()
            .with("error_id", record.id)
            .with("error_type", record.error_type.clone())
            .with("timestamp", record.timestamp.clone());
        self.records.push(record);
        if self.records.len() > MAX_RECORDS {
            self.records.remove(0);
        }
        r
    }

    fn query(&self, args: ErrorQueryArgs) -> OpResult {
        let filtered: Vec<&ErrorRecord> = self
            .records
            .iter()
            .filter(|e| args.type_filter == "all" || e.error_type == args.type_filter)
            .collect();
        let skip = filtered.len().saturating_sub(args.limit);
        let errors: Vec<Value> = filtered
            .into_iter()
            .skip(skip)
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect();
        OpResult::ok()
            .with("count", errors.len())
            .with("errors", errors)
    }

    fn clear(&mut self, args: ErrorClearArgs) -> OpResult {
        let before = self.records.len();
        match args.before_time {
            Some(raw) => {
                let Ok(cutoff) = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT) else {
                    return OpResult::error(format!(
                        "invalid before_time '{raw}': expected format YYYY-MM-DD HH:MM:SS"
                    ));
                };
                self.records.retain(|e| {
                    NaiveDateTime::parse_from_str(&e.timestamp, TIMESTAMP_FORMAT)
                        .map_or(true, |t| t >= cutoff)
                });
            }
            None => {
                self.records.clear();
                self.stats = ErrorStats::default();
            }
        }
        OpResult::ok()
            .with("cleared_count", before - self.records.len())
            .with("remaining_count", self.records.len())
    }

    fn statistics(&self) -> OpResult {
        OpResult::ok().with(
            "statistics",
            serde_json::to_value(&self.stats).unwrap_or(Value::Null),
        )
    }

    fn suggest_fix(&self, args: ErrorSuggestArgs) -> OpResult {
        let Some(record) = self.records.iter().find(|e| e.id == args.error_id) else {
            return OpResult::error(format!("invalid error id: {}", args.error_id));
        };
        let suggestion = match record.error_type.as_str() {
            "parse_error" => "check the output format; reply with valid JSON call objects only",
            "timeout_error" => "increase the timeout or split the work into smaller steps",
            "rate_limit" => "lower the request rate and retry later",
            "content_filter" => "check the input for sensitive content",
            "model_error" => "try another model or check the model service",
            "unknown" => "check the network connection and API configuration",
            _ => "check the system logs and configuration",
        };
        OpResult::ok()
            .with("error_id", record.id)
            .with("error_type", record.error_type.clone())
            .with("suggestion", suggestion)
            .with("context", record.context.clone())
    }
}

impl Window for ErrorWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        let sigs = [
            args::signature::<ErrorRecordArgs>("error_record"),
            args::signature::<ErrorQueryArgs>("error_query"),
            args::signature::<ErrorClearArgs>("error_clear"),
            args::signature::<NoArgs>("error_statistics"),
            args::signature::<ErrorSuggestArgs>("error_suggest_fix"),
        ];
        format!("{DESCRIPTION}\n{}", args::render_operations(&sigs))
    }

    fn render_state(&self) -> String {
        if self.records.is_empty() {
            return "### NO ERROR RECORDS ###\n".to_string();
        }
        let mut s = String::from("### RECENT ERRORS ###\n");
        let skip = self.records.len().saturating_sub(RECENT_SHOWN);
        for (i, e) in self.records.iter().skip(skip).enumerate() {
            s.push_str(&format!(
                "[{}] {} - {}: {}\n",
                i + 1,
                e.timestamp,
                e.error_type,
                truncate_chars(&e.error_message, MESSAGE_PREVIEW)
            ));
        }
        s.push_str(&format!(
            "\n### ERROR STATISTICS ###\nTotal errors: {}\n",
            self.stats.total_errors
        ));
        if !self.stats.errors_by_type.is_empty() {
            s.push_str("By type:\n");
            for (ty, count) in &self.stats.errors_by_type {
                s.push_str(&format!("  - {ty}: {count}\n"));
            }
        }
        s
    }

    fn operations(&self) -> Vec<String> {
        ERROR_OPERATIONS.iter().map(|s| s.to_string()).collect()
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        let outcome = match op {
            "error_record" => decode(op, kwargs).map(|a| self.record(a)),
            "error_query" => decode(op, kwargs).map(|a| self.query(a)),
            "error_clear" => decode(op, kwargs).map(|a| self.clear(a)),
            "error_statistics" => decode::<NoArgs>(op, kwargs).map(|_| self.statistics()),
            "error_suggest_fix" => decode(op, kwargs).map(|a| self.suggest_fix(a)),
            other => Err(OpResult::error(format!("handler not found: {other}"))),
        };
        outcome.unwrap_or_else(|e| e)
    }
}
