//! 环境窗口：把一个外部环境（文本游戏、模拟器……）包装成窗口
//!
//! 导出 `<prefix>_step(action)` 与 `<prefix>_reset()`。环境故障不会变成错误结果，
//! 而是生成一条含 `[ENV ERROR]` 的观察文本，让模型在下一轮看到并自行调整。

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::windows::args::{self, decode, require, NoArgs};
use crate::windows::{OpResult, Window};

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("environment failure: {0}")]
    Failure(String),
}

/// 外部环境契约
pub trait Environment: Send {
    /// 环境说明（渲染为 meta）
    fn describe(&self) -> String;

    /// 当前观察（渲染为 state）
    fn observe(&self) -> String;

    /// 执行一个动作，返回新的观察
    fn step(&mut self, action: &str) -> Result<String, EnvError>;

    /// 重置环境，返回初始观察
    fn reset(&mut self) -> Result<String, EnvError>;
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnvStepArgs {
    pub action: String,
}

pub struct EnvWindow<E: Environment> {
    name: String,
    prefix: String,
    env: E,
    last_action: Option<String>,
}

impl<E: Environment> EnvWindow<E> {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, env: E) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            env,
            last_action: None,
        }
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    fn step_op(&self) -> String {
        format!("{}_step", self.prefix)
    }

    fn reset_op(&self) -> String {
        format!("{}_reset", self.prefix)
    }

    fn observation(outcome: Result<String, EnvError>) -> OpResult {
        match outcome {
            Ok(obs) => OpResult::ok().with("observation", obs),
            Err(e) => {
                tracing::warn!(error = %e, "environment fault");
                OpResult::ok()
                    .with("observation", format!("[ENV ERROR] {e}"))
                    .with("env_error", true)
            }
        }
    }
}

impl<E: Environment> Window for EnvWindow<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        let sigs = [
            args::signature::<EnvStepArgs>(&self.step_op()),
            args::signature::<NoArgs>(&self.reset_op()),
        ];
        format!("{}\n{}", self.env.describe(), args::render_operations(&sigs))
    }

    fn render_state(&self) -> String {
        let last = self.last_action.as_deref().unwrap_or("none");
        format!(
            "[ENV STATE]\n{}\nLast Action: {last}\n[/ENV STATE]",
            self.env.observe()
        )
    }

    fn operations(&self) -> Vec<String> {
        vec![self.step_op(), self.reset_op()]
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        if op == self.step_op() {
            if let Err(e) = require(&kwargs, &["action"], true, "action missing") {
                return e;
            }
            return match decode::<EnvStepArgs>(op, kwargs) {
                Ok(a) => {
                    self.last_action = Some(a.action.clone());
                    Self::observation(self.env.step(&a.action))
                }
                Err(e) => e,
            };
        }
        if op == self.reset_op() {
            self.last_action = None;
            return Self::observation(self.env.reset());
        }
        OpResult::error(format!("handler not found: {op}"))
    }
}
