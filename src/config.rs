//! 应用配置：从 config/default.toml、可选的显式配置文件与环境变量加载
//!
//! 加载顺序：默认 TOML → 显式文件 → 环境变量 `LLMOS__*`（双下划线表示嵌套，如 `LLMOS__STACK__LOOP_LOOKBACK=3`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::BoardError;
use crate::windows::{StackLimits, WindowSpec};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub board: BoardSection,
    pub stack: StackLimits,
    pub parser: ParserSection,
    pub cache: CacheSection,
}

/// [app] 段：应用名、回合上限、会话名
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 驱动程序最多运行的回合数
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_session_name")]
    pub session_name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_turns: default_max_turns(),
            session_name: default_session_name(),
        }
    }
}

fn default_max_turns() -> usize {
    8
}

fn default_session_name() -> String {
    "default".to_string()
}

/// [board] 段：窗口（按提示词中的顺序）与可选的系统窗口
#[derive(Debug, Clone, Deserialize)]
pub struct BoardSection {
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowSpec>,
    /// 未设置时使用空窗口
    #[serde(default)]
    pub system: Option<WindowSpec>,
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            system: None,
        }
    }
}

fn default_windows() -> Vec<WindowSpec> {
    ["kernel", "flowStack", "heap", "think_window", "ChatWindow"]
        .into_iter()
        .map(WindowSpec::of)
        .collect()
}

/// [parser] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ParserSection {
    /// 无 JSON 时是否接受旧式 `[type:func(k=v)]` 语法
    #[serde(default = "default_true")]
    pub legacy_fallback: bool,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            legacy_fallback: true,
        }
    }
}

/// [cache] 段：回放/录制用的 JSON 文件
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    pub path: Option<PathBuf>,
    /// 有缓存记录时优先回放，耗尽后再调用 LLM
    #[serde(default = "default_true")]
    pub replay: bool,
    /// 每轮将 {prompt, response} 追加写入缓存
    #[serde(default = "default_true")]
    pub record: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: None,
            replay: true,
            record: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), BoardError> {
        self.stack.validate().map_err(BoardError::Config)?;
        if self.board.windows.is_empty() && self.board.system.is_none() {
            return Err(BoardError::Config("board has no windows".to_string()));
        }
        Ok(())
    }
}

/// 加载配置：config/default.toml（可选）→ config_path（可选）→ 环境变量 `LLMOS__*`
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, BoardError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(BoardError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(config::File::from(path));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("LLMOS")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| BoardError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}
