//! LLMOS 离线驱动
//!
//! 入口：初始化日志、加载配置、组装 MainBoard，用缓存回放或内置脚本驱动若干回合，最后打印快照。
//! 用法：`llmos [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use llmos::cache::{CacheStore, JsonFileCache};
use llmos::config::load_config;
use llmos::core::{BoardBuilder, BoardError, Session};
use llmos::llm::{LlmError, ScriptedLlmClient};
use serde_json::json;

/// 没有真实模型时使用的演示脚本
const DEMO_SCRIPT: [&str; 4] = [
    r#"{"callType":"prompt","funcName":"heap_set","kwargs":{"key":"user","value":"Alex"},"reasoning":"remember the user's name"}"#,
    r#"```json
[
  {"callType":"prompt","funcName":"stack_push","kwargs":{"description":"greet the user","instruction":"compose a greeting"}},
  {"callType":"prompt","funcName":"new_think","kwargs":{"content":"the user is Alex"}}
]
```"#,
    r#"{"callType":"prompt","funcName":"llm_response","kwargs":{"text":"Hello Alex!"}}"#,
    r#"{"callType":"prompt","funcName":"stack_pop","kwargs":{"result":"greeted","ret_key":"greeting"}}"#,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    llmos::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let board = BoardBuilder::new(cfg.clone())
        .build()
        .context("Failed to build board")?;
    let llm = Arc::new(ScriptedLlmClient::new(DEMO_SCRIPT));

    let mut session = Session::new(cfg.app.session_name.clone(), board, llm);
    if let Some(path) = &cfg.cache.path {
        let cache: Arc<dyn CacheStore> = Arc::new(JsonFileCache::new(path));
        session = session
            .with_cache(cache, cfg.cache.replay, cfg.cache.record)
            .await
            .context("Failed to open cache")?;
    }

    session.inject_event(
        "user_response",
        json!({"text": "Hi, my name is Alex."})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    );

    for _ in 0..cfg.app.max_turns {
        match session.run_turn().await {
            Ok(report) => {
                for (call, result) in report.calls.iter().zip(&report.results) {
                    tracing::info!(turn = report.turn, call = %call.describe(), result = %result, "dispatched");
                }
                if let Some(e) = &report.parse_error {
                    tracing::warn!(turn = report.turn, error = %e, "response not parsed");
                }
            }
            Err(BoardError::Llm(LlmError::Exhausted)) => {
                tracing::info!("no more scripted responses");
                break;
            }
            Err(e) => return Err(e).context("Turn failed"),
        }
    }

    let snapshot = session.board().snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to render snapshot")?
    );
    Ok(())
}
