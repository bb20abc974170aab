//! 会话编排器：回合驱动与单写者串行化
//!
//! 一个会话 = 一个 MainBoard。后台任务独占 board，从命令通道依次消费
//! RunTurn / Inject / Apply / AssemblePrompt / Snapshot / Quit，
//! 每次修改后通过 watch 通道发布最新快照。外部注入的事件与模型回合因此天然串行，
//! 无需在窗口内部加锁。
//!
//! 一个回合：assemble_prompt → 缓存回放（若有剩余）或实时 LLM 调用 → apply_response。
//! 实时回复在开启录制时追加到缓存。

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};

use crate::cache::{CacheRecord, CacheStore, ReplayCursor};
use crate::calls::{Call, ParseError};
use crate::core::{Applied, AssembledPrompt, BoardError, MainBoard, Snapshot};
use crate::llm::LlmClient;
use crate::windows::OpResult;

/// 回复来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Replay,
    Live,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSource::Replay => f.write_str("replay"),
            ResponseSource::Live => f.write_str("live"),
        }
    }
}

/// 一个回合的结果
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// 从 1 开始的回合序号
    pub turn: usize,
    pub source: ResponseSource,
    pub response: String,
    pub calls: Vec<Call>,
    pub results: Vec<OpResult>,
    pub parse_error: Option<ParseError>,
}

/// 发往会话任务的命令
#[derive(Debug)]
pub enum Command {
    /// 跑一个完整回合
    RunTurn(oneshot::Sender<Result<TurnReport, BoardError>>),
    /// 外部事件（以 event_call 分发）
    Inject {
        call: Call,
        reply: oneshot::Sender<OpResult>,
    },
    /// 直接应用一段模型文本（跳过 LLM）
    Apply {
        raw: String,
        reply: oneshot::Sender<Applied>,
    },
    AssemblePrompt(oneshot::Sender<AssembledPrompt>),
    Snapshot(oneshot::Sender<Snapshot>),
    Quit,
}

/// 会话：board + LLM + 可选缓存
pub struct Session {
    /// 会话唯一标识（日志关联用）
    id: String,
    name: String,
    board: MainBoard,
    llm: Arc<dyn LlmClient>,
    cache: Option<Arc<dyn CacheStore>>,
    cursor: ReplayCursor,
    record: bool,
    turn: usize,
}

impl Session {
    pub fn new(name: impl Into<String>, board: MainBoard, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            board,
            llm,
            cache: None,
            cursor: ReplayCursor::default(),
            record: false,
            turn: 0,
        }
    }

    /// 挂接缓存：replay 时预加载全部记录作为回放游标；record 时追加实时回复
    pub async fn with_cache(
        mut self,
        cache: Arc<dyn CacheStore>,
        replay: bool,
        record: bool,
    ) -> Result<Self, BoardError> {
        if replay {
            let records = cache.load().await?;
            tracing::info!(session = %self.name, records = records.len(), "cache loaded for replay");
            self.cursor = ReplayCursor::new(records);
        }
        self.cache = Some(cache);
        self.record = record;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn board(&self) -> &MainBoard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut MainBoard {
        &mut self.board
    }

    pub fn turns(&self) -> usize {
        self.turn
    }

    pub fn replay_remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub async fn run_turn(&mut self) -> Result<TurnReport, BoardError> {
        let prompt = self.board.assemble_prompt();

        let (response, source) = match self.cursor.next_response(&prompt) {
            Some(r) => (r, ResponseSource::Replay),
            None => {
                let r = self.llm.chat(&prompt.system, &prompt.user).await?;
                (r, ResponseSource::Live)
            }
        };

        if source == ResponseSource::Live && self.record {
            if let Some(cache) = &self.cache {
                cache
                    .append(CacheRecord::new(prompt, response.clone()))
                    .await?;
            }
        }

        let applied = self.board.apply_response(&response);
        self.turn += 1;
        tracing::info!(
            session = %self.name,
            session_id = %self.id,
            turn = self.turn,
            source = %source,
            calls = applied.calls.len(),
            parse_error = applied.parse_error.is_some(),
            "turn complete"
        );

        Ok(TurnReport {
            turn: self.turn,
            source,
            response,
            calls: applied.calls,
            results: applied.results,
            parse_error: applied.parse_error,
        })
    }

    pub fn inject_event(&mut self, func_name: &str, kwargs: Map<String, Value>) -> OpResult {
        self.board.inject_event(func_name, kwargs)
    }

    /// 在后台任务中运行本会话，返回句柄
    pub fn spawn(self) -> SessionHandle {
        spawn_session(self)
    }
}

/// 会话句柄：可克隆，多个调用方共享同一个单写者任务
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, BoardError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| BoardError::SessionClosed)?;
        rx.await.map_err(|_| BoardError::SessionClosed)
    }

    pub async fn run_turn(&self) -> Result<TurnReport, BoardError> {
        self.request(Command::RunTurn).await?
    }

    /// 注入外部事件，如 `user_response(text=...)`
    pub async fn inject_event(
        &self,
        func_name: &str,
        kwargs: Map<String, Value>,
    ) -> Result<OpResult, BoardError> {
        let call = Call::event(func_name, kwargs);
        self.request(|reply| Command::Inject { call, reply }).await
    }

    pub async fn apply(&self, raw: impl Into<String>) -> Result<Applied, BoardError> {
        let raw = raw.into();
        self.request(|reply| Command::Apply { raw, reply }).await
    }

    pub async fn assemble_prompt(&self) -> Result<AssembledPrompt, BoardError> {
        self.request(Command::AssemblePrompt).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, BoardError> {
        self.request(Command::Snapshot).await
    }

    /// 订阅快照更新（每次修改后发布）
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state_rx.clone()
    }

    pub fn quit(&self) {
        let _ = self.cmd_tx.send(Command::Quit);
    }
}

/// 创建会话任务：返回句柄；后台任务消费命令直到 Quit 或所有句柄被丢弃
pub fn spawn_session(mut session: Session) -> SessionHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(session.board.snapshot());

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::RunTurn(reply) => {
                    let result = session.run_turn().await;
                    if let Err(e) = &result {
                        tracing::warn!(session = %session.name, error = %e, "turn failed");
                    }
                    let _ = state_tx.send(session.board.snapshot());
                    let _ = reply.send(result);
                }
                Command::Inject { call, reply } => {
                    let result = session.board.dispatch(&call);
                    let _ = state_tx.send(session.board.snapshot());
                    let _ = reply.send(result);
                }
                Command::Apply { raw, reply } => {
                    let applied = session.board.apply_response(&raw);
                    let _ = state_tx.send(session.board.snapshot());
                    let _ = reply.send(applied);
                }
                Command::AssemblePrompt(reply) => {
                    let _ = reply.send(session.board.assemble_prompt());
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(session.board.snapshot());
                }
                Command::Quit => break,
            }
        }
        tracing::info!(session = %session.name, turns = session.turn, "session closed");
    });

    SessionHandle { cmd_tx, state_rx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::AppConfig;
    use crate::core::BoardBuilder;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use serde_json::json;

    fn board() -> MainBoard {
        BoardBuilder::new(AppConfig::default()).build().unwrap()
    }

    const SET_USER: &str =
        r#"{"callType":"prompt","funcName":"heap_set","kwargs":{"key":"user","value":"Alex"}}"#;

    #[tokio::test]
    async fn test_live_turn_records_to_cache() {
        let llm = Arc::new(ScriptedLlmClient::new([SET_USER]));
        let cache = Arc::new(MemoryCache::new());
        let mut session = Session::new("t", board(), llm.clone())
            .with_cache(cache.clone(), true, true)
            .await
            .unwrap();

        let report = session.run_turn().await.unwrap();
        assert_eq!(report.turn, 1);
        assert_eq!(report.source, ResponseSource::Live);
        assert!(report.results[0].is_ok());

        let records = cache.load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response, SET_USER);
        assert_eq!(llm.prompts().await[0], records[0].prompt);
    }

    #[tokio::test]
    async fn test_replay_then_live() {
        let cache = Arc::new(MemoryCache::with_records(vec![CacheRecord::new(
            AssembledPrompt::default(),
            SET_USER,
        )]));
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"callType":"prompt","funcName":"new_think","kwargs":{"content":"done"}}"#,
        ]));
        let mut session = Session::new("t", board(), llm.clone())
            .with_cache(cache.clone(), true, false)
            .await
            .unwrap();

        assert_eq!(session.run_turn().await.unwrap().source, ResponseSource::Replay);
        assert_eq!(llm.prompts().await.len(), 0);
        assert_eq!(session.run_turn().await.unwrap().source, ResponseSource::Live);
        assert_eq!(cache.load().await.unwrap().len(), 1);
        assert!(session.board().snapshot().get("Heap").unwrap().state.contains("Alex"));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let mut session = Session::new("t", board(), llm);
        let err = session.run_turn().await.unwrap_err();
        assert!(matches!(err, BoardError::Llm(LlmError::Exhausted)));
        assert_eq!(session.turns(), 0);
    }

    #[tokio::test]
    async fn test_handle_serializes_and_publishes() {
        let llm = Arc::new(ScriptedLlmClient::new([SET_USER]));
        let handle = Session::new("t", board(), llm).spawn();
        let mut updates = handle.subscribe();

        let r = handle
            .inject_event("user_response", json!({"text": "hi"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert!(r.is_ok());
        updates.changed().await.unwrap();
        assert!(updates
            .borrow()
            .get("ChatWindow")
            .unwrap()
            .state
            .contains("USER: hi"));

        let other = handle.clone();
        let (turn, snap) = tokio::join!(handle.run_turn(), other.snapshot());
        assert!(turn.unwrap().results[0].is_ok());
        assert!(snap.is_ok());

        let snap = handle.snapshot().await.unwrap();
        let stack = &snap.get("FlowStackWindow").unwrap().state;
        assert!(stack.contains("[auto:event_call]"));
        assert!(stack.contains("[auto:prompt]"));

        handle.quit();
    }
}
