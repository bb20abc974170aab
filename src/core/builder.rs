//! Board 构建器：由配置与窗口注册表组装 MainBoard
//!
//! 注册表可先由调用方扩展（自定义窗口、环境窗口），再交给构建器实例化配置中的窗口条目。

use crate::calls::ResponseParser;
use crate::config::AppConfig;
use crate::core::{BoardError, MainBoard};
use crate::windows::{Window, WindowRegistry};

pub struct BoardBuilder {
    config: AppConfig,
    registry: WindowRegistry,
    extra: Vec<Box<dyn Window>>,
}

impl BoardBuilder {
    /// 使用内置窗口注册表
    pub fn new(config: AppConfig) -> Self {
        let registry = WindowRegistry::with_builtins(config.stack);
        Self {
            config,
            registry,
            extra: Vec::new(),
        }
    }

    /// 替换注册表（例如注册了自定义窗口的注册表）
    pub fn with_registry(mut self, registry: WindowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut WindowRegistry {
        &mut self.registry
    }

    /// 追加一个已构造好的窗口（排在配置窗口之后），如包装外部环境的 EnvWindow
    pub fn with_window(mut self, window: Box<dyn Window>) -> Self {
        self.extra.push(window);
        self
    }

    pub fn build(self) -> Result<MainBoard, BoardError> {
        self.config.validate()?;

        let mut windows = self
            .config
            .board
            .windows
            .iter()
            .map(|spec| self.registry.create(spec))
            .collect::<Result<Vec<_>, _>>()?;
        windows.extend(self.extra);

        let system = self
            .config
            .board
            .system
            .as_ref()
            .map(|spec| self.registry.create(spec))
            .transpose()?;

        let mut board =
            MainBoard::new().with_parser(ResponseParser::new(self.config.parser.legacy_fallback));
        board.register_windows(windows, system)?;
        tracing::info!(
            windows = board.window_names().len(),
            operations = board.operations().len(),
            "board ready"
        );
        Ok(board)
    }
}
