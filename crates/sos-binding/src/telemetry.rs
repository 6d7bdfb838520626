//! 日志订阅器的一次性安装入口。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// 安装状态；成功安装后写入，之后的调用一律拒绝。
static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装阶段的失败路径。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `install` 被重复调用。
    #[error("日志订阅器已安装，禁止重复调用 install")]
    AlreadyInstalled,
    /// 宿主已设置其他全局 Subscriber。
    #[error("全局 tracing Subscriber 已存在，无法覆盖")]
    SubscriberAlreadySet,
    /// 设置全局 Subscriber 失败。
    #[error("设置 tracing 全局 Subscriber 失败")]
    SetGlobalSubscriber(#[from] dispatcher::SetGlobalDefaultError),
}

/// 零配置安装：`fmt` 输出 + `EnvFilter`，`RUST_LOG` 未设置时默认 `info`。
///
/// # 教案式说明
/// - **意图（Why）**：交换流程、注册表与协商都以 `tracing` 输出结构化事件，宿主只需调用一次即可看到它们；
/// - **逻辑（How）**：先检查重复安装与外部 Subscriber，再组装 `registry + EnvFilter + fmt` 设置为全局默认；
/// - **契约（What）**：重复调用返回 [`TelemetryError::AlreadyInstalled`]；嵌入到已有日志体系的宿主应跳过本函数。
pub fn install() -> Result<(), TelemetryError> {
    install_with_default_directive("info")
}

/// 与 [`install`] 相同，但 `RUST_LOG` 缺失时使用给定指令。
pub fn install_with_default_directive(directive: &str) -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Err(TelemetryError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(directive))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}

fn build_env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}
