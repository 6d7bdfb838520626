#![deny(unsafe_code)]

//! # sos-dispatch
//!
//! ## 定位与职责（Why）
//! - 传感器观测服务同时接收 SOAP、KVP、POX 与 JSON 等多种线格式、多个协议版本的请求，
//!   并以调用方可接受的表示作答；可解码的输入与可生成的输出都是开放集合，由启动时注册的能力描述符决定；
//! - 本 Crate 提供其中与线格式无关的核心：能力注册表、按特异性选择最佳实现的相似度算法，以及媒体类型内容协商。
//!   同一套引擎复用于解码、编码、异常格式化与原始响应写出。
//!
//! ## 架构嵌入（Where）
//! - 协议绑定（见 `sos-binding`）依据请求构造键、解析解码器并解码；业务逻辑产出领域响应；
//!   绑定协商输出媒体类型，按 (service, version, operation, media type) 解析编码器，最后交给写出器注册表输出。
//!
//! ## 边界（Trade-offs）
//! - 本 Crate 不解析任何线格式，具体的编组、持久化与 Web 框架对象均由外部协作者提供。

/// 能力键、相似度与类型标签。
///
/// - **意图说明 (Why)**：统一描述“组件能处理何种形态”，并以类型距离衡量特异性；
/// - **契约定位 (What)**：所有键满足结构相等与哈希，`similarity_to` 为 0 当且仅当兼容相等。
pub mod capability;

/// 组件清单与按配置启停。
pub mod catalog;

/// 解码器与编码器契约。
pub mod codec;

/// 分发门面：解码、编码、协商与写出的统一入口。
pub mod dispatch;

/// 稳定错误码与核心错误类型。
pub mod error;

/// HTTP 状态表与头部常量。
pub mod http;

/// 媒体类型解析、兼容判定与内容协商。
pub mod media;

/// 负载模型与内置文档类型。
pub mod payload;

/// 能力注册表。
///
/// - **意图说明 (Why)**：读多写少的共享解析表，读路径无锁；
/// - **风险提示 (Trade-offs)**：注册以快照整体替换，单次注册成本与条目数成正比，仅适合启动与重载阶段。
pub mod registry;

/// 运行期配置。
pub mod settings;

/// 响应写出器与传输抽象。
pub mod writer;

pub use capability::{CapabilityKey, Similarity, TypeTag};
pub use dispatch::{DispatchFacade, OperationContext};
pub use error::{CoreError, Result};
pub use media::MediaType;
pub use payload::Payload;
