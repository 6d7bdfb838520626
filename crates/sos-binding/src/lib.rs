#![deny(unsafe_code)]

//! # sos-binding
//!
//! ## 定位与职责（Why）
//! - 把宿主的 HTTP 请求接入 `sos-dispatch` 解析引擎：KVP、JSON、POX 与 SOAP 四种线格式各有一个绑定，
//!   绑定只负责构造解码键与原始负载；
//! - [`HttpExchange`] 串起解码、业务处理、内容协商、编码与写出，并把失败渲染为异常报告。
//!
//! ## 边界（Trade-offs）
//! - 不依赖任何 Web 框架：宿主以 [`TransportRequest`] 与 `ResponseSink` 适配自身的请求与响应对象；
//! - XML 文档的根元素识别交给编组层实现的 [`DocumentProbe`]，本 Crate 不解析 XML。

/// 协议绑定与绑定选择键。
pub mod binding;

/// 绑定错误及其到核心错误的映射。
pub mod error;

/// 请求处理主流程。
pub mod exchange;

/// 日志订阅器安装。
pub mod telemetry;

/// 宿主请求抽象。
pub mod transport;

pub use binding::{Binding, BindingKey, BoundRequest, DocumentProbe, ProbedDocument, XmlFlavor};
pub use error::BindingError;
pub use exchange::{HandledResponse, HttpExchange, OperationHandler};
pub use transport::{HttpMethod, MemoryRequest, TransportRequest};
