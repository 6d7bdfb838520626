//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 协议绑定在进入解析引擎之前就可能失败：参数缺失、请求体不是合法 JSON、方法或内容类型无人处理；
//! - 这些失败需要与核心错误码对齐，才能由交换流程统一映射 HTTP 状态并渲染异常报告。
//!
//! ## 设计要求（What）
//! - 细粒度枚举保留上下文（参数名、方法、媒体类型），`From<BindingError> for CoreError`
//!   选择稳定错误码，原始错误作为 cause 保留。

use std::io;

use sos_dispatch::{
    error::{CoreError, codes},
    media::MediaType,
};
use thiserror::Error;

use crate::transport::HttpMethod;

/// 协议绑定错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“请求无法被任何绑定理解”与“解析引擎找不到组件”区分开，便于运维定位是客户端问题还是部署缺口；
/// - **契约 (What)**：转换到 [`CoreError`] 时，缺参与结构错误映射为 400，方法不被接受为 405，内容类型无人处理为 415；
/// - **设计权衡 (Trade-offs)**：上下文以 `String` 保存，错误路径上的少量分配换取可读的日志。
#[derive(Debug, Error)]
pub enum BindingError {
    /// 必填参数缺失。
    #[error("missing mandatory parameter `{name}`")]
    MissingParameter { name: &'static str },

    /// 参数存在但取值为空或类型不对。
    #[error("parameter `{name}` is invalid: {detail}")]
    InvalidParameter { name: &'static str, detail: String },

    /// 请求体为空，而绑定需要文档。
    #[error("request body is empty")]
    EmptyBody,

    /// JSON 请求体无法解析。
    #[error("request body is not valid JSON")]
    Json(#[source] serde_json::Error),

    /// XML 文档无法被探测出根元素。
    #[error("request document cannot be probed: {detail}")]
    Document { detail: String },

    /// gzip 请求体解压失败。
    #[error("gzip request body cannot be inflated")]
    Inflate(#[source] io::Error),

    /// 请求的 `Content-Type` 头无法解析。
    #[error("request content type `{value}` is malformed")]
    ContentType { value: String },

    /// 没有绑定接受此方法。
    #[error("method {method} is not accepted by any binding")]
    MethodNotAllowed { method: HttpMethod },

    /// 方法被接受，但没有绑定处理此内容类型。
    #[error("no binding handles {method} requests of `{media_type}`")]
    Unsupported {
        method: HttpMethod,
        media_type: MediaType,
    },
}

impl BindingError {
    /// 该错误对应的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter { .. } => codes::BINDING_MISSING_PARAMETER,
            Self::InvalidParameter { .. }
            | Self::EmptyBody
            | Self::Json(_)
            | Self::Document { .. }
            | Self::Inflate(_)
            | Self::ContentType { .. } => codes::BINDING_INVALID_REQUEST,
            Self::MethodNotAllowed { .. } => codes::BINDING_METHOD_NOT_ALLOWED,
            Self::Unsupported { .. } => codes::BINDING_UNSUPPORTED,
        }
    }
}

impl From<BindingError> for CoreError {
    fn from(error: BindingError) -> Self {
        let code = error.code();
        CoreError::new(code, error.to_string()).with_cause(error)
    }
}
