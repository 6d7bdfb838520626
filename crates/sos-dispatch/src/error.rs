use std::{borrow::Cow, error::Error, fmt};

use crate::http::HttpStatus;

/// `CoreError` 是解析核心跨模块共享的稳定错误形态。
///
/// # 设计背景（Why）
/// - 解码、编码、协商与写出四条路径的失败最终都要折算为一个 HTTP 状态或协议故障，
///   统一的错误码可以让协议绑定层查表映射，而无需解析自然语言消息。
/// - 已解析组件自身抛出的故障（例如编码器内部异常）需要原样透传，因此以 `cause` 保留完整链路。
///
/// # 逻辑解析（How）
/// - `code` 始终为 `'static` 字符串，取值见 [`codes`]；`message` 面向排障人员；
/// - `status()` 根据错误码查表得到 [`HttpStatus`]，未登记的错误码一律视为 500。
///
/// # 契约说明（What）
/// - **前置条件**：调用方应优先使用 [`codes`] 中的常量，自定义错误码遵循 `<域>.<语义>` 命名；
/// - **后置条件**：实例满足 `Send + Sync + 'static`，可跨请求线程移动。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 框架统一的返回值别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

impl CoreError {
    /// 构造核心错误。
    ///
    /// ```rust
    /// use sos_dispatch::error::{CoreError, codes};
    ///
    /// let err = CoreError::new(codes::NEGOTIATION_NO_ACCEPTABLE, "nothing matched");
    /// assert_eq!(err.code(), codes::NEGOTIATION_NO_ACCEPTABLE);
    /// assert_eq!(err.status().code(), 406);
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 将错误码映射为协议绑定应返回的 HTTP 状态。
    ///
    /// # 契约说明（What）
    /// - 映射表由 [`codes::status_of`] 集中维护；
    /// - 未登记的错误码视为“已解析但实现自身失败”，返回 500。
    pub fn status(&self) -> HttpStatus {
        codes::status_of(self.code)
    }

    /// 构造 `UnsupportedRepresentation`：键可构造但无组件覆盖。
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::UNSUPPORTED_REPRESENTATION, message)
    }

    /// 构造 `NoAcceptableRepresentation`：协商未找到任何兼容表示。
    pub fn not_acceptable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::NEGOTIATION_NO_ACCEPTABLE, message)
    }

    /// 构造“组件已解析但执行失败”的错误。
    pub fn implementation_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::IMPLEMENTATION_FAILED, message)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 稳定错误码集合。
///
/// # 设计背景（Why）
/// - 错误码遵循 `<领域>.<语义>` 命名约定，方便在跨组件日志中检索与聚合；
/// - 每个码值在 [`status_of`] 中登记其 HTTP 映射，协议绑定层据此统一生成响应。
pub mod codes {
    use crate::http::HttpStatus;

    /// `Accept`/`Content-Type` 文本无法解析。
    pub const MEDIA_TYPE_MALFORMED: &str = "media_type.malformed";
    /// 内容协商未找到客户端可接受的表示。
    pub const NEGOTIATION_NO_ACCEPTABLE: &str = "negotiation.no_acceptable";
    /// 键可以构造，但没有注册任何解码器/编码器/写出器覆盖它。
    pub const UNSUPPORTED_REPRESENTATION: &str = "dispatch.unsupported_representation";
    /// 组件已解析，但其自身执行失败。
    pub const IMPLEMENTATION_FAILED: &str = "dispatch.implementation_failed";
    /// 注册阶段发现重复键。
    pub const REGISTRY_DUPLICATE_KEY: &str = "registry.duplicate_key";
    /// 注册阶段收到空键集合。
    pub const REGISTRY_EMPTY_KEYS: &str = "registry.empty_keys";
    /// 配置源读取或解析失败。
    pub const SETTINGS_INVALID: &str = "settings.invalid";
    /// 输出流 I/O 失败。
    pub const TRANSPORT_IO: &str = "transport.io";
    /// 协议绑定缺失必填参数（如 KVP 的 `service`/`request`）。
    pub const BINDING_MISSING_PARAMETER: &str = "binding.missing_parameter";
    /// 协议绑定收到结构非法的请求体。
    pub const BINDING_INVALID_REQUEST: &str = "binding.invalid_request";
    /// 请求方法不被任何绑定接受。
    pub const BINDING_METHOD_NOT_ALLOWED: &str = "binding.method_not_allowed";
    /// 请求的 `Content-Type` 没有对应绑定。
    pub const BINDING_UNSUPPORTED: &str = "binding.unsupported";

    /// 依据错误码查表得到 HTTP 状态。
    pub fn status_of(code: &str) -> HttpStatus {
        match code {
            MEDIA_TYPE_MALFORMED | BINDING_MISSING_PARAMETER | BINDING_INVALID_REQUEST => {
                HttpStatus::BAD_REQUEST
            }
            NEGOTIATION_NO_ACCEPTABLE => HttpStatus::NOT_ACCEPTABLE,
            UNSUPPORTED_REPRESENTATION | BINDING_UNSUPPORTED => HttpStatus::UNSUPPORTED_MEDIA_TYPE,
            BINDING_METHOD_NOT_ALLOWED => HttpStatus::METHOD_NOT_ALLOWED,
            _ => HttpStatus::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert_eq!(
            CoreError::new(codes::MEDIA_TYPE_MALFORMED, "x").status(),
            HttpStatus::BAD_REQUEST
        );
        assert_eq!(CoreError::not_acceptable("x").status().code(), 406);
        assert_eq!(CoreError::unsupported("x").status().code(), 415);
        assert_eq!(CoreError::implementation_failed("x").status().code(), 500);
        assert_eq!(CoreError::new("custom.thing", "x").status().code(), 500);
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let io = std::io::Error::other("pipe closed");
        let err = CoreError::new(codes::TRANSPORT_IO, "write failed").with_cause(io);
        assert!(err.source().is_some(), "source 必须指向底层 I/O 错误");
        assert_eq!(err.to_string(), "[transport.io] write failed");
    }
}
