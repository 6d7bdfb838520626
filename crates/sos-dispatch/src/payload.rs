//! 负载模型：解码前的原始表示、解码/编码后的领域对象与内置文档类型。
//!
//! # 设计背景（Why）
//! - 解析核心不理解任何领域对象，只需知道它的类型标签以便按类型距离选择写出器；
//! - 领域对象以 `Box<dyn Payload>` 流转，业务处理器通过 [`downcast_ref`](dyn Payload::downcast_ref) 取回具体类型。

use std::{any::Any, borrow::Cow, fmt};

use bytes::Bytes;

use crate::{
    capability::{TypeTag, builtin},
    error::CoreError,
    http::HttpStatus,
    media::MediaType,
};

/// 可被解码器产出、编码器消费、写出器序列化的领域对象。
///
/// # 契约说明（What）
/// - `type_tag` 返回的标签决定写出器解析与 `NamespaceTypeKey` 的类型距离；
/// - 实现必须是 `Send + Sync + 'static`，以便跨请求线程移动。
pub trait Payload: Any + Send + Sync + fmt::Debug {
    fn type_tag(&self) -> &'static TypeTag;
}

impl dyn Payload {
    /// 按具体类型借用。
    pub fn downcast_ref<P: Payload>(&self) -> Option<&P> {
        let any: &dyn Any = self;
        any.downcast_ref::<P>()
    }

    pub fn is<P: Payload>(&self) -> bool {
        self.downcast_ref::<P>().is_some()
    }
}

/// 解码前的请求体。
///
/// - `Document`：XML/JSON 等整体文档，附带请求声明的媒体类型；
/// - `Parameters`：KVP 绑定已拆分的键值对，保持请求中的顺序。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawPayload {
    Document { media_type: MediaType, body: Bytes },
    Parameters(Vec<(String, String)>),
}

impl RawPayload {
    pub fn document(media_type: MediaType, body: impl Into<Bytes>) -> Self {
        Self::Document {
            media_type,
            body: body.into(),
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Document { media_type, .. } => media_type.clone(),
            Self::Parameters(_) => MediaType::APPLICATION_KVP,
        }
    }

    /// 文档正文；参数形态返回 `None`。
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Document { body, .. } => Some(body),
            Self::Parameters(_) => None,
        }
    }

    /// 查找 KVP 参数，名称大小写不敏感。
    pub fn parameter(&self, name: &str) -> Option<&str> {
        match self {
            Self::Parameters(pairs) => pairs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            Self::Document { .. } => None,
        }
    }
}

/// 编码完成、可直接写出的字节文档。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedDocument {
    media_type: MediaType,
    body: Bytes,
}

impl EncodedDocument {
    pub fn new(media_type: MediaType, body: impl Into<Bytes>) -> Self {
        Self {
            media_type,
            body: body.into(),
        }
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl Payload for EncodedDocument {
    fn type_tag(&self) -> &'static TypeTag {
        &builtin::ENCODED_DOCUMENT
    }
}

/// 以 `serde_json::Value` 表达的 JSON 文档，由 JSON 写出器序列化。
#[derive(Clone, Debug, PartialEq)]
pub struct JsonDocument(serde_json::Value);

impl JsonDocument {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Payload for JsonDocument {
    fn type_tag(&self) -> &'static TypeTag {
        &builtin::JSON_DOCUMENT
    }
}

/// 异常报告中的单条异常。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEntry {
    code: Cow<'static, str>,
    locator: Option<String>,
    text: String,
}

impl ExceptionEntry {
    pub fn new(code: impl Into<Cow<'static, str>>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            locator: None,
            text: text.into(),
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// 协议无关的异常报告，由异常格式化器编码为具体表示。
///
/// `status` 由首个错误的错误码决定，协议绑定据此设置响应状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionReport {
    status: HttpStatus,
    exceptions: Vec<ExceptionEntry>,
}

impl ExceptionReport {
    pub fn new(status: HttpStatus) -> Self {
        Self {
            status,
            exceptions: Vec::new(),
        }
    }

    /// 由核心错误构造，错误链上的原因依次附加到文本中。
    pub fn from_error(error: &CoreError) -> Self {
        let mut text = error.message().to_owned();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(error.status()).with_exception(ExceptionEntry::new(error.code(), text))
    }

    pub fn with_exception(mut self, entry: ExceptionEntry) -> Self {
        self.exceptions.push(entry);
        self
    }

    pub fn status(&self) -> HttpStatus {
        self.status
    }

    pub fn exceptions(&self) -> &[ExceptionEntry] {
        &self.exceptions
    }
}

impl Payload for ExceptionReport {
    fn type_tag(&self) -> &'static TypeTag {
        &builtin::EXCEPTION_REPORT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn downcast_recovers_concrete_payload() {
        let boxed: Box<dyn Payload> = Box::new(JsonDocument::new(serde_json::json!({"a": 1})));
        assert!(boxed.is::<JsonDocument>());
        assert!(boxed.downcast_ref::<EncodedDocument>().is_none());
        assert_eq!(boxed.type_tag(), &builtin::JSON_DOCUMENT);
    }

    #[test]
    fn raw_parameters_are_case_insensitive() {
        let raw = RawPayload::Parameters(vec![("SERVICE".into(), "SOS".into())]);
        assert_eq!(raw.parameter("service"), Some("SOS"));
        assert_eq!(raw.media_type(), MediaType::APPLICATION_KVP);
        assert!(raw.body().is_none());
    }

    #[test]
    fn exception_report_carries_cause_chain() {
        let io = std::io::Error::other("disk gone");
        let err = CoreError::implementation_failed("encoder failed").with_cause(io);
        let report = ExceptionReport::from_error(&err);
        assert_eq!(report.status(), HttpStatus::INTERNAL_SERVER_ERROR);
        assert_eq!(report.exceptions()[0].code(), codes::IMPLEMENTATION_FAILED);
        assert_eq!(report.exceptions()[0].text(), "encoder failed: disk gone");
    }
}
