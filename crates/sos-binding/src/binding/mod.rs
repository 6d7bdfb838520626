//! # 协议绑定
//!
//! ## 角色定位（Why）
//! - 同一服务以 KVP、JSON、POX 与 SOAP 多种线格式接入；绑定负责把宿主请求变成“解码键 + 原始负载”，
//!   之后的解码、编码与写出全部交给解析引擎；
//! - 绑定的选择本身也是一张能力注册表，键为 (HTTP 方法, 请求媒体类型)，新增线格式只需注册新绑定。
//!
//! ## 契约（What）
//! - [`Binding::bind`] 收到的请求体已经过 gzip 解压；
//! - 绑定只做“识别”，不解析领域语义：键与原始负载交由解码器解释。

mod json;
mod kvp;
mod xml;

use std::{borrow::Cow, fmt};

use bytes::Bytes;
use sos_dispatch::{
    OperationContext,
    capability::{CapabilityKey, DecoderKey, Similarity},
    http::headers,
    media::MediaType,
    payload::RawPayload,
    registry::CapabilityRegistry,
};

pub use json::JsonBinding;
pub use kvp::KvpBinding;
pub use xml::{DocumentProbe, ProbedDocument, XmlBinding, XmlFlavor};

use crate::{error::BindingError, transport::{HttpMethod, TransportRequest}};

/// 绑定注册表。
pub type BindingRegistry = CapabilityRegistry<BindingKey, dyn Binding>;

/// `application/x-www-form-urlencoded`，POST 形式的 KVP。
pub fn form_urlencoded() -> MediaType {
    MediaType::new("application", "x-www-form-urlencoded")
}

/// 未声明 `Content-Type` 的请求体按 `application/octet-stream` 对待。
pub fn octet_stream() -> MediaType {
    MediaType::new("application", "octet-stream")
}

/// 绑定选择键：HTTP 方法 + 请求媒体类型。
///
/// # 设计背景（Why）
/// - GET 请求没有请求体，统一以 `application/x-kvp` 作为媒体类型，使 KVP 绑定与其他绑定共用一套解析；
/// - 媒体类型的参数（如 `charset`）与选择无关，构造时即被剥离。
///
/// # 契约说明（What）
/// - 方法不同则无关；
/// - 已注册类型为具体类型且与查找类型兼容（含 `text/xml` ↔ `application/xml` 等价）时相似度为 0；
/// - 已注册 `main/*` 时为 1，`*/*` 时为 2，保证具体绑定优先于兜底绑定。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingKey {
    method: HttpMethod,
    media_type: MediaType,
}

impl BindingKey {
    pub fn new(method: HttpMethod, media_type: MediaType) -> Self {
        Self {
            method,
            media_type: media_type.without_parameters(),
        }
    }

    /// 由宿主请求推导查找键。
    pub fn for_request(request: &dyn TransportRequest) -> Result<Self, BindingError> {
        if request.method() == HttpMethod::Get {
            return Ok(Self::new(HttpMethod::Get, MediaType::APPLICATION_KVP));
        }
        let media_type = match request.header(headers::CONTENT_TYPE) {
            Some(value) => MediaType::parse(value).map_err(|_| BindingError::ContentType {
                value: value.to_owned(),
            })?,
            None => octet_stream(),
        };
        Ok(Self::new(request.method(), media_type))
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }
}

impl CapabilityKey for BindingKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        if self.method != candidate.method || !self.media_type.is_compatible(&candidate.media_type) {
            return Similarity::Unrelated;
        }
        let registered = &candidate.media_type;
        if registered.is_wildcard_type() {
            Similarity::Score(2)
        } else if registered.is_wildcard_subtype() {
            Similarity::Score(1)
        } else {
            Similarity::EXACT
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.media_type)
    }
}

/// 绑定产物：解码键、原始负载，以及能直接从请求读出的操作上下文。
#[derive(Clone, Debug)]
pub struct BoundRequest {
    binding: Cow<'static, str>,
    key: DecoderKey,
    raw: RawPayload,
    context: Option<OperationContext>,
}

impl BoundRequest {
    pub fn new(binding: impl Into<Cow<'static, str>>, key: impl Into<DecoderKey>, raw: RawPayload) -> Self {
        Self {
            binding: binding.into(),
            key: key.into(),
            raw,
            context: None,
        }
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// 产生本请求的绑定名称。
    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub fn key(&self) -> &DecoderKey {
        &self.key
    }

    pub fn raw(&self) -> &RawPayload {
        &self.raw
    }

    /// KVP 与 JSON 请求自带 (service, version, request)；XML 请求为 `None`，由处理器给出。
    pub fn context(&self) -> Option<&OperationContext> {
        self.context.as_ref()
    }
}

/// 协议绑定。
pub trait Binding: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn bind(&self, request: &dyn TransportRequest, body: Bytes) -> Result<BoundRequest, BindingError>;
}

/// 读取 (service, version, request) 三元组，`version` 缺省时取 `AcceptVersions` 的首项，都没有则为空串。
pub(crate) fn operation_context(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<OperationContext, BindingError> {
    let service = required(&lookup, "service")?;
    let operation = required(&lookup, "request")?;
    let version = lookup("version")
        .or_else(|| {
            lookup("acceptversions")
                .and_then(|versions| versions.split(',').next().map(|first| first.trim().to_owned()))
        })
        .unwrap_or_default();
    Ok(OperationContext::new(service, version, operation))
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, BindingError> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(BindingError::MissingParameter { name })
}

#[cfg(test)]
mod tests {
    use sos_dispatch::registry::Registration;
    use std::sync::Arc;

    use super::*;
    use crate::transport::MemoryRequest;

    #[test]
    fn get_requests_are_keyed_as_kvp() {
        let key = BindingKey::for_request(&MemoryRequest::get("service=SOS")).unwrap();
        assert_eq!(key, BindingKey::new(HttpMethod::Get, MediaType::APPLICATION_KVP));
    }

    #[test]
    fn content_type_parameters_do_not_affect_selection() {
        let request = MemoryRequest::post("text/xml; charset=UTF-8", "<a/>");
        let key = BindingKey::for_request(&request).unwrap();
        let registered = BindingKey::new(HttpMethod::Post, MediaType::APPLICATION_XML);
        assert_eq!(key.similarity_to(&registered), Similarity::EXACT);
        assert!(key.matches(&registered));
    }

    #[test]
    fn concrete_binding_beats_wildcard_fallback() {
        let registry: BindingRegistry = CapabilityRegistry::new("bindings");
        registry
            .register(Registration::new(
                [BindingKey::new(HttpMethod::Post, MediaType::ANY)],
                Arc::new(KvpBinding) as Arc<dyn Binding>,
            ))
            .unwrap();
        registry
            .register(Registration::new(
                [BindingKey::new(HttpMethod::Post, MediaType::APPLICATION_JSON)],
                Arc::new(JsonBinding) as Arc<dyn Binding>,
            ))
            .unwrap();

        let json = BindingKey::new(HttpMethod::Post, MediaType::APPLICATION_JSON);
        assert_eq!(registry.resolve(&json).map(|b| b.name().to_owned()).as_deref(), Some("json"));
        let other = BindingKey::new(HttpMethod::Post, MediaType::TEXT_PLAIN);
        assert_eq!(registry.resolve(&other).map(|b| b.name().to_owned()).as_deref(), Some("kvp"));
        let get = BindingKey::new(HttpMethod::Get, MediaType::APPLICATION_KVP);
        assert!(registry.resolve(&get).is_none());
    }

    #[test]
    fn malformed_content_type_is_a_client_error() {
        let request = MemoryRequest::post("xml", "<a/>");
        assert!(matches!(
            BindingKey::for_request(&request),
            Err(BindingError::ContentType { .. })
        ));
    }

    #[test]
    fn version_falls_back_to_first_accept_version() {
        let lookup = |name: &str| match name {
            "service" => Some("SOS".to_owned()),
            "request" => Some("GetCapabilities".to_owned()),
            "acceptversions" => Some("2.0.0, 1.0.0".to_owned()),
            _ => None,
        };
        let context = operation_context(lookup).unwrap();
        assert_eq!(context.version(), "2.0.0");
        assert_eq!(context.operation(), "GetCapabilities");
    }
}
