//! # HTTP 交换流程
//!
//! ## 角色定位（Why）
//! - 把一次 HTTP 请求串成完整链路：选择绑定 → 解码 → 业务处理 → 协商 → 编码 → 写出；
//! - 任一环节失败都折算为 HTTP 状态，并尽量以客户端可读的格式渲染异常报告。
//!
//! ## 逻辑解析（How）
//! 1. 以 [`BindingKey::for_request`] 选择绑定，未命中时区分 405 与 415；
//! 2. `Content-Encoding: gzip` 的请求体先解压；
//! 3. 绑定产出解码键与原始负载，交由 [`DispatchFacade::decode_request`]；
//! 4. [`OperationHandler`] 给出响应及其所属操作；按 `Accept` 协商后编码；
//! 5. `Accept-Encoding` 决定是否压缩；写出器与头部经 [`DispatchFacade::prepare_write`] 确定后才设置状态。
//!
//! ## 契约（What）
//! - `handle` 返回 `Ok` 表示已写出一个响应（成功或异常报告）；返回 `Err` 仅在异常报告本身也无法写出，
//!   或输出流打开之后写出失败时发生；
//! - 输出流打开之前的任何失败（包括编码结果没有写出器）都改写为异常报告。

use std::{io::Read, sync::Arc};

use bytes::Bytes;
use flate2::read::GzDecoder;
use sos_dispatch::{
    DispatchFacade, OperationContext, Payload,
    error::{CoreError, Result},
    http::{HttpStatus, accepts_gzip, headers, is_gzip_encoded},
    media::MediaType,
    payload::ExceptionReport,
    registry::{CapabilityRegistry, Registration},
    writer::ResponseSink,
};
use tracing::{debug, info_span, warn};

use crate::{
    binding::{
        Binding, BindingKey, BindingRegistry, BoundRequest, DocumentProbe, JsonBinding, KvpBinding,
        XmlBinding, form_urlencoded,
    },
    error::BindingError,
    transport::{HttpMethod, TransportRequest},
};

/// 业务处理结果：响应负载及其所属操作。
#[derive(Debug)]
pub struct HandledResponse {
    context: OperationContext,
    payload: Box<dyn Payload>,
}

impl HandledResponse {
    pub fn new(context: OperationContext, payload: Box<dyn Payload>) -> Self {
        Self { context, payload }
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }
}

/// 业务处理器。
///
/// 处理器收到已解码的请求负载，必须说明响应属于哪个操作：XML 请求的操作信息只存在于文档内部，
/// 绑定层无法得知。
pub trait OperationHandler: Send + Sync + 'static {
    fn handle(&self, request: &BoundRequest, payload: &dyn Payload) -> Result<HandledResponse>;
}

impl<F> OperationHandler for F
where
    F: Fn(&BoundRequest, &dyn Payload) -> Result<HandledResponse> + Send + Sync + 'static,
{
    fn handle(&self, request: &BoundRequest, payload: &dyn Payload) -> Result<HandledResponse> {
        self(request, payload)
    }
}

/// HTTP 交换。
pub struct HttpExchange {
    facade: Arc<DispatchFacade>,
    bindings: BindingRegistry,
    handler: Arc<dyn OperationHandler>,
}

impl HttpExchange {
    /// 不含任何绑定的交换，绑定经 [`register_binding`](Self::register_binding) 追加。
    pub fn new(facade: Arc<DispatchFacade>, handler: Arc<dyn OperationHandler>) -> Self {
        Self {
            facade,
            bindings: CapabilityRegistry::new("bindings"),
            handler,
        }
    }

    /// 注册 KVP（GET 与 POST 表单）、JSON 与 POX/SOAP 绑定。
    pub fn with_standard_bindings(
        facade: Arc<DispatchFacade>,
        handler: Arc<dyn OperationHandler>,
        probe: Arc<dyn DocumentProbe>,
    ) -> Result<Self> {
        let exchange = Self::new(facade, handler);
        exchange.bindings.register_all([
            Registration::new(
                [
                    BindingKey::new(HttpMethod::Get, MediaType::APPLICATION_KVP),
                    BindingKey::new(HttpMethod::Post, form_urlencoded()),
                ],
                Arc::new(KvpBinding) as Arc<dyn Binding>,
            ),
            Registration::new(
                [BindingKey::new(HttpMethod::Post, MediaType::APPLICATION_JSON)],
                Arc::new(JsonBinding) as Arc<dyn Binding>,
            ),
            Registration::new(XmlBinding::keys(), Arc::new(XmlBinding::new(probe)) as Arc<dyn Binding>),
        ])?;
        Ok(exchange)
    }

    pub fn register_binding(
        &self,
        keys: impl IntoIterator<Item = BindingKey>,
        binding: Arc<dyn Binding>,
    ) -> Result<()> {
        self.bindings.register(Registration::new(keys, binding))
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn facade(&self) -> &Arc<DispatchFacade> {
        &self.facade
    }

    /// 处理一次请求并写出响应。
    pub fn handle(&self, request: &dyn TransportRequest, sink: &mut dyn ResponseSink) -> Result<()> {
        let span = info_span!("sos.exchange", method = %request.method());
        let _entered = span.enter();
        let gzip = accepts_gzip(request.header(headers::ACCEPT_ENCODING));
        let encoded = match self.respond(request) {
            Ok(encoded) => encoded,
            Err(error) => return self.fail(request, sink, &error, gzip),
        };
        match self.facade.prepare_write(encoded.as_ref(), gzip) {
            Ok(prepared) => {
                sink.set_status(HttpStatus::OK);
                prepared.write_to(sink)
            }
            Err(error) => self.fail(request, sink, &error, gzip),
        }
    }

    fn respond(&self, request: &dyn TransportRequest) -> Result<Box<dyn Payload>> {
        let key = BindingKey::for_request(request)?;
        let binding = self
            .bindings
            .resolve(&key)
            .ok_or_else(|| self.unbound(&key))?;
        let body = inflate(request)?;
        let bound = binding.bind(request, body)?;
        debug!(binding = bound.binding(), key = %bound.key(), "请求已绑定");

        let payload = self.facade.decode_request(bound.key(), bound.raw())?;
        let handled = self.handler.handle(&bound, payload.as_ref())?;
        let negotiated = self
            .facade
            .negotiate_for(handled.context(), request.header(headers::ACCEPT))?;
        debug!(
            operation = %handled.context(),
            content_type = %negotiated.content_type(),
            "响应类型已协商"
        );
        self.facade
            .encode_negotiated(handled.context(), handled.payload(), &negotiated)
    }

    /// 绑定未命中：若该方法有任何绑定则为 415，否则为 405。
    fn unbound(&self, key: &BindingKey) -> CoreError {
        let method_known = self
            .bindings
            .keys()
            .iter()
            .any(|registered| registered.method() == key.method());
        if method_known {
            BindingError::Unsupported {
                method: key.method(),
                media_type: key.media_type().clone(),
            }
            .into()
        } else {
            BindingError::MethodNotAllowed {
                method: key.method(),
            }
            .into()
        }
    }

    fn fail(
        &self,
        request: &dyn TransportRequest,
        sink: &mut dyn ResponseSink,
        error: &CoreError,
        gzip: bool,
    ) -> Result<()> {
        let status = error.status();
        if status.is_server_error() {
            warn!(code = error.code(), %status, error = %error, "请求处理失败");
        } else {
            debug!(code = error.code(), %status, error = %error, "请求被拒绝");
        }
        let report = ExceptionReport::from_error(error);
        let media_type = self.exception_media_type(request);
        let encoded = self.facade.encode_exception(&report, &media_type)?;
        let prepared = self.facade.prepare_write(encoded.as_ref(), gzip)?;
        sink.set_status(status);
        prepared.write_to(sink)
    }

    /// 异常报告的目标格式。
    ///
    /// 依次尝试：`Accept` 中权重最高的具体类型、请求体的媒体类型、配置的默认类型，最后为 `application/xml`。
    fn exception_media_type(&self, request: &dyn TransportRequest) -> MediaType {
        let accepted = self
            .facade
            .accept_list(request.header(headers::ACCEPT))
            .ok()
            .and_then(|list| {
                list.entries()
                    .iter()
                    .filter(|media| !media.has_wildcard())
                    .fold(None::<&MediaType>, |best, media| match best {
                        Some(best) if best.quality() >= media.quality() => Some(best),
                        _ => Some(media),
                    })
                    .cloned()
            });
        if let Some(media_type) = accepted {
            return media_type;
        }
        let requested = BindingKey::for_request(request)
            .ok()
            .map(|key| key.media_type().clone())
            .filter(|media| {
                !media.is_compatible(&MediaType::APPLICATION_KVP)
                    && !media.is_compatible(&form_urlencoded())
                    && media.essence() != "application/octet-stream"
            });
        requested
            .or_else(|| self.facade.settings().negotiation.default_media_type.clone())
            .unwrap_or(MediaType::APPLICATION_XML)
    }
}

/// 解压 `Content-Encoding: gzip` 的请求体。
fn inflate(request: &dyn TransportRequest) -> Result<Bytes, BindingError> {
    let body = request.body();
    if !is_gzip_encoded(request.header(headers::CONTENT_ENCODING)) {
        return Ok(body.clone());
    }
    let mut inflated = Vec::new();
    GzDecoder::new(body.as_ref())
        .read_to_end(&mut inflated)
        .map_err(BindingError::Inflate)?;
    debug!(compressed = body.len(), inflated = inflated.len(), "请求体已解压");
    Ok(Bytes::from(inflated))
}
