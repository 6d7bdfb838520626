//! 分发门面：以统一入口串联解码、编码、异常格式化、协商与原始写出。
//!
//! # 教案式解读
//! - **意图（Why）**：
//!   - 协议绑定只需面对一个对象：给它键和原始负载，它返回领域对象；给它领域对象和协商结果，它写出响应；
//!   - 门面不持有全局单例，由组合根通过 [`DispatchFacade::builder`] 构造后以 `Arc` 共享。
//! - **实现策略（How）**：
//!   - 三张注册表分别承载解码器、编码器（含异常格式化器）与写出器；
//!   - 组件清单保存在门面中，配置重载时按 `[activation]` 过滤后整体替换注册表内容。
//! - **契约（What）**：
//!   - 没有组件覆盖某个键时返回 `dispatch.unsupported_representation`（415）；
//!   - 已解析组件自身的失败原样透传。

use std::{borrow::Cow, fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    capability::{
        DecoderKey, EncoderKey, ExceptionFormatKey, OperationKey, TypeKey, TypeTag,
    },
    catalog::ComponentCatalog,
    codec::{Decoder, Encoder},
    error::{CoreError, Result},
    media::{AcceptList, MediaType, Negotiated},
    payload::{ExceptionReport, Payload, RawPayload},
    registry::CapabilityRegistry,
    settings::{DispatchSettings, SettingsHandle, SettingsSource},
    writer::{
        EncodedDocumentWriter, ExceptionReportWriter, JsonDocumentWriter, PreparedWrite,
        ResponseSink, ResponseWriter,
    },
};

/// 一次操作调用的身份：服务、版本与操作名。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationContext {
    service: Cow<'static, str>,
    version: Cow<'static, str>,
    operation: Cow<'static, str>,
}

impl OperationContext {
    pub fn new(
        service: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
        operation: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            operation: operation.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// 以给定媒体类型构造操作键。
    pub fn key(&self, media_type: MediaType) -> OperationKey {
        OperationKey::new(
            self.service.clone(),
            self.version.clone(),
            self.operation.clone(),
            media_type,
        )
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.version, self.operation)
    }
}

/// 解析引擎的统一入口。
pub struct DispatchFacade {
    decoders: CapabilityRegistry<DecoderKey, dyn Decoder>,
    encoders: CapabilityRegistry<EncoderKey, dyn Encoder>,
    writers: CapabilityRegistry<TypeKey, dyn ResponseWriter>,
    catalog: ComponentCatalog,
    settings: SettingsHandle,
}

impl DispatchFacade {
    pub fn builder() -> DispatchFacadeBuilder {
        DispatchFacadeBuilder::default()
    }

    /// 解析解码器。
    pub fn resolve_decoder(&self, key: &DecoderKey) -> Result<Arc<dyn Decoder>> {
        self.decoders.require(key)
    }

    /// 解析编码器（含异常格式化器）。
    pub fn resolve_encoder(&self, key: &EncoderKey) -> Result<Arc<dyn Encoder>> {
        self.encoders.require(key)
    }

    /// 按负载类型解析写出器，最具体的已注册类型胜出。
    pub fn resolve_writer(&self, tag: &'static TypeTag) -> Result<Arc<dyn ResponseWriter>> {
        self.writers.resolve_for_type(tag).ok_or_else(|| {
            CoreError::unsupported(format!("没有写出器支持负载类型 `{tag}`"))
        })
    }

    /// 解码请求：解析解码器并执行。
    pub fn decode_request(&self, key: &DecoderKey, raw: &RawPayload) -> Result<Box<dyn Payload>> {
        let decoder = self.resolve_decoder(key)?;
        debug!(key = %key, "解码请求");
        decoder.decode(raw)
    }

    /// 按协商结果编码响应。
    ///
    /// 查找键取 [`Negotiated::selected`]，即某个已注册编码器的类型，缓存条目数因此受注册表规模约束，
    /// 不随客户端 `Accept` 的写法增长；编码器收到的是 [`Negotiated::content_type`]。
    pub fn encode_negotiated(
        &self,
        context: &OperationContext,
        response: &dyn Payload,
        negotiated: &Negotiated,
    ) -> Result<Box<dyn Payload>> {
        let key = EncoderKey::from(context.key(negotiated.selected().clone()));
        let encoder = self.resolve_encoder(&key)?;
        debug!(key = %key, content_type = %negotiated.content_type(), "编码响应");
        encoder.encode(response, negotiated.content_type())
    }

    /// 以操作键编码响应。
    ///
    /// 查找键去除 `q`，编码器以等价表兼容的类型注册亦可命中。查找结果按键缓存，
    /// `media_type` 来自客户端输入时应改用 [`encode_negotiated`](Self::encode_negotiated)。
    pub fn encode_response(
        &self,
        context: &OperationContext,
        response: &dyn Payload,
        media_type: &MediaType,
    ) -> Result<Box<dyn Payload>> {
        let media_type = media_type.without_parameter("q");
        let key = EncoderKey::from(context.key(media_type.clone()));
        let encoder = self.resolve_encoder(&key)?;
        debug!(key = %key, "编码响应");
        encoder.encode(response, &media_type)
    }

    /// 编码异常报告；没有对应格式化器时返回报告本身，由内置写出器输出纯文本。
    pub fn encode_exception(
        &self,
        report: &ExceptionReport,
        media_type: &MediaType,
    ) -> Result<Box<dyn Payload>> {
        let media_type = media_type.without_parameter("q");
        let key = EncoderKey::from(ExceptionFormatKey::new(media_type.clone()));
        match self.encoders.resolve(&key) {
            Some(formatter) => formatter.encode(report, &media_type),
            None => {
                debug!(media_type = %media_type, "没有异常格式化器，回落到纯文本");
                Ok(Box::new(report.clone()))
            }
        }
    }

    /// 写出负载。
    ///
    /// # 逻辑解析（How）
    /// - 仅当客户端接受、配置开启且写出器支持时压缩；已知长度低于 `gzip_min_length` 时不压缩；
    /// - 头部声明、流关闭与 gzip 收尾见 [`PreparedWrite::write_to`]。
    pub fn write_raw(
        &self,
        payload: &dyn Payload,
        sink: &mut dyn ResponseSink,
        accepts_gzip: bool,
    ) -> Result<()> {
        self.prepare_write(payload, accepts_gzip)?.write_to(sink)
    }

    /// 解析写出器并确定头部，不触碰传输对象。
    ///
    /// 返回错误时响应仍可改写，常见为没有写出器的负载类型（415）。
    pub fn prepare_write<'a>(&self, payload: &'a dyn Payload, accepts_gzip: bool) -> Result<PreparedWrite<'a>> {
        let writer = self.resolve_writer(payload.type_tag())?;
        let settings = self.settings.load();
        let writer_gzip = writer.supports_gzip();
        PreparedWrite::new(writer, payload, |length| {
            let compress = accepts_gzip
                && settings.writer.gzip
                && writer_gzip
                && length.is_none_or(|length| length >= settings.writer.gzip_min_length);
            debug!(
                accepts_gzip,
                enabled = settings.writer.gzip,
                writer_gzip,
                compress,
                "压缩决策"
            );
            compress
        })
    }

    /// 某操作可生成的媒体类型，按编码器注册顺序去重。
    pub fn producible_media_types(&self, service: &str, version: &str, operation: &str) -> Vec<MediaType> {
        let mut types: Vec<MediaType> = Vec::new();
        for key in self.encoders.keys() {
            if let EncoderKey::Operation(key) = key
                && key.same_operation(service, version, operation)
                && !types.contains(key.media_type())
            {
                types.push(key.media_type().clone());
            }
        }
        types
    }

    /// 按当前配置解析 `Accept` 头。
    pub fn accept_list(&self, header: Option<&str>) -> Result<AcceptList> {
        AcceptList::parse(header, self.settings.load().negotiation.accept_policy)
    }

    /// 在可接受列表与可生成列表之间协商。
    pub fn negotiate(&self, accepted: &AcceptList, producible: &[MediaType]) -> Result<Negotiated> {
        self.settings.load().negotiator().negotiate(accepted, producible)
    }

    /// 针对某操作协商响应类型。
    pub fn negotiate_for(&self, context: &OperationContext, accept: Option<&str>) -> Result<Negotiated> {
        let accepted = self.accept_list(accept)?;
        let producible =
            self.producible_media_types(context.service(), context.version(), context.operation());
        self.negotiate(&accepted, &producible)
    }

    /// 重新读取配置并按新的启停设置替换注册表内容。
    ///
    /// 三张注册表先全部校验，全部通过后才逐一发布，校验失败时保留旧状态。
    /// 每张注册表的替换各自原子，但不构成一个整体快照：发布期间的读者可能短暂看到新旧混合的组合。
    pub fn reload(&self, source: &dyn SettingsSource) -> Result<()> {
        let settings = source.load()?;
        if settings.registry.duplicate_policy != self.decoders.policy() {
            warn!("duplicate_policy 仅在构建时生效，重载忽略该项");
        }
        let activation = &settings.activation;
        let decoders = self.catalog.active_decoders(activation);
        let encoders = self.catalog.active_encoders(activation);
        let writers = self.catalog.active_writers(activation);
        self.decoders.validate(decoders.iter().cloned())?;
        self.encoders.validate(encoders.iter().cloned())?;
        self.writers.validate(writers.iter().cloned())?;

        self.decoders.replace_all(decoders)?;
        self.encoders.replace_all(encoders)?;
        self.writers.replace_all(writers)?;
        self.settings.store(settings);
        info!(source = %source.name(), "分发门面已按新配置重载");
        Ok(())
    }

    pub fn settings(&self) -> Arc<DispatchSettings> {
        self.settings.load()
    }

    pub fn decoders(&self) -> &CapabilityRegistry<DecoderKey, dyn Decoder> {
        &self.decoders
    }

    pub fn encoders(&self) -> &CapabilityRegistry<EncoderKey, dyn Encoder> {
        &self.encoders
    }

    pub fn writers(&self) -> &CapabilityRegistry<TypeKey, dyn ResponseWriter> {
        &self.writers
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }
}

impl fmt::Debug for DispatchFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFacade")
            .field("decoders", &self.decoders)
            .field("encoders", &self.encoders)
            .field("writers", &self.writers)
            .finish_non_exhaustive()
    }
}

/// [`DispatchFacade`] 的组合根构建器。
///
/// ```rust
/// use std::sync::Arc;
/// use sos_dispatch::dispatch::DispatchFacade;
/// use sos_dispatch::capability::builtin;
///
/// let facade = DispatchFacade::builder().build().unwrap();
/// assert!(facade.resolve_writer(&builtin::JSON_DOCUMENT).is_ok());
/// let shared = Arc::new(facade);
/// assert_eq!(shared.writers().len(), 3);
/// ```
#[derive(Default)]
pub struct DispatchFacadeBuilder {
    settings: DispatchSettings,
    catalog: ComponentCatalog,
    skip_builtin_writers: bool,
}

impl DispatchFacadeBuilder {
    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn decoder(
        mut self,
        id: impl Into<Cow<'static, str>>,
        keys: impl IntoIterator<Item = impl Into<DecoderKey>>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        self.catalog
            .add_decoder(id, keys.into_iter().map(Into::into), decoder);
        self
    }

    pub fn encoder(
        mut self,
        id: impl Into<Cow<'static, str>>,
        keys: impl IntoIterator<Item = impl Into<EncoderKey>>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        self.catalog
            .add_encoder(id, keys.into_iter().map(Into::into), encoder);
        self
    }

    pub fn writer(mut self, id: impl Into<Cow<'static, str>>, writer: Arc<dyn ResponseWriter>) -> Self {
        self.catalog.add_writer(id, writer);
        self
    }

    /// 不登记内置写出器。
    pub fn without_builtin_writers(mut self) -> Self {
        self.skip_builtin_writers = true;
        self
    }

    /// 登记内置写出器（已有同类型写出器者跳过），按配置启停后填充注册表。
    pub fn build(self) -> Result<DispatchFacade> {
        let Self {
            settings,
            mut catalog,
            skip_builtin_writers,
        } = self;
        if !skip_builtin_writers {
            let builtins: [(&'static str, Arc<dyn ResponseWriter>); 3] = [
                ("builtin.encoded-document", Arc::new(EncodedDocumentWriter)),
                ("builtin.json-document", Arc::new(JsonDocumentWriter)),
                ("builtin.exception-report", Arc::new(ExceptionReportWriter)),
            ];
            for (id, writer) in builtins {
                if !catalog.has_writer_for(&TypeKey::new(writer.handled_type())) {
                    catalog.add_writer(id, writer);
                }
            }
        }

        let policy = settings.registry.duplicate_policy;
        let facade = DispatchFacade {
            decoders: CapabilityRegistry::with_policy("decoders", policy),
            encoders: CapabilityRegistry::with_policy("encoders", policy),
            writers: CapabilityRegistry::with_policy("writers", policy),
            settings: SettingsHandle::new(settings),
            catalog,
        };
        let settings = facade.settings.load();
        let activation = &settings.activation;
        facade
            .decoders
            .replace_all(facade.catalog.active_decoders(activation))?;
        facade
            .encoders
            .replace_all(facade.catalog.active_encoders(activation))?;
        facade
            .writers
            .replace_all(facade.catalog.active_writers(activation))?;
        info!(
            decoders = facade.decoders.len(),
            encoders = facade.encoders.len(),
            writers = facade.writers.len(),
            "分发门面构建完成"
        );
        Ok(facade)
    }
}
