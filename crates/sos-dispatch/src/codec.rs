//! 解码器与编码器契约，以及把闭包包装为对象层实现的适配器。

use std::{fmt, marker::PhantomData};

use crate::{
    error::Result,
    media::MediaType,
    payload::{Payload, RawPayload},
};

/// `Decoder` 把原始请求体转换为领域请求对象。
///
/// # 契约说明（What）
/// - **前置条件**：调用方已按请求构造 [`DecoderKey`](crate::capability::DecoderKey) 并解析出本实现；
/// - **错误语义**：格式错误应以 `binding.invalid_request` 等稳定错误码返回，解析核心原样透传。
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, raw: &RawPayload) -> Result<Box<dyn Payload>>;
}

/// `Encoder` 把领域对象（响应或异常报告）转换为可写出的负载。
///
/// # 契约说明（What）
/// - `media_type` 为协商后应声明的类型，实现应把它写入产出文档，使写出器据此声明 `Content-Type`；
/// - 异常格式化器同样实现本 trait，以 [`ExceptionFormatKey`](crate::capability::ExceptionFormatKey) 注册。
pub trait Encoder: Send + Sync + 'static {
    fn encode(&self, payload: &dyn Payload, media_type: &MediaType) -> Result<Box<dyn Payload>>;
}

/// 以闭包实现 [`Decoder`]。
///
/// # 风险提示（Trade-offs）
/// - 闭包捕获的状态须满足 `Send + Sync + 'static`。
pub struct FnDecoder<F> {
    name: &'static str,
    decode: F,
}

impl<F> FnDecoder<F>
where
    F: Fn(&RawPayload) -> Result<Box<dyn Payload>> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, decode: F) -> Self {
        Self { name, decode }
    }
}

impl<F> Decoder for FnDecoder<F>
where
    F: Fn(&RawPayload) -> Result<Box<dyn Payload>> + Send + Sync + 'static,
{
    fn decode(&self, raw: &RawPayload) -> Result<Box<dyn Payload>> {
        (self.decode)(raw)
    }
}

impl<F> fmt::Debug for FnDecoder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnDecoder").field(&self.name).finish()
    }
}

/// 以闭包实现 [`Encoder`]，闭包只接收具体负载类型 `P`。
///
/// 负载类型不符时返回 `dispatch.implementation_failed`：键已匹配但实现无法处理给定对象。
pub struct FnEncoder<P, F> {
    name: &'static str,
    encode: F,
    _payload: PhantomData<fn(&P)>,
}

impl<P, F> FnEncoder<P, F>
where
    P: Payload,
    F: Fn(&P, &MediaType) -> Result<Box<dyn Payload>> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, encode: F) -> Self {
        Self {
            name,
            encode,
            _payload: PhantomData,
        }
    }
}

impl<P, F> Encoder for FnEncoder<P, F>
where
    P: Payload,
    F: Fn(&P, &MediaType) -> Result<Box<dyn Payload>> + Send + Sync + 'static,
{
    fn encode(&self, payload: &dyn Payload, media_type: &MediaType) -> Result<Box<dyn Payload>> {
        let typed = payload.downcast_ref::<P>().ok_or_else(|| {
            crate::error::CoreError::implementation_failed(format!(
                "编码器 `{}` 无法处理类型为 `{}` 的负载",
                self.name,
                payload.type_tag()
            ))
        })?;
        (self.encode)(typed, media_type)
    }
}

impl<P, F> fmt::Debug for FnEncoder<P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnEncoder").field(&self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::codes,
        payload::{EncodedDocument, JsonDocument},
    };

    #[test]
    fn fn_encoder_rejects_foreign_payloads() {
        let encoder = FnEncoder::new("json", |doc: &JsonDocument, media: &MediaType| {
            Ok(Box::new(EncodedDocument::new(media.clone(), doc.value().to_string()))
                as Box<dyn Payload>)
        });
        let ok = encoder
            .encode(&JsonDocument::new(serde_json::json!([1])), &MediaType::APPLICATION_JSON)
            .unwrap();
        let encoded = ok.downcast_ref::<EncodedDocument>().unwrap();
        assert_eq!(encoded.body().as_ref(), b"[1]");

        let err = encoder
            .encode(
                &EncodedDocument::new(MediaType::TEXT_PLAIN, "x"),
                &MediaType::APPLICATION_JSON,
            )
            .unwrap_err();
        assert_eq!(err.code(), codes::IMPLEMENTATION_FAILED);
    }

    #[test]
    fn fn_decoder_delegates() {
        let decoder = FnDecoder::new("echo", |raw: &RawPayload| {
            Ok(Box::new(EncodedDocument::new(raw.media_type(), Vec::new())) as Box<dyn Payload>)
        });
        let decoded = decoder
            .decode(&RawPayload::Parameters(Vec::new()))
            .unwrap();
        assert_eq!(decoded.type_tag().name(), "core.EncodedDocument");
    }
}
