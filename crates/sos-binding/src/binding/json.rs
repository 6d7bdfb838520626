use bytes::Bytes;
use serde_json::Value;
use sos_dispatch::{media::MediaType, payload::RawPayload};
use tracing::debug;

use super::{Binding, BoundRequest, operation_context};
use crate::{error::BindingError, transport::TransportRequest};

/// JSON 绑定。
///
/// # 契约说明（What）
/// - 请求体须为 JSON 对象，顶层 `service`、`request` 字段必填，`version` 可选；
/// - 原始负载保留完整文档，解码器自行反序列化领域字段。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBinding;

impl Binding for JsonBinding {
    fn name(&self) -> &str {
        "json"
    }

    fn bind(&self, _request: &dyn TransportRequest, body: Bytes) -> Result<BoundRequest, BindingError> {
        if body.is_empty() {
            return Err(BindingError::EmptyBody);
        }
        let document: Value = serde_json::from_slice(&body).map_err(BindingError::Json)?;
        let Value::Object(fields) = &document else {
            return Err(BindingError::InvalidParameter {
                name: "body",
                detail: "JSON 请求必须是对象".to_owned(),
            });
        };
        let context = operation_context(|name| match fields.get(name) {
            Some(Value::String(value)) => Some(value.clone()),
            _ => None,
        })?;
        debug!(operation = %context, "JSON 请求已绑定");
        let raw = RawPayload::document(MediaType::APPLICATION_JSON, body);
        Ok(BoundRequest::new(self.name().to_owned(), context.key(MediaType::APPLICATION_JSON), raw)
            .with_context(context))
    }
}
