use bytes::Bytes;
use sos_dispatch::{media::MediaType, payload::RawPayload};
use tracing::debug;
use url::form_urlencoded;

use super::{Binding, BoundRequest, operation_context};
use crate::{
    error::BindingError,
    transport::{HttpMethod, TransportRequest},
};

/// KVP 绑定：GET 查询串或 POST 表单体。
///
/// # 逻辑解析（How）
/// - 以 `url::form_urlencoded` 解码键值对，保留出现顺序；参数名查找大小写不敏感；
/// - `service` 与 `request` 必填，据此构造媒体类型为 `application/x-kvp` 的操作键。
#[derive(Clone, Copy, Debug, Default)]
pub struct KvpBinding;

impl KvpBinding {
    pub fn parse(input: &[u8]) -> Vec<(String, String)> {
        form_urlencoded::parse(input).into_owned().collect()
    }
}

impl Binding for KvpBinding {
    fn name(&self) -> &str {
        "kvp"
    }

    fn bind(&self, request: &dyn TransportRequest, body: Bytes) -> Result<BoundRequest, BindingError> {
        let pairs = match request.method() {
            HttpMethod::Get => Self::parse(request.query().unwrap_or_default().as_bytes()),
            _ => Self::parse(&body),
        };
        let raw = RawPayload::Parameters(pairs);
        let context = operation_context(|name| raw.parameter(name).map(str::to_owned))?;
        debug!(operation = %context, parameters = ?raw, "KVP 请求已绑定");
        Ok(BoundRequest::new(self.name().to_owned(), context.key(MediaType::APPLICATION_KVP), raw)
            .with_context(context))
    }
}
