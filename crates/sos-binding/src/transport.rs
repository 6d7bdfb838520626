//! 宿主请求抽象。
//!
//! 绑定只依赖方法、头部、查询串与请求体四项能力，不绑定任何 Web 框架；
//! 宿主以适配器实现 [`TransportRequest`]，测试使用 [`MemoryRequest`]。

use std::fmt;

use bytes::Bytes;

/// 绑定关心的 HTTP 方法。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 宿主请求。
///
/// # 契约说明（What）
/// - `header` 名称大小写不敏感，多值头由宿主以逗号拼接后返回；
/// - `query` 为未解码的原始查询串（不含 `?`）；
/// - `body` 为传输层收到的原始字节，可能仍是 gzip 压缩形态。
pub trait TransportRequest {
    fn method(&self) -> HttpMethod;

    fn header(&self, name: &str) -> Option<&str>;

    fn query(&self) -> Option<&str>;

    fn body(&self) -> &Bytes;
}

/// 内存请求，供测试与嵌入式调用构造。
#[derive(Clone, Debug)]
pub struct MemoryRequest {
    method: HttpMethod,
    headers: Vec<(String, String)>,
    query: Option<String>,
    body: Bytes,
}

impl MemoryRequest {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            headers: Vec::new(),
            query: None,
            body: Bytes::new(),
        }
    }

    pub fn get(query: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get).with_query(query)
    }

    pub fn post(content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(HttpMethod::Post)
            .with_header(sos_dispatch::http::headers::CONTENT_TYPE, content_type)
            .with_body(body)
    }

    /// 追加头部；同名头按大小写不敏感覆盖。
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

impl TransportRequest for MemoryRequest {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn body(&self) -> &Bytes {
        &self.body
    }
}
