//! HTTP 邻接常量：状态码表、头部名称与 `Accept-Encoding` 解析。
//!
//! # 设计背景（Why）
//! - 解析核心不依赖宿主 Web 框架，但协议绑定需要以统一方式把协商/解析失败映射为响应状态；
//! - 头部名称集中声明，避免各绑定拼写漂移（例如 `Content-Encoding` 与 `content-encoding`）。

use core::fmt;

/// 标准 HTTP 状态码及其类别谓词。
///
/// # 契约说明（What）
/// - 内部仅保存三位状态码，`reason()` 返回 RFC 9110 的标准短语，未知码返回空串；
/// - 类别谓词只依据百位数字判断，与是否在常量表中登记无关。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HttpStatus(u16);

impl HttpStatus {
    pub const CONTINUE: Self = Self(100);
    pub const OK: Self = Self(200);
    pub const CREATED: Self = Self(201);
    pub const ACCEPTED: Self = Self(202);
    pub const NO_CONTENT: Self = Self(204);
    pub const MOVED_PERMANENTLY: Self = Self(301);
    pub const FOUND: Self = Self(302);
    pub const NOT_MODIFIED: Self = Self(304);
    pub const BAD_REQUEST: Self = Self(400);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const NOT_ACCEPTABLE: Self = Self(406);
    pub const CONFLICT: Self = Self(409);
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(415);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const NOT_IMPLEMENTED: Self = Self(501);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// 以任意三位码构造状态。
    pub const fn from_code(code: u16) -> Self {
        Self(code)
    }

    /// 返回数值形式。
    pub const fn code(self) -> u16 {
        self.0
    }

    pub const fn is_informational(self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    pub const fn is_redirection(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    pub const fn is_client_error(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    pub const fn is_server_error(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// 客户端或服务端错误。
    pub const fn is_error(self) -> bool {
        self.is_client_error() || self.is_server_error()
    }

    /// 标准原因短语。
    pub const fn reason(self) -> &'static str {
        match self.0 {
            100 => "Continue",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            409 => "Conflict",
            413 => "Content Too Large",
            415 => "Unsupported Media Type",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "",
        }
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// 绑定层消费的头部名称。
pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const SOAP_ACTION: &str = "SOAPAction";
}

/// `gzip` 内容编码标识。
pub const GZIP: &str = "gzip";

/// 判断 `Accept-Encoding` 是否允许 gzip。
///
/// # 行为逻辑（How）
/// - 逗号切分后逐项比较编码名（大小写不敏感），`x-gzip` 视为同义词，`*` 视为通配；
/// - 若该项带有 `q=0`，视为显式拒绝。
///
/// ```rust
/// use sos_dispatch::http::accepts_gzip;
///
/// assert!(accepts_gzip(Some("deflate, gzip;q=0.5")));
/// assert!(!accepts_gzip(Some("gzip;q=0")));
/// assert!(!accepts_gzip(None));
/// ```
pub fn accepts_gzip(header: Option<&str>) -> bool {
    let Some(header) = header else {
        return false;
    };
    header.split(',').any(|token| {
        let mut parts = token.split(';');
        let coding = parts.next().unwrap_or_default().trim();
        let named = coding.eq_ignore_ascii_case(GZIP)
            || coding.eq_ignore_ascii_case("x-gzip")
            || coding == "*";
        if !named {
            return false;
        }
        !parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("q=")
                .or_else(|| param.strip_prefix("Q="))
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        })
    })
}

/// 判断 `Content-Encoding` 是否声明请求体为 gzip。
pub fn is_gzip_encoded(header: Option<&str>) -> bool {
    header.is_some_and(|value| {
        value
            .split(',')
            .any(|coding| coding.trim().eq_ignore_ascii_case(GZIP))
    })
}
