//! 媒体类型与内容协商。
//!
//! - [`MediaType`]：解析、打印与兼容判定（含通配与 `text/xml` ↔ `application/xml` 等价）；
//! - [`AcceptList`] / [`ContentNegotiator`]：按客户端偏好选出响应类型。

mod media_type;
mod negotiate;

pub use media_type::{Equivalences, MediaType, MediaTypeError};
pub use negotiate::{AcceptList, AcceptPolicy, ContentNegotiator, Negotiated};
