//! 能力描述符：类型标签与各类能力键。
//!
//! # 模块定位（Why）
//! - 解码器、编码器、异常格式化器与写出器都以“能处理什么”的键注册；本模块提供这些键及其相似度语义；
//! - 类型距离基于静态声明的 [`TypeTag`] 表计算，不依赖运行期类型内省。
//!
//! # 键种类一览（What）
//! | 键 | 组成 | 相似度 |
//! |----|------|--------|
//! | [`NamespaceTypeKey`] | 命名空间 + 负载类型 | 类型距离 |
//! | [`OperationKey`] | 服务 + 版本 + 操作 + 媒体类型 | 仅精确 |
//! | [`ExceptionFormatKey`] | 媒体类型 | 仅精确 |
//! | [`TypeKey`] | 负载类型 | 类型距离 |

mod key;
mod type_tag;

pub use key::{
    CapabilityKey, DecoderKey, EncoderKey, ExceptionFormatKey, NamespaceTypeKey, OperationKey,
    Similarity, TypeKey,
};
pub use type_tag::{TypeTag, builtin};
