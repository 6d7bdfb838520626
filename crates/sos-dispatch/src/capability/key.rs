use std::{borrow::Cow, fmt, hash::Hash};

use crate::media::MediaType;

use super::TypeTag;

/// 查找键与已注册键之间的相似度（特异性距离）。
///
/// # 设计背景（Why）
/// - 解析不是布尔过滤而是“特异性排序”：多个组件都愿意处理同一请求时，类型最具体者胜出；
/// - 以枚举替代魔法数字 `-1`，让“无关”在类型层面不可与合法分数比较大小。
///
/// # 契约说明（What）
/// - `Score(0)` 表示精确匹配，数值越大越泛化；
/// - `Unrelated` 表示不可匹配；[`as_signed`](Self::as_signed) 提供 `-1` 约定的数值视图供日志使用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Similarity {
    Score(u32),
    Unrelated,
}

impl Similarity {
    /// 精确匹配。
    pub const EXACT: Self = Self::Score(0);

    /// 由类型距离构造相似度。
    pub fn from_distance(distance: Option<u32>) -> Self {
        distance.map_or(Self::Unrelated, Self::Score)
    }

    /// 由布尔匹配构造相似度，用于“仅精确匹配”的键种类。
    pub fn exact_if(matched: bool) -> Self {
        if matched { Self::EXACT } else { Self::Unrelated }
    }

    pub fn is_exact(self) -> bool {
        self == Self::EXACT
    }

    pub fn is_related(self) -> bool {
        matches!(self, Self::Score(_))
    }

    /// 非负分数；无关时返回 `None`。
    pub fn score(self) -> Option<u32> {
        match self {
            Self::Score(score) => Some(score),
            Self::Unrelated => None,
        }
    }

    /// 数值视图：无关为 `-1`。
    pub fn as_signed(self) -> i64 {
        match self {
            Self::Score(score) => i64::from(score),
            Self::Unrelated => -1,
        }
    }
}

/// `CapabilityKey` 描述“某组件能处理何种输入/输出形态”。
///
/// # 设计背景（Why）
/// - 解码、编码、异常格式化与原始写出共享同一套解析引擎，差异只在键的种类；
/// - 以 trait 表达键的能力集合 {相等、哈希、相似度}，注册表对具体键种类保持泛型。
///
/// # 契约说明（What）
/// - `Eq`/`Hash` 为**结构相等**，用于解析缓存的键；
/// - [`similarity_to`](Self::similarity_to) 以 `self` 为查找键、`candidate` 为已注册键；
///   必须满足自反性：`k.similarity_to(&k) == Similarity::EXACT`；
/// - [`matches`](Self::matches)（兼容相等）当且仅当相似度为 0 时成立；
/// - “仅精确匹配”的键种类只允许返回 `EXACT` 或 `Unrelated`。
pub trait CapabilityKey: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// 计算查找键到候选键的相似度。
    fn similarity_to(&self, candidate: &Self) -> Similarity;

    /// 兼容相等：相似度为 0。
    fn matches(&self, candidate: &Self) -> bool {
        self.similarity_to(candidate).is_exact()
    }
}

/// 命名空间 + 负载类型键，XML 类负载的解码器以此注册。
///
/// 相似度：命名空间不同则无关；否则为查找类型泛化到候选类型的层数。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespaceTypeKey {
    namespace: Cow<'static, str>,
    payload_type: &'static TypeTag,
}

impl NamespaceTypeKey {
    pub fn new(namespace: impl Into<Cow<'static, str>>, payload_type: &'static TypeTag) -> Self {
        Self {
            namespace: namespace.into(),
            payload_type,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn payload_type(&self) -> &'static TypeTag {
        self.payload_type
    }
}

impl CapabilityKey for NamespaceTypeKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        if self.namespace != candidate.namespace {
            return Similarity::Unrelated;
        }
        Similarity::from_distance(self.payload_type.distance_to(candidate.payload_type))
    }
}

impl fmt::Display for NamespaceTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.payload_type)
    }
}

/// 服务 + 版本 + 操作 + 媒体类型键。
///
/// # 契约说明（What）
/// - 兼容相等要求 service/version/operation 完全相同，且媒体类型满足
///   [`MediaType::is_compatible`]（通配与等价表均计入）；
/// - 仅精确匹配：相似度为 `EXACT` 或 `Unrelated`。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationKey {
    service: Cow<'static, str>,
    version: Cow<'static, str>,
    operation: Cow<'static, str>,
    media_type: MediaType,
}

impl OperationKey {
    pub fn new(
        service: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
        operation: impl Into<Cow<'static, str>>,
        media_type: MediaType,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            operation: operation.into(),
            media_type,
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

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// 是否描述同一 (service, version, operation)，忽略媒体类型。
    pub fn same_operation(&self, service: &str, version: &str, operation: &str) -> bool {
        self.service == service && self.version == version && self.operation == operation
    }
}

impl CapabilityKey for OperationKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        Similarity::exact_if(
            candidate.same_operation(&self.service, &self.version, &self.operation)
                && self.media_type.is_compatible(&candidate.media_type),
        )
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} [{}]",
            self.service, self.version, self.operation, self.media_type
        )
    }
}

/// 异常格式化键：仅由媒体类型构成。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionFormatKey {
    media_type: MediaType,
}

impl ExceptionFormatKey {
    pub fn new(media_type: MediaType) -> Self {
        Self { media_type }
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }
}

impl CapabilityKey for ExceptionFormatKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        Similarity::exact_if(self.media_type.is_compatible(&candidate.media_type))
    }
}

impl fmt::Display for ExceptionFormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exception [{}]", self.media_type)
    }
}

/// 纯类型键，写出器注册表以处理类型注册。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeKey(&'static TypeTag);

impl TypeKey {
    pub fn new(tag: &'static TypeTag) -> Self {
        Self(tag)
    }

    pub fn tag(&self) -> &'static TypeTag {
        self.0
    }
}

impl CapabilityKey for TypeKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        Similarity::from_distance(self.0.distance_to(candidate.0))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)
    }
}

/// 解码器键：XML 类请求以命名空间键查找，KVP/JSON 类请求以操作键查找。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DecoderKey {
    Namespace(NamespaceTypeKey),
    Operation(OperationKey),
}

impl CapabilityKey for DecoderKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        match (self, candidate) {
            (Self::Namespace(lookup), Self::Namespace(registered)) => {
                lookup.similarity_to(registered)
            }
            (Self::Operation(lookup), Self::Operation(registered)) => {
                lookup.similarity_to(registered)
            }
            _ => Similarity::Unrelated,
        }
    }
}

impl fmt::Display for DecoderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace(key) => write!(f, "decoder {key}"),
            Self::Operation(key) => write!(f, "decoder {key}"),
        }
    }
}

impl From<NamespaceTypeKey> for DecoderKey {
    fn from(key: NamespaceTypeKey) -> Self {
        Self::Namespace(key)
    }
}

impl From<OperationKey> for DecoderKey {
    fn from(key: OperationKey) -> Self {
        Self::Operation(key)
    }
}

/// 编码器键：操作响应、异常报告或命名空间内的领域对象。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EncoderKey {
    Operation(OperationKey),
    Exception(ExceptionFormatKey),
    Namespace(NamespaceTypeKey),
}

impl CapabilityKey for EncoderKey {
    fn similarity_to(&self, candidate: &Self) -> Similarity {
        match (self, candidate) {
            (Self::Operation(lookup), Self::Operation(registered)) => {
                lookup.similarity_to(registered)
            }
            (Self::Exception(lookup), Self::Exception(registered)) => {
                lookup.similarity_to(registered)
            }
            (Self::Namespace(lookup), Self::Namespace(registered)) => {
                lookup.similarity_to(registered)
            }
            _ => Similarity::Unrelated,
        }
    }
}

impl fmt::Display for EncoderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(key) => write!(f, "encoder {key}"),
            Self::Exception(key) => write!(f, "encoder {key}"),
            Self::Namespace(key) => write!(f, "encoder {key}"),
        }
    }
}

impl From<OperationKey> for EncoderKey {
    fn from(key: OperationKey) -> Self {
        Self::Operation(key)
    }
}

impl From<ExceptionFormatKey> for EncoderKey {
    fn from(key: ExceptionFormatKey) -> Self {
        Self::Exception(key)
    }
}

impl From<NamespaceTypeKey> for EncoderKey {
    fn from(key: NamespaceTypeKey) -> Self {
        Self::Namespace(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare_type;
    use crate::media::MediaType;

    declare_type!(REQUEST = "k.Request");
    declare_type!(GET_THING = "k.GetThing" => [REQUEST]);

    const SOS: &str = "http://www.opengis.net/sos/2.0";

    #[test]
    fn namespace_key_scores_type_distance() {
        let lookup = NamespaceTypeKey::new(SOS, &GET_THING);
        assert_eq!(lookup.similarity_to(&lookup), Similarity::EXACT);
        assert_eq!(
            lookup.similarity_to(&NamespaceTypeKey::new(SOS, &REQUEST)),
            Similarity::Score(1)
        );
        assert_eq!(
            lookup.similarity_to(&NamespaceTypeKey::new("urn:other", &GET_THING)),
            Similarity::Unrelated
        );
        assert_eq!(Similarity::Unrelated.as_signed(), -1);
    }

    #[test]
    fn operation_key_matches_through_equivalent_media_types() {
        let registered = OperationKey::new("X", "1.0", "GetThing", MediaType::APPLICATION_XML);
        let lookup = OperationKey::new("X", "1.0", "GetThing", MediaType::TEXT_XML);
        assert!(lookup.matches(&registered));
        assert_ne!(lookup, registered, "结构相等仍然区分媒体类型");

        let json = OperationKey::new("X", "1.0", "GetThing", MediaType::APPLICATION_JSON);
        assert_eq!(json.similarity_to(&registered), Similarity::Unrelated);

        let other_version = OperationKey::new("X", "2.0", "GetThing", MediaType::APPLICATION_XML);
        assert!(!other_version.matches(&registered));
    }

    #[test]
    fn cross_variant_keys_are_unrelated() {
        let decoder_ns = DecoderKey::from(NamespaceTypeKey::new(SOS, &GET_THING));
        let decoder_op = DecoderKey::from(OperationKey::new(
            "X",
            "1.0",
            "GetThing",
            MediaType::APPLICATION_KVP,
        ));
        assert_eq!(decoder_ns.similarity_to(&decoder_op), Similarity::Unrelated);

        let exception = EncoderKey::from(ExceptionFormatKey::new(MediaType::APPLICATION_XML));
        assert!(exception.matches(&EncoderKey::from(ExceptionFormatKey::new(
            MediaType::TEXT_XML
        ))));
    }
}
