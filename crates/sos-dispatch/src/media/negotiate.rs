use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CoreError, Result, codes};

use super::{MediaType, media_type::split_unquoted};

/// `Accept` 头全部条目都无法解析时的处理策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptPolicy {
    /// 视为 `*/*`。
    #[default]
    Lenient,
    /// 以 `media_type.malformed`（400）拒绝请求。
    Strict,
}

/// 已解析、按权重排序的 `Accept` 列表。
///
/// # 设计背景（Why）
/// - 协商只关心“客户端按偏好顺序接受什么”，把文本解析与协商算法拆开，
///   便于协议绑定在协商前决定如何对待畸形头部；
/// - `q=0` 在 RFC 9110 中表示“不可接受”，具体类型的 `q=0` 被单独记录为排除项。
///
/// # 逻辑解析（How）
/// - 以逗号切分（引号内逗号不计），逐项调用 [`MediaType::parse`]；
/// - Java `HttpURLConnection` 默认头中的裸 `*`（`*; q=.2`）静默跳过，其余畸形条目记录 `warn!` 后跳过；
/// - 按 `q` 降序做稳定排序，同权重保持客户端书写顺序。
///
/// # 契约说明（What）
/// - `entries()` 不含 `q=0` 条目；为空时协商按 `*/*` 处理；
/// - 通配类型的 `q=0` 仅被丢弃，不参与排除。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AcceptList {
    entries: Vec<MediaType>,
    excluded: Vec<MediaType>,
}

impl AcceptList {
    /// 解析 `Accept` 头；`None` 或空白等价于 `*/*`。
    ///
    /// ```rust
    /// use sos_dispatch::media::{AcceptList, AcceptPolicy, MediaType};
    ///
    /// let list = AcceptList::parse(Some("application/json;q=0.1, text/xml"), AcceptPolicy::Lenient).unwrap();
    /// assert_eq!(list.entries()[0], MediaType::TEXT_XML);
    /// ```
    pub fn parse(header: Option<&str>, policy: AcceptPolicy) -> Result<Self> {
        let Some(header) = header.map(str::trim).filter(|text| !text.is_empty()) else {
            return Ok(Self::default());
        };

        let mut entries = Vec::new();
        let mut excluded = Vec::new();
        let mut considered = 0usize;
        let mut malformed = 0usize;
        for token in split_unquoted(header, ',') {
            let token = token.trim();
            if token.is_empty() || is_legacy_java_wildcard(token) {
                continue;
            }
            considered += 1;
            match MediaType::parse(token) {
                Ok(media_type) if media_type.quality() <= 0.0 => {
                    if !media_type.has_wildcard() {
                        excluded.push(media_type.without_parameter("q"));
                    }
                }
                Ok(media_type) => entries.push(media_type),
                Err(error) => {
                    malformed += 1;
                    warn!(token, %error, "跳过无法解析的 Accept 条目");
                }
            }
        }

        if considered > 0 && malformed == considered {
            match policy {
                AcceptPolicy::Strict => {
                    return Err(CoreError::new(
                        codes::MEDIA_TYPE_MALFORMED,
                        format!("Accept 头 `{header}` 没有任何可解析的条目"),
                    ));
                }
                AcceptPolicy::Lenient => {
                    debug!(header, "Accept 头全部畸形，按 */* 处理");
                    return Ok(Self::default());
                }
            }
        }

        Ok(Self::from_parts(entries, excluded))
    }

    /// 以已解析的类型构造，`q=0` 的条目按解析时的规则处理。
    pub fn from_types(types: impl IntoIterator<Item = MediaType>) -> Self {
        let (excluded, entries): (Vec<_>, Vec<_>) =
            types.into_iter().partition(|media_type| media_type.quality() <= 0.0);
        let excluded = excluded
            .into_iter()
            .filter(|media_type| !media_type.has_wildcard())
            .map(|media_type| media_type.without_parameter("q"))
            .collect();
        Self::from_parts(entries, excluded)
    }

    fn from_parts(mut entries: Vec<MediaType>, excluded: Vec<MediaType>) -> Self {
        entries.sort_by(|left, right| right.quality().total_cmp(&left.quality()));
        Self { entries, excluded }
    }

    /// 按偏好排序的可接受类型。
    pub fn entries(&self) -> &[MediaType] {
        &self.entries
    }

    /// 客户端以 `q=0` 明确拒绝的具体类型。
    pub fn excluded(&self) -> &[MediaType] {
        &self.excluded
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rejects(&self, candidate: &MediaType) -> bool {
        self.excluded
            .iter()
            .any(|excluded| excluded.is_compatible(candidate))
    }
}

/// `HttpURLConnection` 的默认 `Accept` 含 `*; q=.2`，裸 `*` 不是合法媒体范围。
fn is_legacy_java_wildcard(token: &str) -> bool {
    split_unquoted(token, ';')
        .first()
        .is_some_and(|range| range.trim() == "*")
}

/// 协商结果：选中的可生成类型、触发选中的客户端条目与应声明的 `Content-Type`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Negotiated {
    selected: MediaType,
    requested: MediaType,
    content_type: MediaType,
}

impl Negotiated {
    /// 选中的可生成类型，即编码器注册时使用的类型。
    pub fn selected(&self) -> &MediaType {
        &self.selected
    }

    /// 客户端条目（已去除 `q`）。
    pub fn requested(&self) -> &MediaType {
        &self.requested
    }

    /// 应在响应中声明的 `Content-Type`。
    ///
    /// 客户端条目为具体类型时声明其 `type/subtype`（例如编码器以 `application/xml` 注册，
    /// 客户端请求 `text/xml`，响应声明 `text/xml`），客户端附带的参数不进入响应；
    /// 含通配时声明选中的类型，保留其注册时的参数。
    pub fn content_type(&self) -> &MediaType {
        &self.content_type
    }

    fn new(selected: &MediaType, requested: &MediaType) -> Self {
        let content_type = if requested.has_wildcard() {
            selected.clone()
        } else {
            requested.without_parameters()
        };
        Self {
            selected: selected.clone(),
            requested: requested.without_parameter("q"),
            content_type,
        }
    }
}

/// `ContentNegotiator` 在客户端可接受列表与服务端可生成列表之间选出响应类型。
///
/// # 逻辑解析（How）
/// - 依客户端偏好顺序遍历条目，每个条目取可生成列表中第一个兼容且未被排除的类型；
/// - 条目含通配且配置了默认类型时，若默认类型可生成，则优先选择默认类型。
///
/// # 契约说明（What）
/// - **前置条件**：`producible` 的顺序即服务端偏好；
/// - **后置条件**：可生成列表为空或无兼容项时返回 `negotiation.no_acceptable`（406）。
#[derive(Clone, Debug, Default)]
pub struct ContentNegotiator {
    default_media_type: Option<MediaType>,
}

impl ContentNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置通配请求下的首选类型。
    pub fn with_default_media_type(mut self, media_type: MediaType) -> Self {
        self.default_media_type = Some(media_type);
        self
    }

    pub fn default_media_type(&self) -> Option<&MediaType> {
        self.default_media_type.as_ref()
    }

    /// 执行协商。
    ///
    /// ```rust
    /// use sos_dispatch::media::{AcceptList, ContentNegotiator, MediaType};
    ///
    /// let accepted = AcceptList::from_types([MediaType::ANY]);
    /// let negotiated = ContentNegotiator::new()
    ///     .negotiate(&accepted, &[MediaType::APPLICATION_XML, MediaType::APPLICATION_JSON])
    ///     .unwrap();
    /// assert_eq!(negotiated.content_type(), &MediaType::APPLICATION_XML);
    /// ```
    pub fn negotiate(&self, accepted: &AcceptList, producible: &[MediaType]) -> Result<Negotiated> {
        if producible.is_empty() {
            return Err(CoreError::not_acceptable("没有任何可生成的响应类型"));
        }
        let wildcard = [MediaType::ANY];
        let requested_entries = if accepted.is_empty() {
            &wildcard[..]
        } else {
            accepted.entries()
        };

        for requested in requested_entries {
            let mut candidates = producible
                .iter()
                .filter(|candidate| !accepted.rejects(candidate) && requested.is_compatible(candidate));
            let preferred = self
                .default_media_type
                .as_ref()
                .filter(|_| requested.has_wildcard())
                .and_then(|default| {
                    producible.iter().find(|candidate| {
                        candidate.is_compatible(default)
                            && !accepted.rejects(candidate)
                            && requested.is_compatible(candidate)
                    })
                });
            if let Some(selected) = preferred.or_else(|| candidates.next()) {
                debug!(requested = %requested, selected = %selected, "内容协商完成");
                return Ok(Negotiated::new(selected, requested));
            }
        }

        let accepted_text = join(requested_entries);
        let producible_text = join(producible);
        Err(CoreError::not_acceptable(format!(
            "可接受类型 [{accepted_text}] 与可生成类型 [{producible_text}] 无交集"
        )))
    }
}

fn join(types: &[MediaType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
