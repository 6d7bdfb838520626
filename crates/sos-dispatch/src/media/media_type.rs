use std::{borrow::Cow, fmt, str::FromStr};

use thiserror::Error;

use crate::error::{CoreError, codes};

/// `MediaType` 以 RFC 9110 `media-type` 语法描述一种表示形态：`type/subtype` 加有序参数表。
///
/// # 设计背景（Why）
/// - 操作键、异常格式化键与内容协商都以媒体类型为比较单元，且需要处理 `*` 通配、
///   `q` 权重与 `text/xml` ↔ `application/xml` 这类历史等价；
/// - 通过 `Cow<'static, str>` 兼容静态常量与运行时解析出的类型，常用类型以 `const` 提供零分配实例。
///
/// # 逻辑解析（How）
/// - [`parse`](Self::parse) 校验 token 字符集，小写化 `type`/`subtype` 与参数键，保留参数值原文（带引号者去引号）；
/// - [`is_compatible`](Self::is_compatible) 先查静态等价表，再比较通配与双方共有的非 `q` 参数；
/// - `with_*`/`without_*` 返回新值，实例本身不可变。
///
/// # 契约说明（What）
/// - `Eq`/`Hash` 为结构相等：`text/xml` 与 `application/xml` 不相等但兼容；
/// - `q` 缺省视为 `1.0`，解析时保证位于 `[0, 1]`；
/// - `Display` 输出可被 `parse` 还原的规范文本，参数以 `"; "` 分隔。
///
/// # 风险提示（Trade-offs）
/// - [`MediaType::new`] 不校验输入，仅供常量与可信代码使用；外部文本一律走 `parse`。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaType {
    main_type: Cow<'static, str>,
    subtype: Cow<'static, str>,
    parameters: Vec<(Cow<'static, str>, Cow<'static, str>)>,
}

/// 媒体类型文本解析失败的细分原因。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("媒体类型为空")]
    Empty,
    #[error("媒体类型 `{0}` 缺少 `/` 分隔符")]
    MissingSlash(String),
    #[error("媒体类型 `{input}` 含非法 token `{token}`")]
    InvalidToken { input: String, token: String },
    #[error("媒体类型 `{0}` 在主类型处使用通配但子类型不是通配")]
    WildcardType(String),
    #[error("媒体类型 `{input}` 的参数 `{parameter}` 不合法")]
    InvalidParameter { input: String, parameter: String },
    #[error("媒体类型 `{input}` 的权重 `{value}` 不在 [0, 1] 内")]
    InvalidQuality { input: String, value: String },
}

impl From<MediaTypeError> for CoreError {
    fn from(error: MediaTypeError) -> Self {
        CoreError::new(codes::MEDIA_TYPE_MALFORMED, error.to_string()).with_cause(error)
    }
}

const WILDCARD: &str = "*";
const QUALITY: &str = "q";

impl MediaType {
    pub const ANY: Self = Self::new_static("*", "*");
    pub const APPLICATION_XML: Self = Self::new_static("application", "xml");
    pub const TEXT_XML: Self = Self::new_static("text", "xml");
    pub const APPLICATION_JSON: Self = Self::new_static("application", "json");
    pub const APPLICATION_SOAP_XML: Self = Self::new_static("application", "soap+xml");
    pub const APPLICATION_KVP: Self = Self::new_static("application", "x-kvp");
    pub const TEXT_PLAIN: Self = Self::new_static("text", "plain");

    const fn new_static(main_type: &'static str, subtype: &'static str) -> Self {
        Self {
            main_type: Cow::Borrowed(main_type),
            subtype: Cow::Borrowed(subtype),
            parameters: Vec::new(),
        }
    }

    /// 以已知合法的 token 构造，不做校验；类型与子类型统一转为小写，与 [`parse`](Self::parse) 的结果一致。
    pub fn new(main_type: impl Into<Cow<'static, str>>, subtype: impl Into<Cow<'static, str>>) -> Self {
        Self {
            main_type: lowercase(main_type.into()),
            subtype: lowercase(subtype.into()),
            parameters: Vec::new(),
        }
    }

    /// 解析 `type/subtype; key=value` 文本。
    ///
    /// ```rust
    /// use sos_dispatch::media::MediaType;
    ///
    /// let parsed = MediaType::parse(" Text/XML ; Charset=\"UTF-8\" ; q=0.5").unwrap();
    /// assert_eq!(parsed.essence(), "text/xml");
    /// assert_eq!(parsed.parameter("charset"), Some("UTF-8"));
    /// assert_eq!(parsed.quality(), 0.5);
    /// assert!(MediaType::parse("*/xml").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MediaTypeError::Empty);
        }
        let mut segments = split_unquoted(trimmed, ';').into_iter();
        let range = segments.next().unwrap_or_default().trim();
        let Some((main_type, subtype)) = range.split_once('/') else {
            return Err(MediaTypeError::MissingSlash(trimmed.to_owned()));
        };
        let main_type = main_type.trim();
        let subtype = subtype.trim();
        for token in [main_type, subtype] {
            if token != WILDCARD && !is_token(token) {
                return Err(MediaTypeError::InvalidToken {
                    input: trimmed.to_owned(),
                    token: token.to_owned(),
                });
            }
        }
        if main_type == WILDCARD && subtype != WILDCARD {
            return Err(MediaTypeError::WildcardType(trimmed.to_owned()));
        }

        let mut parameters = Vec::new();
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let invalid = || MediaTypeError::InvalidParameter {
                input: trimmed.to_owned(),
                parameter: segment.to_owned(),
            };
            let (key, value) = segment.split_once('=').ok_or_else(invalid)?;
            let key = key.trim();
            if !is_token(key) {
                return Err(invalid());
            }
            let value = parse_parameter_value(value.trim()).ok_or_else(invalid)?;
            let key = key.to_ascii_lowercase();
            if key == QUALITY {
                parse_quality(&value).ok_or_else(|| MediaTypeError::InvalidQuality {
                    input: trimmed.to_owned(),
                    value: value.clone(),
                })?;
            }
            parameters.push((Cow::Owned(key), Cow::Owned(value)));
        }

        Ok(Self {
            main_type: Cow::Owned(main_type.to_ascii_lowercase()),
            subtype: Cow::Owned(subtype.to_ascii_lowercase()),
            parameters,
        })
    }

    pub fn main_type(&self) -> &str {
        &self.main_type
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// 不含参数的 `type/subtype`。
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.subtype)
    }

    /// 按声明顺序返回全部参数。
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(key, value)| (key.as_ref(), value.as_ref()))
    }

    /// 查找参数值，键大小写不敏感。
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_ref())
    }

    /// `q` 权重，缺省为 `1.0`。
    pub fn quality(&self) -> f32 {
        self.parameter(QUALITY)
            .and_then(parse_quality)
            .unwrap_or(1.0)
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.main_type == WILDCARD
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD
    }

    /// 主类型或子类型含通配。
    pub fn has_wildcard(&self) -> bool {
        self.is_wildcard_type() || self.is_wildcard_subtype()
    }

    /// 返回设置了参数的新值；同名参数被替换并保持原位置。
    pub fn with_parameter(
        &self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
    ) -> Self {
        let key = lowercase(key.into());
        let value = value.into();
        let mut next = self.clone();
        match next.parameters.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => next.parameters.push((key, value)),
        }
        next
    }

    /// 返回移除了某参数（全部同名项）的新值。
    pub fn without_parameter(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.parameters
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(key));
        next
    }

    /// 返回不带任何参数的新值。
    pub fn without_parameters(&self) -> Self {
        Self {
            main_type: self.main_type.clone(),
            subtype: self.subtype.clone(),
            parameters: Vec::new(),
        }
    }

    /// 兼容判定。
    ///
    /// # 契约说明（What）
    /// - 对称：`a.is_compatible(&b) == b.is_compatible(&a)`；
    /// - 不传递：等价表只声明成对关系；
    /// - 通配的主类型/子类型与任意值兼容；双方都声明的非 `q` 参数必须一致（值大小写不敏感）。
    ///
    /// ```rust
    /// use sos_dispatch::media::MediaType;
    ///
    /// assert!(MediaType::TEXT_XML.is_compatible(&MediaType::APPLICATION_XML));
    /// assert!(MediaType::ANY.is_compatible(&MediaType::APPLICATION_JSON));
    /// assert!(!MediaType::APPLICATION_JSON.is_compatible(&MediaType::APPLICATION_XML));
    /// ```
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        if !self.parameters_agree(other) {
            return false;
        }
        if Equivalences::STANDARD.are_equivalent(self, other) {
            return true;
        }
        let types_match = self.is_wildcard_type()
            || other.is_wildcard_type()
            || self.main_type == other.main_type;
        let subtypes_match = self.is_wildcard_subtype()
            || other.is_wildcard_subtype()
            || self.subtype == other.subtype;
        types_match && subtypes_match
    }

    /// 双方都带有的非 `q` 参数必须取值一致；同名参数重复出现时按取值集合比较。
    fn parameters_agree(&self, other: &MediaType) -> bool {
        self.values_found_in(other) && other.values_found_in(self)
    }

    fn values_found_in(&self, other: &MediaType) -> bool {
        self.parameters
            .iter()
            .filter(|(key, _)| key != QUALITY)
            .all(|(key, value)| {
                let mut theirs = other
                    .parameters
                    .iter()
                    .filter(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
                    .peekable();
                theirs.peek().is_none() || theirs.any(|(_, theirs)| theirs.eq_ignore_ascii_case(value))
            })
    }

    fn same_essence(&self, main_type: &str, subtype: &str) -> bool {
        self.main_type == main_type && self.subtype == subtype
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.subtype)?;
        for (key, value) in &self.parameters {
            write!(f, "; {key}=")?;
            if is_token(value) {
                f.write_str(value)?;
            } else {
                f.write_str("\"")?;
                for ch in value.chars() {
                    if ch == '"' || ch == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                f.write_str("\"")?;
            }
        }
        Ok(())
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// 静态、对称、不传递的媒体类型等价表。
///
/// 历史客户端会把 XML 响应声明为 `text/xml`，而编码器普遍以 `application/xml` 注册；
/// 该表让两者在兼容判定中互认，其余类型不受影响。
#[derive(Debug, Clone, Copy)]
pub struct Equivalences {
    pairs: &'static [((&'static str, &'static str), (&'static str, &'static str))],
}

impl Equivalences {
    pub const STANDARD: Self = Self {
        pairs: &[(("text", "xml"), ("application", "xml"))],
    };

    /// 两个类型是否在表中成对声明（顺序无关，忽略参数）。
    pub fn are_equivalent(&self, left: &MediaType, right: &MediaType) -> bool {
        self.pairs.iter().any(|((lt, ls), (rt, rs))| {
            (left.same_essence(lt, ls) && right.same_essence(rt, rs))
                || (left.same_essence(rt, rs) && right.same_essence(lt, ls))
        })
    }

    /// 与 `media_type` 等价的全部类型（不含其自身）。
    pub fn equivalents_of(&self, media_type: &MediaType) -> Vec<MediaType> {
        self.pairs
            .iter()
            .filter_map(|((lt, ls), (rt, rs))| {
                if media_type.same_essence(lt, ls) {
                    Some(MediaType::new(*rt, *rs))
                } else if media_type.same_essence(rt, rs) {
                    Some(MediaType::new(*lt, *ls))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// RFC 9110 `tchar`。
/// 仅在含大写字母时分配。
fn lowercase(text: Cow<'static, str>) -> Cow<'static, str> {
    if text.bytes().any(|byte| byte.is_ascii_uppercase()) {
        Cow::Owned(text.to_ascii_lowercase())
    } else {
        text
    }
}

fn is_tchar(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

pub(crate) fn is_token(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.bytes().all(is_tchar)
}

fn parse_parameter_value(raw: &str) -> Option<String> {
    if let Some(quoted) = raw.strip_prefix('"') {
        let inner = quoted.strip_suffix('"')?;
        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => value.push(chars.next()?),
                '"' => return None,
                other => value.push(other),
            }
        }
        Some(value)
    } else if is_token(raw) {
        Some(raw.to_owned())
    } else {
        None
    }
}

fn parse_quality(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|q| q.is_finite() && (0.0..=1.0).contains(q))
}

/// 按分隔符切分，忽略引号内（含转义）出现的分隔符。
pub(crate) fn split_unquoted(input: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (index, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                parts.push(&input[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let parsed = MediaType::parse("  APPLICATION/Soap+XML ;  Action = \"urn:a;b\" ").unwrap();
        assert_eq!(parsed.main_type(), "application");
        assert_eq!(parsed.subtype(), "soap+xml");
        assert_eq!(parsed.parameter("ACTION"), Some("urn:a;b"));
        assert_eq!(parsed.to_string(), "application/soap+xml; action=\"urn:a;b\"");
    }

    #[test]
    fn constructed_values_print_in_parseable_form() {
        let built = MediaType::new("Application", "XML").with_parameter("CharSet", "UTF-8");
        assert_eq!(built.essence(), "application/xml");
        assert_eq!(built.to_string(), "application/xml; charset=UTF-8");
        assert_eq!(MediaType::parse(&built.to_string()).unwrap(), built);
        assert_eq!(MediaType::new("text", "xml"), MediaType::TEXT_XML);
    }

    #[test]
    fn repeated_parameters_compare_as_value_sets() {
        let doubled = MediaType::parse("text/xml; charset=a; charset=b").unwrap();
        let single = MediaType::parse("text/xml; charset=a").unwrap();
        assert!(!doubled.is_compatible(&single));
        assert!(!single.is_compatible(&doubled));
        assert!(doubled.is_compatible(&doubled));

        let reordered = MediaType::parse("application/xml; charset=B; charset=A").unwrap();
        assert!(doubled.is_compatible(&reordered));
        assert!(reordered.is_compatible(&doubled));
        assert!(doubled.is_compatible(&MediaType::APPLICATION_XML));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(MediaType::parse("   "), Err(MediaTypeError::Empty));
        assert!(matches!(
            MediaType::parse("xml"),
            Err(MediaTypeError::MissingSlash(_))
        ));
        assert!(matches!(
            MediaType::parse("*/xml"),
            Err(MediaTypeError::WildcardType(_))
        ));
        assert!(matches!(
            MediaType::parse("text/x ml"),
            Err(MediaTypeError::InvalidToken { .. })
        ));
        assert!(matches!(
            MediaType::parse("text/xml; charset"),
            Err(MediaTypeError::InvalidParameter { .. })
        ));
        assert!(matches!(
            MediaType::parse("text/xml; q=1.5"),
            Err(MediaTypeError::InvalidQuality { .. })
        ));
        assert!(matches!(
            MediaType::parse("text/xml; q=abc"),
            Err(MediaTypeError::InvalidQuality { .. })
        ));
    }

    #[test]
    fn quality_defaults_and_short_forms() {
        assert_eq!(MediaType::APPLICATION_XML.quality(), 1.0);
        assert_eq!(MediaType::parse("*/*; q=.2").unwrap().quality(), 0.2);
    }

    #[test]
    fn parameter_editing_is_pure() {
        let base = MediaType::parse("text/xml; charset=utf-8; q=0.3").unwrap();
        let replaced = base.with_parameter("Charset", "latin1");
        assert_eq!(base.parameter("charset"), Some("utf-8"));
        assert_eq!(replaced.to_string(), "text/xml; charset=latin1; q=0.3");
        assert_eq!(base.without_parameter("q").to_string(), "text/xml; charset=utf-8");
        assert_eq!(base.without_parameters(), MediaType::TEXT_XML);
    }

    #[test]
    fn compatibility_respects_wildcards_parameters_and_equivalence() {
        let app_any = MediaType::parse("application/*").unwrap();
        assert!(app_any.is_compatible(&MediaType::APPLICATION_JSON));
        assert!(!app_any.is_compatible(&MediaType::TEXT_PLAIN));

        let utf8 = MediaType::parse("text/xml; charset=UTF-8").unwrap();
        let latin = MediaType::parse("application/xml; charset=latin1").unwrap();
        assert!(utf8.is_compatible(&MediaType::APPLICATION_XML));
        assert!(!utf8.is_compatible(&latin), "共有参数不一致时不兼容");

        let weighted = MediaType::parse("application/json; q=0.1").unwrap();
        assert!(weighted.is_compatible(&MediaType::APPLICATION_JSON));

        assert!(!MediaType::TEXT_XML.is_compatible(&MediaType::APPLICATION_SOAP_XML));
    }

    #[test]
    fn equivalence_table_lists_counterparts() {
        assert_eq!(
            Equivalences::STANDARD.equivalents_of(&MediaType::TEXT_XML),
            vec![MediaType::APPLICATION_XML]
        );
        assert!(Equivalences::STANDARD
            .equivalents_of(&MediaType::APPLICATION_JSON)
            .is_empty());
    }

    #[test]
    fn malformed_error_maps_to_bad_request() {
        let err = CoreError::from(MediaTypeError::Empty);
        assert_eq!(err.code(), codes::MEDIA_TYPE_MALFORMED);
        assert_eq!(err.status().code(), 400);
    }

    #[test]
    fn split_ignores_quoted_delimiters() {
        assert_eq!(
            split_unquoted("a; b=\"x;\\\"y\"; c", ';'),
            vec!["a", " b=\"x;\\\"y\"", " c"]
        );
    }
}
