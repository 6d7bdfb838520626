//! 解析引擎的运行期配置：协商策略、写出压缩、重复键策略与组件启停。
//!
//! ### 设计目的（Why）
//! - 协商对畸形 `Accept` 的容忍度、gzip 开关与阈值等属于部署决策，不应写死在代码中；
//! - 配置经 `ArcSwap` 发布，请求线程读取快照无需加锁，重载时整体替换。
//!
//! ### 契约说明（What）
//! - TOML 中缺省的段与字段取默认值，未知字段视为错误，避免拼写错误被静默忽略；
//! - `default_media_type` 必须是具体类型（不含通配）。
//!
//! ```rust
//! use sos_dispatch::settings::{DispatchSettings, SettingsSource, TomlSettingsSource};
//! use sos_dispatch::media::AcceptPolicy;
//!
//! let source = TomlSettingsSource::inline(r#"
//!     [negotiation]
//!     accept_policy = "strict"
//!     default_media_type = "application/xml"
//!
//!     [writer]
//!     gzip_min_length = 512
//! "#);
//! let settings: DispatchSettings = source.load().unwrap();
//! assert_eq!(settings.negotiation.accept_policy, AcceptPolicy::Strict);
//! assert!(settings.writer.gzip);
//! ```

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::{
    error::{CoreError, codes},
    media::{AcceptPolicy, ContentNegotiator, MediaType},
    registry::DuplicatePolicy,
};

/// 全部配置段。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
    pub negotiation: NegotiationSettings,
    pub writer: WriterSettings,
    pub registry: RegistrySettings,
    pub activation: ActivationSettings,
}

impl DispatchSettings {
    /// 按当前协商配置构造协商器。
    pub fn negotiator(&self) -> ContentNegotiator {
        match &self.negotiation.default_media_type {
            Some(media_type) => ContentNegotiator::new().with_default_media_type(media_type.clone()),
            None => ContentNegotiator::new(),
        }
    }

    fn validate(self) -> Result<Self, SettingsError> {
        if let Some(media_type) = &self.negotiation.default_media_type
            && media_type.has_wildcard()
        {
            return Err(SettingsError::Invalid(format!(
                "negotiation.default_media_type 不能含通配：`{media_type}`"
            )));
        }
        Ok(self)
    }
}

/// `[negotiation]` 段。
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NegotiationSettings {
    pub accept_policy: AcceptPolicy,
    #[serde(deserialize_with = "deserialize_media_type")]
    pub default_media_type: Option<MediaType>,
}

/// `[writer]` 段。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterSettings {
    /// 是否允许压缩响应；仍需客户端与写出器同时支持。
    pub gzip: bool,
    /// 已知长度低于该值的响应不压缩。
    pub gzip_min_length: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            gzip: true,
            gzip_min_length: 0,
        }
    }
}

/// `[registry]` 段。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    pub duplicate_policy: DuplicatePolicy,
}

/// `[activation]` 段：按组件标识停用组件。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivationSettings {
    pub disabled: Vec<String>,
}

impl ActivationSettings {
    pub fn is_enabled(&self, component_id: &str) -> bool {
        !self.disabled.iter().any(|id| id == component_id)
    }
}

fn deserialize_media_type<'de, D>(deserializer: D) -> Result<Option<MediaType>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| MediaType::parse(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

/// 配置读取失败。
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("读取配置文件 `{path}` 失败")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("配置 `{source_name}` 不是合法的 TOML")]
    Parse {
        source_name: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置取值非法：{0}")]
    Invalid(String),
}

impl From<SettingsError> for CoreError {
    fn from(error: SettingsError) -> Self {
        CoreError::new(codes::SETTINGS_INVALID, error.to_string()).with_cause(error)
    }
}

/// 配置来源。
///
/// ### 契约说明（What）
/// - `name` 为稳定标识（如文件路径），出现在日志与错误中；
/// - `load` 每次调用都重新读取，供重载使用。
pub trait SettingsSource: Send + Sync {
    fn name(&self) -> Cow<'_, str>;

    fn load(&self) -> Result<DispatchSettings, SettingsError>;
}

/// TOML 配置来源：内联文本或文件。
#[derive(Clone, Debug)]
pub enum TomlSettingsSource {
    Inline(String),
    File(PathBuf),
}

impl TomlSettingsSource {
    pub fn inline(text: impl Into<String>) -> Self {
        Self::Inline(text.into())
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    fn parse(&self, text: &str) -> Result<DispatchSettings, SettingsError> {
        toml::from_str::<DispatchSettings>(text)
            .map_err(|source| SettingsError::Parse {
                source_name: self.name().into_owned(),
                source,
            })?
            .validate()
    }
}

impl SettingsSource for TomlSettingsSource {
    fn name(&self) -> Cow<'_, str> {
        match self {
            Self::Inline(_) => Cow::Borrowed("inline"),
            Self::File(path) => path.to_string_lossy(),
        }
    }

    fn load(&self) -> Result<DispatchSettings, SettingsError> {
        match self {
            Self::Inline(text) => self.parse(text),
            Self::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
                    path: path.clone(),
                    source,
                })?;
                self.parse(&text)
            }
        }
    }
}

/// 已发布配置的共享句柄。
#[derive(Debug)]
pub struct SettingsHandle {
    current: ArcSwap<DispatchSettings>,
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(DispatchSettings::default())
    }
}

impl SettingsHandle {
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
        }
    }

    /// 当前快照。
    pub fn load(&self) -> Arc<DispatchSettings> {
        self.current.load_full()
    }

    pub fn store(&self, settings: DispatchSettings) {
        self.current.store(Arc::new(settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = TomlSettingsSource::inline("").load().unwrap();
        assert_eq!(settings, DispatchSettings::default());
        assert!(settings.writer.gzip);
        assert_eq!(settings.registry.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(settings.negotiation.accept_policy, AcceptPolicy::Lenient);
    }

    #[test]
    fn full_document_is_parsed() {
        let settings = TomlSettingsSource::inline(
            r#"
            [negotiation]
            accept_policy = "lenient"
            default_media_type = "Application/JSON"

            [writer]
            gzip = false

            [registry]
            duplicate_policy = "replace"

            [activation]
            disabled = ["sos-2.0-json"]
            "#,
        )
        .load()
        .unwrap();
        assert_eq!(
            settings.negotiation.default_media_type,
            Some(MediaType::APPLICATION_JSON)
        );
        assert!(!settings.writer.gzip);
        assert_eq!(settings.registry.duplicate_policy, DuplicatePolicy::Replace);
        assert!(!settings.activation.is_enabled("sos-2.0-json"));
        assert!(settings.activation.is_enabled("sos-2.0-kvp"));
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let unknown = TomlSettingsSource::inline("[writer]\ngzipp = true").load();
        assert!(matches!(unknown, Err(SettingsError::Parse { .. })));

        let wildcard =
            TomlSettingsSource::inline("[negotiation]\ndefault_media_type = \"*/*\"").load();
        assert!(matches!(wildcard, Err(SettingsError::Invalid(_))));

        let malformed =
            TomlSettingsSource::inline("[negotiation]\ndefault_media_type = \"xml\"").load();
        assert!(matches!(malformed, Err(SettingsError::Parse { .. })));

        let missing = TomlSettingsSource::file("/nonexistent/dispatch.toml").load();
        let err = CoreError::from(missing.unwrap_err());
        assert_eq!(err.code(), codes::SETTINGS_INVALID);
    }

    #[test]
    fn stored_snapshot_leaves_earlier_readers_untouched() {
        let handle = SettingsHandle::default();
        let before = handle.load();
        handle.store(TomlSettingsSource::inline("[writer]\ngzip = false").load().unwrap());
        assert!(before.writer.gzip);
        assert!(!handle.load().writer.gzip);
    }
}
