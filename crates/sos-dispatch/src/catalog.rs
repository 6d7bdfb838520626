use std::{borrow::Cow, fmt, sync::Arc};

use crate::{
    capability::{DecoderKey, EncoderKey, TypeKey},
    codec::{Decoder, Encoder},
    registry::Registration,
    settings::ActivationSettings,
    writer::ResponseWriter,
};

/// 带稳定标识的组件注册。
pub struct Component<K, T: ?Sized> {
    id: Cow<'static, str>,
    registration: Registration<K, T>,
}

impl<K: Clone, T: ?Sized> Clone for Component<K, T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            registration: self.registration.clone(),
        }
    }
}

impl<K, T: ?Sized> Component<K, T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registration(&self) -> &Registration<K, T> {
        &self.registration
    }
}

/// `ComponentCatalog` 记录进程内全部可用组件，配置的 `[activation]` 决定其中哪些进入注册表。
///
/// # 设计背景（Why）
/// - 组件清单在组合根一次性声明，启停只改配置；重载时按新配置过滤后整体替换注册表内容；
/// - 以标识而非类型启停，便于运维在配置中直接引用日志里出现的组件名。
///
/// # 契约说明（What）
/// - 同一标识可出现在多个类别中（例如某编码模块同时提供解码器与编码器），启停一并生效；
/// - 内置写出器以 `builtin.` 前缀标识。
#[derive(Clone, Default)]
pub struct ComponentCatalog {
    decoders: Vec<Component<DecoderKey, dyn Decoder>>,
    encoders: Vec<Component<EncoderKey, dyn Encoder>>,
    writers: Vec<Component<TypeKey, dyn ResponseWriter>>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_decoder(
        &mut self,
        id: impl Into<Cow<'static, str>>,
        keys: impl IntoIterator<Item = DecoderKey>,
        decoder: Arc<dyn Decoder>,
    ) {
        self.decoders.push(Component {
            id: id.into(),
            registration: Registration::new(keys, decoder),
        });
    }

    pub fn add_encoder(
        &mut self,
        id: impl Into<Cow<'static, str>>,
        keys: impl IntoIterator<Item = EncoderKey>,
        encoder: Arc<dyn Encoder>,
    ) {
        self.encoders.push(Component {
            id: id.into(),
            registration: Registration::new(keys, encoder),
        });
    }

    /// 写出器以其 `handled_type` 为唯一键登记。
    pub fn add_writer(&mut self, id: impl Into<Cow<'static, str>>, writer: Arc<dyn ResponseWriter>) {
        let key = TypeKey::new(writer.handled_type());
        self.writers.push(Component {
            id: id.into(),
            registration: Registration::new([key], writer),
        });
    }

    /// 是否已有写出器覆盖该类型键。
    pub fn has_writer_for(&self, key: &TypeKey) -> bool {
        self.writers
            .iter()
            .any(|component| component.registration.keys().contains(key))
    }

    pub fn decoders(&self) -> &[Component<DecoderKey, dyn Decoder>] {
        &self.decoders
    }

    pub fn encoders(&self) -> &[Component<EncoderKey, dyn Encoder>] {
        &self.encoders
    }

    pub fn writers(&self) -> &[Component<TypeKey, dyn ResponseWriter>] {
        &self.writers
    }

    pub fn active_decoders(&self, activation: &ActivationSettings) -> Vec<Registration<DecoderKey, dyn Decoder>> {
        active(&self.decoders, activation)
    }

    pub fn active_encoders(&self, activation: &ActivationSettings) -> Vec<Registration<EncoderKey, dyn Encoder>> {
        active(&self.encoders, activation)
    }

    pub fn active_writers(
        &self,
        activation: &ActivationSettings,
    ) -> Vec<Registration<TypeKey, dyn ResponseWriter>> {
        active(&self.writers, activation)
    }
}

fn active<K: Clone, T: ?Sized>(
    components: &[Component<K, T>],
    activation: &ActivationSettings,
) -> Vec<Registration<K, T>> {
    components
        .iter()
        .filter(|component| activation.is_enabled(&component.id))
        .map(|component| component.registration.clone())
        .collect()
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("decoders", &self.decoders.iter().map(Component::id).collect::<Vec<_>>())
            .field("encoders", &self.encoders.iter().map(Component::id).collect::<Vec<_>>())
            .field("writers", &self.writers.iter().map(Component::id).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::builtin,
        writer::{EncodedDocumentWriter, JsonDocumentWriter},
    };

    #[test]
    fn activation_filters_by_component_id() {
        let mut catalog = ComponentCatalog::new();
        catalog.add_writer("builtin.encoded-document", Arc::new(EncodedDocumentWriter));
        catalog.add_writer("builtin.json-document", Arc::new(JsonDocumentWriter));

        let activation = ActivationSettings {
            disabled: vec!["builtin.json-document".to_owned()],
        };
        let active = catalog.active_writers(&activation);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].keys(), &[TypeKey::new(&builtin::ENCODED_DOCUMENT)]);
        assert!(catalog.has_writer_for(&TypeKey::new(&builtin::JSON_DOCUMENT)));
        assert_eq!(
            format!("{catalog:?}"),
            "ComponentCatalog { decoders: [], encoders: [], writers: [\"builtin.encoded-document\", \"builtin.json-document\"] }"
        );
    }
}
