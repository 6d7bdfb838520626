use std::{borrow::Cow, fmt, sync::Arc};

use bytes::Bytes;
use sos_dispatch::{
    TypeTag,
    capability::NamespaceTypeKey,
    http::headers,
    media::MediaType,
    payload::RawPayload,
};
use tracing::debug;

use super::{Binding, BindingKey, BoundRequest};
use crate::{error::BindingError, transport::TransportRequest};

/// XML 请求的封装形式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XmlFlavor {
    /// 裸 XML 文档。
    Pox,
    /// SOAP 1.1：`text/xml` 且带 `SOAPAction` 头。
    Soap11,
    /// SOAP 1.2：`application/soap+xml`。
    Soap12,
}

impl XmlFlavor {
    fn detect(media_type: &MediaType, request: &dyn TransportRequest) -> Self {
        if media_type.is_compatible(&MediaType::APPLICATION_SOAP_XML) {
            Self::Soap12
        } else if request.header(headers::SOAP_ACTION).is_some() {
            Self::Soap11
        } else {
            Self::Pox
        }
    }
}

impl fmt::Display for XmlFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pox => "pox",
            Self::Soap11 => "soap-1.1",
            Self::Soap12 => "soap-1.2",
        })
    }
}

/// 探测结果：操作元素的命名空间与对应的负载类型。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbedDocument {
    namespace: Cow<'static, str>,
    payload_type: &'static TypeTag,
}

impl ProbedDocument {
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

/// 文档探测器，由编组层提供。
///
/// # 契约说明（What）
/// - SOAP 形式下应报告 `Body` 内第一个子元素，而非信封本身；
/// - 无法识别时返回 [`BindingError::Document`]。
pub trait DocumentProbe: Send + Sync + 'static {
    fn probe(&self, document: &[u8], flavor: XmlFlavor) -> Result<ProbedDocument, BindingError>;
}

/// POX / SOAP 绑定：按根元素的 (命名空间, 类型) 构造解码键。
#[derive(Clone)]
pub struct XmlBinding {
    probe: Arc<dyn DocumentProbe>,
}

impl XmlBinding {
    pub fn new(probe: Arc<dyn DocumentProbe>) -> Self {
        Self { probe }
    }

    /// 本绑定默认覆盖的选择键；`text/xml` 经等价表与 `application/xml` 命中同一键。
    pub fn keys() -> [BindingKey; 2] {
        use crate::transport::HttpMethod::Post;
        [
            BindingKey::new(Post, MediaType::APPLICATION_XML),
            BindingKey::new(Post, MediaType::APPLICATION_SOAP_XML),
        ]
    }
}

impl fmt::Debug for XmlBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlBinding").finish_non_exhaustive()
    }
}

impl Binding for XmlBinding {
    fn name(&self) -> &str {
        "xml"
    }

    fn bind(&self, request: &dyn TransportRequest, body: Bytes) -> Result<BoundRequest, BindingError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(BindingError::EmptyBody);
        }
        let media_type = BindingKey::for_request(request)?.media_type().clone();
        let flavor = XmlFlavor::detect(&media_type, request);
        let probed = self.probe.probe(&body, flavor)?;
        debug!(
            %flavor,
            namespace = probed.namespace(),
            payload_type = %probed.payload_type(),
            "XML 请求已绑定"
        );
        let key = NamespaceTypeKey::new(probed.namespace.clone(), probed.payload_type);
        Ok(BoundRequest::new(
            self.name().to_owned(),
            key,
            RawPayload::document(media_type, body),
        ))
    }
}

#[cfg(test)]
mod tests {
    use sos_dispatch::{capability::DecoderKey, declare_type};

    use super::*;
    use crate::transport::MemoryRequest;

    declare_type!(INSERT_OBSERVATION = "sos.InsertObservation");

    struct FixedProbe;

    impl DocumentProbe for FixedProbe {
        fn probe(&self, document: &[u8], flavor: XmlFlavor) -> Result<ProbedDocument, BindingError> {
            let text = std::str::from_utf8(document).map_err(|error| BindingError::Document {
                detail: error.to_string(),
            })?;
            let namespace = match flavor {
                XmlFlavor::Pox => "urn:pox",
                XmlFlavor::Soap11 => "urn:soap11",
                XmlFlavor::Soap12 => "urn:soap12",
            };
            if text.contains("InsertObservation") {
                Ok(ProbedDocument::new(namespace, &INSERT_OBSERVATION))
            } else {
                Err(BindingError::Document {
                    detail: "unknown root".to_owned(),
                })
            }
        }
    }

    fn bind(request: MemoryRequest) -> Result<BoundRequest, BindingError> {
        let body = request.body().clone();
        XmlBinding::new(Arc::new(FixedProbe)).bind(&request, body)
    }

    fn namespace_of(bound: &BoundRequest) -> &str {
        match bound.key() {
            DecoderKey::Namespace(key) => key.namespace(),
            DecoderKey::Operation(_) => panic!("XML 必须以命名空间键解码"),
        }
    }

    #[test]
    fn flavor_follows_media_type_and_soap_action() {
        let pox = bind(MemoryRequest::post("application/xml", "<InsertObservation/>")).unwrap();
        assert_eq!(namespace_of(&pox), "urn:pox");
        assert!(pox.context().is_none());

        let soap11 = bind(
            MemoryRequest::post("text/xml; charset=utf-8", "<Envelope><InsertObservation/></Envelope>")
                .with_header(headers::SOAP_ACTION, "\"\""),
        )
        .unwrap();
        assert_eq!(namespace_of(&soap11), "urn:soap11");
        assert_eq!(soap11.raw().media_type(), MediaType::TEXT_XML);

        let soap12 = bind(MemoryRequest::post(
            "application/soap+xml",
            "<Envelope><InsertObservation/></Envelope>",
        ))
        .unwrap();
        assert_eq!(namespace_of(&soap12), "urn:soap12");
    }

    #[test]
    fn blank_and_unknown_documents_are_rejected() {
        assert!(matches!(
            bind(MemoryRequest::post("application/xml", "  \n")),
            Err(BindingError::EmptyBody)
        ));
        assert!(matches!(
            bind(MemoryRequest::post("application/xml", "<Other/>")),
            Err(BindingError::Document { .. })
        ));
    }
}
