use std::io::Write;

use crate::{
    capability::{TypeTag, builtin},
    error::{CoreError, Result},
    media::MediaType,
    payload::{EncodedDocument, ExceptionReport, JsonDocument, Payload},
};

use super::{ResponseWriter, io_error};

fn expect_payload<'p, P: Payload>(payload: &'p dyn Payload, writer: &str) -> Result<&'p P> {
    payload.downcast_ref::<P>().ok_or_else(|| {
        CoreError::implementation_failed(format!(
            "写出器 `{writer}` 收到不支持的负载类型 `{}`",
            payload.type_tag()
        ))
    })
}

/// 写出编码完成的字节文档，长度已知。
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodedDocumentWriter;

impl ResponseWriter for EncodedDocumentWriter {
    fn handled_type(&self) -> &'static TypeTag {
        &builtin::ENCODED_DOCUMENT
    }

    fn content_type(&self, payload: &dyn Payload) -> Result<MediaType> {
        expect_payload::<EncodedDocument>(payload, "encoded-document")
            .map(|document| document.media_type().clone())
    }

    fn content_length(&self, payload: &dyn Payload) -> Result<Option<u64>> {
        expect_payload::<EncodedDocument>(payload, "encoded-document")
            .map(|document| Some(document.body().len() as u64))
    }

    fn write(&self, payload: &dyn Payload, out: &mut dyn Write) -> Result<()> {
        let document = expect_payload::<EncodedDocument>(payload, "encoded-document")?;
        out.write_all(document.body()).map_err(io_error)
    }
}

/// 以 `serde_json` 流式写出 JSON 文档。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDocumentWriter;

impl ResponseWriter for JsonDocumentWriter {
    fn handled_type(&self) -> &'static TypeTag {
        &builtin::JSON_DOCUMENT
    }

    fn content_type(&self, _payload: &dyn Payload) -> Result<MediaType> {
        Ok(MediaType::APPLICATION_JSON)
    }

    fn write(&self, payload: &dyn Payload, out: &mut dyn Write) -> Result<()> {
        let document = expect_payload::<JsonDocument>(payload, "json-document")?;
        serde_json::to_writer(out, document.value()).map_err(|error| {
            CoreError::implementation_failed("序列化 JSON 文档失败").with_cause(error)
        })
    }
}

/// 未注册异常格式化器时的纯文本异常写出器。
#[derive(Clone, Copy, Debug, Default)]
pub struct ExceptionReportWriter;

impl ResponseWriter for ExceptionReportWriter {
    fn handled_type(&self) -> &'static TypeTag {
        &builtin::EXCEPTION_REPORT
    }

    fn content_type(&self, _payload: &dyn Payload) -> Result<MediaType> {
        Ok(MediaType::TEXT_PLAIN.with_parameter("charset", "utf-8"))
    }

    fn content_length(&self, payload: &dyn Payload) -> Result<Option<u64>> {
        expect_payload::<ExceptionReport>(payload, "exception-report")
            .map(|report| Some(render_plain(report).len() as u64))
    }

    fn supports_gzip(&self) -> bool {
        false
    }

    fn write(&self, payload: &dyn Payload, out: &mut dyn Write) -> Result<()> {
        let report = expect_payload::<ExceptionReport>(payload, "exception-report")?;
        out.write_all(render_plain(report).as_bytes())
            .map_err(io_error)
    }
}

/// 异常报告的纯文本形式：首行为状态，其后每条异常一行。
///
/// ```rust
/// use sos_dispatch::http::HttpStatus;
/// use sos_dispatch::payload::{ExceptionEntry, ExceptionReport};
/// use sos_dispatch::writer::render_plain;
///
/// let report = ExceptionReport::new(HttpStatus::BAD_REQUEST)
///     .with_exception(ExceptionEntry::new("binding.missing_parameter", "service").with_locator("service"));
/// assert_eq!(render_plain(&report), "400 Bad Request\n[binding.missing_parameter] service: service\n");
/// ```
pub fn render_plain(report: &ExceptionReport) -> String {
    let mut text = format!("{}\n", report.status());
    for entry in report.exceptions() {
        match entry.locator() {
            Some(locator) => {
                text.push_str(&format!("[{}] {locator}: {}\n", entry.code(), entry.text()))
            }
            None => text.push_str(&format!("[{}] {}\n", entry.code(), entry.text())),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::HttpStatus, payload::ExceptionEntry};

    #[test]
    fn json_writer_streams_value() {
        let mut out = Vec::new();
        let document = JsonDocument::new(serde_json::json!({"observations": []}));
        JsonDocumentWriter.write(&document, &mut out).unwrap();
        assert_eq!(out, br#"{"observations":[]}"#);
        assert_eq!(JsonDocumentWriter.content_length(&document).unwrap(), None);
    }

    #[test]
    fn exception_writer_is_plain_text_without_gzip() {
        let report = ExceptionReport::new(HttpStatus::NOT_ACCEPTABLE)
            .with_exception(ExceptionEntry::new("negotiation.no_acceptable", "nothing"));
        let writer = ExceptionReportWriter;
        assert!(!writer.supports_gzip());
        assert_eq!(writer.content_type(&report).unwrap().to_string(), "text/plain; charset=utf-8");
        let mut out = Vec::new();
        writer.write(&report, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "406 Not Acceptable\n[negotiation.no_acceptable] nothing\n"
        );
    }

    #[test]
    fn mismatched_payload_is_an_implementation_failure() {
        let err = EncodedDocumentWriter
            .content_type(&JsonDocument::new(serde_json::Value::Null))
            .unwrap_err();
        assert_eq!(err.status().code(), 500);
    }
}
