//! 响应写出：写出器契约、传输抽象与“先声明头部、后写字节、恰好关闭一次”的写出流程。
//!
//! # 教案式解读
//! - **意图（Why）**：
//!   - 编码后的负载需要按类型选择序列化方式（字节文档、JSON 值、纯文本异常），写出器注册表按类型距离解析；
//!   - 传输对象（宿主框架的响应）以 [`ResponseSink`] 抽象，解析核心不依赖任何 Web 框架。
//! - **实现策略（How）**：
//!   - [`ResponseSink::open_stream`] 以可变借用返回输出流，借用存续期间无法再设置头部，
//!     “头部先于字节”由借用检查器保证；
//!   - 输出流由 `OutputGuard` 持有，成功路径显式关闭，错误路径在 `Drop` 中关闭；
//!   - gzip 包装器声明在守卫之后，按逆序析构先于守卫结束，压缩尾部总在流关闭前写出。
//! - **契约（What）**：
//!   - 压缩时声明 `Content-Encoding: gzip` 且不声明长度；不压缩且写出器给出长度时声明 `Content-Length`。

mod builtin;
mod memory;

use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

use flate2::{Compression, write::GzEncoder};
use tracing::{debug, warn};

pub use builtin::{EncodedDocumentWriter, ExceptionReportWriter, JsonDocumentWriter, render_plain};
pub use memory::{MemoryResponse, MemoryStream};

use crate::{
    capability::TypeTag,
    error::{CoreError, Result, codes},
    http::{GZIP, HttpStatus, headers},
    media::MediaType,
    payload::Payload,
};

/// 写出器：把某类负载序列化到输出流。
///
/// # 契约说明（What）
/// - `handled_type` 即注册键，子类型负载在没有更具体写出器时回落到本实现；
/// - `content_length` 返回 `None` 表示长度未知（流式写出）；
/// - `write` 不得关闭输出流，关闭由写出流程统一负责。
pub trait ResponseWriter: Send + Sync + 'static {
    fn handled_type(&self) -> &'static TypeTag;

    fn content_type(&self, payload: &dyn Payload) -> Result<MediaType>;

    fn content_length(&self, _payload: &dyn Payload) -> Result<Option<u64>> {
        Ok(None)
    }

    fn supports_gzip(&self) -> bool {
        true
    }

    fn write(&self, payload: &dyn Payload, out: &mut dyn Write) -> Result<()>;
}

/// 宿主响应的输出流。
pub trait ResponseStream: Write {
    /// 关闭流；写出流程保证每次写出恰好调用一次。
    fn close(&mut self) -> io::Result<()>;
}

/// 宿主响应：状态、头部与输出流。
pub trait ResponseSink {
    fn set_status(&mut self, status: HttpStatus);

    fn set_content_type(&mut self, media_type: &MediaType);

    fn set_content_length(&mut self, length: u64);

    fn set_header(&mut self, name: &str, value: &str);

    /// 打开输出流。返回的借用存续期间不能再修改头部。
    fn open_stream(&mut self) -> io::Result<&mut dyn ResponseStream>;
}

/// 把 I/O 失败折算为 `transport.io`。
pub fn io_error(error: io::Error) -> CoreError {
    CoreError::new(codes::TRANSPORT_IO, "写出响应失败").with_cause(error)
}

/// 持有输出流并保证其恰好关闭一次。
struct OutputGuard<'a> {
    stream: &'a mut dyn ResponseStream,
    closed: bool,
}

impl<'a> OutputGuard<'a> {
    fn new(stream: &'a mut dyn ResponseStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    fn stream(&mut self) -> &mut (dyn ResponseStream + 'a) {
        &mut *self.stream
    }

    fn close(mut self) -> io::Result<()> {
        self.closed = true;
        self.stream.close()
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(error) = self.stream.close() {
                warn!(%error, "错误路径上关闭输出流失败");
            }
        }
    }
}

/// 以给定写出器写出负载。
///
/// # 逻辑解析（How）
/// 1. 声明 `Content-Type`；压缩时声明 `Content-Encoding`，否则在长度已知时声明 `Content-Length`；
/// 2. 打开输出流并交给守卫；
/// 3. 压缩时经 `GzEncoder` 写出并 `finish`，随后关闭流。
///
/// # 契约说明（What）
/// - `compress` 为调用方综合客户端、配置与写出器能力后的最终决定；
/// - 写出器或流失败时错误原样返回，流仍被关闭一次。
pub fn write_payload(
    writer: &dyn ResponseWriter,
    payload: &dyn Payload,
    sink: &mut dyn ResponseSink,
    compress: bool,
) -> Result<()> {
    let content_type = writer.content_type(payload)?;
    let content_length = if compress {
        None
    } else {
        writer.content_length(payload)?
    };
    stream_payload(writer, payload, sink, &content_type, content_length, compress)
}

/// 已确定写出器与全部头部信息、尚未触碰传输对象的写出。
///
/// # 设计动机（Why）
/// - 写出器解析与 `Content-Type` 计算都可能失败；这些失败发生在状态行之前时，
///   调用方仍可改写一份异常响应，而不是留下一个没有正文的成功状态。
///
/// # 契约说明（What）
/// - 构造成功后，[`write_to`](Self::write_to) 只会因写出器或 I/O 失败而出错，且此时流已被关闭一次。
pub struct PreparedWrite<'a> {
    writer: Arc<dyn ResponseWriter>,
    payload: &'a dyn Payload,
    content_type: MediaType,
    content_length: Option<u64>,
    compress: bool,
}

impl<'a> PreparedWrite<'a> {
    /// 查询写出器给出的类型与长度；`compress` 为调用方的最终决定。
    pub fn new(
        writer: Arc<dyn ResponseWriter>,
        payload: &'a dyn Payload,
        compress: impl FnOnce(Option<u64>) -> bool,
    ) -> Result<Self> {
        let content_type = writer.content_type(payload)?;
        let content_length = writer.content_length(payload)?;
        let compress = compress(content_length);
        Ok(Self {
            writer,
            payload,
            content_type,
            content_length,
            compress,
        })
    }

    pub fn content_type(&self) -> &MediaType {
        &self.content_type
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    /// 声明头部并写出正文。
    pub fn write_to(self, sink: &mut dyn ResponseSink) -> Result<()> {
        let content_length = if self.compress {
            None
        } else {
            self.content_length
        };
        stream_payload(
            self.writer.as_ref(),
            self.payload,
            sink,
            &self.content_type,
            content_length,
            self.compress,
        )
    }
}

impl fmt::Debug for PreparedWrite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedWrite")
            .field("payload", &self.payload.type_tag().name())
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("compress", &self.compress)
            .finish_non_exhaustive()
    }
}

fn stream_payload(
    writer: &dyn ResponseWriter,
    payload: &dyn Payload,
    sink: &mut dyn ResponseSink,
    content_type: &MediaType,
    content_length: Option<u64>,
    compress: bool,
) -> Result<()> {
    sink.set_content_type(content_type);
    if compress {
        sink.set_header(headers::CONTENT_ENCODING, GZIP);
    } else if let Some(length) = content_length {
        sink.set_content_length(length);
    }
    debug!(content_type = %content_type, compress, payload = %payload.type_tag(), "开始写出响应");

    let stream = sink.open_stream().map_err(io_error)?;
    let mut guard = OutputGuard::new(stream);
    if compress {
        let mut encoder = GzEncoder::new(guard.stream(), Compression::default());
        writer.write(payload, &mut encoder)?;
        encoder.finish().map_err(io_error)?.flush().map_err(io_error)?;
    } else {
        writer.write(payload, guard.stream())?;
        guard.stream().flush().map_err(io_error)?;
    }
    guard.close().map_err(io_error)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::payload::EncodedDocument;

    struct FailingWriter;

    impl ResponseWriter for FailingWriter {
        fn handled_type(&self) -> &'static TypeTag {
            &crate::capability::builtin::ENCODED_DOCUMENT
        }

        fn content_type(&self, _payload: &dyn Payload) -> Result<MediaType> {
            Ok(MediaType::APPLICATION_XML)
        }

        fn write(&self, _payload: &dyn Payload, out: &mut dyn Write) -> Result<()> {
            out.write_all(b"<partial").map_err(io_error)?;
            Err(CoreError::implementation_failed("writer exploded"))
        }
    }

    fn document() -> EncodedDocument {
        EncodedDocument::new(MediaType::TEXT_XML, "<ok/>")
    }

    #[test]
    fn plain_write_declares_length_and_closes_once() {
        let mut response = MemoryResponse::new();
        write_payload(&EncodedDocumentWriter, &document(), &mut response, false).unwrap();
        assert_eq!(response.content_type(), Some(&MediaType::TEXT_XML));
        assert_eq!(response.content_length(), Some(5));
        assert_eq!(response.header(headers::CONTENT_ENCODING), None);
        assert_eq!(response.body(), b"<ok/>");
        assert_eq!(response.close_count(), 1);
    }

    #[test]
    fn gzip_write_omits_length_and_finishes_before_close() {
        let mut response = MemoryResponse::new();
        write_payload(&EncodedDocumentWriter, &document(), &mut response, true).unwrap();
        assert_eq!(response.header(headers::CONTENT_ENCODING), Some(GZIP));
        assert_eq!(response.content_length(), None);
        assert_eq!(response.close_count(), 1);

        let mut inflated = String::new();
        GzDecoder::new(response.body())
            .read_to_string(&mut inflated)
            .unwrap();
        assert_eq!(inflated, "<ok/>");
    }

    #[test]
    fn failing_writer_still_closes_stream_once() {
        for compress in [false, true] {
            let mut response = MemoryResponse::new();
            let err = write_payload(&FailingWriter, &document(), &mut response, compress).unwrap_err();
            assert_eq!(err.code(), codes::IMPLEMENTATION_FAILED);
            assert_eq!(response.close_count(), 1, "compress={compress}");
            assert!(!response.wrote_after_close());
        }
    }

    #[test]
    fn open_failure_leaves_nothing_to_close() {
        let mut response = MemoryResponse::new().failing_open();
        let err = write_payload(&EncodedDocumentWriter, &document(), &mut response, false).unwrap_err();
        assert_eq!(err.code(), codes::TRANSPORT_IO);
        assert_eq!(response.close_count(), 0);
    }
}
