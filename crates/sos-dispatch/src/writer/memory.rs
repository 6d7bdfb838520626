use std::io::{self, Write};

use crate::{http::HttpStatus, media::MediaType};

use super::{ResponseSink, ResponseStream};

/// 内存中的输出流，记录关闭次数与关闭后的写入。
#[derive(Debug, Default)]
pub struct MemoryStream {
    body: Vec<u8>,
    closes: u32,
    wrote_after_close: bool,
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closes > 0 {
            self.wrote_after_close = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream already closed"));
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseStream for MemoryStream {
    fn close(&mut self) -> io::Result<()> {
        self.closes += 1;
        Ok(())
    }
}

/// 内存中的宿主响应，供协议绑定的嵌入方与测试使用。
///
/// # 契约说明（What）
/// - 头部名称按大小写不敏感方式去重，后设置者覆盖；
/// - `failing_open` 模拟宿主拒绝打开输出流。
#[derive(Debug)]
pub struct MemoryResponse {
    status: HttpStatus,
    content_type: Option<MediaType>,
    content_length: Option<u64>,
    headers: Vec<(String, String)>,
    stream: MemoryStream,
    fail_open: bool,
}

impl Default for MemoryResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResponse {
    pub fn new() -> Self {
        Self {
            status: HttpStatus::OK,
            content_type: None,
            content_length: None,
            headers: Vec::new(),
            stream: MemoryStream::default(),
            fail_open: false,
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn status(&self) -> HttpStatus {
        self.status
    }

    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.stream.body
    }

    pub fn close_count(&self) -> u32 {
        self.stream.closes
    }

    pub fn wrote_after_close(&self) -> bool {
        self.stream.wrote_after_close
    }
}

impl ResponseSink for MemoryResponse {
    fn set_status(&mut self, status: HttpStatus) {
        self.status = status;
    }

    fn set_content_type(&mut self, media_type: &MediaType) {
        self.content_type = Some(media_type.clone());
    }

    fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_owned(),
            None => self.headers.push((name.to_owned(), value.to_owned())),
        }
    }

    fn open_stream(&mut self) -> io::Result<&mut dyn ResponseStream> {
        if self.fail_open {
            return Err(io::Error::other("response already committed"));
        }
        Ok(&mut self.stream)
    }
}
