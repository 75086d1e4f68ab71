//! # SSE 事件流解码
//!
//! 供工作任务离线解析已捕获的流式响应体，提取 LLM 用量字段。
//! 事件边界为一个空行；`data:` 行跨行累计后按 JSON 解析。

use bytes::BytesMut;
use serde_json::Value;
use std::io;
use tokio_util::codec::Decoder;

/// 一个已组装完成的 SSE 事件
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Value,
}

/// SSE 事件解码器
#[derive(Debug, Clone)]
pub struct SseEventDecoder {
    current: SseEvent,
    has_any: bool,
    buffer: String,
}

impl SseEventDecoder {
    pub fn new() -> Self {
        Self {
            current: SseEvent {
                event: None,
                data: Value::Null,
            },
            has_any: false,
            buffer: String::new(),
        }
    }

    fn finish_event(&mut self) -> SseEvent {
        let payload = self.buffer.trim();
        let data_val = if payload.is_empty() || payload == "[DONE]" {
            Value::Null
        } else if let Some(pos) = payload.find('{') {
            serde_json::from_str::<Value>(&payload[pos..]).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        self.current.data = data_val;
        let ev = std::mem::take(&mut self.current);
        self.has_any = false;
        self.buffer.clear();
        ev
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.has_any {
                return Some(self.finish_event());
            }
            return None;
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let f = &line[..idx];
                let mut v = &line[idx + 1..];
                if v.starts_with(' ') {
                    v = &v[1..];
                }
                (f, v)
            }
            None => (line, ""),
        };

        match field {
            "data" => {
                if !self.buffer.is_empty() {
                    self.buffer.push('\n');
                }
                self.buffer.push_str(value);
                self.has_any = true;
            }
            "event" => {
                self.current.event = Some(value.to_string());
                self.has_any = true;
            }
            _ => {}
        }
        None
    }

    fn take_one_line(src: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(pos) = src.iter().position(|b| *b == b'\n') {
            let mut line_bytes = src.split_to(pos + 1);
            if line_bytes.ends_with(b"\n") {
                line_bytes.truncate(line_bytes.len() - 1);
            }
            if line_bytes.ends_with(b"\r") {
                line_bytes.truncate(line_bytes.len() - 1);
            }
            let line = String::from_utf8(line_bytes.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(line))
        } else {
            Ok(None)
        }
    }
}

impl Default for SseEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SseEventDecoder {
    type Item = SseEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        loop {
            match Self::take_one_line(src)? {
                Some(line) => {
                    if let Some(ev) = self.process_line(&line) {
                        return Ok(Some(ev));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        if !src.is_empty() {
            let mut last = String::from_utf8(src.split_to(src.len()).to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if last.ends_with('\n') {
                last.pop();
            }
            if last.ends_with('\r') {
                last.pop();
            }
            if let Some(ev) = self.process_line(&last) {
                return Ok(Some(ev));
            }
        }
        if self.has_any {
            return Ok(Some(self.finish_event()));
        }
        Ok(None)
    }
}

/// 把完整响应体一次性解码为事件序列
///
/// 非法 UTF-8 行直接终止解析，已解出的事件仍然返回
pub fn parse_sse_events(body: &[u8]) -> Vec<SseEvent> {
    let mut decoder = SseEventDecoder::new();
    let mut buf = BytesMut::from(body);
    let mut events = Vec::new();

    loop {
        match decoder.decode(&mut buf) {
            Ok(Some(ev)) => events.push(ev),
            Ok(None) => break,
            Err(_) => return events,
        }
    }
    loop {
        match decoder.decode_eof(&mut buf) {
            Ok(Some(ev)) => events.push(ev),
            _ => break,
        }
    }
    events
}
