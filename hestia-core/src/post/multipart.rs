//! Streaming `multipart/form-data` decoder
//!
//! Part bodies are emitted as they arrive; only a tail shorter than the
//! delimiter is held back, so a boundary split across two transport chunks
//! is still recognised.

use super::{FieldChunk, PostError};

/// Header block larger than this is treated as malformed
const MAX_PART_HEADER: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preamble,
    AfterBoundary,
    Headers,
    Body,
    Epilogue,
}

#[derive(Debug, Default, Clone)]
struct PartHeaders {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug)]
pub struct MultipartDecoder {
    /// `--boundary`
    dash_boundary: Vec<u8>,
    /// `\r\n--boundary`
    delimiter: Vec<u8>,
    buffer: Vec<u8>,
    phase: Phase,
    part: PartHeaders,
    offset: u64,
}

/// Extract the `boundary` parameter from a multipart content type
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty() && value.len() <= 70).then(|| value.to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        let dash_boundary = format!("--{}", boundary).into_bytes();
        let mut delimiter = b"\r\n".to_vec();
        delimiter.extend_from_slice(&dash_boundary);
        Self {
            dash_boundary,
            delimiter,
            buffer: Vec::new(),
            phase: Phase::Preamble,
            part: PartHeaders::default(),
            offset: 0,
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<FieldChunk>, PostError> {
        self.buffer.extend_from_slice(data);
        let mut out = Vec::new();

        loop {
            let progressed = match self.phase {
                Phase::Preamble => self.skip_preamble(),
                Phase::AfterBoundary => self.after_boundary()?,
                Phase::Headers => self.read_headers()?,
                Phase::Body => self.read_body(&mut out),
                Phase::Epilogue => {
                    self.buffer.clear();
                    false
                }
            };
            if !progressed {
                break;
            }
        }

        Ok(out)
    }

    /// The body must have reached its closing delimiter
    pub fn finish(&mut self) -> Result<Vec<FieldChunk>, PostError> {
        if self.phase == Phase::Epilogue {
            Ok(Vec::new())
        } else {
            Err(PostError::Malformed("multipart body ended before closing boundary".into()))
        }
    }

    fn skip_preamble(&mut self) -> bool {
        match find(&self.buffer, &self.dash_boundary) {
            Some(pos) => {
                self.buffer.drain(..pos + self.dash_boundary.len());
                self.phase = Phase::AfterBoundary;
                true
            }
            None => {
                let keep = self.dash_boundary.len().saturating_sub(1);
                let discard = self.buffer.len().saturating_sub(keep);
                self.buffer.drain(..discard);
                false
            }
        }
    }

    fn after_boundary(&mut self) -> Result<bool, PostError> {
        if self.buffer.len() < 2 {
            return Ok(false);
        }
        if self.buffer.starts_with(b"--") {
            self.phase = Phase::Epilogue;
            return Ok(true);
        }
        // Transport padding is allowed before the line break
        let Some(eol) = find(&self.buffer, b"\r\n") else {
            return Ok(false);
        };
        if self.buffer[..eol].iter().any(|b| !matches!(b, b' ' | b'\t')) {
            return Err(PostError::Malformed("garbage after boundary".into()));
        }
        self.buffer.drain(..eol + 2);
        self.phase = Phase::Headers;
        Ok(true)
    }

    fn read_headers(&mut self) -> Result<bool, PostError> {
        let Some(end) = find(&self.buffer, b"\r\n\r\n") else {
            if self.buffer.len() > MAX_PART_HEADER {
                return Err(PostError::Malformed("part header too large".into()));
            }
            return Ok(false);
        };

        let block = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + 4);
        self.part = parse_part_headers(&block)?;
        self.offset = 0;
        self.phase = Phase::Body;
        Ok(true)
    }

    fn read_body(&mut self, out: &mut Vec<FieldChunk>) -> bool {
        match find(&self.buffer, &self.delimiter) {
            Some(pos) => {
                let data: Vec<u8> = self.buffer.drain(..pos).collect();
                self.buffer.drain(..self.delimiter.len());
                out.push(self.chunk(data, true));
                self.phase = Phase::AfterBoundary;
                true
            }
            None => {
                let keep = self.delimiter.len() - 1;
                if self.buffer.len() > keep {
                    let take = self.buffer.len() - keep;
                    let data: Vec<u8> = self.buffer.drain(..take).collect();
                    out.push(self.chunk(data, false));
                }
                false
            }
        }
    }

    fn chunk(&mut self, data: Vec<u8>, last: bool) -> FieldChunk {
        let chunk = FieldChunk {
            name: self.part.name.clone(),
            filename: self.part.filename.clone(),
            content_type: self.part.content_type.clone(),
            offset: self.offset,
            last,
            data,
        };
        self.offset += chunk.data.len() as u64;
        chunk
    }
}

fn parse_part_headers(block: &str) -> Result<PartHeaders, PostError> {
    let mut headers = PartHeaders::default();
    let mut named = false;

    for line in block.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key == "content-type" {
            headers.content_type = Some(value.trim().to_string());
        } else if key == "content-disposition" {
            for param in value.split(';').skip(1) {
                let Some((name, raw)) = param.split_once('=') else {
                    continue;
                };
                let raw = raw.trim().trim_matches('"').to_string();
                match name.trim().to_ascii_lowercase().as_str() {
                    "name" => {
                        headers.name = raw;
                        named = true;
                    }
                    "filename" => headers.filename = Some(raw),
                    _ => {}
                }
            }
        }
    }

    if !named {
        return Err(PostError::Malformed("part without a field name".into()));
    }
    Ok(headers)
}
