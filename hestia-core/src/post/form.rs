//! Incremental `application/x-www-form-urlencoded` decoder

use super::FieldChunk;
use crate::http::request::urlcode_decode;

#[derive(Debug, Default)]
pub struct UrlEncodedDecoder {
    pending: Vec<u8>,
}

impl UrlEncodedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume bytes; every pair terminated by `&` is emitted whole
    pub fn feed(&mut self, data: &[u8]) -> Vec<FieldChunk> {
        self.pending.extend_from_slice(data);

        let mut fields = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'&') {
            let pair: Vec<u8> = self.pending.drain(..=pos).collect();
            fields.extend(decode_pair(&pair[..pair.len() - 1]));
        }
        fields
    }

    /// Flush the trailing pair
    pub fn finish(&mut self) -> Vec<FieldChunk> {
        let pair = std::mem::take(&mut self.pending);
        decode_pair(&pair).into_iter().collect()
    }
}

fn decode_pair(pair: &[u8]) -> Option<FieldChunk> {
    let pair = String::from_utf8_lossy(pair);
    let pair = pair.trim_matches(|c| c == '\r' || c == '\n');
    if pair.is_empty() {
        return None;
    }
    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
    Some(FieldChunk::whole(urlcode_decode(key), urlcode_decode(value).into_bytes()))
}
