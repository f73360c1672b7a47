//! Request body state machine
//!
//! The first body chunk picks the branch: HTML form bodies
//! (`multipart/form-data`, `application/x-www-form-urlencoded`) are decoded
//! incrementally and each field is mirrored into the session; anything else
//! is buffered verbatim for the resource that will answer the request.
//!
//! ```text
//! Idle --first chunk--> HtmlForm | RawBuffering --finish--> Idle (upload Idle)
//!                                                --abort---> Idle (upload Interrupted)
//! ```

pub mod form;
pub mod multipart;

pub use form::UrlEncodedDecoder;
pub use multipart::{boundary_from_content_type, MultipartDecoder};

use bytes::Bytes;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::http::constants::content_types;
use crate::session::{Session, TransferState};

#[derive(thiserror::Error, Debug)]
pub enum PostError {
    #[error("malformed form body: {0}")]
    Malformed(String),
}

impl From<PostError> for EngineError {
    fn from(err: PostError) -> Self {
        EngineError::BadRequest(err.to_string())
    }
}

/// A piece of one decoded form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChunk {
    pub name: String,
    /// Set for file parts
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    /// Position of `data` within the field's value
    pub offset: u64,
    /// This chunk completes the field
    pub last: bool,
}

impl FieldChunk {
    pub fn whole(name: String, data: Vec<u8>) -> Self {
        Self { name, filename: None, content_type: None, data, offset: 0, last: true }
    }
}

/// Settings shared by every body processed by one engine
#[derive(Debug, Clone)]
pub struct PostSettings {
    pub max_body_size: usize,
    pub upload_dir: PathBuf,
    pub login_user_field: String,
    pub login_password_field: String,
}

impl Default for PostSettings {
    fn default() -> Self {
        Self {
            max_body_size: 16 * 1024 * 1024,
            upload_dir: PathBuf::from("./uploads"),
            login_user_field: "login_user".to_string(),
            login_password_field: "login_password".to_string(),
        }
    }
}

enum FormDecoder {
    UrlEncoded(UrlEncodedDecoder),
    Multipart(MultipartDecoder),
}

enum Phase {
    Idle,
    HtmlForm(FormDecoder),
    RawBuffering(Vec<u8>),
}

/// What a completed body produced
#[derive(Debug, Default)]
pub struct PostOutcome {
    /// Verbatim body for non-form content types
    pub raw: Option<Bytes>,
    /// Decoded form fields; file parts map to their stored path
    pub params: HashMap<String, String>,
}

/// Per-request body consumer
pub struct PostProcessor {
    settings: PostSettings,
    content_type: String,
    content_length: Option<u64>,
    phase: Phase,
    received: u64,
    started: bool,
}

impl PostProcessor {
    pub fn new(
        settings: PostSettings,
        content_type: Option<&str>,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            settings,
            content_type: content_type.unwrap_or_default().to_string(),
            content_length,
            phase: Phase::Idle,
            received: 0,
            started: false,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "Idle",
            Phase::HtmlForm(_) => "HtmlForm",
            Phase::RawBuffering(_) => "RawBuffering",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Between the first chunk and `finish`/`abort`
    pub fn in_progress(&self) -> bool {
        self.started && !self.is_idle()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Consume the next body chunk in transport order
    pub fn feed(&mut self, session: &Session, chunk: &[u8]) -> EngineResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let limit = self.settings.max_body_size;
        let declared_too_large = self.content_length.is_some_and(|len| len > limit as u64);
        if declared_too_large || self.received + chunk.len() as u64 > limit as u64 {
            self.abort(session, "request body too large");
            return Err(EngineError::PayloadTooLarge { limit });
        }

        if self.is_idle() && !self.started {
            self.begin(session, chunk.len())?;
        }
        self.received += chunk.len() as u64;

        let result = self.consume(session, chunk);
        if let Err(err) = &result {
            self.abort(session, &err.to_string());
        }
        result
    }

    fn begin(&mut self, session: &Session, first_chunk: usize) -> EngineResult<()> {
        let mime = self.content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        self.phase = if mime == content_types::MULTIPART_FORM {
            let boundary = boundary_from_content_type(&self.content_type).ok_or_else(|| {
                EngineError::BadRequest("multipart body without a usable boundary".to_string())
            })?;
            Phase::HtmlForm(FormDecoder::Multipart(MultipartDecoder::new(&boundary)))
        } else if mime == content_types::FORM_URLENCODED {
            Phase::HtmlForm(FormDecoder::UrlEncoded(UrlEncodedDecoder::new()))
        } else {
            let capacity = self
                .content_length
                .map_or(first_chunk, |len| len as usize)
                .min(self.settings.max_body_size);
            Phase::RawBuffering(Vec::with_capacity(capacity))
        };
        self.started = true;

        let mut transfer = session.transfer();
        transfer.post.reset();
        transfer.post.active = true;
        transfer.upload.begin(self.content_length);
        log::debug!("Session {} body started as {}", session.id(), self.state_name());
        Ok(())
    }

    fn consume(&mut self, session: &Session, chunk: &[u8]) -> EngineResult<()> {
        let fields = match &mut self.phase {
            Phase::Idle => return Ok(()),
            Phase::RawBuffering(buffer) => {
                buffer.extend_from_slice(chunk);
                session.transfer().upload.received = self.received;
                return Ok(());
            }
            Phase::HtmlForm(FormDecoder::UrlEncoded(decoder)) => decoder.feed(chunk),
            Phase::HtmlForm(FormDecoder::Multipart(decoder)) => decoder.feed(chunk)?,
        };
        self.apply_fields(session, fields)
    }

    fn apply_fields(&self, session: &Session, fields: Vec<FieldChunk>) -> EngineResult<()> {
        let mut transfer = session.transfer();
        transfer.upload.received = self.received;
        for field in fields {
            if field.filename.is_some() {
                self.store_file_chunk(session, &mut transfer, field)?;
            } else {
                self.store_value_chunk(session, &mut transfer, field);
            }
        }
        Ok(())
    }

    fn store_value_chunk(&self, session: &Session, transfer: &mut TransferState, field: FieldChunk) {
        let post = &mut transfer.post;
        if field.offset == 0 {
            post.current_key = Some(field.name.clone());
            post.current_value.clear();
        }
        post.current_value.extend_from_slice(&field.data);
        if !field.last {
            return;
        }

        let value = String::from_utf8_lossy(&post.current_value).into_owned();
        post.current_key = None;
        post.current_value.clear();
        session.set_raw_var(field.name.clone(), serde_json::Value::String(value.clone()));

        if field.name == self.settings.login_user_field {
            post.login_user = Some(value.clone());
        } else if field.name == self.settings.login_password_field {
            post.login_password = Some(value.clone());
        }
        post.params.insert(field.name.clone(), value.clone());
        post.last_field = Some((field.name, value));

        if let (Some(user), Some(password)) = (&post.login_user, &post.login_password) {
            session.auth().login_pending(user, password);
            log::debug!("Form login for {} recorded in session {}", user, session.id());
            post.login_user = None;
            post.login_password = None;
        }
    }

    fn store_file_chunk(
        &self,
        session: &Session,
        transfer: &mut TransferState,
        field: FieldChunk,
    ) -> EngineResult<()> {
        let upload = &mut transfer.upload;
        if field.offset == 0 {
            fs::create_dir_all(&self.settings.upload_dir)?;
            let name = sanitize_filename(field.filename.as_deref().unwrap_or_default());
            let path = self.settings.upload_dir.join(name);
            let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
            upload.file = Some(file);
            upload.destination = Some(path);
        }
        if let Some(file) = upload.file.as_mut() {
            file.write_all(&field.data)?;
        }
        if field.last {
            if let Some(mut file) = upload.file.take() {
                file.flush()?;
            }
            let stored = upload.destination.as_deref().map(path_text).unwrap_or_default();
            log::info!("Stored upload {} for session {}", stored, session.id());
            session.set_raw_var(field.name.clone(), serde_json::Value::String(stored.clone()));
            transfer.post.params.insert(field.name.clone(), stored.clone());
            transfer.post.last_field = Some((field.name, stored));
        }
        Ok(())
    }

    /// Complete the body: raw bytes (if buffered) and decoded fields
    pub fn finish(&mut self, session: &Session) -> EngineResult<PostOutcome> {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let mut outcome = PostOutcome::default();

        match phase {
            Phase::Idle => return Ok(outcome),
            Phase::RawBuffering(buffer) => outcome.raw = Some(Bytes::from(buffer)),
            Phase::HtmlForm(mut decoder) => {
                let tail = match &mut decoder {
                    FormDecoder::UrlEncoded(decoder) => Ok(decoder.finish()),
                    FormDecoder::Multipart(decoder) => decoder.finish(),
                };
                let applied = tail
                    .map_err(EngineError::from)
                    .and_then(|fields| self.apply_fields(session, fields));
                if let Err(err) = applied {
                    // Phase is already Idle; record the failure on the session
                    self.interrupt(session, &err.to_string());
                    return Err(err);
                }
            }
        }

        let mut transfer = session.transfer();
        outcome.params = std::mem::take(&mut transfer.post.params);
        transfer.post.reset();
        transfer.upload.received = self.received;
        transfer.upload.finish();
        Ok(outcome)
    }

    /// Stop mid-body; the session's upload state becomes `Interrupted`
    pub fn abort(&mut self, session: &Session, reason: &str) {
        if !self.started || self.is_idle() {
            return;
        }
        self.phase = Phase::Idle;
        self.interrupt(session, reason);
    }

    fn interrupt(&self, session: &Session, reason: &str) {
        let mut transfer = session.transfer();
        transfer.post.reset();
        transfer.upload.received = self.received;
        transfer.upload.interrupt(reason);
        log::warn!(
            "Session {} body interrupted after {} bytes: {}",
            session.id(),
            self.received,
            reason
        );
    }
}

fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name).file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "upload".to_string(),
        name => name.to_string(),
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
