//! Motif file parsing.
//!
//! MEME motifs come in several dialects. This module reads all of them
//! without knowing in advance which one a file uses:
//!
//! - [`html`]: legacy MEME/DREME HTML output (hidden `<input>` fields) and
//!   newer HTML output with an embedded JSON block
//! - [`text`]: the MEME plain-text motif format
//! - [`xml`]: MEME-XML and DREME-XML, parsed from the whole file
//! - [`simple`]: typed-in IUPAC sites or count matrices
//!
//! [`MotifParser`] feeds each chunk to the streaming parsers in turn and
//! falls back to XML when streaming found nothing. Each parser keeps a
//! confidence rating; when no motif is found the errors of the most
//! confident parser are reported.
//!
//! ## Ratings
//!
//! - 1: nothing recognised
//! - 2-6: format markers, version, alphabet, strands, background
//! - 10: at least one motif reported

pub mod html;
pub mod parser;
pub mod simple;
pub mod text;
pub mod utils;
pub mod xml;

pub use parser::MotifParser;

use thiserror::Error;

use crate::decoder::{EncodingError, SourceError};
use crate::model::{Motif, MotifMeta};
use crate::report::{Message, Summary};

/// Rating of a parser that has recognised nothing.
pub const RATING_NONE: u8 = 1;
/// Rating of a parser that has reported a motif.
pub const RATING_MOTIF: u8 = 10;

/// A structured parse error. It ends the parser that raised it and becomes
/// one of that parser's messages.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct MotifError {
    pub message: String,
    pub reasons: Vec<String>,
}

impl MotifError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reasons: Vec::new(),
        }
    }

    pub fn with_reasons(message: impl Into<String>, reasons: Vec<String>) -> Self {
        Self {
            message: message.into(),
            reasons,
        }
    }

    pub fn to_message(&self) -> Message {
        Message::error(self.message.clone(), self.reasons.clone())
    }
}

pub type MotifResult<T> = Result<T, MotifError>;

/// An unexpected failure that removes a parser from the pool without
/// contributing a message.
#[derive(Error, Debug)]
pub enum ParserFault {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Receives parsed records from a single parser.
pub trait MotifSink {
    fn meta(&mut self, meta: &MotifMeta);
    fn motif(&mut self, motif: &Motif);
}

/// A parser that reads a motif file one chunk at a time.
pub trait StreamingMotifParser {
    fn process_chunk(&mut self, chunk: &[u8], sink: &mut dyn MotifSink) -> Result<(), ParserFault>;

    /// Called once after the last chunk.
    fn process_end(&mut self, sink: &mut dyn MotifSink) -> Result<(), ParserFault>;

    fn rating(&self) -> u8;

    fn errors(&self) -> &[Message];
}

/// Receives what a [`MotifParser`] finds. Every method defaults to doing
/// nothing.
pub trait MotifEvents {
    fn begin(&mut self, _file_size: u64) {}

    fn progress(&mut self, _fraction: f64) {}

    fn meta(&mut self, _meta: &MotifMeta) {}

    fn motif(&mut self, _motif: &Motif) {}

    fn error(&mut self, _message: &Message) {}

    /// Parsing finished. `messages` holds the errors that were not already
    /// sent through [`MotifEvents::error`].
    fn end(&mut self, _messages: &[Message]) {}
}

/// Keeps everything a [`MotifParser`] reports.
#[derive(Debug, Clone, Default)]
pub struct MotifCollector {
    pub file_size: u64,
    pub fraction: f64,
    pub meta: Option<MotifMeta>,
    pub motifs: Vec<Motif>,
    pub messages: Vec<Message>,
    pub finished: bool,
}

impl MotifCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            alphabet: self.meta.as_ref().map(|meta| meta.alphabet),
            ..Summary::default()
        };
        for message in &self.messages {
            summary.add(message.clone());
        }
        summary
    }
}

impl MotifEvents for MotifCollector {
    fn begin(&mut self, file_size: u64) {
        *self = Self {
            file_size,
            ..Self::default()
        };
    }

    fn progress(&mut self, fraction: f64) {
        self.fraction = fraction;
    }

    fn meta(&mut self, meta: &MotifMeta) {
        if self.meta.is_none() {
            self.meta = Some(meta.clone());
        }
    }

    fn motif(&mut self, motif: &Motif) {
        self.motifs.push(motif.clone());
    }

    fn error(&mut self, message: &Message) {
        self.messages.push(message.clone());
    }

    fn end(&mut self, messages: &[Message]) {
        self.messages.extend_from_slice(messages);
        self.finished = true;
    }
}

/// Collects the output of a single parser, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub metas: Vec<MotifMeta>,
    pub motifs: Vec<Motif>,
}

#[cfg(test)]
impl MotifSink for RecordingSink {
    fn meta(&mut self, meta: &MotifMeta) {
        self.metas.push(meta.clone());
    }

    fn motif(&mut self, motif: &Motif) {
        self.motifs.push(motif.clone());
    }
}
