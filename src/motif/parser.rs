//! Format-detecting motif parser.
//!
//! [`MotifParser`] streams a file through the HTML and text parsers at the
//! same time. A parser that hits an unexpected failure (for example invalid
//! UTF-8 in the text parser) drops out silently; structured errors stay with
//! the parser that raised them. When streaming ends without a motif the
//! whole file is read once more as XML.
//!
//! ## Errors
//!
//! Only the errors of the most confident parser are reported, so a broken
//! MEME text file does not also complain that it is not valid XML.

use crate::chunked::{self, Blob, CancelToken, ChunkConsumer, Flow};
use crate::formats::fasta::live_handler;
use crate::formats::{unusable_format, FileKind};
use crate::model::{Motif, MotifMeta};
use crate::motif::html::HtmlMotifParser;
use crate::motif::text::TextMotifParser;
use crate::motif::xml::XmlMotifParser;
use crate::motif::{MotifEvents, MotifSink, StreamingMotifParser, RATING_NONE};
use crate::report::Message;
use crate::CheckError;

/// Bytes at the start of a motif file scanned for NUL bytes.
const MAGIC_SCAN: usize = 40;

/// Forwards records from one parser to the handler and counts motifs.
struct Relay<'a, H> {
    handler: &'a mut Option<H>,
    cancel: &'a CancelToken,
    motif_count: &'a mut usize,
}

impl<H: MotifEvents> MotifSink for Relay<'_, H> {
    fn meta(&mut self, meta: &MotifMeta) {
        if let Some(handler) = live_handler(self.handler, self.cancel) {
            handler.meta(meta);
        }
    }

    fn motif(&mut self, motif: &Motif) {
        *self.motif_count += 1;
        if let Some(handler) = live_handler(self.handler, self.cancel) {
            handler.motif(motif);
        }
    }
}

pub struct MotifParser<H: MotifEvents> {
    html: HtmlMotifParser,
    text: TextMotifParser,
    xml: XmlMotifParser,
    html_active: bool,
    text_active: bool,
    motif_count: usize,
    file_size: u64,
    file_name: Option<String>,
    finished: bool,
    cancel: CancelToken,
    handler: Option<H>,
}

impl<H: MotifEvents> MotifParser<H> {
    pub fn new(handler: H) -> Self {
        Self::with_cancel_token(handler, CancelToken::new())
    }

    pub fn with_cancel_token(handler: H, cancel: CancelToken) -> Self {
        Self {
            html: HtmlMotifParser::new(),
            text: TextMotifParser::new(),
            xml: XmlMotifParser::new(),
            html_active: true,
            text_active: true,
            motif_count: 0,
            file_size: 0,
            file_name: None,
            finished: false,
            cancel,
            handler: Some(handler),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops parsing and drops the handler; no further events are sent.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.handler = None;
    }

    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    /// Gives back the handler, unless the parser was cancelled.
    pub fn into_handler(self) -> Option<H> {
        if self.cancel.is_cancelled() {
            None
        } else {
            self.handler
        }
    }

    pub fn motif_count(&self) -> usize {
        self.motif_count
    }

    /// Parses a whole blob, falling back to XML when streaming finds
    /// nothing.
    pub fn process_blob<B: Blob + ?Sized>(&mut self, blob: &mut B, chunk_size: usize) -> Result<Flow, CheckError> {
        log::info!("Parsing motif file {} ({} bytes)", blob.name().unwrap_or("<memory>"), blob.size());
        let flow = chunked::drive(blob, self, chunk_size)?;
        if flow == Flow::Cancelled {
            self.handler = None;
        }
        if flow != Flow::NeedWholeFile {
            log::info!("Motif parsing finished: {:?}, {} motifs", flow, self.motif_count);
            return Ok(flow);
        }
        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        log::debug!("No motifs found by streaming, trying XML");
        let bytes = chunked::read_whole(blob)?;
        let text = String::from_utf8_lossy(&bytes);
        let mut relay = Relay {
            handler: &mut self.handler,
            cancel: &self.cancel,
            motif_count: &mut self.motif_count,
        };
        self.xml.process_text(&text, &mut relay);
        self.finish_whole();
        log::info!("Motif parsing finished after XML, {} motifs", self.motif_count);
        Ok(Flow::Finished)
    }

    /// The messages to report: those of the most confident parser, plus a
    /// note when no motif was found.
    pub fn errors(&self) -> Vec<Message> {
        let mut messages = vec![Message::error(
            "The file did not match any supported motif formats.",
            Vec::new(),
        )];
        let mut best_rating = 0;
        let ratings = [
            (self.html.rating(), self.html.errors()),
            (self.text.rating(), self.text.errors()),
            (self.xml.rating(), self.xml.errors()),
        ];
        for (rating, errors) in ratings {
            if rating <= RATING_NONE {
                continue;
            }
            if rating > best_rating {
                messages = errors.to_vec();
                best_rating = rating;
            }
        }
        if self.motif_count == 0 {
            messages.push(Message::error("No motifs found.", Vec::new()));
        }
        messages
    }

    /// Ends a streaming parse that found motifs; the messages go with `end`.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let messages = self.errors();
        if let Some(handler) = live_handler(&mut self.handler, &self.cancel) {
            handler.end(&messages);
        }
    }

    /// Ends a parse that needed the XML fallback; each message is sent
    /// through `error` first.
    fn finish_whole(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let messages = self.errors();
        if let Some(handler) = live_handler(&mut self.handler, &self.cancel) {
            for message in &messages {
                handler.error(message);
            }
            handler.end(&[]);
        }
    }

    /// Ends parsing with a single error, for files that are not text.
    fn reject(&mut self, message: String) {
        log::debug!("Rejected motif file: {}", message);
        self.finished = true;
        let message = Message::error(message, Vec::new());
        if let Some(handler) = live_handler(&mut self.handler, &self.cancel) {
            handler.progress(1.0);
            handler.error(&message);
            handler.end(&[]);
        }
    }

    fn stream(&mut self, chunk: &[u8], is_last: bool) {
        let mut relay = Relay {
            handler: &mut self.handler,
            cancel: &self.cancel,
            motif_count: &mut self.motif_count,
        };
        if self.html_active {
            if let Err(fault) = self.html.process_chunk(chunk, &mut relay) {
                log::debug!("HTML motif parser dropped: {}", fault);
                self.html_active = false;
            }
        }
        if self.text_active {
            if let Err(fault) = self.text.process_chunk(chunk, &mut relay) {
                log::debug!("Text motif parser dropped: {}", fault);
                self.text_active = false;
            }
        }
        if !is_last {
            return;
        }
        if self.html_active {
            if let Err(fault) = self.html.process_end(&mut relay) {
                log::debug!("HTML motif parser dropped: {}", fault);
                self.html_active = false;
            }
        }
        if self.text_active {
            if let Err(fault) = self.text.process_end(&mut relay) {
                log::debug!("Text motif parser dropped: {}", fault);
                self.text_active = false;
            }
        }
    }
}

impl<H: MotifEvents> ChunkConsumer for MotifParser<H> {
    fn begin(&mut self, size: u64, name: Option<&str>) {
        self.file_size = size;
        self.file_name = name.map(str::to_string);
        if let Some(handler) = live_handler(&mut self.handler, &self.cancel) {
            handler.begin(size);
        }
    }

    fn consume(&mut self, chunk: &[u8], offset: u64, is_last: bool) -> Result<Flow, CheckError> {
        if self.cancel.is_cancelled() {
            self.handler = None;
            return Ok(Flow::Cancelled);
        }
        let fraction = if self.file_size == 0 {
            0.0
        } else {
            offset as f64 / self.file_size as f64
        };
        if let Some(handler) = live_handler(&mut self.handler, &self.cancel) {
            handler.progress(fraction);
        }

        if offset == 0 {
            if let Some(format) = unusable_format(chunk, Some(MAGIC_SCAN), self.file_name.as_deref()) {
                let message = match format.kind {
                    FileKind::Encoding => {
                        format!("This is encoded as {} which is not parsable as a motif.", format.name)
                    }
                    FileKind::Binary | FileKind::Compressed => {
                        format!("This is a {} file which is not parsable as a motif.", format.name)
                    }
                };
                self.reject(message);
                return Ok(Flow::Finished);
            }
        } else if chunk.contains(&0) {
            self.reject("This is a unknown binary file which is not parsable as a motif.".to_string());
            return Ok(Flow::Finished);
        }

        self.stream(chunk, is_last);

        if is_last || !(self.html_active || self.text_active) {
            if let Some(handler) = live_handler(&mut self.handler, &self.cancel) {
                handler.progress(1.0);
            }
            if self.motif_count > 0 {
                self.finish();
                return Ok(Flow::Finished);
            }
            return Ok(Flow::NeedWholeFile);
        }
        Ok(Flow::Continue)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
