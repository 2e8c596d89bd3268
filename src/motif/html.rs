//! MEME and DREME HTML output.
//!
//! Older versions of MEME and DREME stored their results in hidden form
//! fields:
//!
//! ```html
//! <input type="hidden" name="version" value="MEME version 4.3.0">
//! <input type="hidden" name="alphabet" value="ACGT">
//! <input type="hidden" name="pspm1" value="letter-probability matrix: ...">
//! ```
//!
//! Newer versions embed a JSON object in a script, after an `@JSON_VAR`
//! marker. Both are found by a byte-level tag scanner that never holds more
//! than a tag name, an attribute value or the JSON text in memory. Script
//! and style bodies are skipped by searching for their end tag, so markup
//! inside them is never mistaken for tags.

use std::sync::OnceLock;

use serde::Deserialize;

use crate::alphabet::Alphabet;
use crate::model::{Matrix, Motif, MotifMeta, Strands};
use crate::motif::utils::{self, Counts};
use crate::motif::{MotifError, MotifResult, MotifSink, ParserFault, StreamingMotifParser, RATING_MOTIF, RATING_NONE};
use crate::report::Message;
use crate::search::BmSearch;

const PSPM_ROW_TOLERANCE: f64 = 0.00001;
const BACKGROUND_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag {
    name: &'static str,
    /// Body is skipped up to the end tag.
    skip: bool,
    /// Attributes are kept.
    input: bool,
    /// Body may hold the JSON data.
    script: bool,
}

impl Tag {
    const fn plain(name: &'static str) -> Self {
        Self {
            name,
            skip: false,
            input: false,
            script: false,
        }
    }
}

const TAGS: &[Tag] = &[
    Tag::plain("a"), Tag::plain("abbr"), Tag::plain("acronym"), Tag::plain("address"),
    Tag::plain("applet"), Tag::plain("area"), Tag::plain("b"), Tag::plain("base"),
    Tag::plain("basefont"), Tag::plain("bdo"), Tag::plain("big"), Tag::plain("blockquote"),
    Tag::plain("body"), Tag::plain("br"), Tag::plain("button"), Tag::plain("caption"),
    Tag::plain("center"), Tag::plain("cite"), Tag::plain("code"), Tag::plain("col"),
    Tag::plain("colgroup"), Tag::plain("dd"), Tag::plain("del"), Tag::plain("dfn"),
    Tag::plain("dir"), Tag::plain("div"), Tag::plain("dl"), Tag::plain("dt"),
    Tag::plain("em"), Tag::plain("fieldset"), Tag::plain("font"), Tag::plain("form"),
    Tag::plain("frame"), Tag::plain("frameset"), Tag::plain("h1"), Tag::plain("h2"),
    Tag::plain("h3"), Tag::plain("h4"), Tag::plain("h5"), Tag::plain("h6"),
    Tag::plain("head"), Tag::plain("hr"), Tag::plain("html"), Tag::plain("i"),
    Tag::plain("iframe"), Tag::plain("img"), Tag::plain("ins"), Tag::plain("isindex"),
    Tag::plain("kbd"), Tag::plain("label"), Tag::plain("legend"), Tag::plain("li"),
    Tag::plain("link"), Tag::plain("map"), Tag::plain("menu"), Tag::plain("meta"),
    Tag::plain("noframes"), Tag::plain("noscript"), Tag::plain("object"), Tag::plain("ol"),
    Tag::plain("optgroup"), Tag::plain("option"), Tag::plain("p"), Tag::plain("param"),
    Tag::plain("pre"), Tag::plain("q"), Tag::plain("s"), Tag::plain("samp"),
    Tag::plain("select"), Tag::plain("small"), Tag::plain("span"), Tag::plain("strike"),
    Tag::plain("strong"), Tag::plain("sub"), Tag::plain("sup"), Tag::plain("table"),
    Tag::plain("tbody"), Tag::plain("td"), Tag::plain("textarea"), Tag::plain("tfoot"),
    Tag::plain("th"), Tag::plain("thead"), Tag::plain("title"), Tag::plain("tr"),
    Tag::plain("tt"), Tag::plain("u"), Tag::plain("ul"), Tag::plain("var"),
    Tag::plain("xmp"),
    Tag { name: "script", skip: true, input: false, script: true },
    Tag { name: "style", skip: true, input: false, script: false },
    Tag { name: "input", skip: false, input: true, script: false },
];

/// Longest tag name plus room for a slash and one confirming byte.
const TAG_MAX: usize = 10 + 2;

fn lookup_tag(name: &str) -> Option<Tag> {
    TAGS.iter().copied().find(|tag| tag.name.eq_ignore_ascii_case(name))
}

/// Named character references.
const ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160), ("iexcl", 161), ("cent", 162), ("pound", 163), ("curren", 164),
    ("yen", 165), ("brvbar", 166), ("sect", 167), ("uml", 168), ("copy", 169),
    ("ordf", 170), ("laquo", 171), ("not", 172), ("shy", 173), ("reg", 174), ("macr", 175),
    ("deg", 176), ("plusmn", 177), ("sup2", 178), ("sup3", 179), ("acute", 180),
    ("micro", 181), ("para", 182), ("middot", 183), ("cedil", 184), ("sup1", 185),
    ("ordm", 186), ("raquo", 187), ("frac14", 188), ("frac12", 189), ("frac34", 190),
    ("iquest", 191), ("Agrave", 192), ("Aacute", 193), ("Acirc", 194), ("Atilde", 195),
    ("Auml", 196), ("Aring", 197), ("AElig", 198), ("Ccedil", 199), ("Egrave", 200),
    ("Eacute", 201), ("Ecirc", 202), ("Euml", 203), ("Igrave", 204), ("Iacute", 205),
    ("Icirc", 206), ("Iuml", 207), ("ETH", 208), ("Ntilde", 209), ("Ograve", 210),
    ("Oacute", 211), ("Ocirc", 212), ("Otilde", 213), ("Ouml", 214), ("times", 215),
    ("Oslash", 216), ("Ugrave", 217), ("Uacute", 218), ("Ucirc", 219), ("Uuml", 220),
    ("Yacute", 221), ("THORN", 222), ("szlig", 223), ("agrave", 224), ("aacute", 225),
    ("acirc", 226), ("atilde", 227), ("auml", 228), ("aring", 229), ("aelig", 230),
    ("ccedil", 231), ("egrave", 232), ("eacute", 233), ("ecirc", 234), ("euml", 235),
    ("igrave", 236), ("iacute", 237), ("icirc", 238), ("iuml", 239), ("eth", 240),
    ("ntilde", 241), ("ograve", 242), ("oacute", 243), ("ocirc", 244), ("otilde", 245),
    ("ouml", 246), ("divide", 247), ("oslash", 248), ("ugrave", 249), ("uacute", 250),
    ("ucirc", 251), ("uuml", 252), ("yacute", 253), ("thorn", 254), ("yuml", 255),
    ("fnof", 402), ("Alpha", 913), ("Beta", 914), ("Gamma", 915), ("Delta", 916),
    ("Epsilon", 917), ("Zeta", 918), ("Eta", 919), ("Theta", 920), ("Iota", 921),
    ("Kappa", 922), ("Lambda", 923), ("Mu", 924), ("Nu", 925), ("Xi", 926),
    ("Omicron", 927), ("Pi", 928), ("Rho", 929), ("Sigma", 931), ("Tau", 932),
    ("Upsilon", 933), ("Phi", 934), ("Chi", 935), ("Psi", 936), ("Omega", 937),
    ("alpha", 945), ("beta", 946), ("gamma", 947), ("delta", 948), ("epsilon", 949),
    ("zeta", 950), ("eta", 951), ("theta", 952), ("iota", 953), ("kappa", 954),
    ("lambda", 955), ("mu", 956), ("nu", 957), ("xi", 958), ("omicron", 959), ("pi", 960),
    ("rho", 961), ("sigmaf", 962), ("sigma", 963), ("tau", 964), ("upsilon", 965),
    ("phi", 966), ("chi", 967), ("psi", 968), ("omega", 969), ("thetasym", 977),
    ("upsih", 978), ("piv", 982), ("bull", 8226), ("hellip", 8230), ("prime", 8242),
    ("Prime", 8243), ("oline", 8254), ("frasl", 8260), ("weierp", 8472), ("image", 8465),
    ("real", 8476), ("trade", 8482), ("alefsym", 8501), ("larr", 8592), ("uarr", 8593),
    ("rarr", 8594), ("darr", 8595), ("harr", 8596), ("crarr", 8629), ("lArr", 8656),
    ("uArr", 8657), ("rArr", 8658), ("dArr", 8659), ("hArr", 8660), ("forall", 8704),
    ("part", 8706), ("exist", 8707), ("empty", 8709), ("nabla", 8711), ("isin", 8712),
    ("notin", 8713), ("ni", 8715), ("prod", 8719), ("sum", 8721), ("minus", 8722),
    ("lowast", 8727), ("radic", 8730), ("prop", 8733), ("infin", 8734), ("ang", 8736),
    ("and", 8743), ("or", 8744), ("cap", 8745), ("cup", 8746), ("int", 8747),
    ("there4", 8756), ("sim", 8764), ("cong", 8773), ("asymp", 8776), ("ne", 8800),
    ("equiv", 8801), ("le", 8804), ("ge", 8805), ("sub", 8834), ("sup", 8835),
    ("nsub", 8836), ("sube", 8838), ("supe", 8839), ("oplus", 8853), ("otimes", 8855),
    ("perp", 8869), ("sdot", 8901), ("lceil", 8968), ("rceil", 8969), ("lfloor", 8970),
    ("rfloor", 8971), ("lang", 9001), ("rang", 9002), ("loz", 9674), ("spades", 9824),
    ("clubs", 9827), ("hearts", 9829), ("diams", 9830), ("quot", 34), ("amp", 38),
    ("lt", 60), ("gt", 62), ("OElig", 338), ("oelig", 339), ("Scaron", 352),
    ("scaron", 353), ("Yuml", 376), ("circ", 710), ("tilde", 732), ("ensp", 8194),
    ("emsp", 8195), ("thinsp", 8201), ("zwnj", 8204), ("zwj", 8205), ("lrm", 8206),
    ("rlm", 8207), ("ndash", 8211), ("mdash", 8212), ("lsquo", 8216), ("rsquo", 8217),
    ("sbquo", 8218), ("ldquo", 8220), ("rdquo", 8221), ("bdquo", 8222), ("dagger", 8224),
    ("Dagger", 8225), ("permil", 8240), ("lsaquo", 8249), ("rsaquo", 8250), ("euro", 8364),
];

/// Replaces character references; unknown ones are left as they are.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    regex!(r"&(?:#([1-9][0-9]*)|#[xX]([0-9a-fA-F]+)|([a-zA-Z][a-zA-Z0-9]*));")
        .replace_all(text, |caps: &regex::Captures| {
            let code = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok()
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok()
            } else {
                caps.get(3)
                    .and_then(|name| ENTITIES.iter().find(|(entity, _)| *entity == name.as_str()))
                    .map(|(_, code)| *code)
            };
            match code.and_then(char::from_u32) {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn is_space(byte: u8) -> bool {
    byte == b' ' || (9..=13).contains(&byte)
}

fn search<'a>(cell: &'a OnceLock<BmSearch>, needle: &str, ignore_case: bool) -> &'a BmSearch {
    cell.get_or_init(|| BmSearch::new(needle, ignore_case).expect("ASCII search needle"))
}

fn end_tag_search(tag: Tag) -> &'static BmSearch {
    static SCRIPT: OnceLock<BmSearch> = OnceLock::new();
    static STYLE: OnceLock<BmSearch> = OnceLock::new();
    if tag.script {
        search(&SCRIPT, "</script", true)
    } else {
        search(&STYLE, "</style", true)
    }
}

fn comment_end_search() -> &'static BmSearch {
    static COMMENT_END: OnceLock<BmSearch> = OnceLock::new();
    search(&COMMENT_END, "-->", false)
}

fn json_var_search() -> &'static BmSearch {
    static JSON_VAR: OnceLock<BmSearch> = OnceLock::new();
    search(&JSON_VAR, "@JSON_VAR", false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
    None,
}

impl Quote {
    fn ends_at(self, byte: u8) -> bool {
        match self {
            Quote::Single => byte == b'\'',
            Quote::Double => byte == b'"',
            Quote::None => is_space(byte) || byte == b'<' || byte == b'>',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    TagName,
    InTag,
    AttrName,
    AttrEquals,
    AttrValue,
    InValue(Quote),
    Comment,
    Skip,
    SkipMatch,
    JsonVarMatch,
    JsonStart,
    Json,
}

/// Which attribute value of an input tag is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Store {
    Nothing,
    Type,
    Name,
    Value,
}

#[derive(Debug, Default)]
struct Info {
    version: Option<String>,
    alphabet: Alphabet,
    strands: Option<Strands>,
    background: Option<Vec<f64>>,
}

#[derive(Debug, Default)]
struct PendingMotif {
    index: Option<String>,
    id: Option<String>,
    alt: Option<String>,
    len: Option<usize>,
    nsites: Option<f64>,
    evalue: Option<f64>,
    pwm: Option<Matrix>,
    psm: Option<Matrix>,
}

#[derive(Debug, Deserialize)]
struct JsonData {
    version: String,
    alphabet: JsonAlphabet,
    #[serde(default)]
    motifs: Vec<JsonMotif>,
}

#[derive(Debug, Deserialize)]
struct JsonAlphabet {
    symbols: String,
    strands: String,
    freqs: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct JsonMotif {
    id: String,
    alt: Option<String>,
    len: Option<usize>,
    nsites: Option<f64>,
    /// Written as a number or as a string such as `"1.2e-010"`.
    evalue: Option<serde_json::Value>,
    pwm: Matrix,
    psm: Option<Matrix>,
    url: Option<String>,
}

#[derive(Debug)]
pub struct HtmlMotifParser {
    state: State,
    stopped: bool,
    errors: Vec<Message>,
    rating: u8,
    buf: Vec<u8>,
    leading_slash: bool,
    trailing_slash: bool,
    partial_match: usize,
    partial_match2: usize,
    store: Store,
    gap: bool,
    tag: Option<Tag>,
    input_hidden: bool,
    input_name: String,
    input_value: String,
    in_json_string: bool,
    in_json_escape: bool,
    json_nesting: usize,
    info: Info,
    motif: PendingMotif,
}

impl Default for HtmlMotifParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlMotifParser {
    pub fn new() -> Self {
        Self {
            state: State::Ready,
            stopped: false,
            errors: Vec::new(),
            rating: RATING_NONE,
            buf: Vec::new(),
            leading_slash: false,
            trailing_slash: false,
            partial_match: 0,
            partial_match2: 0,
            store: Store::Nothing,
            gap: false,
            tag: None,
            input_hidden: false,
            input_name: String::new(),
            input_value: String::new(),
            in_json_string: false,
            in_json_escape: false,
            json_nesting: 0,
            info: Info::default(),
            motif: PendingMotif::default(),
        }
    }

    /// Runs the current state on the front of `chunk`, returning how many
    /// bytes it consumed.
    fn step(&mut self, chunk: &[u8], sink: &mut dyn MotifSink) -> MotifResult<usize> {
        Ok(match self.state {
            State::Ready => self.ready(chunk),
            State::TagName => self.tag_name(chunk),
            State::InTag => return self.in_tag(chunk, sink),
            State::AttrName => self.attr_name(chunk),
            State::AttrEquals => self.attr_equals(chunk),
            State::AttrValue => self.attr_value(chunk),
            State::InValue(quote) => return self.in_value(chunk, quote),
            State::Comment => self.comment(chunk),
            State::Skip => self.skip(chunk),
            State::SkipMatch => self.skip_match(chunk),
            State::JsonVarMatch => self.json_var_match(chunk),
            State::JsonStart => self.json_start(chunk),
            State::Json => return self.json(chunk, sink),
        })
    }

    fn ready(&mut self, chunk: &[u8]) -> usize {
        match chunk.iter().position(|&b| b == b'<') {
            Some(i) => {
                self.state = State::TagName;
                i + 1
            }
            None => chunk.len(),
        }
    }

    fn tag_name(&mut self, chunk: &[u8]) -> usize {
        let existing = self.buf.len();
        let mut end = chunk.len();
        for (i, &byte) in chunk.iter().enumerate() {
            if is_space(byte) || byte == b'<' || byte == b'>' {
                end = i;
                break;
            }
            if byte > 127 {
                // tag names are ASCII
                self.buf.clear();
                self.state = State::Ready;
                return 0;
            }
        }
        if existing < TAG_MAX {
            self.buf.extend_from_slice(&chunk[..end.min(TAG_MAX - existing)]);
        }
        if existing < 3 && self.buf.starts_with(b"!--") {
            self.state = State::Comment;
            self.partial_match = 0;
            self.buf.clear();
            return 3 - existing;
        }
        if end == chunk.len() {
            return chunk.len();
        }
        let mut name: &[u8] = &self.buf;
        self.leading_slash = name.first() == Some(&b'/');
        if self.leading_slash {
            name = &name[1..];
        }
        self.trailing_slash = name.last() == Some(&b'/');
        if self.trailing_slash {
            name = &name[..name.len() - 1];
        }
        self.tag = std::str::from_utf8(name).ok().and_then(lookup_tag);
        match self.tag {
            Some(tag) => {
                if tag.name == "html" {
                    self.rating = self.rating.max(2);
                }
                self.state = State::InTag;
            }
            None => self.state = State::Ready,
        }
        self.buf.clear();
        end
    }

    fn in_tag(&mut self, chunk: &[u8], sink: &mut dyn MotifSink) -> MotifResult<usize> {
        let Some(i) = chunk.iter().position(|&b| !is_space(b)) else {
            return Ok(chunk.len());
        };
        let Some(tag) = self.tag else {
            self.state = State::Ready;
            return Ok(i);
        };
        match chunk[i] {
            b'/' => self.trailing_slash = true,
            b'<' | b'>' => {
                let name = std::mem::take(&mut self.input_name);
                let value = std::mem::take(&mut self.input_value);
                if tag.input && self.input_hidden && !name.is_empty() && !value.is_empty() {
                    self.hidden_input(&name, &value, sink)?;
                }
                self.input_hidden = false;
                if tag.skip && !(self.leading_slash || self.trailing_slash) {
                    self.partial_match = 0;
                    self.state = State::Skip;
                } else {
                    self.tag = None;
                    self.state = State::Ready;
                }
                if chunk[i] == b'<' {
                    return Ok(i);
                }
            }
            _ => {
                self.trailing_slash = false;
                self.state = State::AttrName;
                return Ok(i);
            }
        }
        Ok(i + 1)
    }

    fn attr_name(&mut self, chunk: &[u8]) -> usize {
        let existing = self.buf.len();
        let mut end = chunk.len();
        for (i, &byte) in chunk.iter().enumerate() {
            if is_space(byte) || byte == b'/' || (b'<'..=b'>').contains(&byte) {
                end = i;
                break;
            }
            if byte > 127 {
                self.state = State::Ready;
                self.buf.clear();
                return 0;
            }
        }
        let input = self.tag.is_some_and(|tag| tag.input);
        if input && existing < 6 {
            // just enough to tell type, name and value apart
            self.buf.extend_from_slice(&chunk[..end.min(6 - existing)]);
        }
        if end == chunk.len() {
            return chunk.len();
        }
        self.buf.make_ascii_lowercase();
        self.store = match (input, self.buf.as_slice()) {
            (true, b"type") => Store::Type,
            (true, b"name") => Store::Name,
            (true, b"value") => Store::Value,
            _ => Store::Nothing,
        };
        self.buf.clear();
        self.state = State::AttrEquals;
        end
    }

    fn attr_equals(&mut self, chunk: &[u8]) -> usize {
        let Some(i) = chunk.iter().position(|&b| !is_space(b)) else {
            return chunk.len();
        };
        if chunk[i] == b'=' {
            self.state = State::AttrValue;
            self.gap = false;
            i + 1
        } else {
            // attribute without a value
            self.state = State::InTag;
            i
        }
    }

    fn attr_value(&mut self, chunk: &[u8]) -> usize {
        let Some(i) = chunk.iter().position(|&b| !is_space(b)) else {
            if !chunk.is_empty() {
                self.gap = true;
            }
            return chunk.len();
        };
        if i > 0 {
            self.gap = true;
        }
        self.buf.clear();
        match chunk[i] {
            b'>' => {
                self.state = State::InTag;
                i
            }
            b'"' => {
                self.state = State::InValue(Quote::Double);
                i + 1
            }
            b'\'' => {
                self.state = State::InValue(Quote::Single);
                i + 1
            }
            _ => {
                self.state = if self.gap {
                    // `name= other`: the value is empty and `other` is the
                    // next attribute
                    State::InTag
                } else {
                    State::InValue(Quote::None)
                };
                i
            }
        }
    }

    fn in_value(&mut self, chunk: &[u8], quote: Quote) -> MotifResult<usize> {
        let end = chunk.iter().position(|&b| quote.ends_at(b));
        let value_end = end.unwrap_or(chunk.len());
        if self.store != Store::Nothing {
            self.buf.extend_from_slice(&chunk[..value_end]);
        }
        let Some(end) = end else {
            return Ok(chunk.len());
        };
        if self.store != Store::Nothing {
            let raw = std::mem::take(&mut self.buf);
            let text = String::from_utf8(raw)
                .map_err(|_| MotifError::new("Attribute value is not valid UTF-8."))?;
            let value = decode_entities(&text);
            match self.store {
                Store::Type => self.input_hidden = value == "hidden",
                Store::Name => self.input_name = value,
                Store::Value => self.input_value = value,
                Store::Nothing => {}
            }
        }
        self.buf.clear();
        self.state = State::InTag;
        // an unquoted value leaves its terminator for the tag
        Ok(if quote == Quote::None { end } else { end + 1 })
    }

    fn comment(&mut self, chunk: &[u8]) -> usize {
        let search = comment_end_search();
        let found = search.index_in(chunk, -(self.partial_match as isize));
        self.partial_match = 0;
        if let Some(found) = found {
            if found.complete {
                self.state = State::Ready;
                return found.end(search.len());
            }
            self.partial_match = found.carry(chunk.len());
        }
        chunk.len()
    }

    /// Looks for `@JSON_VAR` in a script body. `end` is true when `chunk`
    /// stops at the script's end tag, so a partial match cannot continue.
    fn json_var(&mut self, chunk: &[u8], end: bool) -> Option<usize> {
        let search = json_var_search();
        let found = search.index_in(chunk, -(self.partial_match2 as isize));
        self.partial_match2 = 0;
        let found = found?;
        if found.complete {
            self.state = State::JsonVarMatch;
            return Some(found.end(search.len()));
        }
        if !end {
            self.partial_match2 = found.carry(chunk.len());
        }
        None
    }

    fn skip(&mut self, chunk: &[u8]) -> usize {
        let Some(tag) = self.tag else {
            self.state = State::Ready;
            return 0;
        };
        let search = end_tag_search(tag);
        let found = search.index_in(chunk, -(self.partial_match as isize));
        self.partial_match = 0;
        match found {
            Some(found) => {
                // "</script" and "@JSON_VAR" share no prefix, so their
                // partial matches never overlap
                if tag.script && found.index > 0 {
                    if let Some(consumed) = self.json_var(&chunk[..found.index as usize], true) {
                        return consumed;
                    }
                }
                if found.complete {
                    self.partial_match2 = 0;
                    self.state = State::SkipMatch;
                    return found.end(search.len());
                }
                self.partial_match = found.carry(chunk.len());
            }
            None if tag.script => {
                if let Some(consumed) = self.json_var(chunk, false) {
                    return consumed;
                }
            }
            None => {}
        }
        chunk.len()
    }

    fn skip_match(&mut self, chunk: &[u8]) -> usize {
        let byte = chunk[0];
        if is_space(byte) || byte == b'<' || byte == b'>' {
            self.leading_slash = true;
            self.trailing_slash = false;
            self.state = State::InTag;
        } else {
            self.state = State::Skip;
        }
        0
    }

    fn json_var_match(&mut self, chunk: &[u8]) -> usize {
        self.state = if is_space(chunk[0]) {
            State::JsonStart
        } else {
            State::Skip
        };
        0
    }

    fn json_start(&mut self, chunk: &[u8]) -> usize {
        match chunk.iter().position(|&b| b == b'{') {
            Some(i) => {
                self.buf.clear();
                self.in_json_string = false;
                self.in_json_escape = false;
                self.json_nesting = 0;
                self.state = State::Json;
                i
            }
            None => chunk.len(),
        }
    }

    fn json(&mut self, chunk: &[u8], sink: &mut dyn MotifSink) -> MotifResult<usize> {
        for (i, &byte) in chunk.iter().enumerate() {
            if self.in_json_string {
                if self.in_json_escape {
                    self.in_json_escape = false;
                } else if byte == b'\\' {
                    self.in_json_escape = true;
                } else if byte == b'"' {
                    self.in_json_string = false;
                }
            } else {
                match byte {
                    b'{' => self.json_nesting += 1,
                    b'}' => self.json_nesting = self.json_nesting.saturating_sub(1),
                    b'"' => self.in_json_string = true,
                    _ => {}
                }
            }
            if self.json_nesting == 0 {
                self.buf.extend_from_slice(&chunk[..=i]);
                let text = std::mem::take(&mut self.buf);
                self.partial_match = 0;
                self.state = State::Skip;
                let result = serde_json::from_slice::<JsonData>(&text)
                    .map_err(|err| MotifError::new(err.to_string()))
                    .and_then(|data| self.json_data(data, sink));
                if let Err(err) = result {
                    log::debug!("Ignoring embedded JSON: {}", err);
                }
                return Ok(i + 1);
            }
        }
        self.buf.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn json_data(&mut self, data: JsonData, sink: &mut dyn MotifSink) -> MotifResult<()> {
        if !regex!(r"^\d+(?:\.\d+){0,2}$").is_match(&data.version) {
            return Err(MotifError::new(format!("Invalid version string \"{}\".", data.version)));
        }
        self.rating = self.rating.max(3);
        let alphabet = Alphabet::from_letters(&data.alphabet.symbols);
        if alphabet == Alphabet::Unknown {
            return Err(MotifError::new(format!(
                "Unrecognised alphabet string \"{}\".",
                data.alphabet.symbols
            )));
        }
        self.rating = self.rating.max(4);
        let strands = match (alphabet.is_nucleotide(), data.alphabet.strands.as_str()) {
            (true, "both") => Strands::Both,
            (true, "forward") => Strands::Forward,
            (false, "none") => Strands::None,
            (true, other) => return Err(MotifError::new(format!("Bad strand value \"{}\" for DNA.", other))),
            (false, other) => {
                return Err(MotifError::new(format!("Bad strand value \"{}\" for protein.", other)))
            }
        };
        self.rating = self.rating.max(5);
        let size = alphabet.size().unwrap_or(0);
        let background = if data.alphabet.freqs.len() == size {
            data.alphabet.freqs
        } else {
            log::debug!("Embedded background has {} entries, using uniform", data.alphabet.freqs.len());
            utils::uniform_freqs(size)
        };
        self.rating = self.rating.max(6);
        let meta = MotifMeta {
            version: Some(data.version),
            alphabet,
            strands,
            background,
        };
        sink.meta(&meta);
        for motif in data.motifs {
            if motif.pwm.iter().any(|row| row.len() != size) {
                log::debug!("Skipping embedded motif {}: rows do not match the alphabet", motif.id);
                continue;
            }
            let nsites = motif.nsites.unwrap_or(utils::DEFAULT_SITECOUNT);
            let psm = motif.psm.unwrap_or_else(|| {
                utils::freqs_to_scores(&motif.pwm, Counts::with_sites(nsites), Some(&meta.background))
            });
            let evalue = match motif.evalue {
                Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
                _ => 0.0,
            };
            sink.motif(&Motif {
                len: motif.len.unwrap_or(motif.pwm.len()),
                id: motif.id,
                alt: motif.alt,
                nsites,
                evalue,
                pwm: motif.pwm,
                psm: Some(psm),
                url: motif.url,
            });
            self.rating = RATING_MOTIF;
        }
        Ok(())
    }

    fn require(&self, what: &str, strands: bool, background: bool) -> MotifResult<()> {
        if self.info.version.is_none() {
            return Err(MotifError::new(format!("Expected version before {}", what)));
        }
        if self.info.alphabet == Alphabet::Unknown {
            return Err(MotifError::new(format!("Expected alphabet before {}", what)));
        }
        if strands && self.info.strands.is_none() {
            return Err(MotifError::new(format!("Expected strands before {}", what)));
        }
        if background && self.info.background.is_none() {
            return Err(MotifError::new(format!("Expected bgfreq before {}", what)));
        }
        Ok(())
    }

    fn hidden_input(&mut self, name: &str, value: &str, sink: &mut dyn MotifSink) -> MotifResult<()> {
        log::trace!("Hidden input {}", name);
        if name == "version" {
            let caps = regex!(r"(?:^|\s)MEME\s+version\s+(\d+(?:\.\d+){0,2})(?:\s|$)")
                .captures(value)
                .ok_or_else(|| MotifError::new("Bad version value."))?;
            self.info.version = Some(caps[1].to_string());
            self.rating = self.rating.max(3);
        } else if name == "alphabet" {
            if self.info.version.is_none() {
                return Err(MotifError::new("Expected version before alphabet"));
            }
            self.info.alphabet = match value {
                "ACGT" => Alphabet::Dna,
                "ACDEFGHIKLMNPQRSTVWY" => Alphabet::Protein,
                _ => return Err(MotifError::new("Bad alphabet value.")),
            };
            self.rating = self.rating.max(4);
        } else if name == "strands" {
            self.require("strands", false, false)?;
            self.info.strands = Some(if self.info.alphabet.is_nucleotide() {
                match value {
                    // DREME writes the text notation
                    "+ -" | "both" => Strands::Both,
                    "forward" => Strands::Forward,
                    _ => {
                        return Err(MotifError::new(
                            "DNA motifs must have 'both', 'forward' or '+ -' for strands",
                        ))
                    }
                }
            } else if value == "none" {
                Strands::None
            } else {
                return Err(MotifError::new("Protein motifs must have 'none' value for strands."));
            });
            self.rating = self.rating.max(5);
        } else if name == "bgfreq" {
            self.require("bgfreq", true, false)?;
            self.bgfreq(value, sink)?;
        } else if let Some(index) = name.strip_prefix("motifname") {
            self.require("matrix", true, true)?;
            self.report_motif(Some(index), sink)?;
            self.motif.id = Some(value.to_string());
            // only DREME names its motifs this way
            self.motif.alt = Some("DREME".to_string());
        } else if let Some(index) = name.strip_prefix("pssm") {
            self.require("matrix", true, true)?;
            self.report_motif(Some(index), sink)?;
            self.matrix(value, false, sink)?;
        } else if let Some(index) = name.strip_prefix("pspm") {
            self.require("matrix", true, true)?;
            self.report_motif(Some(index), sink)?;
            self.matrix(value, true, sink)?;
        } else if name == "nmotifs" {
            log::debug!("HTML file lists {} motifs", value);
        }
        Ok(())
    }

    fn bgfreq(&mut self, value: &str, sink: &mut dyn MotifSink) -> MotifResult<()> {
        let letters: Vec<char> = self.info.alphabet.letters().unwrap_or("").chars().collect();
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() != 2 * letters.len() {
            return Err(MotifError::new("Incorrect number of parts in bgfreq."));
        }
        let mut freqs = Vec::with_capacity(letters.len());
        for (letter, pair) in letters.iter().zip(parts.chunks(2)) {
            let mut chars = pair[0].chars();
            if chars.next() != Some(*letter) || chars.next().is_some() {
                return Err(MotifError::new(format!(
                    "Expected bgfreq alphabet letter {} but got \"{}\".",
                    letter, pair[0]
                )));
            }
            let freq = match pair[1].parse::<f64>() {
                Ok(freq) if regex!(r"^\d(?:\.\d+)?(?:[eE]\d+)?$").is_match(pair[1]) => freq,
                _ => {
                    return Err(MotifError::new(format!(
                        "Expected bgfreq probability for letter {} but got \"{}\".",
                        letter, pair[1]
                    )))
                }
            };
            if freq > 1.0 {
                return Err(MotifError::new(format!(
                    "Expected bgfreq probability for letter {} but got {} which is out of range.",
                    letter, freq
                )));
            }
            freqs.push(freq);
        }
        if !utils::sums_to_one(&freqs, BACKGROUND_TOLERANCE) {
            return Err(MotifError::new("Probabilities in bgfreq don't sum to 1.0"));
        }
        let mut meta = MotifMeta::new(self.info.version.clone(), self.info.alphabet);
        meta.strands = self.info.strands.unwrap_or(meta.strands);
        meta.background = freqs.clone();
        self.info.background = Some(freqs);
        self.rating = self.rating.max(6);
        sink.meta(&meta);
        Ok(())
    }

    fn matrix(&mut self, value: &str, is_pspm: bool, sink: &mut dyn MotifSink) -> MotifResult<()> {
        let (kind, existing) = if is_pspm {
            ("PSPM", &self.motif.pwm)
        } else {
            ("PSSM", &self.motif.psm)
        };
        if existing.is_some() {
            return Err(MotifError::new(format!("Already seen {} for this motif.", kind)));
        }
        let lines: Vec<&str> = value
            .split(['\r', '\n'])
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.len() < 2 {
            return Err(MotifError::new("Insufficient lines to define a motif."));
        }
        if is_pspm && !regex!(r"^\s*letter-probability\s+matrix:").is_match(lines[0]) {
            return Err(MotifError::new(
                "First line of PSPM should begin with \"letter-probability matrix:\"",
            ));
        }
        if !is_pspm && !regex!(r"^\s*log-odds\s+matrix:").is_match(lines[0]) {
            return Err(MotifError::new("First line of PSSM should begin with \"log-odds matrix:\""));
        }
        let size = self.info.alphabet.size().unwrap_or(0);
        let header = lines[0].split_once(':').map_or("", |(_, rest)| rest);
        for caps in regex!(r"([a-zA-Z]+)\s*=\s*([+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)").captures_iter(header) {
            let Ok(num) = caps[2].parse::<f64>() else {
                continue;
            };
            match &caps[1] {
                "alength" => {
                    if num != size as f64 {
                        return Err(MotifError::new("Matrix header value 'alength' does not match alphabet."));
                    }
                }
                "w" => {
                    if num.fract() != 0.0 || num < 0.0 {
                        return Err(MotifError::new("Matrix header value 'w' should be a whole number."));
                    }
                    let width = num as usize;
                    if width != lines.len() - 1 {
                        return Err(MotifError::new(
                            "Matrix header value 'w' does not match the number of remaining non-empty lines.",
                        ));
                    }
                    check_same(&mut self.motif.len, width, "w")?;
                }
                // sites may be fractional
                "nsites" => check_same(&mut self.motif.nsites, num, "nsites")?,
                "E" => check_same(&mut self.motif.evalue, num, "E")?,
                _ => {}
            }
        }
        let mut matrix = Vec::with_capacity(lines.len() - 1);
        for line in &lines[1..] {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != size {
                return Err(MotifError::new("Matrix row does not have enough entries for the alphabet."));
            }
            let mut row = Vec::with_capacity(size);
            for part in parts {
                let num = match part.parse::<f64>() {
                    Ok(num) if regex!(r"^[+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?$").is_match(part) => num,
                    _ => {
                        return Err(MotifError::new(format!(
                            "Matrix row contains an entry \"{}\" that is not a number.",
                            part
                        )))
                    }
                };
                if is_pspm && !(0.0..=1.0).contains(&num) {
                    return Err(MotifError::new("Matrix row for PSPM contains an entry that is not a probability."));
                }
                row.push(num);
            }
            if is_pspm && !utils::sums_to_one(&row, PSPM_ROW_TOLERANCE) {
                return Err(MotifError::new("Matrix row for PSPM does not sum to 1."));
            }
            matrix.push(row);
        }
        self.motif.len.get_or_insert(matrix.len());
        if is_pspm {
            self.motif.pwm = Some(matrix);
        } else {
            self.motif.psm = Some(matrix);
        }
        if self.motif.pwm.is_some() && self.motif.psm.is_some() {
            self.report_motif(None, sink)?;
        }
        Ok(())
    }

    /// Reports the pending motif when `new_index` belongs to a different
    /// motif, then starts tracking `new_index`.
    fn report_motif(&mut self, new_index: Option<&str>, sink: &mut dyn MotifSink) -> MotifResult<()> {
        let Some(index) = self.motif.index.as_deref() else {
            if let Some(new_index) = new_index {
                self.motif = PendingMotif {
                    index: Some(new_index.to_string()),
                    ..PendingMotif::default()
                };
            }
            return Ok(());
        };
        if Some(index) == new_index {
            return Ok(());
        }
        let pending = std::mem::replace(
            &mut self.motif,
            PendingMotif {
                index: new_index.map(str::to_string),
                ..PendingMotif::default()
            },
        );
        let (id, alt) = match pending.id {
            Some(id) => (id, pending.alt),
            None => (pending.index.unwrap_or_default(), Some("MEME".to_string())),
        };
        let nsites = pending.nsites.unwrap_or(utils::DEFAULT_SITECOUNT);
        let counts = Counts::with_sites(nsites);
        let background = self.info.background.as_deref();
        let (pwm, psm) = match (pending.pwm, pending.psm) {
            (Some(pwm), Some(psm)) => (pwm, psm),
            (Some(pwm), None) => {
                let psm = utils::freqs_to_scores(&pwm, counts, background);
                (pwm, psm)
            }
            (None, Some(psm)) => (utils::scores_to_freqs(&psm, counts, background), psm),
            (None, None) => return Err(MotifError::new(format!("Motif {} has no matrix.", id))),
        };
        sink.motif(&Motif {
            id,
            alt,
            len: pending.len.unwrap_or(pwm.len()),
            nsites,
            evalue: pending.evalue.unwrap_or(0.0),
            pwm,
            psm: Some(psm),
            url: None,
        });
        self.rating = RATING_MOTIF;
        Ok(())
    }

    fn record(&mut self, error: MotifError) {
        log::debug!("HTML motif parser stopped: {}", error);
        self.errors.push(error.to_message());
        self.stopped = true;
    }
}

/// Stores `value` or checks it against the value already read from the
/// other matrix.
fn check_same<T: PartialEq + Copy>(slot: &mut Option<T>, value: T, key: &str) -> MotifResult<()> {
    match slot {
        Some(existing) if *existing != value => Err(MotifError::new(format!(
            "Matrix header value '{}' does not match previously read values.",
            key
        ))),
        Some(_) => Ok(()),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

impl StreamingMotifParser for HtmlMotifParser {
    fn process_chunk(&mut self, chunk: &[u8], sink: &mut dyn MotifSink) -> Result<(), ParserFault> {
        let mut offset = 0;
        while !self.stopped && offset < chunk.len() {
            match self.step(&chunk[offset..], sink) {
                Ok(consumed) => offset += consumed,
                Err(error) => self.record(error),
            }
        }
        Ok(())
    }

    fn process_end(&mut self, sink: &mut dyn MotifSink) -> Result<(), ParserFault> {
        if !self.stopped && self.motif.index.is_some() {
            if let Err(error) = self.report_motif(None, sink) {
                self.record(error);
            }
        }
        Ok(())
    }

    fn rating(&self) -> u8 {
        self.rating
    }

    fn errors(&self) -> &[Message] {
        &self.errors
    }
}
