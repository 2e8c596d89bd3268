//! MEME-XML and DREME-XML motif files.
//!
//! XML cannot be checked a chunk at a time, so this parser only runs when
//! the streaming parsers found nothing. It takes the whole document:
//!
//! ```xml
//! <MEME version="4.4.0">
//!   <training_set>
//!     <alphabet id="nucleotide">
//!       <letter id="letter_A" symbol="A"/> ...
//!     </alphabet>
//!   </training_set>
//!   <model>
//!     <strands>both</strands>
//!     <background_frequencies>
//!       <alphabet_array><value letter_id="letter_A">0.25</value> ...</alphabet_array>
//!     </background_frequencies>
//!   </model>
//!   <motifs>
//!     <motif name="ACGT" width="4" sites="10" e_value="1e-5">
//!       <scores><alphabet_matrix><alphabet_array>...</alphabet_array></alphabet_matrix></scores>
//!       <probabilities><alphabet_matrix>...</alphabet_matrix></probabilities>
//!     </motif>
//!   </motifs>
//! </MEME>
//! ```
//!
//! DREME files have a `<dreme>` root with `A`/`C`/`G`/`T` attributes on the
//! background and on each motif position.

use roxmltree::{Document, Node};

use crate::alphabet::Alphabet;
use crate::model::{Matrix, Motif, MotifMeta, Strands};
use crate::motif::utils::{self, Counts};
use crate::motif::{MotifError, MotifResult, MotifSink, RATING_MOTIF, RATING_NONE};
use crate::report::Message;

const PROBABILITY_TOLERANCE: f64 = 0.01;
const DNA_LETTERS: [&str; 4] = ["A", "C", "G", "T"];

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn children<'a, 'input: 'a>(node: Node<'a, 'input>, name: &'a str) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.has_tag_name(name))
}

/// Follows a path of element names below `node`.
fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    path.iter().try_fold(node, |node, name| child(node, name))
}

fn text_of(node: Option<Node>) -> String {
    node.and_then(|n| n.text()).unwrap_or("").trim().to_string()
}

fn is_number(text: &str) -> bool {
    regex!(r"^[+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?$").is_match(text)
}

fn is_whole(text: &str) -> bool {
    regex!(r"^\d+$").is_match(text)
}

#[derive(Debug)]
pub struct XmlMotifParser {
    errors: Vec<Message>,
    rating: u8,
}

impl Default for XmlMotifParser {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlMotifParser {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            rating: RATING_NONE,
        }
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn errors(&self) -> &[Message] {
        &self.errors
    }

    /// Parses `text` as XML and reads it. Text that is not well-formed XML
    /// is not an XML motif file and is silently ignored.
    pub fn process_text(&mut self, text: &str, sink: &mut dyn MotifSink) {
        match Document::parse(text) {
            Ok(doc) => self.process_doc(&doc, sink),
            Err(err) => log::debug!("Not XML: {}", err),
        }
    }

    pub fn process_doc(&mut self, doc: &Document, sink: &mut dyn MotifSink) {
        let root = doc.root_element();
        let result = if root.has_tag_name("MEME") {
            self.process_meme(root, sink)
        } else if root.has_tag_name("dreme") {
            self.process_dreme(root, sink)
        } else {
            Err(MotifError::new("Not a recognised XML motif format."))
        };
        if let Err(error) = result {
            log::debug!("XML motif parser stopped: {}", error);
            self.errors.push(error.to_message());
        }
    }

    fn process_meme(&mut self, root: Node, sink: &mut dyn MotifSink) -> MotifResult<()> {
        let version = root.attribute("version").unwrap_or("");
        if !regex!(r"^\d+(?:\.\d+){0,2}$").is_match(version) {
            return Err(MotifError::new(format!(
                "MEME XML contains bad version format \"{}\".",
                version
            )));
        }
        self.rating = self.rating.max(2);

        let alphabet_node = descend(root, &["training_set", "alphabet"]);
        let alphabet = match alphabet_node.and_then(|n| n.attribute("id")).unwrap_or("") {
            "nucleotide" => Alphabet::Dna,
            "amino-acid" => Alphabet::Protein,
            other => {
                return Err(MotifError::new(format!(
                    "MEME XML contains an unrecognised alphabet \"{}\".",
                    other
                )))
            }
        };
        self.rating = self.rating.max(3);

        // letter ids in alphabet order
        let mut symbol_ids = Vec::new();
        for letter in alphabet.letters().unwrap_or("").chars() {
            let symbol = letter.to_string();
            let id = alphabet_node
                .and_then(|node| {
                    children(node, "letter").find(|n| n.attribute("symbol") == Some(symbol.as_str()))
                })
                .and_then(|n| n.attribute("id"))
                .filter(|id| !id.is_empty())
                .ok_or_else(|| MotifError::new(format!("No ID found for the symbol \"{}\".", letter)))?;
            symbol_ids.push(id.to_string());
        }

        let strands_text = text_of(descend(root, &["model", "strands"]));
        let strands = match strands_text.as_str() {
            "both" => Strands::Both,
            "forward" => Strands::Forward,
            "none" => Strands::None,
            other => {
                return Err(MotifError::new(format!(
                    "MEME XML contains an unrecognised strand type \"{}\".",
                    other
                )))
            }
        };
        if alphabet.is_nucleotide() && strands == Strands::None {
            return Err(MotifError::new("Strand type \"none\" is not allowed to be used for DNA."));
        }
        if !alphabet.is_nucleotide() && strands != Strands::None {
            return Err(MotifError::new(format!(
                "Strand type \"{}\" is not allowed to be used for protein.",
                strands_text
            )));
        }
        self.rating = self.rating.max(4);

        let background_node = descend(root, &["model", "background_frequencies", "alphabet_array"])
            .ok_or_else(|| MotifError::new("MEME XML does not have background frequencies."))?;
        let background = meme_alphabet_array(background_node, &symbol_ids, true)?;
        self.rating = self.rating.max(5);
        sink.meta(&MotifMeta {
            version: Some(version.to_string()),
            alphabet,
            strands,
            background,
        });

        if let Some(motifs) = child(root, "motifs") {
            for node in children(motifs, "motif") {
                let motif = meme_motif(node, &symbol_ids)?;
                sink.motif(&motif);
                self.rating = RATING_MOTIF;
            }
        }
        Ok(())
    }

    fn process_dreme(&mut self, root: Node, sink: &mut dyn MotifSink) -> MotifResult<()> {
        let version = root.attribute("version").unwrap_or("");
        if !regex!(r"^\d+(?:\.\d+){0,2}$").is_match(version) {
            return Err(MotifError::new(format!(
                "DREME XML contains bad version format \"{}\".",
                version
            )));
        }
        self.rating = self.rating.max(2);

        let background_node = descend(root, &["model", "background"]);
        let kind = background_node.and_then(|n| n.attribute("type")).unwrap_or("");
        if kind != "dna" {
            return Err(MotifError::new(format!(
                "DREME XML contains an unrecognised alphabet type \"{}\".",
                kind
            )));
        }
        self.rating = self.rating.max(3);

        // early versions have no norc element
        let strands = match descend(root, &["model", "norc"]) {
            None => Strands::Both,
            Some(norc) => {
                let strands = match text_of(Some(norc)).as_str() {
                    "FALSE" => Strands::Both,
                    "TRUE" => Strands::Forward,
                    other => {
                        return Err(MotifError::new(format!(
                            "DREME XML contains an unrecognised value for the norc \"{}\".",
                            other
                        )))
                    }
                };
                self.rating = self.rating.max(4);
                strands
            }
        };

        let background = match background_node {
            Some(node) => dreme_probability_array(node)?,
            None => return Err(MotifError::new("DREME XML does not have a background.")),
        };
        self.rating = self.rating.max(5);
        sink.meta(&MotifMeta {
            version: Some(version.to_string()),
            alphabet: Alphabet::Dna,
            strands,
            background: background.clone(),
        });

        if let Some(motifs) = child(root, "motifs") {
            for node in children(motifs, "motif") {
                let motif = dreme_motif(node, &background)?;
                sink.motif(&motif);
                self.rating = RATING_MOTIF;
            }
        }
        Ok(())
    }
}

fn meme_alphabet_array(node: Node, symbol_ids: &[String], is_probability: bool) -> MotifResult<Vec<f64>> {
    let mut array = Vec::with_capacity(symbol_ids.len());
    for id in symbol_ids {
        let text = text_of(children(node, "value").find(|n| n.attribute("letter_id") == Some(id.as_str())));
        if !is_number(&text) {
            return Err(MotifError::new(format!(
                "MEME alphabet_array contains a value that is not a number \"{}\".",
                text
            )));
        }
        let num: f64 = text.parse().map_err(|_| {
            MotifError::new(format!("MEME alphabet_array contains a value that is not a number \"{}\".", text))
        })?;
        if is_probability && !(0.0..=1.0).contains(&num) {
            return Err(MotifError::new(
                "MEME alphabet_array contains a value that is not a probability.",
            ));
        }
        array.push(num);
    }
    if is_probability && !utils::sums_to_one(&array, PROBABILITY_TOLERANCE) {
        return Err(MotifError::new(
            "MEME alphabet_array contains probabilities that do not sum to 1.0.",
        ));
    }
    Ok(array)
}

fn meme_alphabet_matrix(node: Node, symbol_ids: &[String], is_probability: bool) -> MotifResult<Matrix> {
    children(node, "alphabet_array")
        .map(|row| meme_alphabet_array(row, symbol_ids, is_probability))
        .collect()
}

fn meme_motif(node: Node, symbol_ids: &[String]) -> MotifResult<Motif> {
    let id = node.attribute("name").unwrap_or("");
    if id.is_empty() {
        return Err(MotifError::new("MEME XML motif does not have a name attribute."));
    }
    let width = node.attribute("width").unwrap_or("");
    if !is_whole(width) {
        return Err(MotifError::new("MEME XML motif does not have a numeric width attribute."));
    }
    let len: usize = width
        .parse()
        .map_err(|_| MotifError::new("MEME XML motif does not have a numeric width attribute."))?;
    if len < 1 {
        return Err(MotifError::new("MEME XML motif specifies a width less than 1."));
    }
    let sites = node.attribute("sites").unwrap_or("");
    if !is_whole(sites) {
        return Err(MotifError::new("MEME XML motif does not have a numeric sites attribute."));
    }
    let nsites: f64 = sites
        .parse()
        .map_err(|_| MotifError::new("MEME XML motif does not have a numeric sites attribute."))?;
    if nsites < 2.0 {
        return Err(MotifError::new("MEME XML motif specifies a site count less than 2."));
    }
    let evalue_text = node.attribute("e_value").unwrap_or("");
    let evalue = match evalue_text.parse::<f64>() {
        Ok(evalue) if is_number(evalue_text) => evalue,
        _ => return Err(MotifError::new("MEME XML motif does not have valid e_value attribute.")),
    };
    let matrix = |path: &[&str], is_probability: bool| -> MotifResult<Matrix> {
        let node = descend(node, path)
            .ok_or_else(|| MotifError::new(format!("MEME XML motif {} is missing its {}.", id, path[0])))?;
        meme_alphabet_matrix(node, symbol_ids, is_probability)
    };
    let psm = matrix(&["scores", "alphabet_matrix"], false)?;
    let pwm = matrix(&["probabilities", "alphabet_matrix"], true)?;
    Ok(Motif {
        id: id.to_string(),
        alt: Some("MEME".to_string()),
        len,
        nsites,
        evalue,
        pwm,
        psm: Some(psm),
        url: None,
    })
}

fn dreme_probability_array(node: Node) -> MotifResult<Vec<f64>> {
    let mut array = Vec::with_capacity(DNA_LETTERS.len());
    for letter in DNA_LETTERS {
        let text = node.attribute(letter).unwrap_or("");
        let num = match text.parse::<f64>() {
            Ok(num) if is_number(text) => num,
            _ => {
                return Err(MotifError::new(format!(
                    "DREME probability attribute {} contains a value that is not a number \"{}\".",
                    letter, text
                )))
            }
        };
        if !(0.0..=1.0).contains(&num) {
            return Err(MotifError::new(format!(
                "DREME probability attribute {} contains a value that is not a probability \"{}\".",
                letter, text
            )));
        }
        array.push(num);
    }
    if !utils::sums_to_one(&array, PROBABILITY_TOLERANCE) {
        return Err(MotifError::new(
            "DREME probability attributes contain probabilities that do not sum to 1.0.",
        ));
    }
    Ok(array)
}

fn dreme_motif(node: Node, background: &[f64]) -> MotifResult<Motif> {
    let id = node.attribute("seq").unwrap_or("").to_string();
    let length = node.attribute("length").unwrap_or("");
    let len: usize = match length.parse() {
        Ok(len) if is_whole(length) => len,
        _ => return Err(MotifError::new("DREME XML motif length attribute is not a number.")),
    };
    if len < 1 {
        return Err(MotifError::new("DREME XML motif length attribute should be at least 1."));
    }
    let sites = node.attribute("nsites").unwrap_or("");
    let nsites: f64 = match sites.parse() {
        Ok(nsites) if is_whole(sites) => nsites,
        _ => return Err(MotifError::new("DREME XML motif nsites attribute is not a number.")),
    };
    if nsites < 2.0 {
        return Err(MotifError::new("DREME XML motif nsites attribute should be at least 2."));
    }
    let evalue_text = node.attribute("evalue").unwrap_or("");
    let evalue = match evalue_text.parse::<f64>() {
        Ok(evalue) if is_number(evalue_text) => evalue,
        _ => return Err(MotifError::new("DREME XML motif does not have valid evalue attribute.")),
    };
    let pwm = children(node, "pos")
        .map(dreme_probability_array)
        .collect::<MotifResult<Matrix>>()?;
    if pwm.len() != len {
        return Err(MotifError::new(
            "Expected length of pwm to match the stated length of the motif.",
        ));
    }
    let psm = utils::freqs_to_scores(&pwm, Counts::with_sites(nsites), Some(background));
    Ok(Motif {
        id,
        alt: Some("DREME".to_string()),
        len,
        nsites,
        evalue,
        pwm,
        psm: Some(psm),
        url: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motif::RecordingSink;

    const MEME_XML: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes'?>
<MEME version="4.4.0" release="Thu Mar 10 2010">
<training_set datafile="crp0.s" length="18">
<alphabet id="nucleotide" length="4">
<letter id="letter_A" symbol="A"/>
<letter id="letter_C" symbol="C"/>
<letter id="letter_G" symbol="G"/>
<letter id="letter_T" symbol="T"/>
</alphabet>
</training_set>
<model>
<strands>both</strands>
<background_frequencies source="dataset with add-one prior applied">
<alphabet_array>
<value letter_id="letter_T">0.3</value>
<value letter_id="letter_A">0.3</value>
<value letter_id="letter_C">0.2</value>
<value letter_id="letter_G">0.2</value>
</alphabet_array>
</background_frequencies>
</model>
<motifs>
<motif id="motif_1" name="TGTGA" width="2" sites="17" ic="20.1" re="19.8" llr="233" e_value="2.1e-012" bayes_threshold="8.1" elapsed_time="0.4">
<scores>
<alphabet_matrix>
<alphabet_array>
<value letter_id="letter_A">-200</value>
<value letter_id="letter_C">-200</value>
<value letter_id="letter_G">-200</value>
<value letter_id="letter_T">200</value>
</alphabet_array>
<alphabet_array>
<value letter_id="letter_A">-200</value>
<value letter_id="letter_C">-200</value>
<value letter_id="letter_G">200</value>
<value letter_id="letter_T">-200</value>
</alphabet_array>
</alphabet_matrix>
</scores>
<probabilities>
<alphabet_matrix>
<alphabet_array>
<value letter_id="letter_A">0.0</value>
<value letter_id="letter_C">0.0</value>
<value letter_id="letter_G">0.0</value>
<value letter_id="letter_T">1.0</value>
</alphabet_array>
<alphabet_array>
<value letter_id="letter_A">0.0</value>
<value letter_id="letter_C">0.0</value>
<value letter_id="letter_G">1.0</value>
<value letter_id="letter_T">0.0</value>
</alphabet_array>
</alphabet_matrix>
</probabilities>
</motif>
</motifs>
</MEME>
"#;

    const DREME_XML: &str = r#"<dreme version="4.7.0" release="Wed Sep 28 2011">
<model>
<background type="dna" A="0.25" C="0.25" G="0.25" T="0.25"/>
<norc>TRUE</norc>
</model>
<motifs>
<motif id="m01" seq="GATA" length="2" nsites="12" p="1" n="2" pvalue="1e-5" evalue="3.5e-003" unerased_evalue="3.5e-003">
<pos i="1" A="0.0" C="0.0" G="1.0" T="0.0"/>
<pos i="2" A="1.0" C="0.0" G="0.0" T="0.0"/>
</motif>
</motifs>
</dreme>
"#;

    fn parse(text: &str) -> (XmlMotifParser, RecordingSink) {
        let mut parser = XmlMotifParser::new();
        let mut sink = RecordingSink::default();
        parser.process_text(text, &mut sink);
        (parser, sink)
    }

    #[test]
    fn test_meme_xml() {
        let (parser, sink) = parse(MEME_XML);
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        let meta = &sink.metas[0];
        assert_eq!(meta.version.as_deref(), Some("4.4.0"));
        assert_eq!(meta.alphabet, Alphabet::Dna);
        // values are placed by letter id, not document order
        assert_eq!(meta.background, vec![0.3, 0.2, 0.2, 0.3]);
        assert_eq!(sink.motifs.len(), 1);
        let motif = &sink.motifs[0];
        assert_eq!(motif.id, "TGTGA");
        assert_eq!(motif.len, 2);
        assert_eq!(motif.nsites, 17.0);
        assert_eq!(motif.evalue, 2.1e-12);
        assert_eq!(motif.pwm[1], vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(parser.rating(), RATING_MOTIF);
    }

    #[test]
    fn test_dreme_xml() {
        let (parser, sink) = parse(DREME_XML);
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        assert_eq!(sink.metas[0].strands, Strands::Forward);
        assert_eq!(sink.motifs[0].id, "GATA");
        assert_eq!(sink.motifs[0].alt.as_deref(), Some("DREME"));
        assert_eq!(sink.motifs[0].evalue, 3.5e-3);
        assert!(sink.motifs[0].psm.is_some());
    }

    #[test]
    fn test_dreme_length_mismatch() {
        let (parser, sink) = parse(&DREME_XML.replace("length=\"2\"", "length=\"3\""));
        assert_eq!(sink.metas.len(), 1);
        assert!(sink.motifs.is_empty());
        assert_eq!(
            parser.errors()[0].message,
            "Expected length of pwm to match the stated length of the motif."
        );
        assert_eq!(parser.rating(), 5);
    }

    #[test]
    fn test_dreme_background_sum() {
        let (parser, sink) = parse(&DREME_XML.replace("type=\"dna\" A=\"0.25\"", "type=\"dna\" A=\"0.55\""));
        assert!(sink.motifs.is_empty());
        assert_eq!(
            parser.errors()[0].message,
            "DREME probability attributes contain probabilities that do not sum to 1.0."
        );
    }

    #[test]
    fn test_bad_strands() {
        let (parser, sink) = parse(&MEME_XML.replace("<strands>both</strands>", "<strands>none</strands>"));
        assert!(sink.metas.is_empty());
        assert_eq!(parser.errors()[0].message, "Strand type \"none\" is not allowed to be used for DNA.");
        assert_eq!(parser.rating(), 3);
    }

    #[test]
    fn test_other_documents() {
        let (parser, _) = parse("<html><body/></html>");
        assert_eq!(parser.errors()[0].message, "Not a recognised XML motif format.");
        let (parser, _) = parse("MOTIF not xml");
        assert!(parser.errors().is_empty());
        assert_eq!(parser.rating(), RATING_NONE);
    }
}
