//! Wave notes as structured key/value blocks.
//!
//! A note is free text. Lines of the form `key = value` are collected into
//! blocks; a `[name]` line opens a named block, everything before the first
//! one belongs to the root block (`""`). A single `.` closes the open block,
//! and so does a blank line in [`NoteMode::Strict`]. Lines that are neither
//! are kept verbatim, in order, as strays; a stray also closes the open block.
//!
//! [`generate`] writes the inverse projection: root entries, one section per
//! block, then the strays. Keys in [`RESERVED_KEYS`] are never written. The
//! round trip is exact for root entries and named blocks only.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Root and block names that are internal bookkeeping, never written to a note.
pub const RESERVED_KEYS: &[&str] = &["debug", "strays", "axes", "name", "tmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NoteMode {
    /// Keep the raw note text only.
    Skip,
    /// Blank lines do not end a block.
    #[default]
    Simple,
    /// Blank lines end the open block.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NoteScalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NoteScalar {
    /// Integer if possible, then float, then the text itself.
    pub fn parse(token: &str) -> Self {
        if let Ok(v) = token.parse::<i64>() {
            return NoteScalar::Int(v);
        }
        // words like "inf" or "NaN" stay text
        if token.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(v) = token.parse::<f64>() {
                return NoteScalar::Float(v);
            }
        }
        NoteScalar::Text(token.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NoteScalar::Int(v) => Some(*v as f64),
            NoteScalar::Float(v) => Some(*v),
            NoteScalar::Text(_) => None,
        }
    }
}

impl fmt::Display for NoteScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteScalar::Int(v) => write!(f, "{v}"),
            // Debug keeps the decimal point, so 1.0 reads back as a float
            NoteScalar::Float(v) => write!(f, "{v:?}"),
            NoteScalar::Text(s) => f.write_str(s),
        }
    }
}

/// The value side of a `key=value` line. A value with a single token is always
/// a `Scalar`, even a non-numeric word such as `sample=quartz`; only values
/// with two or more whitespace-separated tokens become a `List`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NoteValue {
    Scalar(NoteScalar),
    List(Vec<NoteScalar>),
}

impl NoteValue {
    /// A single token becomes a scalar, several become a list.
    pub fn parse(value: &str) -> Self {
        let tokens: Vec<&str> = value.split_whitespace().collect();
        match tokens.as_slice() {
            [] => NoteValue::Scalar(NoteScalar::Text(String::new())),
            [one] => NoteValue::Scalar(NoteScalar::parse(one)),
            many => NoteValue::List(many.iter().map(|t| NoteScalar::parse(t)).collect()),
        }
    }

    pub fn as_scalar(&self) -> Option<&NoteScalar> {
        match self {
            NoteValue::Scalar(s) => Some(s),
            NoteValue::List(_) => None,
        }
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteValue::Scalar(s) => s.fmt(f),
            NoteValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    item.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for NoteValue {
    fn from(v: i64) -> Self {
        NoteValue::Scalar(NoteScalar::Int(v))
    }
}

impl From<f64> for NoteValue {
    fn from(v: f64) -> Self {
        NoteValue::Scalar(NoteScalar::Float(v))
    }
}

impl From<&str> for NoteValue {
    fn from(v: &str) -> Self {
        NoteValue::Scalar(NoteScalar::Text(v.to_string()))
    }
}

pub type NoteBlock = BTreeMap<String, NoteValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteMap {
    /// Block name to entries; `""` is the root block.
    pub blocks: BTreeMap<String, NoteBlock>,
    /// Lines that were neither entries nor block markers, in note order.
    pub strays: Vec<String>,
}

impl NoteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.values().all(|b| b.is_empty()) && self.strays.is_empty()
    }

    pub fn root(&self) -> Option<&NoteBlock> {
        self.blocks.get("")
    }

    pub fn block(&self, name: &str) -> Option<&NoteBlock> {
        self.blocks.get(name)
    }

    pub fn get(&self, block: &str, key: &str) -> Option<&NoteValue> {
        self.blocks.get(block)?.get(key)
    }

    pub fn insert(&mut self, block: &str, key: &str, value: impl Into<NoteValue>) {
        self.blocks
            .entry(block.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Store a finished block. The root block accumulates; a named block
    /// replaces an earlier block of the same name.
    fn commit(&mut self, name: String, block: NoteBlock) {
        if name.is_empty() {
            self.blocks.entry(name).or_default().extend(block);
        } else {
            self.blocks.insert(name, block);
        }
    }
}

/// Parse note text into a [`NoteMap`]. [`NoteMode::Skip`] yields an empty map.
pub fn parse(text: &str, mode: NoteMode) -> NoteMap {
    let mut map = NoteMap::new();
    if mode == NoteMode::Skip {
        return map;
    }
    let strict = mode == NoteMode::Strict;

    let mut root = NoteBlock::new();
    // the named block currently being filled, if any
    let mut open: Option<(String, NoteBlock)> = None;

    let text = text.replace('\r', "\n");
    for raw in text.split('\n') {
        let line = raw.trim();

        if line.is_empty() {
            if strict {
                if let Some((name, block)) = open.take() {
                    map.commit(name, block);
                }
            }
            continue;
        }

        if line == "." && open.is_some() {
            if let Some((name, block)) = open.take() {
                map.commit(name, block);
            }
            continue;
        }

        if line.len() >= 2 && line.starts_with('[') && line.ends_with(']') {
            if let Some((name, block)) = open.take() {
                map.commit(name, block);
            }
            open = Some((line[1..line.len() - 1].to_string(), NoteBlock::new()));
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            map.strays.push(line.to_string());
            if let Some((name, block)) = open.take() {
                map.commit(name, block);
            }
            continue;
        };

        let target = match open.as_mut() {
            Some((_, block)) => block,
            None => &mut root,
        };
        target.insert(key.trim().to_string(), NoteValue::parse(value.trim()));
    }

    if let Some((name, block)) = open.take() {
        map.commit(name, block);
    }
    if !root.is_empty() {
        map.commit(String::new(), root);
    }
    map
}

/// Render a [`NoteMap`] as note text.
pub fn generate(map: &NoteMap) -> String {
    let mut out = String::new();
    if map.is_empty() {
        return out;
    }

    if let Some(root) = map.root() {
        write_entries(&mut out, root);
    }
    out.push('\n');

    for (name, block) in &map.blocks {
        if name.is_empty() || RESERVED_KEYS.contains(&name.as_str()) {
            continue;
        }
        out.push('[');
        out.push_str(name);
        out.push_str("]\n");
        write_entries(&mut out, block);
        out.push('\n');
    }
    out.push('\n');

    for line in &map.strays {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn write_entries(out: &mut String, block: &NoteBlock) {
    for (key, value) in block {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        out.push_str(&format!("{key} = {value}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Instrument = SES\r\
                          Pass Energy = 20\r\
                          [Region 1]\r\
                          Energy Range = 16.5 17.5 eV\r\
                          Step = 0.005\r\
                          \r\
                          Lens Mode=Angular30\r\
                          .\r\
                          acquired overnight\r\
                          [Manipulator]\r\
                          T = 12 K\r\
                          formula = a=b+c\r";

    #[test]
    fn single_word_values_stay_scalar() {
        assert_eq!(
            NoteValue::parse("quartz"),
            NoteValue::Scalar(NoteScalar::Text("quartz".into()))
        );
        assert_eq!(NoteValue::parse(" 7 "), NoteValue::Scalar(NoteScalar::Int(7)));
        assert_eq!(
            NoteValue::parse("quartz 7"),
            NoteValue::List(vec![NoteScalar::Text("quartz".into()), NoteScalar::Int(7)])
        );
    }

    #[test]
    fn parses_blocks_entries_and_strays() {
        let map = parse(SAMPLE, NoteMode::Simple);

        assert_eq!(map.get("", "Instrument"), Some(&NoteValue::from("SES")));
        assert_eq!(map.get("", "Pass Energy"), Some(&NoteValue::from(20)));

        let region = map.block("Region 1").unwrap();
        assert_eq!(region["Step"], NoteValue::from(0.005));
        assert_eq!(region["Lens Mode"], NoteValue::from("Angular30"));
        assert_eq!(
            region["Energy Range"],
            NoteValue::List(vec![
                NoteScalar::Float(16.5),
                NoteScalar::Float(17.5),
                NoteScalar::Text("eV".into())
            ])
        );

        let manip = map.block("Manipulator").unwrap();
        assert_eq!(
            manip["T"],
            NoteValue::List(vec![NoteScalar::Int(12), NoteScalar::Text("K".into())])
        );
        // split on the first '=' only
        assert_eq!(manip["formula"], NoteValue::from("a=b+c"));

        assert_eq!(map.strays, vec!["acquired overnight".to_string()]);
    }

    #[test]
    fn strict_mode_closes_blocks_on_blank_lines() {
        let map = parse(SAMPLE, NoteMode::Strict);
        let region = map.block("Region 1").unwrap();
        assert!(!region.contains_key("Lens Mode"));
        assert_eq!(map.get("", "Lens Mode"), Some(&NoteValue::from("Angular30")));
    }

    #[test]
    fn stray_line_closes_the_open_block() {
        let map = parse("[a]\nx = 1\nfree text\ny = 2\n", NoteMode::Simple);
        assert_eq!(map.get("a", "x"), Some(&NoteValue::from(1)));
        assert_eq!(map.get("", "y"), Some(&NoteValue::from(2)));
        assert_eq!(map.strays, vec!["free text".to_string()]);
    }

    #[test]
    fn dot_without_open_block_is_a_stray() {
        let map = parse(".\nk = v\n", NoteMode::Simple);
        assert_eq!(map.strays, vec![".".to_string()]);
        assert_eq!(map.get("", "k"), Some(&NoteValue::from("v")));
    }

    #[test]
    fn repeated_block_names_keep_the_last_block() {
        let map = parse("[a]\nx = 1\n.\n[a]\ny = 2\n", NoteMode::Simple);
        let a = map.block("a").unwrap();
        assert!(!a.contains_key("x"));
        assert_eq!(a["y"], NoteValue::from(2));
    }

    #[test]
    fn skip_mode_parses_nothing() {
        assert!(parse(SAMPLE, NoteMode::Skip).is_empty());
    }

    #[test]
    fn generate_then_parse_is_idempotent() {
        let mut map = NoteMap::new();
        map.insert("", "count", 3);
        map.insert("", "scale", 1.0);
        map.insert("", "operator", "jdoe");
        map.insert(
            "sample",
            "T",
            NoteValue::List(vec![NoteScalar::Int(12), NoteScalar::Text("K".into())]),
        );
        map.insert("sample", "angle", -0.25);
        map.insert("tmp", "last path", "/tmp/x.ibw");
        map.strays.push("free text".into());

        let text = generate(&map);
        let back = parse(&text, NoteMode::Simple);

        assert_eq!(back.root(), map.root());
        assert_eq!(back.block("sample"), map.block("sample"));
        assert!(back.block("tmp").is_none());
        assert_eq!(back.strays, map.strays);
    }

    #[test]
    fn reserved_root_keys_are_not_written() {
        let mut map = NoteMap::new();
        map.insert("", "name", "wave0");
        map.insert("", "gain", 2);
        let text = generate(&map);
        assert!(!text.contains("name"));
        assert!(text.starts_with("gain = 2\n"));
    }
}
