//! JSON-LD `@graph` item extraction.
//!
//! Small documents are parsed whole with `serde_json`. Large ones go through
//! [`GraphItemReader`], which tracks string/escape state and container depth
//! byte by byte and hands each element of the `@graph` array to `serde_json`
//! on its own. A malformed element only costs that element.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub type GraphItem = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("I/O error while reading JSON-LD: {0}")]
    Io(#[from] io::Error),
    #[error("graph item {index} is not valid JSON: {source}")]
    Malformed {
        index: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("graph item {index} is not a JSON object")]
    NotAnObject { index: u64 },
}

impl ItemError {
    /// Only I/O failures end the pass; everything else skips one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ItemError::Io(_))
    }
}

fn into_item(index: u64, value: Value) -> Result<GraphItem, ItemError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ItemError::NotAnObject { index }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureKind {
    Container,
    Scalar,
}

#[derive(Debug)]
struct Capture {
    kind: CaptureKind,
    buf: Vec<u8>,
}

#[derive(Debug)]
enum ScanEvent {
    Item(Vec<u8>),
    GraphEnd,
}

#[derive(Debug, Default)]
struct ScanState {
    depth: usize,
    in_string: bool,
    escaped: bool,
    collecting_key: bool,
    key_buf: Vec<u8>,
    last_key: Vec<u8>,
    /// Container depth of the elements of the `@graph` array while inside it
    graph_depth: Option<usize>,
    graph_seen: bool,
    capture: Option<Capture>,
    pending_end: bool,
}

impl ScanState {
    fn in_graph_array(&self) -> bool {
        self.graph_depth == Some(self.depth)
    }

    fn take_capture(&mut self, strip_last: bool) -> Vec<u8> {
        let mut buf = self.capture.take().map(|c| c.buf).unwrap_or_default();
        if strip_last {
            buf.pop();
        }
        buf
    }

    fn close_graph(&mut self) {
        self.graph_depth = None;
        self.graph_seen = true;
    }

    fn feed(&mut self, b: u8) -> Option<ScanEvent> {
        if let Some(capture) = &mut self.capture {
            capture.buf.push(b);
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
                if self.collecting_key {
                    self.key_buf.push(b);
                }
            } else if b == b'\\' {
                self.escaped = true;
                if self.collecting_key {
                    self.key_buf.push(b);
                }
            } else if b == b'"' {
                self.in_string = false;
                if self.collecting_key {
                    self.collecting_key = false;
                    self.last_key = std::mem::take(&mut self.key_buf);
                }
            } else if self.collecting_key {
                self.key_buf.push(b);
            }
            return None;
        }

        match b {
            b'"' => {
                self.in_string = true;
                if self.capture.is_none() {
                    if self.in_graph_array() {
                        self.capture = Some(Capture {
                            kind: CaptureKind::Scalar,
                            buf: vec![b],
                        });
                    } else if self.depth == 1 && self.graph_depth.is_none() {
                        self.collecting_key = true;
                        self.key_buf.clear();
                    }
                }
                None
            }
            b'{' | b'[' => {
                if self.capture.is_none() && self.in_graph_array() {
                    self.capture = Some(Capture {
                        kind: CaptureKind::Container,
                        buf: vec![b],
                    });
                } else if b == b'[' && self.graph_depth.is_none() && !self.graph_seen {
                    // `"@graph": [` inside the top-level object, or a bare top-level array
                    let graph_key = self.depth == 1 && self.last_key == b"@graph";
                    if graph_key || self.depth == 0 {
                        self.graph_depth = Some(self.depth + 1);
                    }
                }
                self.depth += 1;
                None
            }
            b'}' | b']' => {
                self.depth = self.depth.saturating_sub(1);
                let graph_depth = self.graph_depth?;
                let kind = self.capture.as_ref().map(|c| c.kind);
                match kind {
                    Some(CaptureKind::Container) if self.depth == graph_depth => {
                        Some(ScanEvent::Item(self.take_capture(false)))
                    }
                    Some(CaptureKind::Scalar) if self.depth + 1 == graph_depth => {
                        self.close_graph();
                        self.pending_end = true;
                        Some(ScanEvent::Item(self.take_capture(true)))
                    }
                    None if self.depth + 1 == graph_depth => {
                        self.close_graph();
                        Some(ScanEvent::GraphEnd)
                    }
                    _ => None,
                }
            }
            b',' => {
                let scalar = matches!(
                    self.capture.as_ref().map(|c| c.kind),
                    Some(CaptureKind::Scalar)
                );
                if scalar && self.in_graph_array() {
                    Some(ScanEvent::Item(self.take_capture(true)))
                } else {
                    None
                }
            }
            b if b.is_ascii_whitespace() => None,
            _ => {
                if self.capture.is_none() && self.in_graph_array() {
                    self.capture = Some(Capture {
                        kind: CaptureKind::Scalar,
                        buf: vec![b],
                    });
                }
                None
            }
        }
    }
}

/// Streams the elements of a JSON-LD document's `@graph` array.
///
/// Holds at most one element's bytes at a time. Accepts either a top-level
/// object with an `@graph` key or a bare top-level array of nodes.
pub struct GraphItemReader<R> {
    reader: R,
    state: ScanState,
    items: u64,
    finished: bool,
}

impl<R: BufRead> GraphItemReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ScanState::default(),
            items: 0,
            finished: false,
        }
    }

    /// Whether an `@graph` array has been entered so far.
    pub fn graph_found(&self) -> bool {
        self.state.graph_seen || self.state.graph_depth.is_some()
    }

    fn emit(&mut self, bytes: Vec<u8>) -> Result<GraphItem, ItemError> {
        let index = self.items;
        self.items += 1;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|source| ItemError::Malformed { index, source })?;
        into_item(index, value)
    }
}

impl<R: BufRead> Iterator for GraphItemReader<R> {
    type Item = Result<GraphItem, ItemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.state.pending_end {
            self.finished = true;
            return None;
        }

        loop {
            let (consumed, event) = {
                let buf = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(ItemError::Io(e)));
                    }
                };
                if buf.is_empty() {
                    self.finished = true;
                    // Truncated input: whatever was captured is handed to serde_json,
                    // which reports it as malformed.
                    if self.state.capture.is_some() {
                        let bytes = self.state.take_capture(false);
                        return Some(self.emit(bytes));
                    }
                    return None;
                }

                let mut consumed = buf.len();
                let mut event = None;
                for (i, &b) in buf.iter().enumerate() {
                    if let Some(ev) = self.state.feed(b) {
                        consumed = i + 1;
                        event = Some(ev);
                        break;
                    }
                }
                (consumed, event)
            };
            self.reader.consume(consumed);

            match event {
                Some(ScanEvent::Item(bytes)) => return Some(self.emit(bytes)),
                Some(ScanEvent::GraphEnd) => {
                    self.finished = true;
                    return None;
                }
                None => {}
            }
        }
    }
}

/// Parses a whole document and returns its `@graph` array, or `None` when absent.
pub fn read_graph_document<R: Read>(reader: R) -> Result<Option<Vec<Value>>, serde_json::Error> {
    let doc: Value = serde_json::from_reader(reader)?;
    Ok(match doc {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("@graph") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    })
}

/// Graph items from either the direct or the streaming path.
pub enum GraphItems {
    Direct {
        items: std::vec::IntoIter<Value>,
        index: u64,
    },
    Streaming(GraphItemReader<Box<dyn BufRead>>),
}

impl GraphItems {
    /// False only for a streamed document in which no `@graph` array was seen.
    pub fn graph_found(&self) -> bool {
        match self {
            GraphItems::Direct { .. } => true,
            GraphItems::Streaming(reader) => reader.graph_found(),
        }
    }
}

impl Iterator for GraphItems {
    type Item = Result<GraphItem, ItemError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            GraphItems::Direct { items, index } => {
                let value = items.next()?;
                let i = *index;
                *index += 1;
                Some(into_item(i, value))
            }
            GraphItems::Streaming(reader) => reader.next(),
        }
    }
}

/// Opens `path`, choosing whole-document parsing when the file is smaller than
/// `direct_limit` bytes and streaming otherwise.
pub fn open_graph_items(path: &Path, direct_limit: u64) -> Result<GraphItems> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for: {}", path.display()))?
        .len();
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open JSON-LD file: {}", path.display()))?;

    if size < direct_limit {
        info!(bytes = size, "Parsing JSON-LD document in one pass");
        let items = read_graph_document(BufReader::new(file))
            .with_context(|| format!("Failed to parse JSON-LD document: {}", path.display()))?;
        let items = items.unwrap_or_else(|| {
            warn!(path = %path.display(), "JSON-LD document has no @graph array");
            Vec::new()
        });
        info!(items = items.len(), "Loaded @graph array");
        Ok(GraphItems::Direct {
            items: items.into_iter(),
            index: 0,
        })
    } else {
        info!(bytes = size, "JSON-LD document is large, streaming @graph items");
        let reader: Box<dyn BufRead> = Box::new(BufReader::with_capacity(256 * 1024, file));
        Ok(GraphItems::Streaming(GraphItemReader::new(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(doc: &str) -> Vec<Result<GraphItem, ItemError>> {
        GraphItemReader::new(Cursor::new(doc.as_bytes().to_vec())).collect()
    }

    fn ids(results: &[Result<GraphItem, ItemError>]) -> Vec<String> {
        results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter_map(|m| m.get("@id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    const PRETTY: &str = r#"{
  "@context" : {
    "owl" : "http://www.w3.org/2002/07/owl#",
    "rdfs" : "http://www.w3.org/2000/01/rdf-schema#"
  },
  "@graph" : [ {
    "@id" : "http://ex/Brand",
    "@type" : "owl:Class",
    "rdfs:label" : "Brand"
  }, {
    "@id" : "http://ex/Category",
    "@type" : [ "owl:Class" ],
    "rdfs:comment" : "A product category, e.g. {shoes} or [bags]"
  } ]
}"#;

    #[test]
    fn streams_pretty_printed_graph() {
        let results = stream(PRETTY);
        assert_eq!(results.len(), 2);
        assert_eq!(ids(&results), vec!["http://ex/Brand", "http://ex/Category"]);
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let results = stream(PRETTY);
        let second = results[1].as_ref().unwrap();
        assert_eq!(
            second["rdfs:comment"],
            "A product category, e.g. {shoes} or [bags]"
        );
    }

    #[test]
    fn compact_single_line_document() {
        let results = stream(r#"{"@graph":[{"@id":"a"},{"@id":"b"},{"@id":"c"}]}"#);
        assert_eq!(ids(&results), vec!["a", "b", "c"]);
    }

    #[test]
    fn graph_after_other_keys_with_arrays() {
        let doc = r#"{"@context": ["x", {"@graph": "not this"}], "list": [1, 2], "@graph": [{"@id": "a"}]}"#;
        assert_eq!(ids(&stream(doc)), vec!["a"]);
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let doc = r#"{"@graph": [{"@id": "a", "rdfs:label": "say \"}\" twice"}, {"@id": "b"}]}"#;
        let results = stream(doc);
        assert_eq!(ids(&results), vec!["a", "b"]);
        assert_eq!(results[0].as_ref().unwrap()["rdfs:label"], r#"say "}" twice"#);
    }

    #[test]
    fn malformed_item_is_isolated() {
        let doc = r#"{"@graph": [{"@id": "a"}, {"@id": "b", oops}, {"@id": "c"}]}"#;
        let results = stream(doc);
        assert_eq!(results.len(), 3);
        assert!(matches!(results[1], Err(ItemError::Malformed { index: 1, .. })));
        assert!(!results[1].as_ref().unwrap_err().is_fatal());
        assert_eq!(ids(&results), vec!["a", "c"]);
    }

    #[test]
    fn scalar_elements_are_not_objects() {
        let results = stream(r#"{"@graph": ["http://ex/x", {"@id": "a"}, 42]}"#);
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(ItemError::NotAnObject { index: 0 })));
        assert!(matches!(results[2], Err(ItemError::NotAnObject { index: 2 })));
        assert_eq!(ids(&results), vec!["a"]);
    }

    #[test]
    fn top_level_array() {
        assert_eq!(ids(&stream(r#"[{"@id": "a"}, {"@id": "b"}]"#)), vec!["a", "b"]);
    }

    #[test]
    fn missing_graph_yields_nothing() {
        let mut reader = GraphItemReader::new(Cursor::new(br#"{"@id": "a"}"#.to_vec()));
        assert!(reader.next().is_none());
        assert!(!reader.graph_found());
    }

    #[test]
    fn empty_graph() {
        let mut reader = GraphItemReader::new(Cursor::new(br#"{"@graph": []}"#.to_vec()));
        assert!(reader.next().is_none());
        assert!(reader.graph_found());
    }

    #[test]
    fn truncated_document_reports_malformed_tail() {
        let results = stream(r#"{"@graph": [{"@id": "a"}, {"@id": "b""#);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ItemError::Malformed { .. })));
    }

    #[test]
    fn tiny_read_buffer() {
        let reader = BufReader::with_capacity(3, Cursor::new(PRETTY.as_bytes().to_vec()));
        let results: Vec<_> = GraphItemReader::new(reader).collect();
        assert_eq!(ids(&results), vec!["http://ex/Brand", "http://ex/Category"]);
    }

    #[test]
    fn direct_document_graph() {
        let items = read_graph_document(PRETTY.as_bytes()).unwrap().unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn direct_document_without_graph() {
        assert!(read_graph_document(r#"{"@id": "a"}"#.as_bytes())
            .unwrap()
            .is_none());
    }

    #[test]
    fn direct_document_invalid_json() {
        assert!(read_graph_document("{ not json".as_bytes()).is_err());
    }
}
