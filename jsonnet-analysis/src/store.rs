//! Versioned store of open documents plus the top-level-object cache
//! shared with the resolver.

use std::collections::{HashMap, HashSet};
use std::fs;

use lsp_types::{Diagnostic, Range, Url};
use parking_lot::RwLock;

use crate::ast::Node;
use crate::error::{AnalysisError, Result};

/// One open document and everything derived from it.
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: Url,
    pub version: i32,
    pub text: String,
    /// Last successfully parsed tree. Retained across parse failures so
    /// stale-but-usable results stay available.
    pub ast: Option<Node>,
    /// Parse error of the most recent text, if any.
    pub err: Option<String>,
    /// Zero-indexed lines edited since `ast` was produced.
    pub lines_changed_since_ast: HashSet<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub fn new(uri: Url, version: i32, text: String) -> Self {
        Self {
            uri,
            version,
            text,
            ast: None,
            err: None,
            lines_changed_since_ast: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Default)]
struct CacheInner {
    docs: HashMap<Url, Document>,
    /// Keyed by (importing file, imported file).
    top_level: HashMap<(String, String), Vec<Node>>,
}

/// Thread-safe document cache.
///
/// Reads hand out snapshots; writers hold the lock only for the map update,
/// never across parsing or resolution.
#[derive(Default)]
pub struct DocumentCache {
    inner: RwLock<CacheInner>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `doc`, rejecting writes older than what is already held.
    /// Any successful write invalidates the whole top-level-object cache.
    pub fn put(&self, doc: Document) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.docs.get(&doc.uri) {
            if existing.version > doc.version {
                return Err(AnalysisError::StaleVersion);
            }
        }
        inner.top_level.clear();
        inner.docs.insert(doc.uri.clone(), doc);
        Ok(())
    }

    /// Snapshot of the document at `uri`.
    pub fn get(&self, uri: &Url) -> Result<Document> {
        self.inner
            .read()
            .docs
            .get(uri)
            .cloned()
            .ok_or_else(|| AnalysisError::NotFound(format!("document {uri} is not open")))
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.inner.read().docs.contains_key(uri)
    }

    pub fn remove(&self, uri: &Url) {
        let mut inner = self.inner.write();
        inner.docs.remove(uri);
        inner.top_level.clear();
    }

    /// URIs of every open document.
    pub fn uris(&self) -> Vec<Url> {
        self.inner.read().docs.keys().cloned().collect()
    }

    /// Replaces the recorded diagnostics for `uri`. Missing documents are
    /// ignored; the document may have been closed while diagnostics ran.
    pub fn update_diagnostics(&self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        let mut inner = self.inner.write();
        if let Some(doc) = inner.docs.get_mut(uri) {
            doc.diagnostics = diagnostics;
        }
    }

    pub fn get_top_level_objects(&self, from: &str, filename: &str) -> Option<Vec<Node>> {
        self.inner
            .read()
            .top_level
            .get(&(from.to_string(), filename.to_string()))
            .cloned()
    }

    pub fn put_top_level_objects(&self, from: &str, filename: &str, objects: Vec<Node>) {
        self.inner
            .write()
            .top_level
            .insert((from.to_string(), filename.to_string()), objects);
    }

    /// Extracts the text covered by `range`, reading from the open document
    /// when possible and falling back to disk for files that are not open.
    pub fn get_contents(&self, uri: &Url, range: &Range) -> Result<String> {
        let text = match self.get(uri) {
            Ok(doc) => doc.text,
            Err(_) => {
                let path = uri
                    .to_file_path()
                    .map_err(|_| AnalysisError::InvalidInput(format!("{uri} is not a file uri")))?;
                fs::read_to_string(&path)
                    .map_err(|e| AnalysisError::External(format!("read {}: {e}", path.display())))?
            }
        };
        extract_range(&text, range)
    }
}

fn extract_range(text: &str, range: &Range) -> Result<String> {
    let lines: Vec<&str> = text.split('\n').collect();
    let start_line = range.start.line as usize;
    let end_line = range.end.line as usize;
    if start_line >= lines.len() || end_line >= lines.len() {
        return Err(AnalysisError::OutOfRange(format!(
            "line {} is past the end of the document",
            end_line
        )));
    }

    let mut out = String::new();
    for (i, line) in lines
        .iter()
        .enumerate()
        .take(end_line + 1)
        .skip(start_line)
    {
        // Protocol offsets count characters, not bytes; slicing by byte
        // would split multi-byte codepoints.
        let char_count = line.chars().count();
        let start_char = if i == start_line {
            range.start.character as usize
        } else {
            0
        };
        let end_char = if i == end_line {
            range.end.character as usize
        } else {
            char_count
        };
        if start_char > char_count || end_char > char_count || start_char > end_char {
            return Err(AnalysisError::OutOfRange(format!(
                "character range {start_char}..{end_char} is outside line {i}"
            )));
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.extend(line.chars().skip(start_char).take(end_char - start_char));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Position;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///tmp/{name}")).unwrap()
    }

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range::new(Position::new(sl, sc), Position::new(el, ec))
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 1, "{}".to_string()))
            .unwrap();
        let doc = cache.get(&u).unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.text, "{}");
    }

    #[test]
    fn stale_version_is_rejected() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 5, "new".to_string()))
            .unwrap();
        let err = cache
            .put(Document::new(u.clone(), 3, "old".to_string()))
            .unwrap_err();
        assert_eq!(err, AnalysisError::StaleVersion);
        assert_eq!(cache.get(&u).unwrap().text, "new");
    }

    #[test]
    fn equal_version_overwrites() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 2, "first".to_string()))
            .unwrap();
        cache
            .put(Document::new(u.clone(), 2, "second".to_string()))
            .unwrap();
        assert_eq!(cache.get(&u).unwrap().text, "second");
    }

    #[test]
    fn put_clears_top_level_cache() {
        let cache = DocumentCache::new();
        cache.put_top_level_objects("a.jsonnet", "b.jsonnet", vec![]);
        assert!(cache.get_top_level_objects("a.jsonnet", "b.jsonnet").is_some());
        cache
            .put(Document::new(uri("c.jsonnet"), 1, "{}".to_string()))
            .unwrap();
        assert!(cache.get_top_level_objects("a.jsonnet", "b.jsonnet").is_none());
    }

    #[test]
    fn missing_document_is_not_found() {
        let cache = DocumentCache::new();
        assert!(matches!(
            cache.get(&uri("missing.jsonnet")),
            Err(AnalysisError::NotFound(_))
        ));
    }

    #[test]
    fn get_contents_single_line() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 1, "local x = 1;\nx".to_string()))
            .unwrap();
        let text = cache.get_contents(&u, &range(0, 6, 0, 7)).unwrap();
        assert_eq!(text, "x");
    }

    #[test]
    fn get_contents_multi_line() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 1, "{\n  a: 1,\n}".to_string()))
            .unwrap();
        let text = cache.get_contents(&u, &range(0, 0, 2, 1)).unwrap();
        assert_eq!(text, "{\n  a: 1,\n}");
    }

    #[test]
    fn get_contents_counts_characters_not_bytes() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 1, "héllo: 1".to_string()))
            .unwrap();
        assert_eq!(cache.get_contents(&u, &range(0, 0, 0, 2)).unwrap(), "hé");
        assert_eq!(cache.get_contents(&u, &range(0, 1, 0, 5)).unwrap(), "éllo");
        assert!(matches!(
            cache.get_contents(&u, &range(0, 0, 0, 9)),
            Err(AnalysisError::OutOfRange(_))
        ));
    }

    #[test]
    fn get_contents_out_of_range() {
        let cache = DocumentCache::new();
        let u = uri("a.jsonnet");
        cache
            .put(Document::new(u.clone(), 1, "x".to_string()))
            .unwrap();
        assert!(matches!(
            cache.get_contents(&u, &range(0, 0, 5, 0)),
            Err(AnalysisError::OutOfRange(_))
        ));
        assert!(matches!(
            cache.get_contents(&u, &range(0, 0, 0, 99)),
            Err(AnalysisError::OutOfRange(_))
        ));
    }

    #[test]
    fn get_contents_reads_from_disk_for_closed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("on_disk.jsonnet");
        std::fs::write(&path, "local y = 2;\ny\n").unwrap();
        let u = Url::from_file_path(&path).unwrap();

        let cache = DocumentCache::new();
        let text = cache.get_contents(&u, &range(1, 0, 1, 1)).unwrap();
        assert_eq!(text, "y");
    }
}
