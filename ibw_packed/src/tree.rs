//! The folder/wave tree recovered from a packed experiment.

use ibw_core::{ErrorKind, FormatVersion, IgorError};
use serde::Serialize;

/// Separator of in-archive paths, as in Igor's `root:folder:wave`.
pub const PATH_SEPARATOR: char = ':';

/// Why a single node could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&IgorError> for NodeError {
    fn from(e: &IgorError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Location of one wave inside the archive stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveRef {
    pub name: String,
    /// Stream offset of the wave's first byte (its container header).
    pub offset: u64,
    /// Size of the wave record in bytes.
    pub size: u64,
    pub version: Option<FormatVersion>,
    pub points: Option<usize>,
    /// The record claims more bytes than the archive holds.
    pub truncated: bool,
    /// Set when the wave header could not be decoded.
    pub error: Option<NodeError>,
}

impl WaveRef {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && !self.truncated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Folder {
    pub name: String,
    pub children: Vec<ArchiveNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArchiveNode {
    Folder(Folder),
    Wave(WaveRef),
}

impl ArchiveNode {
    pub fn name(&self) -> &str {
        match self {
            ArchiveNode::Folder(f) => &f.name,
            ArchiveNode::Wave(w) => &w.name,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            ArchiveNode::Folder(f) => Some(f),
            ArchiveNode::Wave(_) => None,
        }
    }

    pub fn as_wave(&self) -> Option<&WaveRef> {
        match self {
            ArchiveNode::Wave(w) => Some(w),
            ArchiveNode::Folder(_) => None,
        }
    }
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Add a child. A sibling with the same name is replaced in place, so the
    /// last record of a given name wins.
    pub fn insert(&mut self, node: ArchiveNode) {
        match self.children.iter_mut().find(|c| c.name() == node.name()) {
            Some(existing) => {
                tracing::debug!(
                    folder = %self.name,
                    name = %node.name(),
                    "replacing node of the same name"
                );
                *existing = node;
            }
            None => self.children.push(node),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveNode> {
        self.children.iter().find(|c| c.name() == name)
    }

    /// Follow `path` down from this folder.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&ArchiveNode> {
        let (first, rest) = path.split_first()?;
        let node = self.get(first.as_ref())?;
        if rest.is_empty() {
            return Some(node);
        }
        node.as_folder()?.find(rest)
    }

    /// Every wave below this folder, depth first, with its in-archive path.
    pub fn waves(&self) -> Vec<(String, &WaveRef)> {
        let mut out = Vec::new();
        self.collect_waves("", &mut out);
        out
    }

    fn collect_waves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a WaveRef)>) {
        for child in &self.children {
            let path = join_path(prefix, child.name());
            match child {
                ArchiveNode::Wave(w) => out.push((path, w)),
                ArchiveNode::Folder(f) => f.collect_waves(&path, out),
            }
        }
    }

    pub fn wave_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| match c {
                ArchiveNode::Wave(_) => 1,
                ArchiveNode::Folder(f) => f.wave_count(),
            })
            .sum()
    }

    /// Number of folders below this one.
    pub fn folder_count(&self) -> usize {
        self.children
            .iter()
            .filter_map(ArchiveNode::as_folder)
            .map(|f| 1 + f.folder_count())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{name}")
    }
}

/// Join path segments with [`PATH_SEPARATOR`].
pub fn igor_path<S: AsRef<str>>(parts: &[S]) -> String {
    parts.iter().fold(String::new(), |acc, p| join_path(&acc, p.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(name: &str, offset: u64) -> ArchiveNode {
        ArchiveNode::Wave(WaveRef {
            name: name.into(),
            offset,
            size: 10,
            version: Some(FormatVersion::V5),
            points: Some(1),
            truncated: false,
            error: None,
        })
    }

    fn sample() -> Folder {
        let mut inner = Folder::new("inner");
        inner.insert(wave("deep", 30));
        let mut a = Folder::new("a");
        a.insert(wave("w1", 10));
        a.insert(ArchiveNode::Folder(inner));
        let mut root = Folder::new("");
        root.insert(wave("top", 0));
        root.insert(ArchiveNode::Folder(a));
        root.insert(ArchiveNode::Folder(Folder::new("empty")));
        root
    }

    #[test]
    fn finds_nodes_by_path() {
        let root = sample();
        assert_eq!(root.find(&["a", "inner", "deep"]).unwrap().as_wave().unwrap().offset, 30);
        assert!(root.find(&["a", "inner"]).unwrap().as_folder().is_some());
        assert!(root.find(&["top", "x"]).is_none());
        assert!(root.find::<&str>(&[]).is_none());
    }

    #[test]
    fn lists_waves_depth_first() {
        let root = sample();
        let paths: Vec<String> = root.waves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["top", "a:w1", "a:inner:deep"]);
        assert_eq!(root.wave_count(), 3);
        assert_eq!(root.folder_count(), 3);
    }

    #[test]
    fn same_name_replaces_in_place() {
        let mut root = sample();
        root.insert(wave("top", 99));
        assert_eq!(root.len(), 3);
        assert_eq!(root.children[0].as_wave().unwrap().offset, 99);
    }

    #[test]
    fn serializes_with_a_type_tag() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains(r#""type":"wave""#), "{json}");
        assert!(json.contains(r#""type":"folder""#), "{json}");
    }
}
