use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ocipack_layer::Owner;
use ocipack_stat_mode::StatMode;

use crate::error::SquashError;

pub type NodeId = usize;

pub const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EntryKind {
    Directory,
    Regular,
    Symlink,
}

/// The explicit metadata a node was given when some layer wrote it. Nodes
/// synthesized purely to allow traversal (an implicit intermediate
/// directory) carry no header at all.
#[derive(Debug, Clone)]
pub struct Header {
    pub kind: EntryKind,
    pub mode: StatMode,
    pub owner: Owner,
    pub modtime: i64,
    pub link_target: Option<String>,
    pub body: Option<Arc<[u8]>>,
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: NodeId,
    header: Option<Header>,
    children: BTreeMap<String, NodeId>,
    /// A `.wh..wh..opq` currently applies to this directory: its listed
    /// children are authoritative and nothing from a lower layer should
    /// show through.
    opaque: bool,
    /// Names deleted by a `.wh.{name}` marker and not since recreated.
    whiteouts: BTreeSet<String>,
}

impl Node {
    fn root() -> Self {
        Self {
            name: String::new(),
            parent: ROOT,
            header: None,
            children: BTreeMap::new(),
            opaque: false,
            whiteouts: BTreeSet::new(),
        }
    }
}

/// An arena-allocated virtual filesystem tree, built up by applying an
/// ordered stack of layers. Cyclic parent/child references are modeled as
/// integer ids into `arena` rather than owning pointers, so moving or
/// deleting a subtree never needs reference-counted cycle collection.
pub struct Tree {
    arena: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self { arena: vec![Node::root()] }
    }

    fn alloc(&mut self, name: String, parent: NodeId) -> NodeId {
        self.arena.push(Node { name, parent, header: None, children: BTreeMap::new(), opaque: false, whiteouts: BTreeSet::new() });
        self.arena.len() - 1
    }

    fn is_directory(&self, id: NodeId) -> bool {
        match &self.arena[id].header {
            None => true,
            Some(h) => h.kind == EntryKind::Directory,
        }
    }

    pub fn is_symlink(&self, id: NodeId) -> bool {
        matches!(&self.arena[id].header, Some(h) if h.kind == EntryKind::Symlink)
    }

    pub fn header(&self, id: NodeId) -> Option<&Header> {
        self.arena[id].header.as_ref()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.arena[id].name
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self.arena[id].parent
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.arena[parent].children.get(name).copied()
    }

    /// Children in `(whiteouts-first, then lexicographic)` emission order;
    /// whiteout names are synthesized at call time from the node's tombstone
    /// state rather than stored as real children.
    pub fn ordered_children(&self, id: NodeId) -> (Vec<String>, Vec<(String, NodeId)>) {
        let node = &self.arena[id];
        let mut whiteouts: Vec<String> = node.whiteouts.iter().cloned().collect();
        whiteouts.sort();
        if node.opaque {
            whiteouts.insert(0, ocipack_layer::OPAQUE_WHITEOUT_NAME.to_string());
        }
        let children: Vec<(String, NodeId)> =
            node.children.iter().map(|(name, id)| (name.clone(), *id)).collect();
        (whiteouts, children)
    }

    pub fn has_explicit_header(&self, id: NodeId) -> bool {
        self.arena[id].header.is_some()
    }

    // -- whiteout application --------------------------------------------

    /// Applies `.wh..wh..opq` inside the directory at `dir` (root if
    /// `dir_path` is empty): clears every child and marks the directory
    /// opaque.
    pub fn apply_opaque(&mut self, dir_path: &str) -> Result<(), SquashError> {
        let dir = self.ensure_dir_path(dir_path, &mut Vec::new())?;
        self.arena[dir].children.clear();
        self.arena[dir].whiteouts.clear();
        self.arena[dir].opaque = true;
        Ok(())
    }

    /// Applies `.wh.{name}` inside the directory at `dir_path`: removes the
    /// named child, recording the tombstone so it re-emits in the squashed
    /// output.
    pub fn apply_named_whiteout(&mut self, dir_path: &str, name: &str) -> Result<(), SquashError> {
        let dir = self.ensure_dir_path(dir_path, &mut Vec::new())?;
        self.arena[dir].children.remove(name);
        self.arena[dir].whiteouts.insert(name.to_string());
        Ok(())
    }

    // -- insertion ---------------------------------------------------------

    /// Writes `header` at `path` (cleaned, `/`-joined, non-empty), creating
    /// any missing intermediate directories and resolving symlinks along
    /// the way.
    pub fn insert(&mut self, path: &str, header: Header) -> Result<(), SquashError> {
        let (parent_path, name) = ocipack_layer::split_parent(path);
        let mut visited = Vec::new();
        let parent = match parent_path {
            Some(p) => self.ensure_dir_path(p, &mut visited)?,
            None => ROOT,
        };
        self.set_entry(parent, name, header);
        Ok(())
    }

    fn set_entry(&mut self, parent: NodeId, name: &str, header: Header) {
        self.arena[parent].whiteouts.remove(name);
        let becomes_dir = header.kind == EntryKind::Directory;

        if let Some(id) = self.arena[parent].children.get(name).copied() {
            let was_dir = self.is_directory(id);
            if was_dir && !becomes_dir {
                self.arena[id].children.clear();
                self.arena[id].opaque = false;
                self.arena[id].whiteouts.clear();
            } else if !was_dir && becomes_dir {
                self.arena[id].opaque = true;
            }
            self.arena[id].header = Some(header);
        } else {
            let id = self.alloc(name.to_string(), parent);
            self.arena[id].header = Some(header);
            self.arena[parent].children.insert(name.to_string(), id);
        }
    }

    /// Ensures every component of `path` exists as a directory, creating
    /// implicit directories and following symlinks as needed; returns the
    /// final directory's id.
    fn ensure_dir_path(&mut self, path: &str, visited: &mut Vec<NodeId>) -> Result<NodeId, SquashError> {
        let mut cur = ROOT;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            cur = self.ensure_dir_child(cur, segment, visited)?;
        }
        Ok(cur)
    }

    fn ensure_dir_child(&mut self, parent: NodeId, name: &str, visited: &mut Vec<NodeId>) -> Result<NodeId, SquashError> {
        if let Some(id) = self.arena[parent].children.get(name).copied() {
            if self.is_symlink(id) {
                return self.follow_symlink_for_write(id, visited);
            }
            if !self.is_directory(id) {
                // non-directory -> directory: synthesize an opaque whiteout
                // to preserve the implicit deletion of whatever used to be
                // "under" this former file.
                self.arena[id].children.clear();
                self.arena[id].whiteouts.clear();
                self.arena[id].opaque = true;
                self.arena[id].header = None;
            }
            return Ok(id);
        }
        let id = self.alloc(name.to_string(), parent);
        self.arena[parent].children.insert(name.to_string(), id);
        Ok(id)
    }

    fn follow_symlink_for_write(&mut self, link: NodeId, visited: &mut Vec<NodeId>) -> Result<NodeId, SquashError> {
        if visited.contains(&link) {
            let path = self.path_of(link);
            tracing::warn!(path, "symlink loop detected while squashing layers");
            return Err(SquashError::Loop(path));
        }
        visited.push(link);

        let target = match &self.arena[link].header {
            Some(Header { kind: EntryKind::Symlink, link_target: Some(t), .. }) => t.clone(),
            _ => return Err(SquashError::NotDir(self.path_of(link))),
        };
        let anchor = if target.starts_with('/') { ROOT } else { self.arena[link].parent };
        let relative = target.trim_start_matches('/');
        let cleaned = ocipack_layer::clean_relative_path(relative)
            .map_err(|_| SquashError::NotExist(target.clone()))?;
        match cleaned {
            None => Ok(anchor),
            Some(cleaned) => {
                let mut cur = anchor;
                for segment in cleaned.split('/') {
                    cur = self.ensure_dir_child(cur, segment, visited)?;
                }
                Ok(cur)
            }
        }
    }

    // -- lookup (read path, used by the VFS reader) ------------------------

    /// Resolves `path` against the tree without mutating it; follows
    /// symlinks in intermediate components always, and in the final
    /// component only when `follow_final` is set.
    pub fn lookup(&self, path: &str, follow_final: bool) -> Result<NodeId, SquashError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut cur = ROOT;
        let mut visited = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            cur = self.step(cur, segment, &mut visited)?;
            if self.is_symlink(cur) && (!is_last || follow_final) {
                cur = self.resolve_symlink_read(cur, &mut visited)?;
            }
        }
        Ok(cur)
    }

    fn step(&self, parent: NodeId, name: &str, _visited: &mut Vec<NodeId>) -> Result<NodeId, SquashError> {
        if !self.is_directory(parent) && !self.is_symlink(parent) {
            return Err(SquashError::NotDir(self.path_of(parent)));
        }
        self.arena[parent]
            .children
            .get(name)
            .copied()
            .ok_or_else(|| SquashError::NotExist(format!("{}/{name}", self.path_of(parent))))
    }

    fn resolve_symlink_read(&self, link: NodeId, visited: &mut Vec<NodeId>) -> Result<NodeId, SquashError> {
        if visited.contains(&link) {
            return Err(SquashError::Loop(self.path_of(link)));
        }
        visited.push(link);

        let target = match &self.arena[link].header {
            Some(Header { kind: EntryKind::Symlink, link_target: Some(t), .. }) => t.clone(),
            _ => return Ok(link),
        };
        let anchor = if target.starts_with('/') { ROOT } else { self.arena[link].parent };
        let relative = target.trim_start_matches('/');
        let cleaned = match ocipack_layer::clean_relative_path(relative) {
            Ok(c) => c,
            Err(_) => return Err(SquashError::NotExist(target)),
        };
        let Some(cleaned) = cleaned else { return Ok(anchor) };

        let mut cur = anchor;
        for segment in cleaned.split('/') {
            cur = self.step(cur, segment, visited)?;
            if self.is_symlink(cur) {
                cur = self.resolve_symlink_read(cur, visited)?;
            }
        }
        Ok(cur)
    }

    fn path_of(&self, mut id: NodeId) -> String {
        let mut parts = Vec::new();
        while id != ROOT {
            parts.push(self.arena[id].name.clone());
            id = self.arena[id].parent;
        }
        parts.reverse();
        parts.join("/")
    }
}
