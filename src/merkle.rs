//! C2: the Merkle node, the only persistent entity in the data model.
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde_json::Map as JsonMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::serialize;

/// What kind of filesystem entry a node represents. Symlink is tested before
/// Directory/File by the Generator because a symlink can resolve as either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    File,
    Directory,
    Symlink,
}

impl Kind {
    pub(crate) fn as_tag(self) -> &'static str {
        match self {
            Kind::File => "file",
            Kind::Directory => "directory",
            Kind::Symlink => "symlink",
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Option<Kind> {
        match tag {
            "file" => Some(Kind::File),
            "directory" => Some(Kind::Directory),
            "symlink" => Some(Kind::Symlink),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A directory's children, either fully built in memory (Generator output, or
/// an already-materialized lazy load) or still undecoded (fresh out of
/// `Serializer::load`). The transition from `Lazy` to materialized happens at
/// most once per node, guarded by `OnceCell` rather than a lock, since the
/// tree is not shared across threads until materialization completes.
pub(crate) enum ChildrenRepr {
    Eager(BTreeMap<PathBuf, Merkle>),
    Lazy {
        raw: JsonMap<String, Value>,
        materialized: OnceCell<BTreeMap<PathBuf, Merkle>>,
    },
}

impl ChildrenRepr {
    pub(crate) fn lazy(raw: JsonMap<String, Value>) -> Self {
        ChildrenRepr::Lazy { raw, materialized: OnceCell::new() }
    }

    fn get_or_materialize(&self) -> Result<&BTreeMap<PathBuf, Merkle>> {
        match self {
            ChildrenRepr::Eager(map) => Ok(map),
            ChildrenRepr::Lazy { raw, materialized } => {
                materialized.get_or_try_init(|| serialize::decode_children(raw))
            }
        }
    }
}

/// One filesystem entry: a file, a directory, or a symlink.
///
/// Immutable after construction, apart from the one-shot lazy-children
/// materialization on a loaded Directory (see [`ChildrenRepr`]). Equality
/// never considers `path`, which is what lets identical content be
/// recognized as a match wherever it lives in the tree.
pub struct Merkle {
    path: PathBuf,
    kind: Kind,
    size: u64,
    digest: String,
    children: Option<ChildrenRepr>,
}

impl Merkle {
    pub(crate) fn new_file(path: PathBuf, size: u64, digest: String) -> Self {
        Merkle { path, kind: Kind::File, size, digest, children: None }
    }

    pub(crate) fn new_symlink(path: PathBuf, size: u64, digest: String) -> Self {
        Merkle { path, kind: Kind::Symlink, size, digest, children: None }
    }

    pub(crate) fn new_directory(
        path: PathBuf,
        size: u64,
        digest: String,
        children: BTreeMap<PathBuf, Merkle>,
    ) -> Self {
        Merkle {
            path,
            kind: Kind::Directory,
            size,
            digest,
            children: Some(ChildrenRepr::Eager(children)),
        }
    }

    pub(crate) fn new_lazy_directory(
        path: PathBuf,
        size: u64,
        digest: String,
        raw_children: JsonMap<String, Value>,
    ) -> Self {
        Merkle {
            path,
            kind: Kind::Directory,
            size,
            digest,
            children: Some(ChildrenRepr::lazy(raw_children)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The children of a directory node, materializing them on first access
    /// if this node came from a lazy load.
    ///
    /// Fails with `NotFound` if called on a File or Symlink node, and with
    /// `MalformedDocument` if a lazily-loaded node's raw children blob
    /// doesn't decode.
    pub fn children(&self) -> Result<&BTreeMap<PathBuf, Merkle>> {
        match &self.children {
            None => Err(Error::NotFound(self.path.clone())),
            Some(repr) => repr.get_or_materialize(),
        }
    }

    /// Resolve `sub_path` (absolute, or relative to this node's own `path`)
    /// to the descendant whose `path` equals it, descending by path-prefix
    /// matching. Purely lexical: no filesystem calls.
    pub fn traverse(&self, sub_path: impl AsRef<Path>) -> Result<&Merkle> {
        let sub_path = sub_path.as_ref();
        let target: Cow<'_, Path> = if sub_path.is_absolute() {
            Cow::Borrowed(sub_path)
        } else {
            Cow::Owned(self.path.join(sub_path))
        };
        self.traverse_resolved(&target)
    }

    fn traverse_resolved(&self, target: &Path) -> Result<&Merkle> {
        let children = self.children()?;
        for (child_path, child) in children.iter() {
            if target == child_path {
                return Ok(child);
            } else if target.starts_with(child_path) {
                return child.traverse_resolved(target);
            }
        }
        Err(Error::NotFound(target.to_path_buf()))
    }
}

/// Two nodes are equal iff `kind`, `size`, and `digest` agree; `path` is
/// excluded, which is what lets the Comparator detect renames and moves.
/// Directory children aren't walked here: digest is a pure function of a
/// directory's children's digests, so digest equality already implies
/// "deeply equal children" up to the digest's collision resistance — the
/// same assumption the Comparator's fast path relies on.
impl PartialEq for Merkle {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.size == other.size && self.digest == other.digest
    }
}

impl Eq for Merkle {}

impl fmt::Debug for Merkle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Merkle")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("digest", &self.digest)
            .finish()
    }
}
