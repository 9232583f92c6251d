//! C4: the on-disk document format — encode, decode, and the lazy-load
//! contract.
//!
//! The document is a self-describing JSON text document. A node carries an
//! explicit `__dmerk__` sentinel and its `kind` carries its own
//! `__dmerk_kind__` sentinel; both are required at decode time. Paths are
//! encoded as `"<flavor>:<absolute-path>"` strings rather than by `eval`-ing
//! a constructor expression: `flavor` is `posix` or `windows`, so the
//! decoder can tell which kind of path it's reconstructing without running
//! arbitrary code.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map as JsonMap, Value};

use crate::error::{Error, Result};
use crate::merkle::Kind;
use crate::Merkle;

#[cfg(windows)]
const PATH_FLAVOR: &str = "windows";
#[cfg(not(windows))]
const PATH_FLAVOR: &str = "posix";

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedDocument(msg.into())
}

fn encode_path(path: &Path) -> String {
    format!("{PATH_FLAVOR}:{}", path.display())
}

fn decode_path(encoded: &str) -> Result<PathBuf> {
    match encoded.split_once(':') {
        Some(("posix", rest)) | Some(("windows", rest)) => Ok(PathBuf::from(rest)),
        _ => Err(malformed(format!("unrecognized path flavor in '{encoded}'"))),
    }
}

fn kind_to_value(kind: Kind) -> Value {
    let mut tag = JsonMap::new();
    tag.insert("__dmerk_kind__".to_string(), Value::String(kind.as_tag().to_string()));
    Value::Object(tag)
}

fn decode_kind(value: &Value) -> Result<Kind> {
    let tag = value
        .as_object()
        .and_then(|obj| obj.get("__dmerk_kind__"))
        .and_then(Value::as_str);
    tag.and_then(Kind::from_tag).ok_or_else(|| malformed("not a valid kind tag"))
}

/// Encode a fully-materialized node (and, recursively, its children) to a
/// JSON document value. Forces materialization of any lazily-loaded
/// descendants, so re-saving a tree that was itself loaded lazily is just as
/// valid as saving a freshly generated one.
fn node_to_value(node: &Merkle) -> Result<Value> {
    let mut obj = JsonMap::new();
    obj.insert("__dmerk__".to_string(), Value::Bool(true));
    obj.insert("path".to_string(), Value::String(encode_path(node.path())));
    obj.insert("kind".to_string(), kind_to_value(node.kind()));
    obj.insert("size".to_string(), Value::from(node.size()));
    obj.insert("digest".to_string(), Value::String(node.digest().to_string()));
    if node.kind() == Kind::Directory {
        let mut children = JsonMap::new();
        for (path, child) in node.children()? {
            children.insert(encode_path(path), node_to_value(child)?);
        }
        obj.insert("children".to_string(), Value::Object(children));
    }
    Ok(Value::Object(obj))
}

/// Decode a single node from a document value, without descending into its
/// children's children: a Directory's own children are kept as a raw,
/// undecoded JSON map (see [`crate::merkle::ChildrenRepr`]), materialized
/// lazily on first access to `Merkle::children`.
fn value_to_node(value: &Value) -> Result<Merkle> {
    let obj = value.as_object().ok_or_else(|| malformed("not a valid dmerk node"))?;
    let is_dmerk_node = obj.get("__dmerk__").and_then(Value::as_bool).unwrap_or(false);
    if !is_dmerk_node {
        return Err(malformed("not a valid dmerk node"));
    }
    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("node is missing 'path'"))?;
    let path = decode_path(path)?;
    let kind = decode_kind(obj.get("kind").ok_or_else(|| malformed("node is missing 'kind'"))?)?;
    let size = obj.get("size").and_then(Value::as_u64).ok_or_else(|| malformed("node is missing 'size'"))?;
    let digest = obj
        .get("digest")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("node is missing 'digest'"))?
        .to_string();

    match kind {
        Kind::File => Ok(Merkle::new_file(path, size, digest)),
        Kind::Symlink => Ok(Merkle::new_symlink(path, size, digest)),
        Kind::Directory => {
            let raw_children =
                obj.get("children").and_then(Value::as_object).cloned().unwrap_or_default();
            Ok(Merkle::new_lazy_directory(path, size, digest, raw_children))
        }
    }
}

/// Materialize one level of a lazily-loaded directory's children. Called
/// at most once per node (see `ChildrenRepr::get_or_materialize`); does no
/// I/O, since `load` already read the whole document into memory.
pub(crate) fn decode_children(raw: &JsonMap<String, Value>) -> Result<BTreeMap<PathBuf, Merkle>> {
    raw.values()
        .map(|value| value_to_node(value).map(|node| (node.path().to_path_buf(), node)))
        .collect()
}

/// Encode `tree` to the same JSON value [`save_as`] would write, without
/// touching the filesystem. Useful for `--print`.
pub fn to_json_value(tree: &Merkle) -> Result<Value> {
    node_to_value(tree)
}

/// Encode `tree` to a self-describing JSON document and write it to
/// `filename`.
pub fn save_as(tree: &Merkle, filename: &Path) -> Result<()> {
    let value = node_to_value(tree)?;
    let encoded = serde_json::to_string(&value)
        .map_err(|e| malformed(format!("failed to encode document: {e}")))?;
    fs::write(filename, encoded).map_err(|source| Error::IoError { path: filename.to_path_buf(), source })
}

/// Encode `tree` to a self-describing JSON document inside `dir`, synthesizing
/// `"<root_name>.dmerk"` as the filename and retrying with a random 8-hex-digit
/// suffix on collision. Returns the path actually written.
pub fn save(tree: &Merkle, dir: &Path) -> Result<PathBuf> {
    let path = unique_filename(tree, dir);
    save_as(tree, &path)?;
    Ok(path)
}

fn unique_filename(tree: &Merkle, dir: &Path) -> PathBuf {
    let root_name = tree.path().file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "root".to_string());
    let mut candidate = dir.join(format!("{root_name}.dmerk"));
    while candidate.exists() {
        let suffix: String =
            rand::thread_rng().sample_iter(&Alphanumeric).filter(|c| c.is_ascii_hexdigit()).map(|c| (c as char).to_ascii_lowercase()).take(8).collect();
        candidate = dir.join(format!("{root_name}_{suffix}.dmerk"));
    }
    candidate
}

/// Read and decode a `.dmerk` document, returning a root whose immediate
/// fields are populated but whose descendants are held undecoded until
/// accessed.
pub fn load(filename: &Path) -> Result<Merkle> {
    let contents =
        fs::read_to_string(filename).map_err(|source| Error::IoError { path: filename.to_path_buf(), source })?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| malformed(format!("failed to parse document: {e}")))?;
    value_to_node(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate;
    use std::collections::BTreeMap as Map;
    use tempfile::TempDir;

    #[test]
    fn round_trip_preserves_equality_and_shape() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file1"), "Hello World 1").unwrap();
        std::fs::write(dir.path().join("file2"), "Hello World 2").unwrap();
        let tree = generate::generate(dir.path(), false).unwrap();

        let saved_path = save(&tree, dir.path()).unwrap();
        let loaded = load(&saved_path).unwrap();

        assert_eq!(tree, loaded);
        assert_eq!(tree.size(), loaded.size());
        assert_eq!(loaded.children().unwrap().len(), 2);
    }

    #[test]
    fn save_retries_filename_on_collision() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("root")).unwrap();
        let tree = generate::generate(&dir.path().join("root"), false).unwrap();

        let first = save(&tree, dir.path()).unwrap();
        assert_eq!(first, dir.path().join("root.dmerk"));
        let second = save(&tree, dir.path()).unwrap();
        assert_ne!(first, second);
        assert!(second.file_name().unwrap().to_string_lossy().starts_with("root_"));
    }

    #[test]
    fn load_rejects_missing_sentinel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.dmerk");
        fs::write(&path, r#"{"path": "posix:/x", "kind": {"__dmerk_kind__": "file"}, "size": 0, "digest": "x"}"#)
            .unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn load_rejects_unknown_kind_tag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.dmerk");
        fs::write(
            &path,
            r#"{"__dmerk__": true, "path": "posix:/x", "kind": {"__dmerk_kind__": "blockdevice"}, "size": 0, "digest": "x"}"#,
        )
        .unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn lazy_directory_materializes_children_on_first_access() {
        let mut grandchild = JsonMap::new();
        grandchild.insert("__dmerk__".to_string(), Value::Bool(true));
        grandchild.insert("path".to_string(), Value::String(encode_path(Path::new("/root/dir/leaf"))));
        grandchild.insert("kind".to_string(), kind_to_value(Kind::File));
        grandchild.insert("size".to_string(), Value::from(3u64));
        grandchild.insert("digest".to_string(), Value::String("aaa".to_string()));

        let mut raw = JsonMap::new();
        raw.insert(encode_path(Path::new("/root/dir/leaf")), Value::Object(grandchild));

        let node = Merkle::new_lazy_directory(PathBuf::from("/root/dir"), 3, "bbb".to_string(), raw);
        let children = node.children().unwrap();
        let expected: Map<PathBuf, u64> = Map::from([(PathBuf::from("/root/dir/leaf"), 3)]);
        assert_eq!(children.len(), expected.len());
        assert_eq!(children.get(Path::new("/root/dir/leaf")).unwrap().digest(), "aaa");
    }
}
