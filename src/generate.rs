//! C3: the Generator — walks a filesystem subtree and builds its Merkle tree
//! bottom-up.
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::digest;
use crate::error::{Error, Result};
use crate::Merkle;

enum LeafKind {
    File,
    Symlink,
}

/// Walk `root` and return its Merkle node. Fails with [`Error::NotADirectory`]
/// if `root` doesn't exist or isn't a directory (symlinks to a directory are
/// accepted, matching the root being resolved the way `Path.exists()` would).
///
/// When `continue_on_error` is set, entries that are neither file, directory,
/// nor symlink, and entries that hit a permission or I/O error, are logged
/// and excluded from the result rather than failing the whole walk.
pub fn generate(root: &Path, continue_on_error: bool) -> Result<Merkle> {
    let root = root.to_path_buf();
    let root_is_dir = fs::metadata(&root).map(|m| m.is_dir()).unwrap_or(false);
    if !root_is_dir {
        return Err(Error::NotADirectory(root));
    }

    // Phase 1 (sequential, cheap): classify every entry under `root`.
    // `WalkDir` walks iteratively, not recursively, so this never risks a
    // stack overflow no matter how deep the tree is.
    let mut leaves: Vec<(PathBuf, PathBuf, LeafKind)> = Vec::new();
    let mut directories: Vec<PathBuf> = vec![root.clone()];
    let mut parent_of: HashMap<PathBuf, PathBuf> = HashMap::new();

    for entry in WalkDir::new(&root).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if continue_on_error {
                    log::warn!("skipping unreadable entry: {err}");
                    continue;
                }
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                let source = err.into_io_error().unwrap_or_else(|| io::Error::other("walk failed"));
                return Err(Error::IoError { path, source });
            }
        };
        let path = entry.path().to_path_buf();
        let parent = path.parent().expect("walked entry has a parent").to_path_buf();
        let file_type = entry.file_type();

        // is_symlink must be checked first: a symlink to a directory is also is_dir().
        if file_type.is_symlink() {
            parent_of.insert(path.clone(), parent.clone());
            leaves.push((path, parent, LeafKind::Symlink));
        } else if file_type.is_dir() {
            parent_of.insert(path.clone(), parent);
            directories.push(path);
        } else if file_type.is_file() {
            parent_of.insert(path.clone(), parent.clone());
            leaves.push((path, parent, LeafKind::File));
        } else if continue_on_error {
            log::warn!("skipping non-file/directory/symlink entry: {}", path.display());
        } else {
            return Err(Error::InvalidEntry(path));
        }
    }

    // Phase 2 (parallel): hash every leaf. Each leaf's digest depends only on
    // its own bytes or link target, so fanning this out to rayon's pool is an
    // internal optimization only — the result is identical to hashing
    // sequentially.
    let leaf_results: Vec<(PathBuf, Result<Merkle>)> = leaves
        .into_par_iter()
        .map(|(path, _parent, kind)| {
            let result = hash_leaf(&path, kind);
            (path, result)
        })
        .collect();

    let mut children_of: HashMap<PathBuf, BTreeMap<PathBuf, Merkle>> =
        directories.iter().cloned().map(|dir| (dir, BTreeMap::new())).collect();

    for (path, result) in leaf_results {
        match result {
            Ok(node) => {
                let parent = parent_of.remove(&path).expect("leaf was walked with a parent");
                children_of.entry(parent).or_default().insert(path, node);
            }
            Err(err) if continue_on_error => log::warn!("skipping unreadable entry: {err}"),
            Err(err) => return Err(err),
        }
    }

    // Phase 3 (sequential): fold directories bottom-up. Sorting deepest-first
    // guarantees every directory's children (leaves or already-folded
    // subdirectories) are present in `children_of` by the time we reach it —
    // an explicit ordering standing in for a work stack, with no native
    // recursion at all.
    directories.sort_by_key(|dir| Reverse(dir.components().count()));
    for dir in directories {
        let children = children_of.remove(&dir).unwrap_or_default();
        let inode_size = fs::symlink_metadata(&dir).map(|m| m.len()).unwrap_or(0);
        let size = inode_size + children.values().map(Merkle::size).sum::<u64>();
        let mut child_digests: Vec<&str> = children.values().map(Merkle::digest).collect();
        child_digests.sort_unstable();
        let digest = digest::hash_string(&child_digests.join(","));
        let node = Merkle::new_directory(dir.clone(), size, digest, children);

        if dir == root {
            return Ok(node);
        }
        let parent = parent_of.remove(&dir).expect("directory was walked with a parent");
        children_of.entry(parent).or_default().insert(dir, node);
    }
    unreachable!("root is always the last directory folded")
}

fn hash_leaf(path: &Path, kind: LeafKind) -> Result<Merkle> {
    let metadata = fs::symlink_metadata(path)
        .map_err(|source| Error::IoError { path: path.to_path_buf(), source })?;
    let size = metadata.len();
    match kind {
        LeafKind::Symlink => {
            let target = fs::read_link(path)
                .map_err(|source| Error::IoError { path: path.to_path_buf(), source })?;
            let digest = digest::hash_string(&target.to_string_lossy());
            Ok(Merkle::new_symlink(path.to_path_buf(), size, digest))
        }
        LeafKind::File => {
            let file = fs::File::open(path)
                .map_err(|source| Error::IoError { path: path.to_path_buf(), source })?;
            let digest = digest::hash_bytes(io::BufReader::new(file))
                .map_err(|source| Error::IoError { path: path.to_path_buf(), source })?;
            Ok(Merkle::new_file(path.to_path_buf(), size, digest))
        }
    }
}
