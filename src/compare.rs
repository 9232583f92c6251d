//! C6: the Comparator — a structural diff between two Merkle (sub-)trees
//! that reports matches and unmatched sets at the coarsest granularity
//! possible.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::merkle::Kind;
use crate::Merkle;

/// The result of [`compare`]. Report order within each list is unspecified;
/// callers should only rely on set-equality.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Pairs of subtrees with identical digests: `(paths_in_a, paths_in_b)`.
    pub matches: Vec<(Vec<PathBuf>, Vec<PathBuf>)>,
    /// Groups of paths in `a`, by shared digest, with no counterpart in `b`.
    pub unmatched_1: Vec<Vec<PathBuf>>,
    /// Symmetric to `unmatched_1`, for paths in `b`.
    pub unmatched_2: Vec<Vec<PathBuf>>,
}

/// Compare two Merkle (sub-)trees rooted anywhere. Total: never fails.
///
/// The fast path is the whole point: if the two roots already share a
/// digest, the entire pair is reported as one match without looking at
/// either side's children. Because that check fires at every level of
/// recursion, a match is always reported at the shallowest subtree where it
/// holds — the Comparator never descends below a match boundary.
pub fn compare(a: &Merkle, b: &Merkle) -> Report {
    let mut report = Report::default();
    compare_into(&[a], &[b], &mut report);
    report
}

/// Compare two pools of sibling nodes (initially the two roots, on later
/// calls the pooled children of directories that didn't match their
/// counterpart). Grouping by digest before checking for a match handles the
/// single-pair fast path for free: a singleton pool with one digest either
/// matches the other singleton pool outright, or doesn't, with no special
/// case needed.
///
/// When a directory on each side is left over after matching, their
/// children are pooled together (not compared directory-by-directory) and
/// the whole thing recurses, exactly so a nested match doesn't get missed
/// just because its immediate parents differ — e.g. two directories that
/// both contain a matching subdirectory plus one differing file each: the
/// parents' digests disagree, but recursing into their pooled children
/// still finds the subdirectory match.
fn compare_into<'a>(nodes_a: &[&'a Merkle], nodes_b: &[&'a Merkle], report: &mut Report) {
    let groups_a = digest_groups(nodes_a.iter().copied());
    let groups_b = digest_groups(nodes_b.iter().copied());

    for (digest, group_a) in &groups_a {
        if let Some(group_b) = groups_b.get(digest) {
            report.matches.push((paths_of(group_a), paths_of(group_b)));
        }
    }

    let exclusive_a = exclusive_nodes(&groups_a, &groups_b);
    let exclusive_b = exclusive_nodes(&groups_b, &groups_a);

    let (dirs_a, terminal_a) = partition_expandable(exclusive_a);
    let (dirs_b, terminal_b) = partition_expandable(exclusive_b);

    if !dirs_a.is_empty() && !dirs_b.is_empty() {
        let mut next_a = terminal_a;
        next_a.extend(pooled_children(&dirs_a));
        let mut next_b = terminal_b;
        next_b.extend(pooled_children(&dirs_b));
        compare_into(&next_a, &next_b, report);
    } else {
        report.unmatched_1.extend(finalize_unmatched(dirs_a, terminal_a));
        report.unmatched_2.extend(finalize_unmatched(dirs_b, terminal_b));
    }
}

fn digest_groups<'a>(nodes: impl Iterator<Item = &'a Merkle>) -> HashMap<&'a str, Vec<&'a Merkle>> {
    let mut groups: HashMap<&'a str, Vec<&'a Merkle>> = HashMap::new();
    for node in nodes {
        groups.entry(node.digest()).or_default().push(node);
    }
    groups
}

fn paths_of(nodes: &[&Merkle]) -> Vec<PathBuf> {
    nodes.iter().map(|n| n.path().to_path_buf()).collect()
}

/// All nodes from `groups` whose digest has no counterpart in `other`.
fn exclusive_nodes<'a>(
    groups: &HashMap<&'a str, Vec<&'a Merkle>>,
    other: &HashMap<&'a str, Vec<&'a Merkle>>,
) -> Vec<&'a Merkle> {
    groups.iter().filter(|(digest, _)| !other.contains_key(*digest)).flat_map(|(_, nodes)| nodes.iter().copied()).collect()
}

/// Split exclusive nodes into directories worth descending into (non-empty,
/// with children that materialize) versus everything else, which is already
/// as coarse as it'll get: files, symlinks, empty directories, and
/// directories whose children failed to materialize.
fn partition_expandable(nodes: Vec<&Merkle>) -> (Vec<&Merkle>, Vec<&Merkle>) {
    let mut dirs = Vec::new();
    let mut terminal = Vec::new();
    for node in nodes {
        if node.kind() != Kind::Directory {
            terminal.push(node);
            continue;
        }
        match node.children() {
            Ok(children) if !children.is_empty() => dirs.push(node),
            Ok(_) => terminal.push(node),
            Err(_) => {
                log::warn!("'{}': children failed to materialize, treating as unmatched", node.path().display());
                terminal.push(node);
            }
        }
    }
    (dirs, terminal)
}

fn pooled_children<'a>(dirs: &[&'a Merkle]) -> Vec<&'a Merkle> {
    dirs.iter().flat_map(|d| d.children().expect("checked Ok in partition_expandable").values()).collect()
}

/// Group `dirs` and `terminal` by digest for the final report: `dirs` here
/// are directories left over only because the other side ran out of
/// directories to pair them against, not because they matched anything, so
/// they're reported as single-element unmatched groups just like any other
/// leftover node — descending into them wouldn't find a match on a side that
/// has nothing left to compare against.
fn finalize_unmatched<'a>(dirs: Vec<&'a Merkle>, terminal: Vec<&'a Merkle>) -> Vec<Vec<PathBuf>> {
    let mut groups = digest_groups(dirs.into_iter().chain(terminal));
    let mut order: Vec<&str> = groups.keys().copied().collect();
    order.sort_unstable();
    order.into_iter().map(|digest| paths_of(&groups.remove(digest).unwrap())).collect()
}

/// Compare two loaded/generated trees after resolving `sub_path_a`/`sub_path_b`
/// against each root via [`Merkle::traverse`] (the CLI's `-sp1`/`-sp2`).
pub fn compare_subtrees(
    a: &Merkle,
    sub_path_a: Option<&Path>,
    b: &Merkle,
    sub_path_b: Option<&Path>,
) -> Result<Report> {
    let root_a = match sub_path_a {
        Some(p) => a.traverse(p)?,
        None => a,
    };
    let root_b = match sub_path_b {
        Some(p) => b.traverse(p)?,
        None => b,
    };
    Ok(compare(root_a, root_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate;
    use std::fs;
    use tempfile::TempDir;

    fn one(list: &[Vec<PathBuf>]) -> Vec<PathBuf> {
        assert_eq!(list.len(), 1);
        list[0].clone()
    }

    #[test]
    fn comparing_a_tree_with_itself_is_one_match_no_unmatched() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), "A").unwrap();
        let tree = generate::generate(dir.path(), false).unwrap();

        let report = compare(&tree, &tree);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0], (vec![tree.path().to_path_buf()], vec![tree.path().to_path_buf()]));
        assert!(report.unmatched_1.is_empty());
        assert!(report.unmatched_2.is_empty());
    }

    // An entire directory moved/renamed is one match, the fast path fires
    // without descending.
    #[test]
    fn move_detection_whole_directory() {
        let left_root = TempDir::new().unwrap();
        let dir_a = left_root.path().join("dirA");
        fs::create_dir(&dir_a).unwrap();
        fs::write(dir_a.join("file"), "K").unwrap();

        let right_root = TempDir::new().unwrap();
        let dir_b = right_root.path().join("dirB");
        fs::create_dir(&dir_b).unwrap();
        fs::write(dir_b.join("file"), "K").unwrap();

        let left = generate::generate(left_root.path(), false).unwrap();
        let right = generate::generate(right_root.path(), false).unwrap();

        let report = compare(&left, &right);
        assert!(report.unmatched_1.is_empty());
        assert!(report.unmatched_2.is_empty());
        assert_eq!(report.matches.len(), 1);
        assert_eq!(one(&[report.matches[0].0.clone()]), vec![left.path().to_path_buf()]);
    }

    // Partial overlap — one match, one unmatched each side.
    #[test]
    fn partial_overlap() {
        let left_root = TempDir::new().unwrap();
        fs::write(left_root.path().join("fileA"), "A").unwrap();
        fs::write(left_root.path().join("fileB"), "B").unwrap();

        let right_root = TempDir::new().unwrap();
        fs::write(right_root.path().join("fileA"), "A").unwrap();
        fs::write(right_root.path().join("fileC"), "C").unwrap();

        let left = generate::generate(left_root.path(), false).unwrap();
        let right = generate::generate(right_root.path(), false).unwrap();

        let report = compare(&left, &right);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].0, vec![left_root.path().join("fileA")]);
        assert_eq!(report.matches[0].1, vec![right_root.path().join("fileA")]);

        assert_eq!(one(&report.unmatched_1), vec![left_root.path().join("fileB")]);
        assert_eq!(one(&report.unmatched_2), vec![right_root.path().join("fileC")]);
    }

    #[test]
    fn fast_path_does_not_descend_into_matching_subtrees() {
        // A directory with deeply nested content, duplicated verbatim. If
        // the comparator descended, it would still find the same matches,
        // but the point under test is that the whole subtree is reported as
        // ONE match, not one match per leaf.
        let left_root = TempDir::new().unwrap();
        fs::create_dir_all(left_root.path().join("a/b/c")).unwrap();
        fs::write(left_root.path().join("a/b/c/leaf"), "content").unwrap();

        let right_root = TempDir::new().unwrap();
        fs::create_dir_all(right_root.path().join("a/b/c")).unwrap();
        fs::write(right_root.path().join("a/b/c/leaf"), "content").unwrap();

        let left = generate::generate(left_root.path(), false).unwrap();
        let right = generate::generate(right_root.path(), false).unwrap();

        let report = compare(&left, &right);
        assert_eq!(report.matches.len(), 1);
    }

    // GL = {P1: {Q1: {fileA: "K"}, extra1: "Z1"}}, GR = {P2: {Q2: {fileA: "K"}, extra2: "Z2"}}.
    // digest(P1) != digest(P2) because extra1/extra2 differ, so the slow path
    // must recurse past the mismatching P1/P2 pair to find that Q1 and Q2
    // match.
    #[test]
    fn nested_match_is_found_beneath_mismatching_ancestor_directories() {
        let left_root = TempDir::new().unwrap();
        fs::create_dir_all(left_root.path().join("P1/Q1")).unwrap();
        fs::write(left_root.path().join("P1/Q1/fileA"), "K").unwrap();
        fs::write(left_root.path().join("P1/extra1"), "Z1").unwrap();

        let right_root = TempDir::new().unwrap();
        fs::create_dir_all(right_root.path().join("P2/Q2")).unwrap();
        fs::write(right_root.path().join("P2/Q2/fileA"), "K").unwrap();
        fs::write(right_root.path().join("P2/extra2"), "Z2").unwrap();

        let left = generate::generate(left_root.path(), false).unwrap();
        let right = generate::generate(right_root.path(), false).unwrap();

        let report = compare(&left, &right);

        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].0, vec![left_root.path().join("P1/Q1")]);
        assert_eq!(report.matches[0].1, vec![right_root.path().join("P2/Q2")]);

        assert_eq!(one(&report.unmatched_1), vec![left_root.path().join("P1/extra1")]);
        assert_eq!(one(&report.unmatched_2), vec![right_root.path().join("P2/extra2")]);
    }

    #[test]
    fn grouped_digests_pair_as_sets_when_duplicates_exist() {
        let left_root = TempDir::new().unwrap();
        fs::write(left_root.path().join("dup1"), "same").unwrap();
        fs::write(left_root.path().join("dup2"), "same").unwrap();
        // Without these, both roots would have the identical two-children
        // digest multiset and match whole, never reaching the slow path.
        fs::write(left_root.path().join("uniqueL"), "L").unwrap();

        let right_root = TempDir::new().unwrap();
        fs::write(right_root.path().join("copyA"), "same").unwrap();
        fs::write(right_root.path().join("copyB"), "same").unwrap();
        fs::write(right_root.path().join("uniqueR"), "R").unwrap();

        let left = generate::generate(left_root.path(), false).unwrap();
        let right = generate::generate(right_root.path(), false).unwrap();

        let report = compare(&left, &right);
        assert_eq!(report.matches.len(), 1);
        let (mut a_paths, mut b_paths) = report.matches[0].clone();
        a_paths.sort();
        b_paths.sort();
        assert_eq!(a_paths, vec![left_root.path().join("dup1"), left_root.path().join("dup2")]);
        assert_eq!(b_paths, vec![right_root.path().join("copyA"), right_root.path().join("copyB")]);

        assert_eq!(one(&report.unmatched_1), vec![left_root.path().join("uniqueL")]);
        assert_eq!(one(&report.unmatched_2), vec![right_root.path().join("uniqueR")]);
    }
}
