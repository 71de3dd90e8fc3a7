// src/dispatch/resolve.rs

use crate::config::ExecutionMap;

/// Resolve `(source, branch)` to the ordered list of action names to run.
///
/// Pure lookup over the loaded execution map. Precedence:
///
/// 1. exact source + exact branch
/// 2. exact source + `"*"` branch
/// 3. `"*"` source + exact branch
/// 4. `"*"` source + `"*"` branch
///
/// No entry at all (not even a wildcard) resolves to an empty list. That is
/// not an error; the run is still checkpointed as seen.
pub fn resolve<'a>(map: &'a ExecutionMap, source: &str, branch: &str) -> &'a [String] {
    for source_key in [source, "*"] {
        let Some(branches) = map.get(source_key) else {
            continue;
        };
        for branch_key in [branch, "*"] {
            if let Some(actions) = branches.get(branch_key) {
                return actions;
            }
        }
    }
    &[]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(entries: &[(&str, &str, &[&str])]) -> ExecutionMap {
        let mut map = ExecutionMap::new();
        for (source, branch, actions) in entries {
            map.entry(source.to_string())
                .or_insert_with(BTreeMap::new)
                .insert(
                    branch.to_string(),
                    actions.iter().map(|s| s.to_string()).collect(),
                );
        }
        map
    }

    #[test]
    fn exact_source_and_branch_wins() {
        let map = map(&[
            ("repo", "main", &["a"]),
            ("repo", "*", &["b"]),
            ("*", "main", &["c"]),
            ("*", "*", &["d"]),
        ]);
        assert_eq!(resolve(&map, "repo", "main"), ["a"]);
    }

    #[test]
    fn exact_source_wildcard_branch_beats_wildcard_source() {
        let map = map(&[
            ("repo", "*", &["b"]),
            ("*", "main", &["c"]),
            ("*", "*", &["d"]),
        ]);
        assert_eq!(resolve(&map, "repo", "main"), ["b"]);
    }

    #[test]
    fn wildcard_source_exact_branch_beats_double_wildcard() {
        let map = map(&[("*", "main", &["c"]), ("*", "*", &["d"])]);
        assert_eq!(resolve(&map, "repo", "main"), ["c"]);
    }

    #[test]
    fn double_wildcard_is_the_last_resort() {
        let map = map(&[("*", "*", &["d"])]);
        assert_eq!(resolve(&map, "repo", "feature/x"), ["d"]);
    }

    #[test]
    fn no_entry_resolves_empty() {
        let map = map(&[("other", "main", &["a"])]);
        assert!(resolve(&map, "repo", "main").is_empty());
    }

    #[test]
    fn order_is_preserved() {
        let map = map(&[("repo", "main", &["restart", "notify", "cleanup"])]);
        assert_eq!(
            resolve(&map, "repo", "main"),
            ["restart", "notify", "cleanup"]
        );
    }

    #[test]
    fn exact_source_without_matching_branch_falls_through_to_wildcard_source() {
        // "repo" exists but has no entry for this branch and no "*" branch;
        // the wildcard source still applies.
        let map = map(&[("repo", "main", &["a"]), ("*", "*", &["d"])]);
        assert_eq!(resolve(&map, "repo", "develop"), ["d"]);
    }
}
