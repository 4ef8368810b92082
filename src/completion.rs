//! Command-name completion backed by a character trie.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    is_end: bool,
}

/// Prefix index over command names.
///
/// Populated once at startup from the built-in names and every executable
/// name on PATH, then queried by the line editor on Tab.
#[derive(Debug, Default)]
pub struct CompletionIndex {
    root: TrieNode,
}

impl CompletionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the built-in names plus every regular file or symlink found in the
    /// directories of `search_paths` (a PATH-style list).
    pub fn populate<'a>(
        &mut self,
        builtins: impl IntoIterator<Item = &'a str>,
        search_paths: &OsStr,
    ) {
        for name in builtins {
            self.insert(name);
        }

        for dir in std::env::split_paths(search_paths) {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::trace!("skipping {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let is_candidate = entry
                    .file_type()
                    .map(|t| t.is_file() || t.is_symlink())
                    .unwrap_or(false);
                if is_candidate {
                    if let Some(name) = entry.file_name().to_str() {
                        self.insert(name);
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, word: &str) {
        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.is_end = true;
    }

    pub fn contains(&self, word: &str) -> bool {
        self.find(word).is_some_and(|node| node.is_end)
    }

    /// Every indexed word starting with `prefix`, in no particular order.
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        let Some(start) = self.find(prefix) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        let mut stack = vec![(start, prefix.to_string())];
        while let Some((node, word)) = stack.pop() {
            if node.is_end {
                results.push(word.clone());
            }
            for (ch, child) in &node.children {
                let mut next = word.clone();
                next.push(*ch);
                stack.push((child, next));
            }
        }
        results
    }

    /// Remove `word`, pruning branches that no longer lead to any word.
    ///
    /// Returns whether the word was present.
    pub fn delete(&mut self, word: &str) -> bool {
        let chars: Vec<char> = word.chars().collect();
        let mut removed = false;
        remove(&mut self.root, &chars, &mut removed);
        removed
    }

    fn find(&self, prefix: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for ch in prefix.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }
}

// Returns true when `node` became empty and can be dropped by its parent.
fn remove(node: &mut TrieNode, rest: &[char], removed: &mut bool) -> bool {
    match rest.split_first() {
        None => {
            *removed = node.is_end;
            node.is_end = false;
        }
        Some((ch, tail)) => {
            let Some(child) = node.children.get_mut(ch) else {
                return false;
            };
            if remove(child, tail, removed) {
                node.children.remove(ch);
            }
        }
    }
    !node.is_end && node.children.is_empty()
}

/// Longest prefix shared by every word; empty for an empty slice.
pub fn longest_common_prefix<S: AsRef<str>>(words: &[S]) -> String {
    let Some((first, rest)) = words.split_first() else {
        return String::new();
    };
    let mut prefix = first.as_ref();
    for word in rest {
        let shared = prefix
            .char_indices()
            .zip(word.as_ref().chars())
            .find(|((_, a), b)| a != b)
            .map(|((i, _), _)| i)
            .unwrap_or_else(|| prefix.len().min(word.as_ref().len()));
        prefix = &prefix[..shared];
    }
    prefix.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_completions_by_prefix() {
        let mut trie = CompletionIndex::new();
        trie.insert("cd");
        trie.insert("cat");

        assert_eq!(sorted(trie.completions("c")), vec!["cat", "cd"]);
        assert!(trie.completions("z").is_empty());
        assert_eq!(trie.completions("cat"), vec!["cat"]);
    }

    #[test]
    fn test_delete_prunes_only_the_word() {
        let mut trie = CompletionIndex::new();
        trie.insert("cd");
        trie.insert("cat");

        assert!(trie.delete("cd"));
        assert_eq!(trie.completions("c"), vec!["cat"]);
        assert!(!trie.contains("cd"));
        assert!(trie.contains("cat"));
        assert!(!trie.delete("cd"));
    }

    #[test]
    fn test_delete_keeps_longer_words_sharing_the_path() {
        let mut trie = CompletionIndex::new();
        trie.insert("ls");
        trie.insert("lsblk");

        assert!(trie.delete("ls"));
        assert!(!trie.contains("ls"));
        assert_eq!(trie.completions("l"), vec!["lsblk"]);
    }

    #[test]
    fn test_contains_requires_end_marker() {
        let mut trie = CompletionIndex::new();
        trie.insert("echo");
        assert!(trie.contains("echo"));
        assert!(!trie.contains("ech"));
        assert!(!trie.contains("echoes"));
    }

    #[test]
    fn test_longest_common_prefix() {
        assert_eq!(longest_common_prefix(&["xyz_foo", "xyz_foo_bar", "xyz_fob"]), "xyz_fo");
        assert_eq!(longest_common_prefix(&["cat"]), "cat");
        assert_eq!(longest_common_prefix(&["abc", "ab"]), "ab");
        assert_eq!(longest_common_prefix::<&str>(&[]), "");
    }

    #[test]
    #[cfg(unix)]
    fn test_populate_indexes_path_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("my_tool"), "")?;
        fs::create_dir(dir.path().join("my_subdir"))?;

        let mut trie = CompletionIndex::new();
        trie.populate(["echo", "exit"], dir.path().as_os_str());

        assert!(trie.contains("my_tool"));
        assert!(!trie.contains("my_subdir"));
        assert_eq!(sorted(trie.completions("e")), vec!["echo", "exit"]);
        Ok(())
    }
}
