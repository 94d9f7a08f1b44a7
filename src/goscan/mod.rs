//! Go source scanning
//!
//! Duck-typed interface matching over Go source trees using tree-sitter.
//! A type "implements" an interface here when it declares every required
//! method name; receiver value vs. pointer is irrelevant and signatures are
//! never inspected. This is intentionally unsound: the targets are large,
//! generated, multi-file codebases where full type-checking is unnecessary
//! for existence detection and too expensive to run per scaffolding step.

pub mod imports;
pub mod root;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use streaming_iterator::StreamingIterator;
use tracing::trace;
use tree_sitter::{Node, Parser, Query, QueryCursor, Tree};
use walkdir::WalkDir;

use crate::error::{Result, SchemascanError};

const GO_FILE_EXTENSION: &str = "go";

/// Receiver and name are enough; parameters and results never matter
static METHOD_QUERY: Lazy<Query> = Lazy::new(|| {
    Query::new(
        &tree_sitter_go::LANGUAGE.into(),
        "(method_declaration receiver: (parameter_list) @recv name: (field_identifier) @name)",
    )
    .expect("method query")
});

/// Per-type tracking of which required method names have been seen
type Implementation = HashMap<String, bool>;

fn new_implementation(required: &[&str]) -> Implementation {
    required.iter().map(|m| (m.to_string(), false)).collect()
}

fn check_implementation(impl_map: &Implementation) -> bool {
    impl_map.values().all(|found| *found)
}

/// Parse one Go file into a syntax tree
pub(crate) fn parse_go_source(src: &str, path: &Path) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| SchemascanError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    parser.parse(src, None).ok_or_else(|| SchemascanError::Parse {
        path: path.to_path_buf(),
        message: "parser returned no tree".to_string(),
    })
}

/// Find the names of declared types whose method set covers `required`,
/// scanning the Go files directly inside `dir` (non-recursive).
///
/// A directory with no Go files yields an empty result, never an error; a
/// file that fails to parse aborts the whole call.
pub fn find_implementation(dir: &Path, required: &[&str]) -> Result<Vec<String>> {
    let mut sources = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_go_file(&path) {
            sources.push(path);
        }
    }
    sources.sort();

    find_implementation_in_files(&sources, required)
}

/// Like `find_implementation`, but walks every subdirectory of `dir` and
/// unions the per-directory results. Useful when the implementation may
/// live a few levels below the registered import path.
pub fn deep_find_implementation(dir: &Path, required: &[&str]) -> Result<Vec<String>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        found.extend(find_implementation(entry.path(), required)?);
    }

    Ok(found)
}

/// Run the matcher over an explicit file list (cross-file method sets merge)
pub(crate) fn find_implementation_in_files(
    files: &[PathBuf],
    required: &[&str],
) -> Result<Vec<String>> {
    let mut implementations: HashMap<String, Implementation> = HashMap::new();

    for path in files {
        let src = fs::read_to_string(path)?;
        let tree = parse_go_source(&src, path)?;
        collect_methods(&tree, src.as_bytes(), required, &mut implementations);
    }

    let mut found: Vec<String> = implementations
        .into_iter()
        .filter(|(_, impl_map)| check_implementation(impl_map))
        .map(|(name, _)| name)
        .collect();
    found.sort();

    trace!(?found, "method-set match");
    Ok(found)
}

/// Map every method declaration in the tree onto its receiver's base type
fn collect_methods(
    tree: &Tree,
    source: &[u8],
    required: &[&str],
    implementations: &mut HashMap<String, Implementation>,
) {
    let query = &*METHOD_QUERY;
    let recv_idx = query.capture_index_for_name("recv").expect("recv capture");
    let name_idx = query.capture_index_for_name("name").expect("name capture");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let mut method_name: Option<&str> = None;
        let mut type_name: Option<String> = None;

        for capture in m.captures {
            if capture.index == name_idx {
                method_name = capture.node.utf8_text(source).ok();
            } else if capture.index == recv_idx {
                type_name = receiver_base_type(capture.node, source);
            }
        }

        let (Some(method_name), Some(type_name)) = (method_name, type_name) else {
            continue;
        };

        let impl_map = implementations
            .entry(type_name)
            .or_insert_with(|| new_implementation(required));
        if let Some(seen) = impl_map.get_mut(method_name) {
            *seen = true;
        }
    }
}

/// The receiver's base type name: `(s *Server)` and `(s Server)` both give
/// `Server`. The first `type_identifier` below the receiver list is the base
/// type for plain, pointer and generic receivers alike.
fn receiver_base_type(recv: Node, source: &[u8]) -> Option<String> {
    let mut cursor = recv.walk();
    let mut stack = vec![recv];

    while let Some(node) = stack.pop() {
        if node.kind() == "type_identifier" {
            return node.utf8_text(source).ok().map(|s| s.to_string());
        }
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    None
}

fn is_go_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext == GO_FILE_EXTENSION)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MSG_METHODS: &[&str] = &["Route", "Type", "ValidateBasic"];

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let found = find_implementation(tmp.path(), MSG_METHODS).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn pointer_and_value_receivers_both_count() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "msg.go",
            r#"
package types

func (m MsgSend) Route() string { return "bank" }
func (m *MsgSend) Type() string { return "send" }
func (m MsgSend) ValidateBasic() error { return nil }
"#,
        );

        let found = find_implementation(tmp.path(), MSG_METHODS).unwrap();
        assert_eq!(found, vec!["MsgSend"]);
    }

    #[test]
    fn method_set_merges_across_files() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "a.go",
            "package types\nfunc (m MsgGrant) Route() string { return \"\" }\nfunc (m MsgGrant) Type() string { return \"\" }\n",
        );
        write(
            tmp.path(),
            "b.go",
            "package types\nfunc (m *MsgGrant) ValidateBasic() error { return nil }\n",
        );

        let found = find_implementation(tmp.path(), MSG_METHODS).unwrap();
        assert_eq!(found, vec!["MsgGrant"]);
    }

    #[test]
    fn missing_one_method_fails_the_match() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "partial.go",
            "package types\nfunc (m MsgHalf) Route() string { return \"\" }\nfunc (m MsgHalf) Type() string { return \"\" }\n",
        );

        let found = find_implementation(tmp.path(), MSG_METHODS).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn superset_of_required_methods_matches() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "extra.go",
            r#"
package types

func (m MsgBig) Route() string { return "" }
func (m MsgBig) Type() string { return "" }
func (m MsgBig) ValidateBasic() error { return nil }
func (m MsgBig) GetSigners() []string { return nil }
func (m MsgBig) String() string { return "" }
"#,
        );

        let found = find_implementation(tmp.path(), MSG_METHODS).unwrap();
        assert_eq!(found, vec!["MsgBig"]);
    }

    #[test]
    fn scan_is_not_recursive_but_deep_scan_is() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "keeper/msg_server.go",
            "package keeper\nfunc (k Keeper) Route() string { return \"\" }\nfunc (k Keeper) Type() string { return \"\" }\nfunc (k Keeper) ValidateBasic() error { return nil }\n",
        );

        assert!(find_implementation(tmp.path(), MSG_METHODS).unwrap().is_empty());
        assert_eq!(
            deep_find_implementation(tmp.path(), MSG_METHODS).unwrap(),
            vec!["Keeper"]
        );
    }

    #[test]
    fn unparseable_file_aborts_with_path() {
        let tmp = TempDir::new().unwrap();
        // tree-sitter recovers from almost anything, so force an IO-level
        // failure instead: a directory posing as a .go file
        fs::create_dir(tmp.path().join("broken.go")).unwrap();

        let err = find_implementation_in_files(
            &[tmp.path().join("broken.go")],
            MSG_METHODS,
        );
        assert!(err.is_err());
    }
}
