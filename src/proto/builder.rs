//! Schema builder
//!
//! Folds the raw per-file syntax records of one package into the public
//! `Package` model: underscore names for nested messages, highest field
//! ordinals, services, and the HTTP rules derived from `google.api.http`
//! annotations (including recursive `additional_bindings`).

use once_cell::sync::Lazy;
use regex::Regex;

use super::package::{File, HttpRule, Message, Package, RpcFunc, Service};
use super::parser::{RawLiteral, RawMessage, RawPackage, RawRpc};

const OPTION_GO_PACKAGE: &str = "go_package";
const OPTION_HTTP: &str = "google.api.http";

static URL_PARAM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(.+?)\}").unwrap());

/// Build a high-level `Package` from a raw package grouping
pub(crate) fn build(raw: &RawPackage) -> Package {
    let mut pkg = Package {
        name: raw.name.clone(),
        path: raw.dir.clone(),
        files: build_files(raw),
        messages: build_messages(raw),
        ..Default::default()
    };
    pkg.services = build_services(raw);

    for parsed in &raw.files {
        if let Some((_, value)) = parsed
            .file
            .options
            .iter()
            .find(|(name, _)| name == OPTION_GO_PACKAGE)
        {
            pkg.go_import_name = value.clone();
            break;
        }
    }

    pkg
}

fn build_files(raw: &RawPackage) -> Vec<File> {
    raw.files
        .iter()
        .map(|parsed| File {
            path: parsed.path.clone(),
            dependencies: parsed.file.imports.clone(),
        })
        .collect()
}

/// Flatten every message of the package, nested ones included.
///
/// A message defined inside another message is named by the underscore-joined
/// chain of its enclosing messages, outer to inner: `C` in `B` in `A` becomes
/// `A_B_C`. The chain stops at the file level, which is the first non-message
/// ancestor.
fn build_messages(raw: &RawPackage) -> Vec<Message> {
    let mut messages = Vec::new();

    for parsed in &raw.files {
        for msg in &parsed.file.messages {
            collect_messages(msg, "", &parsed.path, &mut messages);
        }
    }

    messages
}

fn collect_messages(
    msg: &RawMessage,
    prefix: &str,
    path: &std::path::Path,
    out: &mut Vec<Message>,
) {
    let name = if prefix.is_empty() {
        msg.name.clone()
    } else {
        format!("{}_{}", prefix, msg.name)
    };

    out.push(Message {
        name: name.clone(),
        path: path.to_path_buf(),
        highest_field_number: msg.highest_field_number(),
    });

    for nested in &msg.nested {
        collect_messages(nested, &name, path, out);
    }
}

fn build_services(raw: &RawPackage) -> Vec<Service> {
    raw.files
        .iter()
        .flat_map(|parsed| parsed.file.services.iter())
        .map(|svc| Service {
            name: svc.name.clone(),
            rpc_funcs: svc.rpcs.iter().filter_map(|rpc| build_rpc(raw, rpc)).collect(),
        })
        .collect()
}

/// Build one RPC function. An RPC whose request type cannot be resolved in
/// the package is skipped: forward-declared or partially written schemas are
/// expected, and the HTTP derivation needs the request message's fields.
fn build_rpc(raw: &RawPackage, rpc: &RawRpc) -> Option<RpcFunc> {
    let request = find_raw_message(raw, &rpc.request_type)?;

    let mut http_rules = Vec::new();
    for option in &rpc.options {
        if !option.name.contains(OPTION_HTTP) {
            continue;
        }
        derive_http_rules(request, &option.value, &mut http_rules);
    }

    Some(RpcFunc {
        name: rpc.name.clone(),
        request_type: rpc.request_type.clone(),
        returns_type: rpc.returns_type.clone(),
        http_rules,
    })
}

/// Look up a raw message by its declared (unprefixed) name, nested
/// declarations included
fn find_raw_message<'a>(raw: &'a RawPackage, name: &str) -> Option<&'a RawMessage> {
    fn find_in<'a>(msgs: &'a [RawMessage], name: &str) -> Option<&'a RawMessage> {
        for msg in msgs {
            if msg.name == name {
                return Some(msg);
            }
            if let Some(found) = find_in(&msg.nested, name) {
                return Some(found);
            }
        }
        None
    }

    raw.files
        .iter()
        .find_map(|parsed| find_in(&parsed.file.messages, name))
}

/// Derive HTTP rules from one `google.api.http` constant, recursing into
/// `additional_bindings`: nesting of depth N yields N+1 rules.
fn derive_http_rules(request: &RawMessage, constant: &RawLiteral, out: &mut Vec<HttpRule>) {
    // the endpoint template: a bare string constant, or the value of the
    // first HTTP method key in the annotation map
    let mut endpoint = constant.source.as_str();
    if endpoint.is_empty() {
        for method in ["get", "post", "put", "patch", "delete"] {
            if let Some(value) = constant.get(method) {
                endpoint = &value.source;
                break;
            }
        }
    }

    let params: Vec<String> = URL_PARAM_RE
        .captures_iter(endpoint)
        .map(|c| c[1].to_string())
        .collect();

    let message_fields_count = request.field_count();
    let params_count = params.len();

    let body_fields_count = match constant.get("body") {
        // every field not consumed by the path goes to the body
        Some(body) if body.source == "*" => message_fields_count.saturating_sub(params_count),
        // body fields are grouped under a single top-level field
        Some(body) if !body.source.is_empty() => 1,
        _ => 0,
    };

    let query_params_count = message_fields_count
        .saturating_sub(params_count)
        .saturating_sub(body_fields_count);

    out.push(HttpRule {
        params,
        has_query: query_params_count > 0,
        has_body: body_fields_count > 0,
    });

    if let Some(nested) = constant.get("additional_bindings") {
        derive_http_rules(request, nested, out);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::parser::{parse_file_content, RawParsedFile};
    use std::path::PathBuf;

    fn raw_package(src: &str) -> RawPackage {
        let file = parse_file_content(src).unwrap();
        RawPackage {
            name: file.package.clone(),
            dir: PathBuf::from("proto/test"),
            files: vec![RawParsedFile {
                path: PathBuf::from("proto/test/test.proto"),
                file,
            }],
        }
    }

    fn rules_for(option_body: &str) -> Vec<HttpRule> {
        let src = format!(
            r#"
package test.v1;
message QueryItemRequest {{
  string id = 1;
  string owner = 2;
  Payload payload = 3;
}}
message QueryItemResponse {{}}
service Query {{
  rpc Item(QueryItemRequest) returns (QueryItemResponse) {{
    option (google.api.http) = {option_body};
  }}
}}
"#
        );
        let pkg = build(&raw_package(&src));
        pkg.services[0].rpc_funcs[0].http_rules.clone()
    }

    #[test]
    fn nested_message_names_use_underscores() {
        let pkg = build(&raw_package(
            r#"
package test.v1;
message A {
  message B {
    message C { string x = 1; }
  }
}
message D { string y = 2; }
"#,
        ));

        let names: Vec<_> = pkg.messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A_B", "A_B_C", "D"]);
    }

    #[test]
    fn highest_field_number_tracks_normal_fields() {
        let pkg = build(&raw_package(
            r#"
package test.v1;
message M {
  string a = 1;
  repeated string b = 9;
  map<string, string> c = 12;
}
"#,
        ));
        // map fields do not participate in the ordinal scan
        assert_eq!(pkg.message_by_name("M").unwrap().highest_field_number, 9);
    }

    #[test]
    fn path_params_only_yields_query() {
        let rules = rules_for(r#"{ get: "/v1/items/{id}" }"#);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].params, vec!["id"]);
        // fieldCount=3, params=1, body=0 => 2 query fields
        assert!(rules[0].has_query);
        assert!(!rules[0].has_body);
    }

    #[test]
    fn star_body_consumes_remaining_fields() {
        let rules = rules_for(r#"{ post: "/v1/items/{id}" body: "*" }"#);
        assert_eq!(rules[0].params, vec!["id"]);
        assert!(!rules[0].has_query);
        assert!(rules[0].has_body);
    }

    #[test]
    fn named_body_leaves_query_fields() {
        let rules = rules_for(r#"{ post: "/v1/items/{id}" body: "payload" }"#);
        // fieldCount=3, params=1, body=1 => 1 query field
        assert!(rules[0].has_query);
        assert!(rules[0].has_body);
    }

    #[test]
    fn additional_bindings_recurse() {
        let rules = rules_for(
            r#"{
  get: "/v1/items/{id}"
  additional_bindings {
    get: "/v1/items/by-owner/{owner}"
    additional_bindings { post: "/v1/items" body: "*" }
  }
}"#,
        );
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].params, vec!["id"]);
        assert_eq!(rules[1].params, vec!["owner"]);
        assert!(rules[2].params.is_empty());
        assert!(rules[2].has_body);
    }

    #[test]
    fn rpc_without_resolvable_request_is_skipped() {
        let pkg = build(&raw_package(
            r#"
package test.v1;
message Known {}
service Query {
  rpc Ghost(UnknownRequest) returns (Known);
  rpc Real(Known) returns (Known);
}
"#,
        ));

        let funcs = &pkg.services[0].rpc_funcs;
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "Real");
    }

    #[test]
    fn rpc_without_annotation_has_no_rules() {
        let pkg = build(&raw_package(
            r#"
package test.v1;
message Ping {}
service Svc { rpc Do(Ping) returns (Ping); }
"#,
        ));
        assert!(pkg.services[0].rpc_funcs[0].http_rules.is_empty());
    }

    #[test]
    fn go_import_name_comes_from_file_option() {
        let pkg = build(&raw_package(
            r#"
package test.v1;
option go_package = "github.com/org/app/x/test/types;testtypes";
"#,
        ));
        assert_eq!(pkg.go_import_path(), "github.com/org/app/x/test/types");
    }
}
