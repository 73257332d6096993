//! Canonical text form of queries.
//!
//! The printed form is used for logging and, hashed, as the dedup key of
//! in-flight fetches. Operation names are left out so two callers asking for
//! the same subtree under different names share one fetch.

use std::fmt::Write as _;

use super::node::{CallArg, QueryNode, RootQuery};

/// Prints a root query as `call(arg){child,...}`.
#[must_use]
pub fn print_root(root: &RootQuery) -> String {
    let mut out = String::new();
    out.push_str(&root.call_name);
    match &root.arg {
        None => {}
        Some(CallArg::Single(value)) => {
            let _ = write!(out, "({})", quote(value));
        }
        Some(CallArg::List(values)) => {
            let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
            let _ = write!(out, "([{}])", quoted.join(","));
        }
    }
    print_children(&root.children, &mut out);
    out
}

/// Stable hex digest of `print_root`.
#[must_use]
pub fn signature(root: &RootQuery) -> String {
    blake3::hash(print_root(root).as_bytes()).to_hex().to_string()
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn print_children(children: &[QueryNode], out: &mut String) {
    if children.is_empty() {
        return;
    }
    out.push('{');
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        print_node(child, out);
    }
    out.push('}');
}

fn print_node(node: &QueryNode, out: &mut String) {
    match node {
        QueryNode::Root(root) => out.push_str(&print_root(root)),
        QueryNode::Field(field) => {
            if let Some(alias) = &field.alias {
                let _ = write!(out, "{alias}:");
            }
            out.push_str(&field.storage_key());
            print_children(&field.children, out);
        }
        QueryNode::Fragment(fragment) => {
            let _ = write!(out, "...{}", fragment.name);
            print_children(&fragment.children, out);
        }
    }
}
