//! Key and value completion for request documents.

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind};

const TOP_LEVEL_KEYS: &[(&str, &str)] = &[
    ("yapi", "Document version (v1)"),
    ("url", "Target URL; the scheme selects the transport"),
    ("path", "Path appended to the URL"),
    ("method", "HTTP method"),
    ("content_type", "Content-Type header override"),
    ("headers", "Request headers"),
    ("body", "Request body (string or object)"),
    ("json", "Raw JSON body"),
    ("form", "Form fields"),
    ("query", "Query parameters"),
    ("graphql", "GraphQL query or mutation"),
    ("variables", "GraphQL variables"),
    ("service", "gRPC service name"),
    ("rpc", "gRPC method name"),
    ("proto", "Proto file"),
    ("proto_path", "Proto import path"),
    ("plaintext", "gRPC without TLS"),
    ("data", "TCP payload"),
    ("encoding", "TCP payload encoding"),
    ("read_timeout", "TCP read timeout in seconds"),
    ("idle_timeout", "TCP idle timeout in milliseconds"),
    ("close_after_send", "Close the TCP write side after sending"),
    ("jq_filter", "Filter applied to the response body"),
    ("insecure", "Skip TLS certificate verification"),
    ("timeout", "Request timeout (e.g. 5s)"),
    ("output_file", "Write the response body to a file"),
    ("expect", "Status and assertions to check"),
    ("chain", "Sequence of dependent requests"),
    ("delay", "Wait before sending (e.g. 500ms)"),
];

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];
const ENCODINGS: &[&str] = &["text", "hex", "base64"];
const CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];
const BOOLEANS: &[&str] = &["true", "false"];

/// Completions at a 0-based `line`/`character` in `text`.
pub fn completions(text: &str, line: usize, character: usize) -> Vec<CompletionItem> {
    let current = text.lines().nth(line).unwrap_or("");
    let before: String = current.chars().take(character).collect();

    if let Some((key, _)) = before.split_once(':') {
        return value_completions(key.trim());
    }
    if before.starts_with([' ', '\t', '-']) {
        return Vec::new();
    }

    let used = used_top_level_keys(text);
    TOP_LEVEL_KEYS
        .iter()
        .filter(|(key, _)| !used.contains(key))
        .map(|(key, doc)| CompletionItem {
            label: key.to_string(),
            kind: Some(CompletionItemKind::PROPERTY),
            detail: Some(doc.to_string()),
            insert_text: Some(format!("{key}: ")),
            ..Default::default()
        })
        .collect()
}

fn value_completions(key: &str) -> Vec<CompletionItem> {
    let values = match key {
        "method" => METHODS,
        "encoding" => ENCODINGS,
        "content_type" => CONTENT_TYPES,
        "insecure" | "plaintext" | "close_after_send" => BOOLEANS,
        _ => return Vec::new(),
    };
    values
        .iter()
        .map(|v| CompletionItem {
            label: v.to_string(),
            kind: Some(CompletionItemKind::VALUE),
            ..Default::default()
        })
        .collect()
}

fn used_top_level_keys(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|l| !l.starts_with([' ', '\t', '-', '#']))
        .filter_map(|l| l.split_once(':').map(|(k, _)| k.trim()))
        .collect()
}
