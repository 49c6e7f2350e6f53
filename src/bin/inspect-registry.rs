//! CLI tool to load a schema tree or bundle and summarize what the registry sees
//!
//! Usage:
//!   cargo run --bin inspect-registry -- ./knowledge_base/schemas
//!   cargo run --bin inspect-registry -- ./schemas.tar.gz shopify,amazon

use std::env;
use std::path::{Path, PathBuf};

use commerce_query_gateway::registry::{DocumentSource, RegistrySnapshot};
use serde_json::json;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <schema-dir|schema-archive.tar.gz> [platforms]", args[0]);
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  {} ./knowledge_base/schemas", args[0]);
        eprintln!("  {} ./schemas.tar.gz shopify,amazon,ebay", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    if !path.exists() {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }

    let platforms: Vec<String> = args
        .get(2)
        .map(String::as_str)
        .unwrap_or("shopify,amazon,ebay")
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    let source = if path.is_dir() {
        DocumentSource::Directory(path.to_path_buf())
    } else {
        DocumentSource::Archive(PathBuf::from(path))
    };

    let contents = match source.read_documents(&platforms) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error reading schema documents: {}", e);
            std::process::exit(1);
        }
    };

    let snapshot = RegistrySnapshot::build(contents);
    let summary = summarize(&snapshot);

    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error rendering summary: {}", e);
            std::process::exit(1);
        }
    }

    // Same rule a live reload applies before swapping a snapshot in
    if let Err(e) = snapshot.check_minimum_structure() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }
}

fn summarize(snapshot: &RegistrySnapshot) -> serde_json::Value {
    let tables: Vec<_> = snapshot
        .tables()
        .map(|t| {
            json!({
                "table": t.table_name,
                "platform": t.platform,
                "columns": t.columns.len(),
                "date_column": t.date_column().map(|c| c.name.clone()),
                "query_types": t.query_types,
            })
        })
        .collect();

    let edges: Vec<_> = snapshot
        .relationships()
        .edges()
        .map(|(from, to, edge)| {
            json!({
                "from": from,
                "to": to,
                "type": edge.relationship_type,
                "keys": edge.keys,
                "dangling": !snapshot.table_exists(to),
            })
        })
        .collect();

    let templates: Vec<_> = snapshot
        .query_templates()
        .map(|t| {
            json!({
                "name": t.name,
                "table": t.table,
                "type": t.query_type,
                "metrics": t.metrics,
            })
        })
        .collect();

    let skipped: Vec<_> = snapshot
        .skipped()
        .iter()
        .map(|s| json!({ "origin": s.origin, "reason": s.reason }))
        .collect();

    json!({
        "fingerprint": snapshot.fingerprint(),
        "platforms": snapshot.get_all_platforms(),
        "tables": tables,
        "edges": edges,
        "glossary_terms": snapshot.glossary_len(),
        "metrics": snapshot.metric_definitions().count(),
        "templates": templates,
        "skipped": skipped,
    })
}
