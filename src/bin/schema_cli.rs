// schema-cli: inspect schemas without the GUI
// Build with: cargo build --features cli --bin schema-cli

use clap::{Arg, ArgAction, ArgMatches, Command};
use schema_loom::api::client::SchemaClient;
use schema_loom::persistence::settings::AppSettings;
use schema_loom::scene::manager::TableInfo;
use schema_loom::schema_utils::schema::SchemaDocument;
use schema_loom::schema_utils::sql_import;

fn endpoint_arg() -> Arg {
    Arg::new("endpoint")
        .long("endpoint")
        .value_name("URL")
        .help("Schema endpoint (defaults to the one in the app settings)")
}

fn api_key_arg() -> Arg {
    Arg::new("api_key").long("api-key").value_name("KEY").help("API key to send as X-API-Key header")
}

fn fetch(sub: &ArgMatches) -> SchemaDocument {
    let settings = AppSettings::load().unwrap_or_default();
    let endpoint = sub
        .get_one::<String>("endpoint")
        .cloned()
        .unwrap_or(settings.schema_endpoint);
    let api_key = sub.get_one::<String>("api_key").cloned().or(settings.api_key);
    let client = match SchemaClient::new(&endpoint, api_key) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    match client.fetch_schema() {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!(
                "Failed to fetch schema from {}: {}\nHint: start Schema-Loom with the API enabled, or pass --endpoint.",
                endpoint, e
            );
            std::process::exit(2);
        }
    }
}

fn import(path: &str) -> SchemaDocument {
    match sql_import::import_sql_file(std::path::Path::new(path)) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Failed to import {}: {:#}", path, e);
            std::process::exit(1);
        }
    }
}

fn print_json(doc: &SchemaDocument, compact: bool) {
    let out = if compact { serde_json::to_string(doc) } else { serde_json::to_string_pretty(doc) };
    match out {
        Ok(s) => println!("{}", s),
        Err(e) => {
            eprintln!("serialization error: {}", e);
            std::process::exit(3);
        }
    }
}

fn print_summary(doc: &SchemaDocument) {
    println!("{} tables, {} relationships (revision {})", doc.table_count(), doc.relationship_count(), doc.revision);
    for (name, table) in &doc.tables {
        let pks: Vec<&str> = table.fields.iter().filter(|f| f.is_primary).map(|f| f.name.as_str()).collect();
        println!("  {:<24} {:>3} fields  pk: {}", name, table.fields.len(), if pks.is_empty() { "-".to_string() } else { pks.join(", ") });
    }
    for rel in &doc.relationships {
        println!("  {}.{} -> {}.{}", rel.from_table, rel.from_field, rel.to_table, rel.to_field);
    }
}

fn print_info(doc: &SchemaDocument, table: &str) {
    let Some(info) = TableInfo::describe(doc, table) else {
        eprintln!("no table named '{}' (known: {})", table, doc.table_names().collect::<Vec<_>>().join(", "));
        std::process::exit(4);
    };
    println!("{}", info.name);
    for f in &info.fields {
        let pk = if f.is_primary { " (PK)" } else { "" };
        println!("  {:<24} {}{}", f.name, f.ty, pk);
    }
    if !info.relationships.is_empty() {
        println!("Relationships");
        for line in &info.relationships {
            println!("  {}", line);
        }
    }
}

fn main() {
    env_logger::init();
    let matches = Command::new("schema-cli")
        .about("Schema-Loom CLI: import SQL dumps and inspect a served schema")
        .subcommand_required(true)
        .subcommand(
            Command::new("import")
                .about("Convert a SQL dump into a schema document (JSON on stdout)")
                .arg(Arg::new("file").required(true).value_name("FILE.sql"))
                .arg(Arg::new("compact").long("compact").action(ArgAction::SetTrue).help("Single-line JSON")),
        )
        .subcommand(
            Command::new("fetch")
                .about("Fetch the schema document from a running endpoint")
                .arg(endpoint_arg())
                .arg(api_key_arg())
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue).help("Print the whole document as JSON")),
        )
        .subcommand(
            Command::new("info")
                .about("Show one table's fields and relationships")
                .arg(Arg::new("table").required(true))
                .arg(endpoint_arg().conflicts_with("sql"))
                .arg(api_key_arg())
                .arg(Arg::new("sql").long("sql").value_name("FILE.sql").help("Read the schema from a SQL dump instead")),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("import", sub)) => {
            let Some(file) = sub.get_one::<String>("file") else { return };
            let doc = import(file);
            print_json(&doc, sub.get_flag("compact"));
        }
        Some(("fetch", sub)) => {
            let doc = fetch(sub);
            if sub.get_flag("json") {
                print_json(&doc, false);
            } else {
                print_summary(&doc);
            }
        }
        Some(("info", sub)) => {
            let Some(table) = sub.get_one::<String>("table") else { return };
            let doc = match sub.get_one::<String>("sql") {
                Some(path) => import(path),
                None => fetch(sub),
            };
            print_info(&doc, table);
        }
        _ => {}
    }
}
