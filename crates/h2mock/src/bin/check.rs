//! h2mock document checker
//!
//! Validates administrative documents (matching, provisions, global
//! variables, client endpoints and client provisions) or whole bootstrap
//! configuration files before they are loaded into the engine.
//!
//! Usage:
//!   h2mock-check <directory_or_file> [OPTIONS]
//!
//! Checks:
//! - JSON Schema conformance against the embedded schemas
//! - Content rules (regexes, query strings, transformation vocabulary)
//! - Duplicate provision keys inside a file (later ones win at load time)
//! - Client provisions pointing at endpoints not defined in the same file

use clap::Parser;
use h2mock::client::{ClientProvision, EndpointRegistry};
use h2mock::config::Config;
use h2mock::matching::MatchingConfig;
use h2mock::provision::ProvisionRule;
use h2mock::schema::SchemaKind;
use h2mock::vars::GlobalVariables;
use h2mock::LoadError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "h2mock-check")]
#[command(author, version, about = "Validate h2mock documents and configuration files")]
struct Args {
    /// Document/config file or a directory of them
    #[arg(required = true)]
    path: PathBuf,

    /// Force the document kind instead of detecting it
    /// (server_matching, server_provision, global_variables, client_endpoint,
    /// client_provision, config)
    #[arg(short, long)]
    kind: Option<String>,

    /// Output format: text (default), json
    #[arg(short, long, default_value = "text")]
    output: String,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Strict mode - treat warnings as errors
    #[arg(short, long)]
    strict: bool,

    /// Print an embedded schema and exit
    #[arg(long, value_name = "NAME")]
    print_schema: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn color(&self) -> &'static str {
        match self {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone)]
struct Issue {
    severity: Severity,
    code: &'static str,
    message: String,
    file: PathBuf,
    location: Option<String>,
}

#[derive(Debug, Default)]
struct CheckResult {
    issues: Vec<Issue>,
    files_checked: usize,
    documents_checked: usize,
    errors: usize,
    warnings: usize,
}

impl CheckResult {
    fn add(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.issues.push(issue);
    }
}

/// What a file holds.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FileKind {
    Document(SchemaKind),
    Config,
}

/// Issue sink bound to one file.
struct FileReport<'a> {
    file: &'a Path,
    result: &'a mut CheckResult,
}

impl FileReport<'_> {
    fn issue(&mut self, severity: Severity, code: &'static str, location: Option<String>, message: String) {
        self.result.add(Issue {
            severity,
            code,
            message,
            file: self.file.to_path_buf(),
            location,
        });
    }

    fn load_error(&mut self, location: Option<String>, err: &LoadError) {
        let code = match err {
            LoadError::BadSchema(_) => "E101",
            LoadError::BadContent(_) => "E102",
        };
        self.issue(Severity::Error, code, location, err.to_string());
    }
}

fn main() {
    let args = Args::parse();

    if let Some(name) = &args.print_schema {
        match SchemaKind::from_name(name) {
            Some(kind) => {
                println!("{}", kind.source());
                std::process::exit(0);
            }
            None => {
                let known: Vec<_> = SchemaKind::ALL.iter().map(|k| k.name()).collect();
                eprintln!("{RED}Unknown schema '{name}'.{RESET} Known: {}", known.join(", "));
                std::process::exit(2);
            }
        }
    }

    let forced = match args.kind.as_deref() {
        None => None,
        Some("config") => Some(FileKind::Config),
        Some(name) => match SchemaKind::from_name(name) {
            Some(kind) => Some(FileKind::Document(kind)),
            None => {
                eprintln!("{RED}Unknown document kind '{name}'{RESET}");
                std::process::exit(2);
            }
        },
    };

    println!("{BOLD}{CYAN}h2mock document checker{RESET}");
    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");

    let files = collect_files(&args.path);
    if files.is_empty() {
        println!("{YELLOW}Warning:{RESET} No JSON/YAML files found in {:?}", args.path);
        std::process::exit(0);
    }
    println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", args.path.display());
    println!("{DIM}Found:{RESET}    {BOLD}{}{RESET} file(s)\n", files.len());

    let mut result = CheckResult {
        files_checked: files.len(),
        ..CheckResult::default()
    };

    for file in &files {
        let mut report = FileReport {
            file,
            result: &mut result,
        };
        let value = match load_file(file) {
            Ok(value) => value,
            Err(e) => {
                report.issue(Severity::Error, "E001", None, format!("Failed to parse: {e}"));
                continue;
            }
        };
        let kind = match forced.or_else(|| detect_kind(&value)) {
            Some(kind) => kind,
            None => {
                report.issue(
                    Severity::Error,
                    "E002",
                    None,
                    "Could not tell what kind of document this is (use --kind)".to_string(),
                );
                continue;
            }
        };
        match kind {
            FileKind::Config => check_config(&value, &mut report),
            FileKind::Document(kind) => {
                check_document(kind, &value, &MatchingConfig::default(), None, &mut report)
            }
        }
    }

    if args.output == "json" {
        print_results_json(&result);
    } else {
        print_results(&result, &args);
    }

    let failed = result.errors > 0 || (args.strict && result.warnings > 0);
    std::process::exit(if failed { 1 } else { 0 });
}

fn collect_files(path: &Path) -> Vec<PathBuf> {
    let wanted = |p: &Path| {
        p.extension()
            .is_some_and(|ext| ext == "json" || ext == "yaml" || ext == "yml")
    };
    let mut files = Vec::new();
    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                let entry_path = entry.path();
                if entry_path.is_file() && wanted(&entry_path) {
                    files.push(entry_path);
                }
            }
        }
    }
    files.sort();
    files
}

fn load_file(path: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    }
}

fn items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

fn detect_kind(value: &Value) -> Option<FileKind> {
    const CONFIG_KEYS: [&str; 6] = [
        "engine",
        "matching",
        "globals",
        "provisions",
        "clientEndpoints",
        "clientProvisions",
    ];
    if let Some(object) = value.as_object() {
        if object.contains_key("algorithm") {
            return Some(FileKind::Document(SchemaKind::ServerMatching));
        }
        if !object.is_empty() && object.keys().all(|k| CONFIG_KEYS.contains(&k.as_str())) {
            return Some(FileKind::Config);
        }
    }
    let first = items(value).into_iter().next()?.as_object()?;
    let has = |key: &str| first.contains_key(key);
    let kind = if has("endpoint") && has("id") {
        SchemaKind::ClientProvision
    } else if has("host") && has("port") {
        SchemaKind::ClientEndpoint
    } else if has("requestMethod") {
        SchemaKind::ServerProvision
    } else if value.is_object() && first.values().all(Value::is_string) {
        SchemaKind::GlobalVariables
    } else {
        return None;
    };
    Some(FileKind::Document(kind))
}

/// Check one document of `kind`. `endpoints` lists the endpoint ids known in
/// the same file, when there is such a context.
fn check_document(
    kind: SchemaKind,
    value: &Value,
    matching: &MatchingConfig,
    endpoints: Option<&HashSet<String>>,
    report: &mut FileReport<'_>,
) {
    report.result.documents_checked += 1;
    let violations = kind.violations(value);
    if !violations.is_empty() {
        for violation in violations {
            report.issue(
                Severity::Error,
                "E101",
                Some(kind.name().to_string()),
                format!("schema violation: {violation}"),
            );
        }
        return;
    }

    match kind {
        SchemaKind::ServerMatching => {
            if let Err(e) = MatchingConfig::from_json(value) {
                report.load_error(Some("matching".to_string()), &e);
            }
        }
        SchemaKind::GlobalVariables => {
            if let Err(e) = GlobalVariables::new().load(value) {
                report.load_error(Some("globals".to_string()), &e);
            }
        }
        SchemaKind::ClientEndpoint => {
            if let Err(e) = EndpointRegistry::new().load(value) {
                report.load_error(Some("clientEndpoints".to_string()), &e);
            }
        }
        SchemaKind::ServerProvision => {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for (i, item) in items(value).into_iter().enumerate() {
                let location = Some(format!("provision[{i}]"));
                match ProvisionRule::from_json(item, matching) {
                    Ok(rule) => {
                        if let Some(first) = seen.insert(rule.key().to_string(), i) {
                            report.issue(
                                Severity::Warning,
                                "W201",
                                location,
                                format!(
                                    "key '{}' already defined by provision[{first}]; this one replaces it",
                                    rule.key()
                                ),
                            );
                        }
                    }
                    Err(e) => report.load_error(location, &e),
                }
            }
        }
        SchemaKind::ClientProvision => {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for (i, item) in items(value).into_iter().enumerate() {
                let location = Some(format!("clientProvision[{i}]"));
                match ClientProvision::from_json(item) {
                    Ok(provision) => {
                        if let Some(first) = seen.insert(provision.key(), i) {
                            report.issue(
                                Severity::Warning,
                                "W201",
                                location.clone(),
                                format!(
                                    "key '{}' already defined by clientProvision[{first}]; this one replaces it",
                                    provision.key()
                                ),
                            );
                        }
                        if let Some(known) = endpoints {
                            if !known.contains(provision.endpoint()) {
                                report.issue(
                                    Severity::Warning,
                                    "W202",
                                    location,
                                    format!("endpoint '{}' is not defined", provision.endpoint()),
                                );
                            }
                        }
                    }
                    Err(e) => report.load_error(location, &e),
                }
            }
        }
    }
}

fn check_config(value: &Value, report: &mut FileReport<'_>) {
    let config: Config = match serde_json::from_value(value.clone()) {
        Ok(config) => config,
        Err(e) => {
            report.issue(Severity::Error, "E003", None, format!("invalid configuration: {e}"));
            return;
        }
    };
    if let Err(e) = config.validate() {
        report.issue(Severity::Error, "E004", None, e.to_string());
    }

    let mut matching = MatchingConfig::default();
    if let Some(document) = &config.matching {
        check_document(SchemaKind::ServerMatching, document, &matching, None, report);
        if let Ok(parsed) = MatchingConfig::from_json(document) {
            matching = parsed;
        }
    }
    if let Some(document) = &config.globals {
        check_document(SchemaKind::GlobalVariables, document, &matching, None, report);
    }
    for document in &config.provisions {
        check_document(SchemaKind::ServerProvision, document, &matching, None, report);
    }

    let endpoints: HashSet<String> = config
        .client_endpoints
        .iter()
        .flat_map(items)
        .filter_map(|e| e.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();
    for document in &config.client_endpoints {
        check_document(SchemaKind::ClientEndpoint, document, &matching, None, report);
    }
    for document in &config.client_provisions {
        check_document(
            SchemaKind::ClientProvision,
            document,
            &matching,
            Some(&endpoints),
            report,
        );
    }
}

fn print_results_json(result: &CheckResult) {
    use serde_json::json;

    let issues: Vec<_> = result
        .issues
        .iter()
        .map(|issue| {
            json!({
                "severity": issue.severity.label(),
                "code": issue.code,
                "message": issue.message,
                "file": issue.file.to_string_lossy(),
                "location": issue.location,
            })
        })
        .collect();
    let output = json!({
        "files_checked": result.files_checked,
        "documents_checked": result.documents_checked,
        "errors": result.errors,
        "warnings": result.warnings,
        "issues": issues
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("{RED}failed to render results: {e}{RESET}"),
    }
}

fn print_results(result: &CheckResult, args: &Args) {
    let shown: Vec<&Issue> = result
        .issues
        .iter()
        .filter(|i| !args.errors_only || i.severity == Severity::Error)
        .collect();

    if shown.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    } else {
        let mut by_file: HashMap<&PathBuf, Vec<&Issue>> = HashMap::new();
        for issue in shown {
            by_file.entry(&issue.file).or_default().push(issue);
        }
        let mut files: Vec<_> = by_file.keys().copied().collect();
        files.sort();

        for file in files {
            let issues = &by_file[file];
            let file_errors = issues
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .count();
            let status = if file_errors > 0 {
                format!("{RED}FAIL{RESET}")
            } else {
                format!("{YELLOW}WARN{RESET}")
            };
            let file_name = file.file_name().unwrap_or_default().to_string_lossy();
            println!("{status} {BOLD}{CYAN}{file_name}{RESET}");

            for issue in issues {
                let color = issue.severity.color();
                let location = issue
                    .location
                    .as_ref()
                    .map(|l| format!(" {DIM}at {l}{RESET}"))
                    .unwrap_or_default();
                println!(
                    "  {color}|{RESET} {color}{}[{}]{RESET} {}{location}",
                    issue.severity.label(),
                    issue.code,
                    issue.message
                );
            }
            println!();
        }
    }

    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    let verdict = if result.errors > 0 {
        format!("{RED}{BOLD}FAILED{RESET}")
    } else if result.warnings > 0 {
        format!("{YELLOW}{BOLD}PASSED WITH WARNINGS{RESET}")
    } else {
        format!("{GREEN}{BOLD}PASSED{RESET}")
    };
    println!(
        "{verdict}  {} file(s), {} document(s), {RED}{} error(s){RESET}, {YELLOW}{} warning(s){RESET}",
        result.files_checked, result.documents_checked, result.errors, result.warnings
    );
}
