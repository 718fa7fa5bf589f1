//! `gost`: recovers Go string literals and their call sites from Mach-O/ELF binaries.

mod address;
mod analysis;
mod args;
mod error;
mod exe;
mod linetable;
mod pattern;
mod reconcile;
mod scan;
mod strtable;

use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use error::GostError;
use exe::object_adapter::ObjectExecutable;
use exe::Executable;
use linetable::{LineTable, NullLineTable, Pclntab};
use reconcile::ScanResult;
use scan::ScanOptions;
use strtable::StringTablePolicy;

const DEFAULT_TEMPLATE: &str = "{addr}: {value} -> {refs}";
const MAX_RENDERED_REFS: usize = 5;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gost: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Expands `--flag=value` into `--flag value` so the parser's value arguments work with either
/// spelling, matching common CLI conventions.
fn normalize_args(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    for arg in raw {
        if let Some(stripped) = arg.strip_prefix("--") {
            if let Some((key, value)) = stripped.split_once('=') {
                out.push(format!("--{key}"));
                out.push(value.to_string());
                continue;
            }
        }
        out.push(arg);
    }
    out
}

fn run() -> Result<(), GostError> {
    let argv = normalize_args(std::env::args().skip(1));
    let parsed = args::parse(argv.into_iter());

    if parsed.help {
        println!("usage: gost [OPTIONS] <binary>");
        println!();
        args::print_help();
        return Ok(());
    }

    let template = parsed.template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let mut opts = ScanOptions::default();

    if let Some(policy) = parsed.string_table.as_deref() {
        opts.string_table_policy = match policy {
            "guess" => StringTablePolicy::Guess,
            "ignore" => StringTablePolicy::Ignore,
            other => return Err(GostError::ReadFailure(format!("invalid str-table flag value: {other}"))),
        };
    }

    if let Some(no_nulls) = parsed.no_nulls.as_deref() {
        opts.reject_nulls = match no_nulls {
            "true" | "1" => true,
            "false" | "0" => false,
            other => return Err(GostError::ReadFailure(format!("invalid no-nulls flag value: {other}"))),
        };
    }

    let path = parsed
        .leftover
        .first()
        .ok_or_else(|| GostError::ReadFailure("missing required binary path argument".to_string()))?;

    let exe = ObjectExecutable::open(Path::new(path))?;
    let line_table: Box<dyn LineTable> = match exe.pclntab_section().ok() {
        Some(section) => match Pclntab::parse(section.data(), exe.text_section()?.addr_range.start) {
            Some(table) => Box::new(table),
            None => Box::new(NullLineTable),
        },
        None => Box::new(NullLineTable),
    };

    let results = scan::run(&exe, line_table.as_ref(), &opts)?;

    for result in &results {
        println!("{}", render(&template, result));
    }

    Ok(())
}

fn render(template: &str, result: &ScanResult) -> String {
    template
        .replace("{addr}", &format!("{:x}", result.addr))
        .replace("{value}", &format!("{:?}", String::from_utf8_lossy(&result.value)))
        .replace("{refs}", &render_refs(result))
}

fn render_refs(result: &ScanResult) -> String {
    let rendered: Vec<String> = result
        .refs
        .iter()
        .take(MAX_RENDERED_REFS)
        .map(|r| format!("{}:{}", r.file, r.line))
        .collect();

    let mut out = rendered.join(" ");
    if result.refs.len() > MAX_RENDERED_REFS {
        out.push_str(&format!("... ({} total)", result.refs.len()));
    }
    out
}
