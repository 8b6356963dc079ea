//! Cask CLI - run a code bundle against an in-memory store
//!
//! Usage:
//!   cask bundle.js --entry main --args '["a", 1]'
//!   cask --entry main < bundle.js
//!
//! The store starts with the `--seed` entries. After the invocation its
//! contents are printed to stdout as a JSON object.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cask::policy::{PolicyBuilder, PolicyStore};
use cask::{Cask, MemoryStore, ResourceLimits, Store, Value};

/// Run one entry point of a JavaScript code bundle
#[derive(Parser, Debug)]
#[command(name = "cask")]
#[command(about = "Run a code bundle entry point against an in-memory key/value store")]
struct Args {
    /// Bundle file; read from stdin when omitted
    bundle: Option<PathBuf>,

    /// Entry point to call
    #[arg(long, short)]
    entry: String,

    /// Call arguments as JSON. An array is spread into positional arguments.
    #[arg(long, short, default_value = "[]")]
    args: String,

    /// Seed the store with KEY=VALUE before running
    #[arg(long, value_parser = parse_seed)]
    seed: Vec<(String, String)>,

    /// Restrict writes to keys matching GLOB (repeatable). Reads stay open.
    #[arg(long, value_name = "GLOB")]
    allow_write: Vec<String>,

    /// JSON file with resource limits
    #[arg(long, value_name = "FILE")]
    limits: Option<PathBuf>,

    /// Wall-clock deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Interpreter heap limit in bytes
    #[arg(long)]
    max_memory_bytes: Option<u64>,
}

fn parse_seed(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("empty key in `{}`", raw)),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

fn load_limits(args: &Args) -> anyhow::Result<ResourceLimits> {
    let mut limits = match &args.limits {
        Some(path) => read_limits(path)?,
        None => ResourceLimits::default(),
    };
    if let Some(ms) = args.timeout_ms {
        limits = limits.with_timeout(Duration::from_millis(ms));
    }
    if let Some(bytes) = args.max_memory_bytes {
        limits = limits.with_max_memory_bytes(bytes);
    }
    Ok(limits)
}

fn read_limits(path: &Path) -> anyhow::Result<ResourceLimits> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading limits from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing limits in {}", path.display()))
}

fn read_bundle(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading bundle {}", path.display()))
        }
        None => {
            let mut bundle = Vec::new();
            io::stdin()
                .read_to_end(&mut bundle)
                .context("reading bundle from stdin")?;
            Ok(bundle)
        }
    }
}

fn build_store(memory: &Arc<MemoryStore>, allow_write: &[String]) -> Arc<dyn Store> {
    if allow_write.is_empty() {
        return memory.clone();
    }
    let policy = allow_write
        .iter()
        .fold(PolicyBuilder::new().allow_read("*"), |builder, pattern| {
            builder.allow_write(pattern)
        })
        .build();
    Arc::new(PolicyStore::new(Arc::clone(memory), Arc::new(policy)))
}

fn render(snapshot: BTreeMap<String, Vec<u8>>) -> serde_json::Value {
    snapshot
        .into_iter()
        .map(|(key, value)| {
            let value = String::from_utf8_lossy(&value).into_owned();
            (key, serde_json::Value::String(value))
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so stdout carries only the store contents
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let call_args: serde_json::Value =
        serde_json::from_str(&args.args).context("--args is not valid JSON")?;
    let limits = load_limits(&args)?;
    let bundle = read_bundle(args.bundle.as_deref())?;

    let memory = Arc::new(MemoryStore::new());
    for (key, value) in &args.seed {
        memory.insert(key.as_str(), value.as_str())?;
    }
    let store = build_store(&memory, &args.allow_write);

    let cask = Cask::new(1);
    let outcome = cask
        .execute(store, bundle, &args.entry, Value::from(call_args), limits)
        .await;

    let snapshot = render(memory.snapshot()?);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    match outcome {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) if e.is_internal() => {
            tracing::error!(error = %e, "invocation failed");
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            tracing::error!(error = %e, "invocation failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["cask", "--entry", "main"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(
            parse_seed("k=v=w").unwrap(),
            ("k".to_string(), "v=w".to_string())
        );
        assert_eq!(parse_seed("k=").unwrap(), ("k".to_string(), String::new()));
        assert!(parse_seed("=v").is_err());
        assert!(parse_seed("novalue").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = args(&[]);

        assert_eq!(args.args, "[]");
        assert!(args.bundle.is_none());
        assert!(args.seed.is_empty());
        assert!(load_limits(&args).unwrap().is_unbounded());
    }

    #[test]
    fn test_repeated_seeds() {
        let args = args(&["--seed", "a=1", "--seed", "b=2"]);
        assert_eq!(
            args.seed,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_limits_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"timeout": 1000, "max_stack_bytes": 65536}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let args = args(&["--limits", path, "--timeout-ms", "50"]);
        let limits = load_limits(&args).unwrap();

        assert_eq!(limits.timeout, Some(Duration::from_millis(50)));
        assert_eq!(limits.max_stack_bytes, Some(65536));
        assert_eq!(limits.max_memory_bytes, None);
    }

    #[test]
    fn test_bad_limits_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = read_limits(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing limits"));
    }

    #[test]
    fn test_read_bundle_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "function main() {{}}").unwrap();

        let bundle = read_bundle(Some(file.path())).unwrap();
        assert_eq!(bundle, b"function main() {}");
    }

    #[test]
    fn test_write_scope_is_enforced() {
        let memory = Arc::new(MemoryStore::new());
        let store = build_store(&memory, &["out/*".to_string()]);

        assert!(store.put("out/a", &mut "1".as_bytes()).is_ok());
        assert!(store.put("elsewhere", &mut "1".as_bytes()).is_err());
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_render_is_lossy() {
        let snapshot = BTreeMap::from([
            ("text".to_string(), b"hi".to_vec()),
            ("bin".to_string(), vec![0xff]),
        ]);

        let rendered = render(snapshot);
        assert_eq!(rendered["text"], "hi");
        assert_eq!(rendered["bin"], "\u{fffd}");
    }
}
