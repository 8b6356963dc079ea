//! Policy store example.
//!
//! Demonstrates restricting which keys a bundle may read and write. A
//! [`PolicyStore`] wraps any store; denied commands reach the guest as an
//! `error` field, so the bundle decides what to do about them.
//!
//! Run with: cargo run -p cask --example policy_store

use std::sync::Arc;

use cask::policy::{PolicyBuilder, PolicyStore, read_only_policy};
use cask::{Cask, MemoryStore, ResourceLimits, Value};

const BUNDLE: &str = r#"
    function publish(key, value) {
        var result = db.put(key, value);
        if (result.error) throw new Error(result.error);
    }

    function tryWrite(key) {
        var result = db.put(key, "x");
        db.put("report/" + key, result.error ? "denied" : "written");
    }
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Policy Store Example ===\n");

    let cask = Cask::new(1);
    let limits = ResourceLimits::default();
    let inner = Arc::new(MemoryStore::new());
    inner.insert("config", "mode=production")?;

    // === Example 1: read-only store ===
    println!("--- Example 1: read_only_policy() ---");
    let read_only = Arc::new(PolicyStore::new(
        Arc::clone(&inner),
        Arc::new(read_only_policy()),
    ));
    let outcome = cask
        .execute(
            read_only,
            BUNDLE,
            "publish",
            Value::from(vec!["config", "mode=debug"]),
            limits.clone(),
        )
        .await;
    match outcome {
        Ok(_) => println!("Writing config: unexpectedly allowed"),
        Err(e) => println!("Writing config: DENIED\n  Error: {}", e),
    }

    // === Example 2: scoped writes with PolicyBuilder ===
    println!("\n--- Example 2: Custom Policy with PolicyBuilder ---");
    println!("Reads anywhere, writes only under out/* and report/*\n");
    let policy = PolicyBuilder::new()
        .allow_read("*")
        .allow_write("out/*")
        .allow_write("report/*")
        .build();
    let scoped = Arc::new(PolicyStore::new(Arc::clone(&inner), Arc::new(policy)));

    for key in ["out/result", "config"] {
        cask.execute(
            scoped.clone(),
            BUNDLE,
            "tryWrite",
            Value::from(vec![key]),
            limits.clone(),
        )
        .await?;
    }

    println!("Final store contents:");
    for (key, value) in inner.snapshot()? {
        println!("  {} = {}", key, String::from_utf8_lossy(&value));
    }

    Ok(())
}
