//! Custom store example.
//!
//! Demonstrates plugging your own storage backend into Cask. Any type that
//! implements [`Store`] can be handed to an invocation; this one keeps every
//! version ever written under a key, so the host can inspect the history a
//! bundle produced.
//!
//! Run with: cargo run -p cask --example custom_store

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use cask::{Cask, ResourceLimits, Store, StoreError, Value};

/// Keeps all versions of each key; reads return the latest.
#[derive(Default)]
struct VersionedStore {
    versions: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl VersionedStore {
    fn history(&self, key: &str) -> Vec<String> {
        let versions = match self.versions.lock() {
            Ok(versions) => versions,
            Err(_) => return Vec::new(),
        };
        versions
            .get(key)
            .map(|all| {
                all.iter()
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Store for VersionedStore {
    fn put(&self, key: &str, value: &mut dyn Read) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        value.read_to_end(&mut buf)?;
        let mut versions = self.versions.lock().map_err(|_| StoreError::Poisoned)?;
        versions.entry(key.to_string()).or_default().push(buf);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        let versions = self.versions.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(versions.contains_key(key))
    }

    fn get(&self, key: &str, sink: &mut dyn Write) -> Result<bool, StoreError> {
        let versions = self.versions.lock().map_err(|_| StoreError::Poisoned)?;
        match versions.get(key).and_then(|all| all.last()) {
            Some(latest) => {
                sink.write_all(latest)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

const BUNDLE: &str = r#"
    function bump(key) {
        var current = db.get(key);
        if (current.error) throw new Error(current.error);
        var next = current.ok ? Number(current.data) + 1 : 1;
        db.put(key, String(next));
    }
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(VersionedStore::default());
    let cask = Cask::new(2);

    println!("=== Running `bump` three times ===");
    for _ in 0..3 {
        let stats = cask
            .execute(
                store.clone(),
                BUNDLE,
                "bump",
                Value::from(vec!["counter"]),
                ResourceLimits::default(),
            )
            .await?;
        println!("  commands issued: {}", stats.commands);
    }

    println!("\n=== History of `counter` ===");
    for (i, version) in store.history("counter").iter().enumerate() {
        println!("  v{}: {}", i + 1, version);
    }

    Ok(())
}
