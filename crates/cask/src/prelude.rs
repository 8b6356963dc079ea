//! Host-owned bootstrap prelude and the protocol names it relies on.

/// Version of the host/guest command protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// Global name of the host dispatch function installed for guest code.
pub const DISPATCH_FUNCTION: &str = "send";

/// Global name of the guest entry function the host calls.
pub const ENTRY_FUNCTION: &str = "recv";

/// The prelude evaluated before every bundle. Defines `recv`, the `Command`
/// numbers and the `db` helpers.
pub const PRELUDE: &str = include_str!("prelude.js");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::command::CommandKind;
    use crate::limits::ResourceLimits;
    use crate::script::{FunctionRef, QuickJs, ScriptRuntime};

    fn loaded() -> QuickJs {
        let mut js = QuickJs::new(&ResourceLimits::default()).unwrap();
        js.load("prelude", PRELUDE).unwrap();
        js
    }

    #[test]
    fn test_prelude_loads() {
        let mut js = loaded();
        assert!(js.global_function(ENTRY_FUNCTION).unwrap().is_some());
    }

    #[test]
    fn test_prelude_matches_host_protocol() {
        let mut js = loaded();
        js.load(
            "probe",
            "function probe() { return [CASK_PROTOCOL, Command.PUT, Command.HAS, Command.GET]; }",
        )
        .unwrap();

        let result = js.call(&FunctionRef::new("probe"), &[]).unwrap();
        assert_eq!(
            result,
            json!([
                PROTOCOL_VERSION,
                CommandKind::Put as u8,
                CommandKind::Has as u8,
                CommandKind::Get as u8
            ])
        );
    }

    #[test]
    fn test_recv_spreads_arrays() {
        let mut js = loaded();
        js.load("bundle", "function sum(a, b) { return a + b; }")
            .unwrap();

        let recv = FunctionRef::new(ENTRY_FUNCTION);
        let result = js.call(&recv, &[json!("sum"), json!("[2, 3]")]).unwrap();
        assert_eq!(result, json!(5));
    }

    #[test]
    fn test_recv_passes_objects_whole() {
        let mut js = loaded();
        js.load("bundle", "function pick(args) { return args.key; }")
            .unwrap();

        let recv = FunctionRef::new(ENTRY_FUNCTION);
        let result = js
            .call(&recv, &[json!("pick"), json!(r#"{"key": "k1"}"#)])
            .unwrap();
        assert_eq!(result, json!("k1"));
    }

    #[test]
    fn test_recv_unknown_name() {
        let mut js = loaded();

        let recv = FunctionRef::new(ENTRY_FUNCTION);
        let err = js.call(&recv, &[json!("nope"), json!("[]")]).unwrap_err();
        assert!(err.to_string().contains("no such entry point: nope"), "{}", err);
    }
}
