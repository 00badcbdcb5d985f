//! `${NAME}` / `${!NAME}` expansion against the variable environment.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::vars::Variables;
use crate::error::ScriptError;

static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z0-9_]+)\}").unwrap());
static ERASURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{![a-zA-Z0-9_]+\}").unwrap());

/// Expand every variable token in `raw`.
///
/// Three passes, in order:
///
/// 1. `${NAME}` is replaced by the value bound to `NAME` (transient store
///    first, then the environment layer). A bound but empty value is an error.
///    Unbound references are left in place. Substituted text is not scanned
///    for further references.
/// 2. Every `${!NAME}` is removed, including ones brought in by step 1.
/// 3. Any `${NAME}` still present is reported as unresolved.
pub fn expand(raw: &str, vars: &Variables) -> Result<String, ScriptError> {
    let mut substituted = String::with_capacity(raw.len());
    let mut last = 0;

    for caps in REFERENCE_RE.captures_iter(raw) {
        let Some(token) = caps.get(0) else { continue };
        substituted.push_str(&raw[last..token.start()]);
        last = token.end();

        let name = &caps[1];
        match vars.lookup(name) {
            Some(value) if value.is_empty() => {
                return Err(ScriptError::EmptyValue {
                    name: name.to_string(),
                });
            }
            Some(value) => substituted.push_str(&value.to_string()),
            None => substituted.push_str(token.as_str()),
        }
    }
    substituted.push_str(&raw[last..]);

    let out = ERASURE_RE.replace_all(&substituted, "");
    if let Some(token) = REFERENCE_RE.find(&out) {
        return Err(ScriptError::UnresolvedReference {
            token: token.as_str().to_string(),
        });
    }
    Ok(out.into_owned())
}

/// Expand an optional field, leaving `None` untouched.
pub fn expand_opt(raw: Option<&str>, vars: &Variables) -> Result<Option<String>, ScriptError> {
    raw.map(|raw| expand(raw, vars)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;
    use crate::core::vars::EnvLayer;

    fn vars() -> Variables {
        let mut vars = Variables::new(EnvLayer::from_vars([
            ("HOME".to_string(), "/home/me".to_string()),
            ("EMPTY".to_string(), String::new()),
        ]));
        vars.set("count", Value::Int(3)).expect("set count");
        vars.set("name", Value::from("world")).expect("set name");
        vars
    }

    #[test]
    fn substitutes_transient_and_environment() {
        let out = expand("hello ${name} x${count} at ${HOME}", &vars()).expect("expand");
        assert_eq!(out, "hello world x3 at /home/me");
    }

    #[test]
    fn replaces_every_occurrence() {
        let out = expand("${name}-${name}", &vars()).expect("expand");
        assert_eq!(out, "world-world");
    }

    #[test]
    fn erasure_ignores_binding_state() {
        let vars = vars();
        assert_eq!(expand("a${!name}b", &vars).expect("bound"), "ab");
        assert_eq!(expand("a${!nobody}b", &vars).expect("unbound"), "ab");
    }

    #[test]
    fn unbound_reference_is_reported() {
        let err = expand("value: ${undefined_var}", &vars()).expect_err("unbound");
        match err {
            ScriptError::UnresolvedReference { token } => assert_eq!(token, "${undefined_var}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_value_is_reported() {
        let err = expand("x=${EMPTY}", &vars()).expect_err("empty");
        assert!(matches!(err, ScriptError::EmptyValue { name } if name == "EMPTY"));
    }

    #[test]
    fn substituted_tokens_are_not_expanded_again() {
        let mut vars = vars();
        vars.set("indirect", Value::from("${name}")).expect("set");
        let err = expand("${indirect}", &vars).expect_err("dangling after substitution");
        assert!(matches!(err, ScriptError::UnresolvedReference { .. }));
    }

    #[test]
    fn erasure_applies_to_substituted_text() {
        let mut vars = vars();
        vars.set("wrapped", Value::from("a${!hidden}b")).expect("set");
        assert_eq!(expand("<${wrapped}>", &vars).expect("expand"), "<ab>");
    }

    #[test]
    fn erasure_runs_after_substitution() {
        let vars = vars();
        let err = expand("${!x}${undefined_var}", &vars).expect_err("still unresolved");
        assert!(matches!(
            err,
            ScriptError::UnresolvedReference { token } if token == "${undefined_var}"
        ));
    }

    #[test]
    fn token_free_strings_are_fixed_points() {
        let vars = vars();
        for raw in ["plain", "${name} and ${count}", "$HOME {x} ${not-a-token}", ""] {
            let once = expand(raw, &vars).expect("once");
            let twice = expand(&once, &vars).expect("twice");
            assert_eq!(once, twice, "input {raw:?}");
        }
    }
}
