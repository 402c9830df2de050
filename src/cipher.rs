//! Signature decipher.
//!
//! The companion player script scrambles signatures with a short function built from three
//! helpers: reverse the characters, swap the first character with another one, and drop
//! a prefix. We never run the script. We mine it for the order of helper calls and their
//! numeric arguments, then replay that sequence with our own implementations.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::ExtractError;

/// One elementary operation over the signature's characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transform {
    ReverseAll,
    /// Exchange index 0 with `index % len`
    SwapCharacters(usize),
    /// Remove the first `count` characters; clamps to empty when `count > len`
    DropPrefix(usize),
}

impl Transform {
    fn apply_to(&self, chars: &mut Vec<char>) {
        match *self {
            Transform::ReverseAll => chars.reverse(),
            Transform::SwapCharacters(index) => {
                if !chars.is_empty() {
                    let len = chars.len();
                    chars.swap(0, index % len);
                }
            }
            Transform::DropPrefix(count) => {
                let count = count.min(chars.len());
                chars.drain(..count);
            }
        }
    }
}

/// Ordered list of transforms that undoes the site's signature scrambling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TransformProgram {
    steps: Vec<Transform>,
}

impl TransformProgram {
    pub fn new(steps: Vec<Transform>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Transform] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replays every step in order. Pure and total.
    pub fn apply(&self, input: &str) -> String {
        let mut chars: Vec<char> = input.chars().collect();
        for step in &self.steps {
            step.apply_to(&mut chars);
        }
        chars.into_iter().collect()
    }
}

/// Helper kinds found in the script's helper object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperKind {
    Reverse,
    Swap,
    Splice,
}

// Places where the page's dispatch code hands the scrambled signature to the decipher
// function, newest layouts first.
static DISPATCH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"\b[cs]\s*&&\s*[adf]\.set\([^,]+\s*,\s*encodeURIComponent\s*\(\s*([a-zA-Z0-9$]+)\("#,
        r#"\b[a-zA-Z0-9]+\s*&&\s*[a-zA-Z0-9]+\.set\([^,]+\s*,\s*encodeURIComponent\s*\(\s*([a-zA-Z0-9$]+)\("#,
        r#"\bm=([a-zA-Z0-9$]{2,})\(decodeURIComponent\(h\.s\)\)"#,
        r#"(?:^|[^a-zA-Z0-9$])([a-zA-Z0-9$]{2,})\s*=\s*function\(\s*a\s*\)\s*\{\s*a\s*=\s*a\.split\(\s*""\s*\)"#,
        r#"\.sig\|\|([a-zA-Z0-9$]+)\("#,
        r#"\bc\s*&&\s*d\.set\([^,]+\s*,\s*(?:encodeURIComponent\s*\(\s*)?([a-zA-Z0-9$]+)\("#,
        r#"\byt\.akamaized\.net/\)\s*\|\|\s*.*?\s*[cs]\s*&&\s*[adf]\.set\([^,]+\s*,\s*(?:encodeURIComponent\s*\(\s*)?([a-zA-Z0-9$]+)\("#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static dispatch pattern"))
    .collect()
});

static HELPER_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?([a-zA-Z0-9$]+)["']?\s*:\s*function\s*\(([^)]*)\)\s*\{([^}]*)\}"#)
        .expect("static helper pattern")
});

static SPLIT_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([a-zA-Z0-9$]+)\s*=\s*([a-zA-Z0-9$]+)\.split\(\s*(?:""|'')\s*\)$"#)
        .expect("static split pattern")
});

static JOIN_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^return\s+([a-zA-Z0-9$]+)\.join\(\s*(?:""|'')\s*\)$"#)
        .expect("static join pattern")
});

/// Finds the decipher function in `script` and turns its helper calls into a program.
///
/// Fails with [`ExtractError::DecipherUnavailable`] when the dispatch site, the function
/// body, the helper object, or any helper it calls cannot be located, and also when the
/// body holds a statement we do not understand.
pub fn derive_program(script: &str) -> Result<TransformProgram, ExtractError> {
    let function_name = find_dispatch_function(script)?;
    debug!("Decipher function: {}", function_name);

    let (param, body) = find_function_body(script, &function_name)?;
    let calls = parse_calls(&param, &body)?;

    let object_name = calls
        .first()
        .map(|call| call.object.clone())
        .ok_or_else(|| ExtractError::decipher("decipher function calls no helpers"))?;
    if calls.iter().any(|call| call.object != object_name) {
        return Err(ExtractError::decipher(
            "decipher function calls more than one helper object",
        ));
    }

    let helpers = find_helpers(script, &object_name)?;
    debug!("Helper object {} with {} methods", object_name, helpers.len());

    let mut steps = Vec::with_capacity(calls.len());
    for call in calls {
        let kind = helpers.get(&call.method).ok_or_else(|| {
            ExtractError::decipher(format!("helper {}.{} not found", object_name, call.method))
        })?;
        let step = match kind {
            HelperKind::Reverse => Transform::ReverseAll,
            HelperKind::Swap => Transform::SwapCharacters(call.require_argument()?),
            HelperKind::Splice => Transform::DropPrefix(call.require_argument()?),
        };
        steps.push(step);
    }

    Ok(TransformProgram::new(steps))
}

fn find_dispatch_function(script: &str) -> Result<String, ExtractError> {
    DISPATCH_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(script))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ExtractError::decipher("signature dispatch function not found"))
}

/// Returns the parameter name and the body of `name`'s definition.
fn find_function_body(script: &str, name: &str) -> Result<(String, String), ExtractError> {
    let name = regex::escape(name);
    let pattern = format!(
        r#"(?:function\s+{name}|(?:^|[^a-zA-Z0-9$.]){name}\s*=\s*function)\s*\(\s*([a-zA-Z0-9$]+)\s*\)\s*\{{([^}}]+)\}}"#
    );
    let definition = Regex::new(&pattern)
        .map_err(|e| ExtractError::decipher(format!("bad function pattern: {}", e)))?;

    let captures = definition
        .captures(script)
        .ok_or_else(|| ExtractError::decipher("decipher function body not found"))?;
    match (captures.get(1), captures.get(2)) {
        (Some(param), Some(body)) => Ok((param.as_str().to_string(), body.as_str().to_string())),
        _ => Err(ExtractError::decipher("decipher function body not found")),
    }
}

#[derive(Debug)]
struct HelperCall {
    object: String,
    method: String,
    argument: Option<usize>,
}

impl HelperCall {
    fn require_argument(&self) -> Result<usize, ExtractError> {
        self.argument.ok_or_else(|| {
            ExtractError::decipher(format!("{}.{} called without an index", self.object, self.method))
        })
    }
}

fn parse_calls(param: &str, body: &str) -> Result<Vec<HelperCall>, ExtractError> {
    let escaped = regex::escape(param);
    let call_pattern = format!(
        r#"^([a-zA-Z0-9$]+)(?:\.([a-zA-Z0-9$]+)|\[\s*["']([a-zA-Z0-9$]+)["']\s*\])\(\s*{escaped}\s*(?:,\s*(\d+)\s*)?\)$"#
    );
    let call = Regex::new(&call_pattern)
        .map_err(|e| ExtractError::decipher(format!("bad call pattern: {}", e)))?;

    let mut calls = Vec::new();
    for statement in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(c) = SPLIT_STATEMENT.captures(statement) {
            if c[1] == *param && c[2] == *param {
                continue;
            }
        }
        if let Some(c) = JOIN_STATEMENT.captures(statement) {
            if c[1] == *param {
                continue;
            }
        }

        let captures = call.captures(statement).ok_or_else(|| {
            ExtractError::decipher(format!("unrecognised statement in decipher body: {}", statement))
        })?;
        let method = captures
            .get(2)
            .or_else(|| captures.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let argument = match captures.get(4) {
            Some(m) => Some(m.as_str().parse::<usize>().map_err(|_| {
                ExtractError::decipher(format!("helper argument out of range: {}", m.as_str()))
            })?),
            None => None,
        };
        calls.push(HelperCall {
            object: captures[1].to_string(),
            method,
            argument,
        });
    }
    Ok(calls)
}

fn find_helpers(script: &str, object_name: &str) -> Result<HashMap<String, HelperKind>, ExtractError> {
    let pattern = format!(
        r#"(?:var|let|const)\s+{}\s*=\s*\{{([\s\S]*?)\}}\s*;"#,
        regex::escape(object_name)
    );
    let object = Regex::new(&pattern)
        .map_err(|e| ExtractError::decipher(format!("bad helper object pattern: {}", e)))?;
    let fields = object
        .captures(script)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ExtractError::decipher(format!("helper object {} not found", object_name)))?;

    let mut helpers = HashMap::new();
    for method in HELPER_METHOD.captures_iter(fields.as_str()) {
        let body = &method[3];
        let kind = if body.contains(".reverse(") {
            HelperKind::Reverse
        } else if body.contains(".splice(") {
            HelperKind::Splice
        } else if body.contains("[0]") {
            HelperKind::Swap
        } else {
            debug!("Ignoring unrecognised helper {}: {}", &method[1], body);
            continue;
        };
        helpers.insert(method[1].to_string(), kind);
    }
    Ok(helpers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"var _yt_player={};(function(g){
var Xy={AB:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c},
CD:function(a,b){a.splice(0,b)},
EF:function(a){a.reverse()}};
Qk=function(a){a=a.split("");Xy.AB(a,2);Xy.CD(a,1);return a.join("")};
g.load=function(f,b,d){var c=f.s;c&&d.set(b,encodeURIComponent(Qk(decodeURIComponent(c))))};
})(_yt_player);"#;

    #[test]
    fn reverse_twice_is_identity() {
        let program = TransformProgram::new(vec![Transform::ReverseAll, Transform::ReverseAll]);
        for input in ["", "a", "abc", "héllo wörld", "AOq0QJ8wRAIgX"] {
            assert_eq!(program.apply(input), input);
        }
    }

    #[test]
    fn apply_is_deterministic() {
        let program = TransformProgram::new(vec![
            Transform::SwapCharacters(7),
            Transform::ReverseAll,
            Transform::DropPrefix(3),
        ]);
        let input = "0123456789abcdef";
        assert_eq!(program.apply(input), program.apply(input));
    }

    #[test]
    fn swap_takes_index_modulo_length() {
        let swap = |i| TransformProgram::new(vec![Transform::SwapCharacters(i)]);
        assert_eq!(swap(2).apply("abcd"), "cbad");
        assert_eq!(swap(6).apply("abcd"), "cbad");
        assert_eq!(swap(0).apply("abcd"), "abcd");
        assert_eq!(swap(3).apply(""), "");
    }

    #[test]
    fn drop_prefix_removes_leading_characters() {
        let program = TransformProgram::new(vec![Transform::DropPrefix(2)]);
        assert_eq!(program.apply("abcdef"), "cdef");
    }

    #[test]
    fn drop_prefix_clamps_when_longer_than_input() {
        let program = TransformProgram::new(vec![Transform::DropPrefix(10)]);
        assert_eq!(program.apply("abc"), "");
        assert_eq!(program.apply(""), "");
        let exact = TransformProgram::new(vec![Transform::DropPrefix(3)]);
        assert_eq!(exact.apply("abc"), "");
    }

    #[test]
    fn empty_program_is_identity() {
        assert_eq!(TransformProgram::default().apply("xyz"), "xyz");
    }

    #[test]
    fn derives_program_from_script() {
        let program = derive_program(SCRIPT).unwrap();
        assert_eq!(
            program.steps(),
            &[Transform::SwapCharacters(2), Transform::DropPrefix(1)]
        );
        // swap(2): "cbadef", drop(1): "badef"
        assert_eq!(program.apply("abcdef"), "badef");
    }

    #[test]
    fn derives_program_with_bracket_calls_and_dollar_names() {
        let script = r#"var $x={"rv":function(a){a.reverse()},sw:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c},sp:function(a,b){a.splice(0,b)}};
function u$(q){q=q.split("");$x["rv"](q);$x.sw(q,13);$x.sp(q,3);$x.rv(q,61);return q.join("")}
var h={};h.sig||u$(h.s);"#;
        let program = derive_program(script).unwrap();
        assert_eq!(
            program.steps(),
            &[
                Transform::ReverseAll,
                Transform::SwapCharacters(13),
                Transform::DropPrefix(3),
                Transform::ReverseAll,
            ]
        );
    }

    #[test]
    fn missing_dispatch_is_unavailable() {
        let err = derive_program("var a=1;function b(){}").unwrap_err();
        assert!(matches!(err, ExtractError::DecipherUnavailable(_)));
    }

    #[test]
    fn missing_helper_object_is_unavailable() {
        let script = r#"Qk=function(a){a=a.split("");Zz.AB(a,2);return a.join("")};c&&d.set(b,encodeURIComponent(Qk(e)));"#;
        let err = derive_program(script).unwrap_err();
        assert!(matches!(err, ExtractError::DecipherUnavailable(_)));
    }

    #[test]
    fn missing_helper_method_is_unavailable() {
        let script = SCRIPT.replace("Xy.CD(a,1)", "Xy.GH(a,1)");
        let err = derive_program(&script).unwrap_err();
        assert!(matches!(err, ExtractError::DecipherUnavailable(msg) if msg.contains("GH")));
    }

    #[test]
    fn unknown_statement_is_unavailable() {
        let script = SCRIPT.replace("Xy.CD(a,1);", "a=eval(a);");
        assert!(derive_program(&script).is_err());
    }
}
