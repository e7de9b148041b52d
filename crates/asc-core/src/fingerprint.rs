// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-addressed fingerprint for work units.
//!
//! The fingerprint names a unique (provider, model, prompt_version,
//! question, persona, normalized question text, settings) combination and
//! must be bitwise stable across processes: the same inputs always hash to
//! the same 64-hex-digit string, regardless of settings key order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Normalize question text for hashing: lowercase and collapse every
/// maximal run of whitespace to a single space.
pub fn normalize_question_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serialize a JSON value into its canonical form: compact, with object
/// keys lexicographically ordered at every nesting level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization never fails for a string.
                out.push_str(&serde_json::to_string(key).expect("serialize key"));
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            out.push_str(&serde_json::to_string(other).expect("serialize scalar"));
        }
    }
}

/// Compute the fingerprint of one (question x provider spec) work unit.
///
/// Inputs are joined with `|`, which cannot occur in any component: the
/// identifiers are opaque UUIDs, the scalar fields are provider/model/
/// version tokens, the question text is whitespace-normalized, and the
/// settings are JSON (where a literal `|` would be confined to string
/// values that are themselves part of the canonical serialization).
pub fn fingerprint(
    provider: &str,
    model: &str,
    prompt_version: &str,
    question_id: &str,
    persona_id: &str,
    question_text: &str,
    provider_settings: &Value,
) -> String {
    let normalized = normalize_question_text(question_text);
    let settings = canonical_json(provider_settings);

    let mut hasher = Sha256::new();
    for (i, part) in [
        provider,
        model,
        prompt_version,
        question_id,
        persona_id,
        normalized.as_str(),
        settings.as_str(),
    ]
    .iter()
    .enumerate()
    {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn fp(text: &str, settings: &Value) -> String {
        fingerprint("openai", "gpt-4o-mini", "v1", "q-1", "p-1", text, settings)
    }

    #[test]
    fn is_64_lowercase_hex() {
        let h = fp("How long does the battery last?", &json!({}));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn identical_inputs_identical_hash() {
        let settings = json!({"model": "gpt-4o-mini", "allow_sampling": false});
        assert_eq!(fp("Question?", &settings), fp("Question?", &settings));
    }

    #[test]
    fn key_order_does_not_matter() {
        // Build the same object with two different insertion orders.
        let mut a = serde_json::Map::new();
        a.insert("model".into(), json!("m"));
        a.insert("allow_sampling".into(), json!(false));
        a.insert("nested".into(), json!({"b": 2, "a": 1}));

        let mut b = serde_json::Map::new();
        b.insert("nested".into(), json!({"a": 1, "b": 2}));
        b.insert("allow_sampling".into(), json!(false));
        b.insert("model".into(), json!("m"));

        assert_eq!(fp("q", &Value::Object(a)), fp("q", &Value::Object(b)));
    }

    #[test]
    fn whitespace_and_case_normalize_to_the_same_hash() {
        let s = json!({});
        assert_eq!(fp("  How   LONG\tdoes it\nlast? ", &s), fp("how long does it last?", &s));
    }

    #[test]
    fn distinct_words_stay_distinct() {
        let s = json!({});
        assert_ne!(fp("how long", &s), fp("howlong", &s));
    }

    #[test]
    fn every_input_is_significant() {
        let s = json!({"k": 1});
        let base = fingerprint("openai", "m", "v1", "q", "p", "text", &s);
        assert_ne!(base, fingerprint("gemini", "m", "v1", "q", "p", "text", &s));
        assert_ne!(base, fingerprint("openai", "m2", "v1", "q", "p", "text", &s));
        assert_ne!(base, fingerprint("openai", "m", "v2", "q", "p", "text", &s));
        assert_ne!(base, fingerprint("openai", "m", "v1", "q2", "p", "text", &s));
        assert_ne!(base, fingerprint("openai", "m", "v1", "q", "p2", "text", &s));
        assert_ne!(base, fingerprint("openai", "m", "v1", "q", "p", "other", &s));
        assert_ne!(base, fingerprint("openai", "m", "v1", "q", "p", "text", &json!({"k": 2})));
    }

    #[test]
    fn canonical_json_sorts_keys_at_every_level() {
        let v = json!({"z": {"b": [1, {"y": 1, "x": 2}], "a": null}, "a": true});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":true,"z":{"a":null,"b":[1,{"x":2,"y":1}]}}"#
        );
    }

    #[test]
    fn canonical_json_escapes_strings() {
        let v = json!({"s": "a|b\"c"});
        assert_eq!(canonical_json(&v), r#"{"s":"a|b\"c"}"#);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(text in ".{0,200}") {
            let once = normalize_question_text(&text);
            let twice = normalize_question_text(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn hash_agrees_iff_normalized_forms_agree(
            a in "[ \t]{0,3}[a-zA-Z ]{0,40}[ \t]{0,3}",
            b in "[ \t]{0,3}[a-zA-Z ]{0,40}[ \t]{0,3}",
        ) {
            let s = json!({});
            let same_norm = normalize_question_text(&a) == normalize_question_text(&b);
            let same_hash = fp(&a, &s) == fp(&b, &s);
            prop_assert_eq!(same_norm, same_hash);
        }
    }
}
