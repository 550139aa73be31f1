// Patitas Engine — Event Codec
// The single validation boundary for model output. Everything the vision
// model returns crosses through `decode` before it may touch the store:
// the compact event grammar is parsed into typed tuples here, and anything
// off-grammar is a MalformedExtraction the batch driver skips.
//
// Wire grammar (see engine/prompts.rs for the instruction that produces it):
//   0                                     — institutional content, no animals
//   ["name1,name2",[[u,e,"t",p,r],...]]   — names + event tuples
// with u∈1..=4, e∈{1,2,3,5,6}, r∈1..=5, t = "" | DD/MM/YYYY HH:MM:SS |
// relative phrase, p = free-text person name(s).

use crate::atoms::constants::NO_ANIMALS_SENTINEL;
use crate::atoms::error::{RescueError, RescueResult};
use crate::atoms::types::{AnimalStatus, Decoded, EventTuple, LocationKind, RelationKind};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;

// ── Name normalization ─────────────────────────────────────────────────────

/// Fold Spanish accented characters to their base letter. Kept minimal on
/// purpose: names arrive already lowercased by `normalize_name`.
pub(crate) fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            _ => c,
        })
        .collect()
}

/// Configuration-supplied diminutive/alias equivalences. "uvita" maps to
/// "uva" only if an operator listed that pair — no automatic stemming.
#[derive(Debug, Clone, Default)]
pub struct NameRules {
    aliases: HashMap<String, String>,
}

impl NameRules {
    /// Build from raw config pairs; both sides go through the same
    /// normalization the lookup key does.
    pub fn new(aliases: &HashMap<String, String>) -> Self {
        let aliases = aliases
            .iter()
            .map(|(from, to)| (base_normalize(from), base_normalize(to)))
            .collect();
        NameRules { aliases }
    }

    fn canonical(&self, name: &str) -> String {
        match self.aliases.get(name) {
            Some(base) => base.clone(),
            None => name.to_string(),
        }
    }
}

fn base_normalize(raw: &str) -> String {
    let folded = fold_accents(&raw.to_lowercase());
    let mut out = String::with_capacity(folded.len());
    let mut last_was_space = true;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            // Collapse runs; punctuation and emoji fall through entirely.
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

/// Normalize an animal name into its dedup-key form: lowercase, accents
/// folded, punctuation/emoji stripped, whitespace collapsed and trimmed,
/// then mapped through the configured alias table.
pub fn normalize_name(raw: &str, rules: &NameRules) -> String {
    rules.canonical(&base_normalize(raw))
}

// ── Fence stripping ────────────────────────────────────────────────────────

/// The model is told not to wrap output in markdown, but sometimes does
/// anyway. Strip a ```json … ``` (or bare ```) envelope before parsing.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest.trim_start();
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s
}

// ── Decoding ───────────────────────────────────────────────────────────────

fn tuple_code(v: &Value, field: &str) -> RescueResult<i64> {
    v.as_i64()
        .ok_or_else(|| RescueError::malformed(format!("event tuple {field} is not an integer: {v}")))
}

fn tuple_text(v: &Value, field: &str) -> RescueResult<String> {
    v.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| RescueError::malformed(format!("event tuple {field} is not a string: {v}")))
}

fn decode_tuple(v: &Value) -> RescueResult<EventTuple> {
    let items = v
        .as_array()
        .ok_or_else(|| RescueError::malformed(format!("event tuple is not an array: {v}")))?;
    if items.len() != 5 {
        return Err(RescueError::malformed(format!(
            "event tuple has {} elements, expected 5",
            items.len()
        )));
    }

    let u = tuple_code(&items[0], "location")?;
    let location = LocationKind::from_code(u)
        .ok_or_else(|| RescueError::malformed(format!("unknown location code {u}")))?;

    let e = tuple_code(&items[1], "status")?;
    let status = AnimalStatus::from_code(e)
        .ok_or_else(|| RescueError::malformed(format!("unknown status code {e}")))?;

    let time = tuple_text(&items[2], "time")?;
    let person = tuple_text(&items[3], "person")?;

    let r = tuple_code(&items[4], "relation")?;
    let relation = RelationKind::from_code(r)
        .ok_or_else(|| RescueError::malformed(format!("unknown relation code {r}")))?;

    Ok(EventTuple { location, status, time, person, relation })
}

/// Collapse tuples that share an identical raw time field down to the
/// highest-precedence status: simultaneous signals in one text span are one
/// inferred event. Tuples with distinct time fields are a narrated history
/// and stay separate, in their original order.
fn collapse_simultaneous(events: Vec<EventTuple>) -> Vec<EventTuple> {
    let mut kept: Vec<EventTuple> = Vec::with_capacity(events.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for event in events {
        match seen.get(&event.time) {
            Some(&idx) => {
                if event.status.precedence() > kept[idx].status.precedence() {
                    debug!(
                        "[codec] simultaneous signals at {:?}: {:?} supersedes {:?}",
                        event.time, event.status, kept[idx].status
                    );
                    kept[idx] = event;
                }
            }
            None => {
                seen.insert(event.time.clone(), kept.len());
                kept.push(event);
            }
        }
    }
    kept
}

/// Decode a raw model response into a validated `Decoded`.
///
/// Rejects anything off-grammar with `MalformedExtraction` — the caller
/// skips the record and the batch carries on; nothing here panics.
pub fn decode(raw: &str, rules: &NameRules) -> RescueResult<Decoded> {
    let body = strip_code_fences(raw);
    if body == NO_ANIMALS_SENTINEL {
        return Ok(Decoded::NoAnimals);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| RescueError::malformed(format!("response is not valid JSON: {e}")))?;

    // The bare-integer form of the sentinel also parses as JSON.
    if value.as_i64() == Some(0) {
        return Ok(Decoded::NoAnimals);
    }

    let outer = value
        .as_array()
        .ok_or_else(|| RescueError::malformed(format!("expected a two-element array: {value}")))?;
    if outer.len() != 2 {
        return Err(RescueError::malformed(format!(
            "expected a two-element array, got {} elements",
            outer.len()
        )));
    }

    let names_joined = outer[0]
        .as_str()
        .ok_or_else(|| RescueError::malformed("names element is not a string".to_string()))?;

    // Comma-joined with no spaces per the wire contract; split on the
    // literal comma only, never on linguistic cues.
    let names: Vec<String> = names_joined
        .split(',')
        .map(|n| normalize_name(n, rules))
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(RescueError::malformed("names element is empty".to_string()));
    }

    let tuples = outer[1]
        .as_array()
        .ok_or_else(|| RescueError::malformed("events element is not an array".to_string()))?;
    let events = tuples.iter().map(decode_tuple).collect::<RescueResult<Vec<_>>>()?;

    Ok(Decoded::Animals { names, events: collapse_simultaneous(events) })
}

// ── Tests ──────────────────────────────────────────────────────────────────
