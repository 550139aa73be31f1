// Patitas Engine — Temporal Resolver
// Turns relative/absolute date phrases found in post captions into absolute
// timestamps anchored at the post's publication time.
//
// Pure and deterministic: the same (reference, phrase) pair always resolves
// to the same result, which is what makes reprocessing idempotent and the
// whole thing unit-testable. No match returns None — never an error.

use crate::atoms::constants::WIRE_DATE_FORMAT;
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

use crate::engine::codec::fold_accents;

// ── Phrase patterns ────────────────────────────────────────────────────────
// Compiled once; applied to the lowercased, accent-folded phrase so that
// "hace 3 días" and "hace 3 dias" hit the same pattern.

fn ago_es() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"hace\s+(?:casi\s+)?(\w+)\s+(horas?|dias?|semanas?|mes(?:es)?|anos?)")
            .unwrap()
    })
}

fn ago_en() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:almost\s+)?(\w+)\s+(hours?|days?|weeks?|months?|years?)\s+ago").unwrap()
    })
}

fn numeric_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}))?(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?)?",
        )
        .unwrap()
    })
}

fn month_name_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})\s+de\s+([a-z]+)(?:\s+de\s+(\d{4}))?").unwrap()
    })
}

fn day_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(anteayer|ayer|anoche|yesterday|hoy|today)\b|last night").unwrap()
    })
}

// ── Number words ───────────────────────────────────────────────────────────

fn parse_count(word: &str) -> Option<u32> {
    if let Ok(n) = word.parse::<u32>() {
        return Some(n);
    }
    let n = match word {
        "un" | "una" | "uno" | "one" | "a" => 1,
        "dos" | "two" => 2,
        "tres" | "three" => 3,
        "cuatro" | "four" => 4,
        "cinco" | "five" => 5,
        "seis" | "six" => 6,
        "siete" | "seven" => 7,
        "ocho" | "eight" => 8,
        "nueve" | "nine" => 9,
        "diez" | "ten" => 10,
        "once" | "eleven" => 11,
        "doce" | "twelve" => 12,
        _ => return None,
    };
    Some(n)
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(n)
}

// ── Unit subtraction ───────────────────────────────────────────────────────
// Weeks are a flat 7 days. Months and years subtract on the calendar: same
// day-of-month, clamped to the target month's last day when it is shorter.

fn subtract(reference: NaiveDateTime, count: u32, unit: &str) -> Option<NaiveDateTime> {
    match unit {
        u if u.starts_with("hora") || u.starts_with("hour") => {
            Some(reference - Duration::hours(count as i64))
        }
        u if u.starts_with("dia") || u.starts_with("day") => {
            Some(reference - Duration::days(count as i64))
        }
        u if u.starts_with("semana") || u.starts_with("week") => {
            Some(reference - Duration::days(7 * count as i64))
        }
        u if u.starts_with("mes") || u.starts_with("month") => {
            reference.checked_sub_months(Months::new(count))
        }
        u if u.starts_with("ano") || u.starts_with("year") => {
            reference.checked_sub_months(Months::new(12 * count))
        }
        _ => None,
    }
}

// ── Resolution ─────────────────────────────────────────────────────────────

/// Resolve a date phrase against a reference timestamp.
///
/// Recognized, in priority order: an exact `DD/MM/YYYY HH:MM:SS` value,
/// "hace N unidad" / "N units ago" (with the "casi"/"almost" qualifier
/// treated as the exact N), the day keywords hoy/ayer/anoche/anteayer and
/// their English equivalents, and in-text absolute dates (`DD/MM[/YYYY]`,
/// "DD de <mes> [de YYYY]") defaulting year and time-of-day to the
/// reference's.
pub fn resolve(reference: NaiveDateTime, phrase: &str) -> Option<NaiveDateTime> {
    let trimmed = phrase.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Already absolute in the wire format.
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, WIRE_DATE_FORMAT) {
        return Some(dt);
    }

    let text = fold_accents(&trimmed.to_lowercase());

    for re in [ago_es(), ago_en()] {
        if let Some(caps) = re.captures(&text) {
            if let Some(count) = parse_count(&caps[1]) {
                if let Some(dt) = subtract(reference, count, &caps[2]) {
                    return Some(dt);
                }
            }
        }
    }

    if let Some(caps) = day_keywords().captures(&text) {
        // Alternation lists "anteayer" before "ayer" so the longer keyword
        // wins; the bare "last night" arm has no capture group.
        let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or("anoche");
        return Some(match keyword {
            "anteayer" => reference - Duration::days(2),
            "ayer" | "anoche" | "yesterday" => reference - Duration::days(1),
            _ => reference,
        });
    }

    if let Some(caps) = numeric_date().captures(&text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => reference.year(),
        };
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = match (caps.get(4), caps.get(5)) {
            (Some(h), Some(m)) => {
                let sec: u32 = caps.get(6).and_then(|s| s.as_str().parse().ok()).unwrap_or(0);
                chrono::NaiveTime::from_hms_opt(
                    h.as_str().parse().ok()?,
                    m.as_str().parse().ok()?,
                    sec,
                )?
            }
            _ => reference.time(),
        };
        return Some(date.and_time(time));
    }

    if let Some(caps) = month_name_date().captures(&text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => reference.year(),
        };
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(date.and_time(reference.time()));
    }

    None
}

// ── Tests ──────────────────────────────────────────────────────────────────
