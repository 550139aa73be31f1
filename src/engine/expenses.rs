// Patitas Engine — Expense Classification
// Turns extracted receipt fields into classified GASTOS rows. Category is
// a provider-name pattern match; transport entries follow the shelter's
// weekend-rides rule; dedup keys on the operation id already stored in the
// `observacion` column.

use crate::atoms::constants::WIRE_DATE_FORMAT;
use crate::atoms::error::RescueResult;
use crate::atoms::types::{ExpenseCategory, ExpenseRecord, ReceiptFields};
use crate::engine::store::{Table, TabularStore};
use chrono::{Datelike, NaiveDateTime, Weekday};
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

fn veterinary_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:WALTER EDUARDO PEREZ|VETERINAR|LINARES)").unwrap())
}

fn transport_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bCABIFY\b").unwrap())
}

/// Category from the provider name. Known veterinary providers win over the
/// transport match; anything unrecognized is food/supplies.
pub fn classify(provider: &str) -> ExpenseCategory {
    let upper = provider.to_uppercase();
    if veterinary_pattern().is_match(&upper) {
        ExpenseCategory::Veterinary
    } else if transport_pattern().is_match(&upper) {
        ExpenseCategory::Transport
    } else {
        ExpenseCategory::Food
    }
}

/// Shelter rule: transport rides are reimbursable only on weekends. A
/// transport entry whose date does not parse is dropped rather than guessed
/// at. Other categories always pass.
pub fn keep(category: ExpenseCategory, date: &str) -> bool {
    if category != ExpenseCategory::Transport {
        return true;
    }
    match NaiveDateTime::parse_from_str(date, WIRE_DATE_FORMAT) {
        Ok(dt) => matches!(dt.weekday(), Weekday::Sat | Weekday::Sun),
        Err(_) => false,
    }
}

/// True when this operation id already has a GASTOS row.
pub fn already_recorded<S: TabularStore>(store: &S, operation_id: &str) -> RescueResult<bool> {
    Ok(store
        .find_by_column(Table::Expense, "observacion", operation_id)?
        .is_some())
}

/// Assemble the GASTOS row for one receipt. Free-text notes from the
/// extraction fold into the detail column; `observacion` is reserved for the
/// operation id.
pub fn build_record(
    fields: &ReceiptFields,
    operation_id: &str,
    photo_url: &str,
    photo_id: &str,
) -> Option<ExpenseRecord> {
    let category = classify(&fields.provider);
    if !keep(category, &fields.date) {
        debug!(
            "[expenses] dropping weekday transport entry from {:?} on {:?}",
            fields.provider, fields.date
        );
        return None;
    }
    let detail = if fields.notes.trim().is_empty() {
        fields.detail.clone()
    } else if fields.detail.trim().is_empty() {
        fields.notes.clone()
    } else {
        format!("{} — {}", fields.detail, fields.notes)
    };
    Some(ExpenseRecord {
        date: fields.date.clone(),
        provider: fields.provider.clone(),
        category,
        pet: fields.pet.clone(),
        responsible: fields.responsible.clone(),
        detail,
        amount: fields.amount,
        payment_method: fields.payment_method.clone(),
        operation_id: operation_id.to_string(),
        photo_url: photo_url.to_string(),
        photo_id: photo_id.to_string(),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::FieldMap;
    use crate::engine::store::MemoryStore;

    #[test]
    fn test_classify_providers() {
        assert_eq!(classify("Centro Veterinario Linares"), ExpenseCategory::Veterinary);
        assert_eq!(classify("WALTER EDUARDO PEREZ"), ExpenseCategory::Veterinary);
        assert_eq!(classify("veterinaria del sur"), ExpenseCategory::Veterinary);
        assert_eq!(classify("Cabify Argentina"), ExpenseCategory::Transport);
        assert_eq!(classify("Balanceados El Campo"), ExpenseCategory::Food);
        assert_eq!(classify(""), ExpenseCategory::Food);
    }

    #[test]
    fn test_transport_kept_only_on_weekends() {
        // 09/08/2025 is a Saturday, 11/08/2025 a Monday.
        assert!(keep(ExpenseCategory::Transport, "09/08/2025 10:00:00"));
        assert!(keep(ExpenseCategory::Transport, "10/08/2025 10:00:00"));
        assert!(!keep(ExpenseCategory::Transport, "11/08/2025 10:00:00"));
        assert!(!keep(ExpenseCategory::Transport, "not a date"));
        // Other categories ignore the date entirely.
        assert!(keep(ExpenseCategory::Veterinary, "11/08/2025 10:00:00"));
        assert!(keep(ExpenseCategory::Food, "garbage"));
    }

    #[test]
    fn test_build_record_folds_notes_into_detail() {
        let fields = ReceiptFields {
            date: "25/01/2024 15:02:24".into(),
            provider: "Centro Veterinario Linares".into(),
            detail: "APLICACION INTRAMUS.".into(),
            amount: 3000.0,
            payment_method: "MERCADOPAGO".into(),
            notes: "segunda dosis".into(),
            ..ReceiptFields::default()
        };
        let record = build_record(&fields, "file-9", "http://files/file-9", "file-9").unwrap();
        assert_eq!(record.category, ExpenseCategory::Veterinary);
        assert_eq!(record.detail, "APLICACION INTRAMUS. — segunda dosis");
        assert_eq!(record.operation_id, "file-9");
        let row = record.fields();
        assert_eq!(row["tipo_gasto"], "Veterinaria");
        assert_eq!(row["monto"], "3000.00");
        assert_eq!(row["observacion"], "file-9");
    }

    #[test]
    fn test_build_record_drops_weekday_ride() {
        let fields = ReceiptFields {
            date: "11/08/2025 08:30:00".into(),
            provider: "CABIFY".into(),
            amount: 1500.0,
            ..ReceiptFields::default()
        };
        assert!(build_record(&fields, "op-1", "", "f-1").is_none());
    }

    #[test]
    fn test_already_recorded_by_operation_id() {
        let store = MemoryStore::new();
        assert!(!already_recorded(&store, "op-7").unwrap());
        let mut fields = FieldMap::new();
        fields.insert("observacion".into(), "op-7".into());
        store.append_row(Table::Expense, &fields).unwrap();
        assert!(already_recorded(&store, "op-7").unwrap());
    }
}
