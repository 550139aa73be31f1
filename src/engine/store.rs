// Patitas Engine — Tabular Store
// Header-driven, spreadsheet-shaped persistence. The store enforces nothing:
// no primary keys, no uniqueness, no auto-increment — all identifier and
// dedup logic lives in the reconciliation engine. Headers define field
// order; fields absent from a row map are written as empty strings.
//
// `append_batch` is all-or-nothing so one post's Animal/Interaction/Event
// rows either all land or none do.

use crate::atoms::error::{RescueError, RescueResult};
use crate::atoms::types::FieldMap;
use log::info;
use rusqlite::{params_from_iter, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

// ── Tables ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Animal,
    Event,
    Interaction,
    Expense,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Animal, Table::Event, Table::Interaction, Table::Expense];

    /// Sheet name in the store (kept Spanish, matching the live sheet).
    pub fn name(self) -> &'static str {
        match self {
            Table::Animal => "ANIMAL",
            Table::Event => "EVENTO",
            Table::Interaction => "INTERACCION",
            Table::Expense => "GASTOS",
        }
    }

    /// Header row used when a backend bootstraps an empty table.
    pub fn default_headers(self) -> &'static [&'static str] {
        match self {
            Table::Animal => &[
                "id",
                "nombre",
                "fecha",
                "tipo_animal",
                "ubicacion",
                "edad",
                "color_de_pelo",
                "condicion_de_salud_inicial",
                "activo",
                "fecha_actualizacion",
            ],
            Table::Event => {
                &["animal_id", "ubicacion_id", "estado_id", "persona_id", "tipo_relacion_id", "fecha"]
            }
            Table::Interaction => &["animal_id", "fecha", "post_id", "contenido", "media_url"],
            Table::Expense => &[
                "fecha",
                "proveedor",
                "tipo_gasto",
                "mascota",
                "responsable",
                "detalle",
                "monto",
                "forma_pago",
                "observacion",
                "foto",
                "id_foto",
            ],
        }
    }
}

// ── Mutations ──────────────────────────────────────────────────────────────

/// One planned row append. Reconciliation produces a Vec of these, and the
/// driver commits them in order through `append_batch`.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub table: Table,
    pub fields: FieldMap,
}

impl Mutation {
    pub fn new(table: Table, fields: FieldMap) -> Self {
        Mutation { table, fields }
    }
}

// ── Store interface ────────────────────────────────────────────────────────

/// Read/write access to the header-driven tabular store. The engine only
/// ever talks to this trait; backends are swappable collaborators.
pub trait TabularStore: Send + Sync {
    fn headers(&self, table: Table) -> RescueResult<Vec<String>>;

    /// First row whose `column` equals `value` (string comparison, the way
    /// a sheet stores everything), or None.
    fn find_by_column(&self, table: Table, column: &str, value: &str)
        -> RescueResult<Option<FieldMap>>;

    /// Maximum numeric value in `column`, ignoring non-numeric cells; 0 for
    /// an empty table.
    fn max_numeric(&self, table: Table, column: &str) -> RescueResult<i64>;

    fn append_row(&self, table: Table, fields: &FieldMap) -> RescueResult<()>;

    /// All-or-nothing append of a planned batch, in order.
    fn append_batch(&self, batch: &[Mutation]) -> RescueResult<()>;

    fn all_rows(&self, table: Table) -> RescueResult<Vec<FieldMap>>;
}

// ── SQLite backend ─────────────────────────────────────────────────────────
// Local system-of-record. One TEXT column per header; the header row of the
// sheet becomes the table schema.

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store and bootstrap any missing tables.
    pub fn open(path: &Path) -> RescueResult<Self> {
        info!("[store] opening tabular store at {path:?}");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        for table in Table::ALL {
            let columns = table
                .default_headers()
                .iter()
                .map(|h| format!("\"{h}\" TEXT NOT NULL DEFAULT ''"))
                .collect::<Vec<_>>()
                .join(", ");
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" ({columns});",
                table.name()
            ))?;
        }
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Column names must come from the table's own header set before being
    /// spliced into SQL.
    fn checked_column(&self, table: Table, column: &str) -> RescueResult<String> {
        let headers = self.headers(table)?;
        if headers.iter().any(|h| h == column) {
            Ok(column.to_string())
        } else {
            Err(RescueError::store_write(format!(
                "table {} has no column {column:?}",
                table.name()
            )))
        }
    }

    fn row_from_statement(
        headers: &[String],
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<FieldMap> {
        let mut map = FieldMap::new();
        for (i, header) in headers.iter().enumerate() {
            map.insert(header.clone(), row.get::<_, String>(i)?);
        }
        Ok(map)
    }

    fn insert_row(
        conn: &Connection,
        table: Table,
        headers: &[String],
        fields: &FieldMap,
    ) -> RescueResult<()> {
        let columns = headers.iter().map(|h| format!("\"{h}\"")).collect::<Vec<_>>().join(", ");
        let placeholders = (1..=headers.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let values: Vec<String> = headers
            .iter()
            .map(|h| fields.get(h).cloned().unwrap_or_default())
            .collect();
        conn.execute(
            &format!("INSERT INTO \"{}\" ({columns}) VALUES ({placeholders})", table.name()),
            params_from_iter(values.iter()),
        )?;
        Ok(())
    }
}

impl TabularStore for SqliteStore {
    fn headers(&self, table: Table) -> RescueResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table.name()))?;
        let headers = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(headers)
    }

    fn find_by_column(
        &self,
        table: Table,
        column: &str,
        value: &str,
    ) -> RescueResult<Option<FieldMap>> {
        let column = self.checked_column(table, column)?;
        let headers = self.headers(table)?;
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM \"{}\" WHERE \"{column}\" = ?1 LIMIT 1",
            table.name()
        ))?;
        let mut rows = stmt.query_map([value], |row| Self::row_from_statement(&headers, row))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn max_numeric(&self, table: Table, column: &str) -> RescueResult<i64> {
        let column = self.checked_column(table, column)?;
        let conn = self.lock();
        let max: Option<i64> = conn.query_row(
            &format!(
                "SELECT MAX(CAST(\"{column}\" AS INTEGER)) FROM \"{}\" \
                 WHERE \"{column}\" GLOB '[0-9]*'",
                table.name()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    fn append_row(&self, table: Table, fields: &FieldMap) -> RescueResult<()> {
        let headers = self.headers(table)?;
        let conn = self.lock();
        Self::insert_row(&conn, table, &headers, fields)
    }

    fn append_batch(&self, batch: &[Mutation]) -> RescueResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut header_cache: HashMap<Table, Vec<String>> = HashMap::new();
        for mutation in batch {
            if !header_cache.contains_key(&mutation.table) {
                header_cache.insert(mutation.table, self.headers(mutation.table)?);
            }
        }
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for mutation in batch {
            let headers = &header_cache[&mutation.table];
            Self::insert_row(&tx, mutation.table, headers, &mutation.fields)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn all_rows(&self, table: Table) -> RescueResult<Vec<FieldMap>> {
        let headers = self.headers(table)?;
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", table.name()))?;
        let rows = stmt
            .query_map([], |row| Self::row_from_statement(&headers, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── In-memory backend (tests) ──────────────────────────────────────────────

/// Test double with the same semantics as the SQLite backend.
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, (Vec<String>, Vec<Vec<String>>)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        for table in Table::ALL {
            let headers: Vec<String> =
                table.default_headers().iter().map(|h| h.to_string()).collect();
            tables.insert(table, (headers, Vec::new()));
        }
        MemoryStore { tables: Mutex::new(tables) }
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<Table, (Vec<String>, Vec<Vec<String>>)>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn column_index(headers: &[String], column: &str) -> RescueResult<usize> {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| RescueError::store_write(format!("no column {column:?}")))
    }
}

impl TabularStore for MemoryStore {
    fn headers(&self, table: Table) -> RescueResult<Vec<String>> {
        Ok(self.lock()[&table].0.clone())
    }

    fn find_by_column(
        &self,
        table: Table,
        column: &str,
        value: &str,
    ) -> RescueResult<Option<FieldMap>> {
        let tables = self.lock();
        let (headers, rows) = &tables[&table];
        let idx = Self::column_index(headers, column)?;
        Ok(rows.iter().find(|row| row[idx] == value).map(|row| {
            headers.iter().cloned().zip(row.iter().cloned()).collect::<FieldMap>()
        }))
    }

    fn max_numeric(&self, table: Table, column: &str) -> RescueResult<i64> {
        let tables = self.lock();
        let (headers, rows) = &tables[&table];
        let idx = Self::column_index(headers, column)?;
        Ok(rows.iter().filter_map(|row| row[idx].parse::<i64>().ok()).max().unwrap_or(0))
    }

    fn append_row(&self, table: Table, fields: &FieldMap) -> RescueResult<()> {
        let mut tables = self.lock();
        let (headers, rows) = tables
            .get_mut(&table)
            .ok_or_else(|| RescueError::store_write(format!("no table {}", table.name())))?;
        let row = headers.iter().map(|h| fields.get(h).cloned().unwrap_or_default()).collect();
        rows.push(row);
        Ok(())
    }

    fn append_batch(&self, batch: &[Mutation]) -> RescueResult<()> {
        for mutation in batch {
            self.append_row(mutation.table, &mutation.fields)?;
        }
        Ok(())
    }

    fn all_rows(&self, table: Table) -> RescueResult<Vec<FieldMap>> {
        let tables = self.lock();
        let (headers, rows) = &tables[&table];
        Ok(rows
            .iter()
            .map(|row| headers.iter().cloned().zip(row.iter().cloned()).collect::<FieldMap>())
            .collect())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn field_map(pairs: &[(&str, &str)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store
            .append_row(Table::Animal, &field_map(&[("id", "1"), ("nombre", "luna")]))
            .unwrap();
        let row = store.find_by_column(Table::Animal, "nombre", "luna").unwrap().unwrap();
        assert_eq!(row["id"], "1");
        // Absent fields persist as empty strings.
        assert_eq!(row["edad"], "");
        assert!(store.find_by_column(Table::Animal, "nombre", "max").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_max_numeric_ignores_non_numeric() {
        let store = MemoryStore::new();
        assert_eq!(store.max_numeric(Table::Animal, "id").unwrap(), 0);
        store.append_row(Table::Animal, &field_map(&[("id", "7")])).unwrap();
        store.append_row(Table::Animal, &field_map(&[("id", "three")])).unwrap();
        store.append_row(Table::Animal, &field_map(&[("id", "2")])).unwrap();
        assert_eq!(store.max_numeric(Table::Animal, "id").unwrap(), 7);
    }

    #[test]
    fn test_memory_store_unknown_column_is_error() {
        let store = MemoryStore::new();
        assert!(store.find_by_column(Table::Animal, "nope", "x").is_err());
    }

    #[test]
    fn test_sqlite_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("store.db")).unwrap();

        let headers = store.headers(Table::Animal).unwrap();
        assert_eq!(headers[0], "id");
        assert_eq!(headers[1], "nombre");

        store
            .append_row(Table::Animal, &field_map(&[("id", "1"), ("nombre", "luna")]))
            .unwrap();
        let row = store.find_by_column(Table::Animal, "nombre", "luna").unwrap().unwrap();
        assert_eq!(row["id"], "1");
        assert_eq!(row["activo"], "");
        assert_eq!(store.max_numeric(Table::Animal, "id").unwrap(), 1);
    }

    #[test]
    fn test_sqlite_append_batch_spans_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("store.db")).unwrap();

        let batch = vec![
            Mutation::new(Table::Animal, field_map(&[("id", "1"), ("nombre", "luna")])),
            Mutation::new(
                Table::Interaction,
                field_map(&[("animal_id", "1"), ("contenido", "p1")]),
            ),
            Mutation::new(Table::Event, field_map(&[("animal_id", "1"), ("estado_id", "2")])),
        ];
        store.append_batch(&batch).unwrap();
        assert_eq!(store.all_rows(Table::Animal).unwrap().len(), 1);
        assert_eq!(store.all_rows(Table::Interaction).unwrap().len(), 1);
        assert_eq!(store.all_rows(Table::Event).unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_rejects_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("store.db")).unwrap();
        assert!(store.max_numeric(Table::Animal, "id; DROP TABLE ANIMAL").is_err());
    }
}
