// End-to-end scenarios over the real SQLite backend with a scripted model
// and canned media bytes. Each test drives the public surface only:
// BatchRunner + SqliteStore + Config-free NameRules.

use async_trait::async_trait;
use patitas::engine::extraction::ContentPart;
use patitas::{
    BatchRunner, MediaSource, NameRules, Post, RescueError, RescueResult, SqliteStore, StoredFile,
    Table, TabularStore, VisionModel,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    fn new(responses: &[&str]) -> Self {
        ScriptedModel {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn complete(
        &self,
        _system: &str,
        _parts: &[ContentPart],
        _max_tokens: u32,
    ) -> RescueResult<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RescueError::transient("script exhausted".to_string()))
    }
}

struct StubMedia;

#[async_trait]
impl MediaSource for StubMedia {
    async fn fetch(&self, _url: &str) -> RescueResult<Vec<u8>> {
        Ok(vec![0xFF, 0xD8, 0xFF])
    }
}

fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(&dir.path().join("store.db")).unwrap()
}

fn luna_post() -> Post {
    Post {
        id: "post-1".into(),
        caption: "Soy Luna, fue encontrada en Palermo hace 3 días, está desnutrida".into(),
        timestamp: "2025-08-09T19:00:00+0000".into(),
        permalink: "p1".into(),
        media_url: Some("http://media/luna.jpg".into()),
        ..Post::default()
    }
}

const LUNA_EVENTS: &str = r#"["Luna",[[1,1,"hace 3 días","",4]]]"#;
const LUNA_PROFILE: &str = r#"[{"Nombre":"Luna","tipo_animal":"perro","color_pelo":[{"color":"negro","porcentaje":100}],"Edad":"2 años","Condición de Salud Inicial":"desnutrida","Ubicacion":"Palermo"}]"#;

#[tokio::test]
async fn new_animal_post_lands_all_three_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    // Seed an older animal so identifier assignment continues the sequence.
    let mut seed = HashMap::new();
    seed.insert("id".to_string(), "41".to_string());
    seed.insert("nombre".to_string(), "max".to_string());
    store.append_row(Table::Animal, &seed).unwrap();

    let model = ScriptedModel::new(&[LUNA_EVENTS, LUNA_PROFILE]);
    let rules = NameRules::default();
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    let summary = runner.run_posts(vec![luna_post()]).await;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);

    let luna = store.find_by_column(Table::Animal, "nombre", "luna").unwrap().unwrap();
    assert_eq!(luna["id"], "42");
    assert_eq!(luna["tipo_animal"], "perro");
    assert_eq!(luna["ubicacion"], "Palermo");
    assert_eq!(luna["activo"], "TRUE");

    let interaction = store.find_by_column(Table::Interaction, "contenido", "p1").unwrap().unwrap();
    assert_eq!(interaction["animal_id"], "42");
    assert_eq!(interaction["fecha"], "09/08/2025 19:00:00");

    // "hace 3 días" anchored at publish time, same hour.
    let events = store.all_rows(Table::Event).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["fecha"], "06/08/2025 19:00:00");
    assert_eq!(events[0]["estado_id"], "1");
    assert_eq!(events[0]["animal_id"], "42");
}

#[tokio::test]
async fn reprocessing_the_same_post_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let model = ScriptedModel::new(&[LUNA_EVENTS, LUNA_PROFILE]);
    let rules = NameRules::default();
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    assert_eq!(runner.run_posts(vec![luna_post()]).await.processed, 1);
    let animals = store.all_rows(Table::Animal).unwrap().len();
    let events = store.all_rows(Table::Event).unwrap().len();

    // The script is exhausted: a second semantic model call would fail the
    // post instead of skipping it.
    let second = runner.run_posts(vec![luna_post()]).await;
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(store.all_rows(Table::Animal).unwrap().len(), animals);
    assert_eq!(store.all_rows(Table::Event).unwrap().len(), events);
}

#[tokio::test]
async fn later_post_about_known_animal_links_without_rewriting() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let adoption = r#"["LUNA!",[[4,5,"","María García",1]]]"#;
    let model = ScriptedModel::new(&[LUNA_EVENTS, LUNA_PROFILE, adoption]);
    let rules = NameRules::default();
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    runner.run_posts(vec![luna_post()]).await;
    let before = store.find_by_column(Table::Animal, "nombre", "luna").unwrap().unwrap();

    let mut followup = luna_post();
    followup.id = "post-2".into();
    followup.permalink = "p2".into();
    followup.caption = "LUNA! fue adoptada por María García".into();
    followup.timestamp = "2025-09-01T12:00:00+0000".into();
    let summary = runner.run_posts(vec![followup]).await;
    assert_eq!(summary.processed, 1);

    // Same animal row, untouched attributes, exactly one ANIMAL row total.
    assert_eq!(store.all_rows(Table::Animal).unwrap().len(), 1);
    let after = store.find_by_column(Table::Animal, "nombre", "luna").unwrap().unwrap();
    assert_eq!(after, before);

    // New interaction and adoption event point at the existing id.
    let link = store.find_by_column(Table::Interaction, "contenido", "p2").unwrap().unwrap();
    assert_eq!(link["animal_id"], before["id"]);
    let events = store.all_rows(Table::Event).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["estado_id"], "5");
    assert_eq!(events[1]["persona_id"], "María García");
    assert_eq!(events[1]["fecha"], "01/09/2025 12:00:00");
}

#[tokio::test]
async fn configured_alias_merges_into_canonical_animal() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let model = ScriptedModel::new(&[LUNA_EVENTS, LUNA_PROFILE, r#"["Lunita",[[2,2,"","",4]]]"#]);
    let mut aliases = HashMap::new();
    aliases.insert("lunita".to_string(), "luna".to_string());
    let rules = NameRules::new(&aliases);
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    runner.run_posts(vec![luna_post()]).await;
    let mut followup = luna_post();
    followup.id = "post-2".into();
    followup.permalink = "p2".into();
    followup.caption = "Lunita sigue en tratamiento".into();
    runner.run_posts(vec![followup]).await;

    assert_eq!(store.all_rows(Table::Animal).unwrap().len(), 1);
    assert_eq!(store.all_rows(Table::Event).unwrap().len(), 2);
}

#[tokio::test]
async fn institutional_post_is_recorded_nowhere() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let model = ScriptedModel::new(&["0"]);
    let rules = NameRules::default();
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    let mut post = luna_post();
    post.caption = "¡Gracias a todos por la colecta de alimento!".into();
    let summary = runner.run_posts(vec![post]).await;
    assert_eq!(summary.skipped, 1);
    for table in Table::ALL {
        assert!(store.all_rows(table).unwrap().is_empty());
    }
}

#[tokio::test]
async fn receipt_pipeline_classifies_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let vet = r#"{"Fecha":"25/01/2024 15:02:24","Proveedor":"Centro Veterinario Linares","Mascota":"Luna","Detalle":"APLICACION INTRAMUS.","Monto":3000.50,"Forma de Pago":"MERCADOPAGO","Observaciones":""}"#;
    // 11/08/2025 is a Monday: weekday ride, dropped.
    let weekday_ride = r#"{"Fecha":"11/08/2025 08:30:00","Proveedor":"CABIFY","Detalle":"traslado","Monto":1500.0,"Forma de Pago":"MERCADOPAGO"}"#;
    let model = ScriptedModel::new(&[vet, weekday_ride]);
    let rules = NameRules::default();
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    let files = vec![
        StoredFile { id: "f-1".into(), name: "vet.jpg".into(), created_time: String::new() },
        StoredFile { id: "f-2".into(), name: "ride.jpg".into(), created_time: String::new() },
    ];
    let summary = runner.run_receipts(&files).await;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);

    let rows = store.all_rows(Table::Expense).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["tipo_gasto"], "Veterinaria");
    assert_eq!(rows[0]["monto"], "3000.50");
    assert_eq!(rows[0]["observacion"], "f-1");
    assert_eq!(rows[0]["mascota"], "luna");

    // Rerun with an exhausted script: dedup has to answer before the model.
    let rerun = runner.run_receipts(&files[..1]).await;
    assert_eq!(rerun.skipped, 1);
    assert_eq!(store.all_rows(Table::Expense).unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_extraction_fails_one_post_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let model = ScriptedModel::new(&["the model rambles here", LUNA_EVENTS, LUNA_PROFILE]);
    let rules = NameRules::default();
    let media = StubMedia;
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    let mut bad = luna_post();
    bad.timestamp = "2025-08-01T10:00:00+0000".into();
    bad.permalink = "p0".into();
    let summary = runner.run_posts(vec![bad, luna_post()]).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(store.all_rows(Table::Animal).unwrap().len(), 1);
}
