// ── Patitas Atoms: Pure Data Types ─────────────────────────────────────────
// All plain struct/enum definitions with no logic beyond code↔enum mapping
// and row-field construction. Atoms layer rule: no I/O, no side effects.

use crate::atoms::constants::WIRE_DATE_FORMAT;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header-keyed row content for the tabular store. Absent headers are
/// persisted as empty strings; extra keys the store has no header for are
/// dropped on write.
pub type FieldMap = HashMap<String, String>;

// ── Coded enumerations (wire contract with the extraction model) ───────────

/// Where an animal is at the time of an event. Wire codes 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationKind {
    Shelter,
    Foster,
    Veterinary,
    AdopterHome,
}

impl LocationKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Shelter),
            2 => Some(Self::Foster),
            3 => Some(Self::Veterinary),
            4 => Some(Self::AdopterHome),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Shelter => 1,
            Self::Foster => 2,
            Self::Veterinary => 3,
            Self::AdopterHome => 4,
        }
    }
}

/// Animal status at a point in time. Wire codes {1,2,3,5,6} — 4 is
/// unassigned in the protocol and must be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimalStatus {
    Lost,
    InTreatment,
    InAdoption,
    Adopted,
    Deceased,
}

impl AnimalStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Lost),
            2 => Some(Self::InTreatment),
            3 => Some(Self::InAdoption),
            5 => Some(Self::Adopted),
            6 => Some(Self::Deceased),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Lost => 1,
            Self::InTreatment => 2,
            Self::InAdoption => 3,
            Self::Adopted => 5,
            Self::Deceased => 6,
        }
    }

    /// Precedence when simultaneous signals describe one inferred event:
    /// Deceased > Adopted > InAdoption > InTreatment > Lost.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Lost => 1,
            Self::InTreatment => 2,
            Self::InAdoption => 3,
            Self::Adopted => 4,
            Self::Deceased => 5,
        }
    }
}

/// How a named person relates to an event. Wire codes 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Adopter,
    FosterCarer,
    Veterinarian,
    Volunteer,
    Interested,
}

impl RelationKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Adopter),
            2 => Some(Self::FosterCarer),
            3 => Some(Self::Veterinarian),
            4 => Some(Self::Volunteer),
            5 => Some(Self::Interested),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Adopter => 1,
            Self::FosterCarer => 2,
            Self::Veterinarian => 3,
            Self::Volunteer => 4,
            Self::Interested => 5,
        }
    }
}

/// Expense classification derived from the provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Veterinary,
    Transport,
    Food,
}

impl ExpenseCategory {
    /// Label persisted in the GASTOS sheet (Spanish, matching the store).
    pub fn label(self) -> &'static str {
        match self {
            Self::Veterinary => "Veterinaria",
            Self::Transport => "Transporte",
            Self::Food => "Alimentos",
        }
    }
}

// ── Decoded extraction output ──────────────────────────────────────────────

/// One (location, status, time, person, relation) tuple from the caption
/// extraction. `time` is the raw wire string — empty, absolute
/// `DD/MM/YYYY HH:MM:SS`, or a relative phrase — resolved later against the
/// post's publish timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTuple {
    pub location: LocationKind,
    pub status: AnimalStatus,
    pub time: String,
    pub person: String,
    pub relation: RelationKind,
}

/// Validated output of the Event Codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Institutional content: no concrete animals, nothing to record.
    NoAnimals,
    /// Concrete animals, in the order the model listed them.
    Animals {
        names: Vec<String>,
        events: Vec<EventTuple>,
    },
}

// ── Animal entity ──────────────────────────────────────────────────────────

/// One color of an animal's coat with an approximate share. Shares need not
/// sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoatColor {
    pub color: String,
    #[serde(rename = "porcentaje")]
    pub percent: u8,
}

/// Typed output of the attribute-extraction call for one animal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimalProfile {
    pub name: String,
    pub species: String,
    pub coat: Vec<CoatColor>,
    pub age: String,
    pub condition: String,
    pub location: String,
}

/// One rescued animal as persisted in the ANIMAL sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Animal {
    pub id: i64,
    pub name: String,
    pub recorded_at: NaiveDateTime,
    pub species: String,
    pub location: String,
    pub age: String,
    pub coat: Vec<CoatColor>,
    pub condition: String,
    pub active: bool,
}

impl Animal {
    /// Build a new Animal from an extraction profile. The normalized name is
    /// the dedup key and is stored as-is; attribute fields come from the
    /// profile and are never overwritten on later sightings.
    pub fn from_profile(id: i64, name: &str, profile: &AnimalProfile, at: NaiveDateTime) -> Self {
        Animal {
            id,
            name: name.to_string(),
            recorded_at: at,
            species: profile.species.clone(),
            location: profile.location.clone(),
            age: profile.age.clone(),
            coat: profile.coat.clone(),
            condition: profile.condition.clone(),
            active: true,
        }
    }

    pub fn fields(&self) -> FieldMap {
        let date = self.recorded_at.format(WIRE_DATE_FORMAT).to_string();
        let coat = serde_json::to_string(&self.coat).unwrap_or_default();
        let mut f = FieldMap::new();
        f.insert("id".into(), self.id.to_string());
        f.insert("nombre".into(), self.name.clone());
        f.insert("fecha".into(), date.clone());
        f.insert("tipo_animal".into(), self.species.clone());
        f.insert("ubicacion".into(), self.location.clone());
        f.insert("edad".into(), self.age.clone());
        f.insert("color_de_pelo".into(), coat);
        f.insert("condicion_de_salud_inicial".into(), self.condition.clone());
        f.insert("activo".into(), if self.active { "TRUE" } else { "FALSE" }.into());
        f.insert("fecha_actualizacion".into(), date);
        f
    }
}

// ── Event row ──────────────────────────────────────────────────────────────

/// One timestamped status transition for an animal, persisted in EVENTO.
/// Append-only: never mutated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub animal_id: i64,
    pub location: LocationKind,
    pub status: AnimalStatus,
    /// Resolved absolute timestamp, already wire-formatted. Empty only when
    /// the phrase was unresolvable and no fallback applied.
    pub occurred_at: String,
    pub person: String,
    pub relation: RelationKind,
}

impl EventRecord {
    pub fn fields(&self) -> FieldMap {
        let mut f = FieldMap::new();
        f.insert("animal_id".into(), self.animal_id.to_string());
        f.insert("ubicacion_id".into(), self.location.code().to_string());
        f.insert("estado_id".into(), self.status.code().to_string());
        f.insert("persona_id".into(), self.person.clone());
        f.insert("tipo_relacion_id".into(), self.relation.code().to_string());
        f.insert("fecha".into(), self.occurred_at.clone());
        f
    }
}

// ── Interaction row ────────────────────────────────────────────────────────

/// Links one source post/media item to an animal. The permalink (stored in
/// the `contenido` column) is the natural dedup key: a post already present
/// by permalink is never re-processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub post_id: String,
    pub animal_id: i64,
    pub occurred_at: String,
    pub permalink: String,
    pub media_url: String,
}

impl Interaction {
    pub fn fields(&self) -> FieldMap {
        let mut f = FieldMap::new();
        f.insert("animal_id".into(), self.animal_id.to_string());
        f.insert("fecha".into(), self.occurred_at.clone());
        f.insert("post_id".into(), self.post_id.clone());
        f.insert("contenido".into(), self.permalink.clone());
        f.insert("media_url".into(), self.media_url.clone());
        f
    }
}

// ── Expense row ────────────────────────────────────────────────────────────

/// Typed output of the receipt-extraction call, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptFields {
    pub date: String,
    pub provider: String,
    pub pet: String,
    pub responsible: String,
    pub detail: String,
    pub amount: f64,
    pub payment_method: String,
    pub notes: String,
}

/// One classified financial transaction, persisted in GASTOS. The operation
/// id (stored in `observacion`) is the dedup key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRecord {
    pub date: String,
    pub provider: String,
    pub category: ExpenseCategory,
    pub pet: String,
    pub responsible: String,
    pub detail: String,
    pub amount: f64,
    pub payment_method: String,
    pub operation_id: String,
    pub photo_url: String,
    pub photo_id: String,
}

impl ExpenseRecord {
    pub fn fields(&self) -> FieldMap {
        let mut f = FieldMap::new();
        f.insert("fecha".into(), self.date.clone());
        f.insert("proveedor".into(), self.provider.clone());
        f.insert("tipo_gasto".into(), self.category.label().into());
        f.insert("mascota".into(), self.pet.clone());
        f.insert("responsable".into(), self.responsible.clone());
        f.insert("detalle".into(), self.detail.clone());
        f.insert("monto".into(), format!("{:.2}", self.amount));
        f.insert("forma_pago".into(), self.payment_method.clone());
        f.insert("observacion".into(), self.operation_id.clone());
        f.insert("foto".into(), self.photo_url.clone());
        f.insert("id_foto".into(), self.photo_id.clone());
        f
    }
}

// ── Inbound record shapes (collaborator APIs) ──────────────────────────────

/// One child media item of a carousel post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaChild {
    pub id: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl MediaChild {
    /// Thumbnail wins over media URL (videos only expose a thumbnail).
    pub fn media_url(&self) -> &str {
        self.thumbnail_url
            .as_deref()
            .or(self.media_url.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Children {
    #[serde(default)]
    pub data: Vec<MediaChild>,
}

/// One social-media post as returned by the content API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub caption: String,
    /// ISO-8601 with offset, e.g. `2025-08-09T19:00:00+0000`.
    pub timestamp: String,
    pub permalink: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub children: Option<Children>,
}

impl Post {
    pub fn media_url(&self) -> &str {
        self.thumbnail_url
            .as_deref()
            .or(self.media_url.as_deref())
            .unwrap_or_default()
    }

    /// Child media item `i`, when the post is a carousel. In multi-animal
    /// posts child `i` supplies the media for animal `i`.
    pub fn child(&self, i: usize) -> Option<&MediaChild> {
        self.children.as_ref().and_then(|c| c.data.get(i))
    }

    /// Publication time in the poster's local offset, as the wire format's
    /// naive timestamp.
    pub fn published_at(&self) -> Option<NaiveDateTime> {
        chrono::DateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%z")
            .ok()
            .map(|dt| dt.naive_local())
    }
}

/// One stored file (receipt scan) as returned by the file-storage API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdTime", default)]
    pub created_time: String,
}
