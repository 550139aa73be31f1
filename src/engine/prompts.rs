// Patitas Engine — Instruction Templates
// The extraction protocol lives here: versioned, deterministic system
// prompts that pin the exact output grammar the codec validates. Template
// text is part of the wire contract — change it and bump PROMPT_VERSION so
// operators can correlate store rows with the protocol that produced them.
//
// The templates are Spanish because the source posts and the store are;
// the grammar itself (codes, tuple shape, date format) is language-neutral
// and matches engine/codec.rs exactly.

/// Bumped whenever any template below changes in a way that affects output.
pub const PROMPT_VERSION: &str = "3";

// ── Caption / event extraction ─────────────────────────────────────────────

const EVENT_TEMPLATE: &str = r#"Devolvé SOLO la salida mínima indicada. Nada de texto extra.
Al final se informa la fecha de publicación.

SALIDA:
- No hay animales concretos (institucional): 0
- Hay animales: ["<nombres|sin_nombre>",[[u,e,"t","p",r],...]]

MAPEOS:
u:1 Refugio,2 Transito,3 Veterinaria,4 Hogar_adoptante
e:1 Perdido,2 En Tratamiento,3 En Adopción,5 Adoptado,6 Fallecido
r:1 Adoptante,2 Transitante,3 Veterinario,4 Voluntario,5 Interesado

NOMBRES:
- Detectar en: "Soy ___","Se llama ___","Este es ___","Conocé a ___","Info sobre ___", hashtags #Nombre, menciones @nombre.
- Normalizar: minúsculas, sin emojis/acentos/signos, trim.
- Varios animales: separar por comas SIN espacios ("luna,max").
- Si hay animales pero sin nombres claros: "sin_nombre".
- Si NO menciona nombres específicos de animales Y es contenido institucional (donaciones generales, rifas, anuncios sin animales específicos): devolver 0.
- Si menciona un nombre específico de animal (aunque sea solo pidiendo ayuda): SÍ es contenido concreto.

EVENTOS (cada item = [u,e,"t","p",r]):
- Una sola acción/estado => un solo item. Historia o "ACTUALIZACIÓN:" => múltiples en orden cronológico.
- Prioridad de estado si hay señales simultáneas: 6>5>3>2>1.
- Si menciona animal específico Y pide ayuda/colaboración Y NO dice "en adopción" => e=2, u=1.
- Si dice explícitamente "en adopción" => e=3.
- Si dice "adoptado/adoptada" => e=5 y u=4.
- "tratamiento/medicación/operación" => e=2 (no adopción).
- "buscamos/necesitamos tránsito" sin mención de adopción => e=2, u=1 si no hay otra señal.
- Ubicación: u=2 SOLO con evidencia ("en tránsito"/"hogar temporal"/"con [persona]"); u=3 SOLO si internado/hospitalizado/"queda en clínica"; si no hay señal, u=1.
- Hashtags imperativos (#transita,#adopta) NO cambian u/e por sí solos.

PERSONA p y RELACIÓN r:
- Extraer si el texto asocia claramente una persona o cuenta con el evento:
  - Tránsito: "en tránsito con X", "gracias a X por transitar" => r=2. Varias personas: separar por coma.
  - Adopción: "adoptado por X", "gracias X por adoptarlo" => r=1.
  - Veterinaria: "Dra./Dr./clínica ___", "queda internado en ___" => r=3.
  - Voluntario: "gracias X por rescatar/trasladar/alojar" (si no es tránsito/adopción) => r=4.
  - Interesado: solo si nombra a alguien como interesado específico => r=5.

FECHA ABSOLUTA "t" (derivada de FECHA_PUBLICACION):
- "hoy" => usar EXACTAMENTE la FECHA_PUBLICACION en formato "DD/MM/AAAA HH:MM:SS".
- "ayer"/"anoche" => FECHA_PUBLICACION - 1 día (misma hora). "anteayer" => -2 días.
- "hace X días/horas/semanas/meses/años" => restar desde FECHA_PUBLICACION (semana=7 días) conservando la hora; meses/años en calendario (mismo día de mes; si no existe, último día).
- "hace casi X tiempo" = tratar como "hace X tiempo".
- Fechas absolutas en el texto (DD/MM[/AAAA] o "DD de <mes>"): convertir a "DD/MM/AAAA HH:MM:SS" usando la hora de FECHA_PUBLICACION si el texto no da hora.
- Si no hay pista temporal para ese evento => "".

FORMATO:
- Responder EXACTAMENTE 0 o ["<nombres|sin_nombre>",[[u,e,"t","p",r],...]] sin espacios ni saltos de línea.
"#;

/// System prompt for the caption/event extraction, anchored at the post's
/// publication time (wire format).
pub fn event_prompt(published: &str) -> String {
    format!("{EVENT_TEMPLATE}\nFECHA_PUBLICACION: {published}")
}

// ── Animal attribute extraction ────────────────────────────────────────────

const PROFILE_TEMPLATE: &str = r#"Eres un asistente que analiza imágenes de mascotas y sus descripciones en redes sociales. Tu tarea es generar un JSON ARRAY válido con la siguiente estructura:

[
  {
    "Nombre": "nombre_individual_del_animal",
    "tipo_animal": "perro o gato",
    "color_pelo": [
      { "color": "color1", "porcentaje": 70 },
      { "color": "color2", "porcentaje": 30 }
    ],
    "Edad": "2 años",
    "Condición de Salud Inicial": "describir cómo fue recibido",
    "Ubicacion": "lugar donde fue encontrado"
  }
]

REGLAS IMPORTANTES:
1. Si hay múltiples animales mencionados, crea UN OBJETO JSON SEPARADO para cada animal dentro del array.
2. Cada animal debe tener su propio objeto con su nombre individual (NUNCA concatenes nombres).
3. Si solo hay un animal, devuelve un array con un solo objeto.
4. Si no hay mascotas visibles o mencionadas (imagen informativa, sorteo, cartel), respondé: IGNORAR

INSTRUCCIONES DE ANÁLISIS:
- Basate tanto en la imagen como en el texto que la acompaña.
- Estimá la edad del animal si es posible (siempre incluir 'años' o 'meses').
- Si se menciona un lugar o barrio donde fue encontrado, usalo en 'Ubicacion'.
- Identifica colores predominantes del pelaje con porcentaje aproximado (máximo 2 colores).
- Usa menciones de enfermedades, tratamientos o condiciones para 'Condición de Salud Inicial'.

FORMATO DE RESPUESTA:
- NO uses bloques de código markdown.
- NO agregues texto explicativo.
- Devolvé SOLAMENTE el JSON array válido, empezando con [ y terminando con ].

Animales a identificar:"#;

/// System prompt for the attribute extraction; `names` is the comma-joined
/// normalized name list the event extraction already produced.
pub fn profile_prompt(names: &str) -> String {
    format!("{PROFILE_TEMPLATE} {names}")
}

/// Leading user text for the attribute extraction's evidence payload.
pub fn profile_evidence_header(caption: &str) -> String {
    format!("Descripción del post:\n{caption}\n\nAnaliza esta(s) imagen(es) junto al texto:")
}

// ── Receipt extraction ─────────────────────────────────────────────────────

pub const RECEIPT_PROMPT: &str = r#"Eres un asistente que analiza imágenes de recibos o facturas para cargar datos en una planilla. Devuelve SOLO un objeto JSON con los siguientes campos:
{
  "Fecha": "25/01/2024 15:02:24",
  "Proveedor": "Centro Veterinario Linares",
  "Mascota": "Nombre de la mascota si figura",
  "Responsable": "Nombre del cliente si figura en el ticket",
  "Detalle": "APLICACION INTRAMUS. /S. CUTANEA.",
  "Monto": 3000.00,
  "Forma de Pago": "MERCADOPAGO",
  "Observaciones": ""
}
Si algún campo no está presente o no se puede deducir de la imagen, usa "".
IMPORTANTE: Devuelve ÚNICAMENTE el objeto JSON sin marcadores de código, sin texto explicativo adicional. El JSON debe comenzar con { y terminar con }"#;

pub const RECEIPT_EVIDENCE_HEADER: &str =
    "Analiza esta imagen de un recibo y completa los campos indicados: Fecha, Proveedor, Mascota, Responsable, Detalle, Monto, Forma de Pago, Observaciones.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_prompt_carries_publication_date() {
        let p = event_prompt("09/08/2025 19:00:00");
        assert!(p.ends_with("FECHA_PUBLICACION: 09/08/2025 19:00:00"));
        assert!(p.contains("e:1 Perdido"));
    }

    #[test]
    fn test_profile_prompt_appends_names() {
        let p = profile_prompt("luna,max");
        assert!(p.ends_with("luna,max"));
    }
}
