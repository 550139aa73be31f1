// Patitas Engine — Extraction Orchestrator
// Builds evidence payloads, calls the vision model over HTTP, and funnels
// every response through the codec's validation boundary. The model is an
// untrusted function: off-grammar output is a MalformedExtraction the
// caller skips, never a batch abort.

use crate::atoms::constants::*;
use crate::atoms::error::{RescueError, RescueResult};
use crate::atoms::types::{AnimalProfile, CoatColor, Decoded, ReceiptFields};
use crate::engine::codec::{self, NameRules};
use crate::engine::config::Config;
use crate::engine::prompts;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDateTime;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

// ── Evidence payload ───────────────────────────────────────────────────────

/// One piece of the user-side evidence payload.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    /// Raw JPEG bytes; base64-encoded into a data URL at request time.
    Image(Vec<u8>),
}

// ── Model seam ─────────────────────────────────────────────────────────────

/// The one interface to the external model. Tests implement it with a
/// scripted stub; production uses `OpenAiVision`.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        parts: &[ContentPart],
        max_tokens: u32,
    ) -> RescueResult<String>;
}

// ── HTTP retry policy ──────────────────────────────────────────────────────

/// Check if an HTTP status code represents a transient/retryable error.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Sleep with exponential backoff. Returns the delay used, for logging.
async fn retry_delay(attempt: u32) -> Duration {
    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
    tokio::time::sleep(delay).await;
    delay
}

// ── OpenAI-compatible vision client ────────────────────────────────────────
// Works for OpenAI or any /chat/completions-compatible endpoint.

pub struct OpenAiVision {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiVision {
    pub fn new(config: &Config) -> RescueResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(OpenAiVision {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn format_parts(parts: &[ContentPart]) -> Vec<Value> {
        parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({"type": "text", "text": text}),
                ContentPart::Image(bytes) => {
                    let encoded = BASE64.encode(bytes);
                    json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:image/jpeg;base64,{encoded}")}
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl VisionModel for OpenAiVision {
    async fn complete(
        &self,
        system: &str,
        parts: &[ContentPart],
        max_tokens: u32,
    ) -> RescueResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": Self::format_parts(parts)},
            ],
            "max_tokens": max_tokens,
        });

        // Bounded retries on transport-level failures only. A response that
        // arrived, whatever its content, is never re-issued: one semantic
        // model call per record.
        let mut attempt = 0u32;
        loop {
            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let value: Value = response.json().await?;
                        let content = value["choices"][0]["message"]["content"]
                            .as_str()
                            .ok_or_else(|| {
                                RescueError::malformed("response has no message content".to_string())
                            })?;
                        return Ok(content.trim().to_string());
                    }
                    if is_retryable_status(status.as_u16()) && attempt < MAX_RETRIES {
                        let delay = retry_delay(attempt).await;
                        warn!(
                            "[extraction] model returned {status}, retrying in {delay:?} (attempt {}/{MAX_RETRIES})",
                            attempt + 1
                        );
                        attempt += 1;
                        continue;
                    }
                    let detail = response.text().await.unwrap_or_default();
                    return Err(RescueError::transient(format!(
                        "model call failed with {status}: {detail}"
                    )));
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_RETRIES => {
                    let delay = retry_delay(attempt).await;
                    warn!(
                        "[extraction] transport error ({e}), retrying in {delay:?} (attempt {}/{MAX_RETRIES})",
                        attempt + 1
                    );
                    attempt += 1;
                }
                // Timeouts and refused connections class as transient even
                // once retries run out; only other transport failures keep
                // the raw network error.
                Err(e) if e.is_timeout() || e.is_connect() => {
                    return Err(RescueError::transient(format!("model call failed: {e}")))
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ── Orchestration ──────────────────────────────────────────────────────────

pub struct Extractor<'a, M: VisionModel> {
    model: &'a M,
    rules: &'a NameRules,
}

impl<'a, M: VisionModel> Extractor<'a, M> {
    pub fn new(model: &'a M, rules: &'a NameRules) -> Self {
        Extractor { model, rules }
    }

    /// Extract the names/events encoding from a post caption, anchored at
    /// its publication time.
    pub async fn extract_events(
        &self,
        caption: &str,
        published: NaiveDateTime,
    ) -> RescueResult<Decoded> {
        let stamp = published.format(WIRE_DATE_FORMAT).to_string();
        let system = prompts::event_prompt(&stamp);
        let parts = [ContentPart::Text(format!("Descripción del post:\n{caption}\n"))];
        let raw = self.model.complete(&system, &parts, MAX_TOKENS_EVENTS).await?;
        codec::decode(&raw, self.rules)
    }

    /// Extract attribute profiles for newly seen animals. One call per post
    /// regardless of image count; multiple images are delimited with
    /// numbered markers so the model can pair image i with animal i.
    pub async fn extract_profiles(
        &self,
        images: &[Vec<u8>],
        caption: &str,
        names: &[String],
    ) -> RescueResult<Vec<AnimalProfile>> {
        let system = prompts::profile_prompt(&names.join(","));
        let mut parts = vec![ContentPart::Text(prompts::profile_evidence_header(caption))];
        if images.len() == 1 {
            parts.push(ContentPart::Image(images[0].clone()));
        } else {
            for (i, image) in images.iter().enumerate() {
                parts.push(ContentPart::Text(format!("\n--- Imagen {} ---", i + 1)));
                parts.push(ContentPart::Image(image.clone()));
            }
        }

        let raw = self.model.complete(&system, &parts, MAX_TOKENS_PROFILES).await?;
        if raw.to_uppercase() == "IGNORAR" {
            info!("[extraction] profile call for {names:?} marked as non-animal content");
            return Ok(Vec::new());
        }
        parse_profiles(&raw, self.rules)
    }

    /// Extract structured fields from a single receipt image.
    pub async fn extract_receipt(&self, image: &[u8]) -> RescueResult<ReceiptFields> {
        let parts = [
            ContentPart::Text(prompts::RECEIPT_EVIDENCE_HEADER.to_string()),
            ContentPart::Image(image.to_vec()),
        ];
        let raw = self
            .model
            .complete(prompts::RECEIPT_PROMPT, &parts, MAX_TOKENS_RECEIPT)
            .await?;
        parse_receipt(&raw)
    }
}

// ── Response parsing ───────────────────────────────────────────────────────

fn text_field(obj: &Value, key: &str, default: &str) -> String {
    obj[key].as_str().unwrap_or(default).trim().to_string()
}

fn parse_coat(value: &Value) -> Vec<CoatColor> {
    match value {
        Value::Array(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
        // A bare string is tolerated as a single full-coat color.
        Value::String(color) if !color.trim().is_empty() => {
            vec![CoatColor { color: color.trim().to_string(), percent: 100 }]
        }
        _ => Vec::new(),
    }
}

pub(crate) fn parse_profiles(raw: &str, rules: &NameRules) -> RescueResult<Vec<AnimalProfile>> {
    let body = codec::strip_code_fences(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RescueError::malformed(format!("profile response is not valid JSON: {e}")))?;

    // A lone object instead of a one-element array is tolerated.
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(RescueError::malformed(format!(
                "profile response is neither array nor object: {other}"
            )))
        }
    };

    let mut profiles = Vec::with_capacity(items.len());
    for item in &items {
        if !item.is_object() {
            return Err(RescueError::malformed(format!("profile entry is not an object: {item}")));
        }
        profiles.push(AnimalProfile {
            name: codec::normalize_name(&text_field(item, "Nombre", UNNAMED_SENTINEL), rules),
            species: text_field(item, "tipo_animal", "No determinado"),
            coat: parse_coat(&item["color_pelo"]),
            age: text_field(item, "Edad", "No determinado"),
            condition: text_field(item, "Condición de Salud Inicial", "No determinado"),
            location: text_field(item, "Ubicacion", "No determinado"),
        });
    }
    Ok(profiles)
}

fn amount_field(obj: &Value, key: &str) -> f64 {
    match &obj[key] {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        // Scanned receipts yield either "3.000,50" (comma decimal, dot
        // thousands) or plain "3000.50". A dot only separates thousands
        // when a comma is present; otherwise it is the decimal point.
        Value::String(s) => {
            let normalized = if s.contains(',') {
                s.replace('.', "").replace(',', ".")
            } else {
                s.trim().to_string()
            };
            normalized.parse().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

pub(crate) fn parse_receipt(raw: &str) -> RescueResult<ReceiptFields> {
    let body = codec::strip_code_fences(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RescueError::malformed(format!("receipt response is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(RescueError::malformed(format!("receipt response is not an object: {value}")));
    }

    Ok(ReceiptFields {
        date: text_field(&value, "Fecha", ""),
        provider: text_field(&value, "Proveedor", ""),
        pet: text_field(&value, "Mascota", ""),
        responsible: text_field(&value, "Responsable", ""),
        detail: text_field(&value, "Detalle", ""),
        amount: amount_field(&value, "Monto"),
        payment_method: text_field(&value, "Forma de Pago", ""),
        notes: text_field(&value, "Observaciones", ""),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> NameRules {
        NameRules::default()
    }

    #[test]
    fn test_parse_profiles_array() {
        let raw = r#"[{"Nombre":"Luna","tipo_animal":"perro","color_pelo":[{"color":"negro","porcentaje":70},{"color":"blanco","porcentaje":30}],"Edad":"2 años","Condición de Salud Inicial":"desnutrida","Ubicacion":"Palermo"}]"#;
        let profiles = parse_profiles(raw, &rules()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "luna");
        assert_eq!(profiles[0].coat.len(), 2);
        assert_eq!(profiles[0].coat[0].percent, 70);
        assert_eq!(profiles[0].location, "Palermo");
    }

    #[test]
    fn test_parse_profiles_tolerates_lone_object_and_string_coat() {
        let raw = r#"{"Nombre":"Max","tipo_animal":"gato","color_pelo":"naranja"}"#;
        let profiles = parse_profiles(raw, &rules()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].coat, vec![CoatColor { color: "naranja".into(), percent: 100 }]);
        assert_eq!(profiles[0].age, "No determinado");
    }

    #[test]
    fn test_parse_profiles_rejects_garbage() {
        assert!(parse_profiles("no json here", &rules()).is_err());
        assert!(parse_profiles("42", &rules()).is_err());
    }

    #[test]
    fn test_parse_profiles_strips_fences() {
        let raw = "```json\n[{\"Nombre\":\"Sol\"}]\n```";
        let profiles = parse_profiles(raw, &rules()).unwrap();
        assert_eq!(profiles[0].name, "sol");
    }

    #[test]
    fn test_parse_receipt() {
        let raw = r#"{"Fecha":"25/01/2024 15:02:24","Proveedor":"Centro Veterinario Linares","Mascota":"Luna","Responsable":"","Detalle":"APLICACION","Monto":3000.50,"Forma de Pago":"MERCADOPAGO","Observaciones":""}"#;
        let receipt = parse_receipt(raw).unwrap();
        assert_eq!(receipt.provider, "Centro Veterinario Linares");
        assert_eq!(receipt.amount, 3000.50);
    }

    #[test]
    fn test_parse_receipt_amount_from_localized_string() {
        let raw = r#"{"Fecha":"","Proveedor":"","Monto":"3.000,50"}"#;
        let receipt = parse_receipt(raw).unwrap();
        assert_eq!(receipt.amount, 3000.50);
    }

    #[test]
    fn test_parse_receipt_amount_keeps_dot_decimal_string() {
        // A dot with no comma is a decimal point, not a thousands mark.
        let raw = r#"{"Fecha":"","Proveedor":"","Monto":"3000.50"}"#;
        let receipt = parse_receipt(raw).unwrap();
        assert_eq!(receipt.amount, 3000.50);

        let raw = r#"{"Fecha":"","Proveedor":"","Monto":"1.234.567,89"}"#;
        assert_eq!(parse_receipt(raw).unwrap().amount, 1_234_567.89);
    }

    #[test]
    fn test_parse_receipt_rejects_non_object() {
        assert!(parse_receipt("[1,2]").is_err());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }

    // Paused time auto-advances the backoff sleeps, so the retry loop runs
    // to exhaustion without real delays.
    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_surfaces_as_transient() {
        let config = Config {
            api_key: "k".into(),
            // Port 1 refuses immediately; every attempt is a connect error.
            base_url: "http://127.0.0.1:1".into(),
            model: "test".into(),
            db_path: std::path::PathBuf::from("unused.db"),
            aliases: std::collections::HashMap::new(),
        };
        let client = OpenAiVision::new(&config).unwrap();
        let err = client
            .complete("system", &[ContentPart::Text("hola".into())], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RescueError::Transient(_)), "got {err:?}");
    }
}
