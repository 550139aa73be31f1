// ── Patitas Atoms: Constants ───────────────────────────────────────────────
// All named constants for the crate live here.
// Collecting them in one place eliminates magic strings and keeps the wire
// contract with the extraction model auditable.

// ── Wire formats ───────────────────────────────────────────────────────────
// The extraction model emits and receives timestamps in this format; the
// tabular store persists the same shape. Treat as a stable identifier: the
// prompt templates in engine/prompts.rs spell it out for the model.
pub const WIRE_DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Sentinel the model returns for institutional content with no animals.
pub const NO_ANIMALS_SENTINEL: &str = "0";

/// Sentinel name for a concrete animal the post never names.
pub const UNNAMED_SENTINEL: &str = "sin_nombre";

// ── Model defaults ─────────────────────────────────────────────────────────
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Per-request token ceilings, matched to each extraction's payload size.
pub const MAX_TOKENS_EVENTS: u32 = 700;
pub const MAX_TOKENS_PROFILES: u32 = 800;
pub const MAX_TOKENS_RECEIPT: u32 = 700;

// ── HTTP policy ────────────────────────────────────────────────────────────
/// Maximum transport retries per model call (429/5xx/connect only; a
/// completed response is never re-issued).
pub const MAX_RETRIES: u32 = 3;
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
