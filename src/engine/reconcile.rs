// Patitas Engine — Reconciliation
// Turns one decoded extraction into a planned mutation batch against the
// store snapshot: new entity vs. existing entity by normalized name, row
// insert vs. interaction-only link, and the event rows to append. The plan
// is pure bookkeeping — nothing is written until the driver commits the
// whole batch through `append_batch`.

use crate::atoms::constants::WIRE_DATE_FORMAT;
use crate::atoms::error::{RescueError, RescueResult};
use crate::atoms::types::{
    Animal, AnimalProfile, Decoded, EventRecord, EventTuple, Interaction, Post,
};
use crate::engine::store::{Mutation, Table, TabularStore};
use crate::engine::temporal;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::collections::HashMap;

// ── Dedup ──────────────────────────────────────────────────────────────────

/// A post whose permalink already has an Interaction row is terminal: it
/// was fully processed on an earlier run and must never be re-processed.
pub fn already_processed<S: TabularStore>(store: &S, post: &Post) -> RescueResult<bool> {
    Ok(store
        .find_by_column(Table::Interaction, "contenido", &post.permalink)?
        .is_some())
}

// ── Planning ───────────────────────────────────────────────────────────────

fn resolve_event_time(published: NaiveDateTime, tuple: &EventTuple) -> String {
    let fallback = published.format(WIRE_DATE_FORMAT).to_string();
    if tuple.time.trim().is_empty() {
        return fallback;
    }
    match temporal::resolve(published, &tuple.time) {
        Some(dt) => dt.format(WIRE_DATE_FORMAT).to_string(),
        None => {
            debug!("[reconcile] unresolvable time phrase {:?}, using publish time", tuple.time);
            fallback
        }
    }
}

/// Profile for `name`: prefer an exact normalized-name match, fall back to
/// positional pairing. Profiles are extracted for the not-yet-stored names
/// only, so the positional index is this animal's rank among the batch's
/// new creations, not its position in the full name list.
fn profile_for<'p>(
    profiles: &'p [AnimalProfile],
    name: &str,
    created_index: usize,
) -> Option<&'p AnimalProfile> {
    profiles.iter().find(|p| p.name == name).or_else(|| profiles.get(created_index))
}

/// Plan all store mutations for one post. `decoded` is the validated
/// extraction; `profiles` carries attribute data for any animals not yet in
/// the store (may be empty when every name already exists).
///
/// Guarantees:
///   • the identifier sequence starts at max(id)+1 and is threaded through
///     this batch only — no shared counter across posts;
///   • all rows for name i precede rows for name i+1 (decoded order);
///   • existing animals get an Interaction link and events, never an
///     attribute rewrite.
pub fn plan_post<S: TabularStore>(
    store: &S,
    post: &Post,
    decoded: &Decoded,
    profiles: &[AnimalProfile],
) -> RescueResult<Vec<Mutation>> {
    let (names, events) = match decoded {
        Decoded::NoAnimals => return Ok(Vec::new()),
        Decoded::Animals { names, events } => (names, events),
    };

    let published = post.published_at().ok_or_else(|| {
        RescueError::malformed(format!("post {} has unparseable timestamp {:?}", post.id, post.timestamp))
    })?;
    let published_wire = published.format(WIRE_DATE_FORMAT).to_string();

    // Explicit sequence, read fresh from the snapshot for this post only.
    let mut next_id = store.max_numeric(Table::Animal, "id")? + 1;
    let mut created_in_batch = 0usize;
    // Identities already planned in this batch. The store snapshot cannot
    // see them, so a name that normalizes to one seen earlier in the same
    // post must reuse the planned rows, never allocate a second id.
    let mut handled: HashMap<&str, i64> = HashMap::new();
    let mut plan = Vec::new();

    for (i, name) in names.iter().enumerate() {
        if let Some(&id) = handled.get(name.as_str()) {
            debug!("[reconcile] {name:?} repeats within this post, id {id} already planned");
            continue;
        }
        let existing = store.find_by_column(Table::Animal, "nombre", name)?;
        let animal_id = match existing {
            Some(row) => {
                let id = row
                    .get("id")
                    .and_then(|v| v.parse::<i64>().ok())
                    .ok_or_else(|| {
                        RescueError::store_write(format!("animal row for {name:?} has no numeric id"))
                    })?;
                debug!("[reconcile] {name:?} already recorded as id {id}");
                plan.push(Mutation::new(
                    Table::Interaction,
                    Interaction {
                        post_id: post.id.clone(),
                        animal_id: id,
                        occurred_at: published_wire.clone(),
                        permalink: post.permalink.clone(),
                        media_url: post.media_url().to_string(),
                    }
                    .fields(),
                ));
                id
            }
            None => {
                let id = next_id;
                next_id += 1;

                let default_profile = AnimalProfile::default();
                let profile =
                    profile_for(profiles, name, created_in_batch).unwrap_or(&default_profile);
                created_in_batch += 1;
                info!("[reconcile] creating animal {name:?} with id {id}");
                plan.push(Mutation::new(
                    Table::Animal,
                    Animal::from_profile(id, name, profile, published).fields(),
                ));

                // In a multi-animal carousel, child media i belongs to
                // animal i; single posts link the parent media.
                let (media_id, media_url) = match (names.len() > 1, post.child(i)) {
                    (true, Some(child)) => (child.id.clone(), child.media_url().to_string()),
                    _ => (post.id.clone(), post.media_url().to_string()),
                };
                plan.push(Mutation::new(
                    Table::Interaction,
                    Interaction {
                        post_id: media_id,
                        animal_id: id,
                        occurred_at: published_wire.clone(),
                        permalink: post.permalink.clone(),
                        media_url,
                    }
                    .fields(),
                ));
                id
            }
        };
        handled.insert(name.as_str(), animal_id);

        for tuple in events {
            plan.push(Mutation::new(
                Table::Event,
                EventRecord {
                    animal_id,
                    location: tuple.location,
                    status: tuple.status,
                    occurred_at: resolve_event_time(published, tuple),
                    person: tuple.person.clone(),
                    relation: tuple.relation,
                }
                .fields(),
            ));
        }
    }

    // The tuple grammar carries no animal reference, so with several animals
    // created from one post the event attribution is a documented guess.
    if created_in_batch > 1 && !events.is_empty() {
        warn!(
            "[reconcile] post {}: {created_in_batch} animals created in one batch — event \
             attribution is ambiguous, tuples were replicated per animal",
            post.id
        );
    }

    Ok(plan)
}

// ── Tests ──────────────────────────────────────────────────────────────────
