// Patitas Engine — module map
// Engine layer: logic with side effects. Only this layer talks to the
// network and the store; atoms stay pure.

pub mod codec;
pub mod config;
pub mod expenses;
pub mod extraction;
pub mod ingest;
pub mod prompts;
pub mod reconcile;
pub mod store;
pub mod temporal;
