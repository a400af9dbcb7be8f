// Alert pipeline for per-frame perception results.
//
// Architecture:
// - model.rs: Alert types, severities, typed metadata and dedup keys
// - triggers.rs: Rule evaluators turning one frame into alert candidates
// - cooldown.rs: Per-key deduplication window
// - engine.rs: Orchestrates evaluation order and cooldown gating
// - window.rs: Bounded record of recently fired alerts
// - notifier.rs: Operator notification backends
// - dispatcher.rs: Severity ordering, recording and notification

pub mod cooldown;
pub mod dispatcher;
pub mod engine;
pub mod model;
pub mod notifier;
pub mod triggers;
pub mod window;
