//! Event normalization
//!
//! Turns raw API event records into [`NormalizedEvent`]s sorted newest first.

use serde_json::Value;

use crate::coerce::{read_timestamp, RawNumber};
use crate::models::{EventMetadata, EventType, NormalizedEvent, RawEvent, RawEventMetadata};

/// Normalize raw events and sort them by timestamp, newest first.
///
/// Events without a usable timestamp keep their relative order and sort
/// after every dated event.
pub fn normalize_events(events: &[RawEvent]) -> Vec<NormalizedEvent> {
    let mut normalized: Vec<NormalizedEvent> = events.iter().map(normalize_event).collect();

    // `None < Some(_)`, so comparing b to a puts undated events last.
    normalized.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let undated = normalized.iter().filter(|e| e.timestamp.is_none()).count();
    if undated > 0 {
        tracing::debug!(
            total = normalized.len(),
            undated,
            "Events without a usable timestamp sorted last"
        );
    }

    tracing::debug!(count = normalized.len(), "Events normalized");

    normalized
}

/// Normalize a single raw event.
pub fn normalize_event(raw: &RawEvent) -> NormalizedEvent {
    let timestamp = read_timestamp(&raw.timestamp);
    if timestamp.is_none() && raw.timestamp.is_some() {
        tracing::trace!(
            signature = %raw.signature,
            timestamp = ?raw.timestamp,
            "Unparseable event timestamp"
        );
    }

    NormalizedEvent {
        id: raw.id.as_ref().map(RawNumber::to_finite).unwrap_or(0.0).trunc() as i64,
        signature: raw.signature.clone(),
        timestamp,
        event_type: EventType::from(raw.event_type.as_str()),
        amount: raw.amount.as_ref().map(RawNumber::to_finite).unwrap_or(0.0),
        price_usd: raw.price_usd.as_ref().map(RawNumber::to_f64),
        usd_value: raw.usd_value.as_ref().map(RawNumber::to_f64),
        metadata: raw.metadata.as_ref().and_then(normalize_metadata),
    }
}

/// Keeps metadata only when at least one field carries something.
fn normalize_metadata(raw: &RawEventMetadata) -> Option<EventMetadata> {
    let wallet_delta = raw.wallet_delta.as_ref().and_then(RawNumber::finite);
    let vault_delta = raw.vault_delta.as_ref().and_then(RawNumber::finite);
    let accounts: Vec<String> = match &raw.accounts {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    if wallet_delta.is_none() && vault_delta.is_none() && accounts.is_empty() {
        return None;
    }

    Some(EventMetadata {
        wallet_delta,
        vault_delta,
        accounts,
    })
}
