//! Aggregate statistics and fund-flow summary
//!
//! Per-type statistics, totals and the date range come from one of two
//! sources: a precomputed upstream payload (trusted, but sanitized) or a fold
//! over the normalized events. Each part is selected independently by
//! presence. The flow summary has no upstream equivalent and is always
//! derived from events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::coerce::{count_or_zero, finite_or_zero, read_or_zero, read_timestamp};
use crate::models::{
    AggregateEntry, Aggregates, DateRange, EventType, FlowSummary, NormalizedEvent,
    RawAggregateEntry, RawAggregateTotals, RawAggregates, RawRange, Totals,
};

/// Wallet deltas at or below this magnitude are treated as noise.
pub const WALLET_DELTA_THRESHOLD: f64 = 0.01;

/// Build aggregates, preferring precomputed parts where supplied.
///
/// `events` must be the output of [`crate::normalize_events`] (newest first).
pub fn build_aggregates(
    precomputed: Option<&RawAggregates>,
    events: &[NormalizedEvent],
) -> Aggregates {
    let by_type = match precomputed.and_then(|a| a.by_type.as_ref()) {
        Some(raw) => {
            tracing::debug!(types = raw.len(), "Using precomputed per-type aggregates");
            sanitize_by_type(raw)
        }
        None => derive_by_type(events),
    };

    let totals = match precomputed.and_then(|a| a.totals.as_ref()) {
        Some(raw) => sanitize_totals(raw),
        None => derive_totals(events),
    };

    let range = build_range(precomputed.and_then(|a| a.range.as_ref()), events);

    Aggregates {
        by_type: with_all_types(by_type, events),
        totals,
        range,
        flow: build_flow_summary(events),
    }
}

/// Fold events into per-type statistics.
pub fn derive_by_type(events: &[NormalizedEvent]) -> BTreeMap<EventType, AggregateEntry> {
    let mut by_type: BTreeMap<EventType, AggregateEntry> = BTreeMap::new();

    for event in events {
        let entry = by_type.entry(event.event_type.clone()).or_default();
        entry.amount += event.amount;
        entry.usd_value += event.usd_value_or_zero();
        entry.count += 1;
        entry.average_amount = entry.amount / entry.count as f64;
        entry.average_usd_value = entry.usd_value / entry.count as f64;

        if let Some(ts) = event.timestamp {
            entry.first_seen = Some(entry.first_seen.map_or(ts, |seen| seen.min(ts)));
            entry.last_seen = Some(entry.last_seen.map_or(ts, |seen| seen.max(ts)));
        }
    }

    by_type
}

/// Sanitize precomputed per-type statistics without recomputing them.
pub fn sanitize_by_type(
    raw: &BTreeMap<String, RawAggregateEntry>,
) -> BTreeMap<EventType, AggregateEntry> {
    raw.iter()
        .map(|(key, entry)| (EventType::from(key.as_str()), sanitize_entry(entry)))
        .collect()
}

fn sanitize_entry(raw: &RawAggregateEntry) -> AggregateEntry {
    AggregateEntry {
        amount: read_or_zero(&raw.amount),
        usd_value: read_or_zero(&raw.usd_value),
        count: count_or_zero(read_or_zero(&raw.count)),
        average_amount: read_or_zero(&raw.average_amount),
        average_usd_value: read_or_zero(&raw.average_usd_value),
        first_seen: read_timestamp(&raw.first_seen),
        last_seen: read_timestamp(&raw.last_seen),
    }
}

/// Gross and direction-weighted net totals over all events.
pub fn derive_totals(events: &[NormalizedEvent]) -> Totals {
    let mut totals = Totals {
        count: events.len() as u64,
        ..Totals::default()
    };

    for event in events {
        let usd_value = event.usd_value_or_zero();
        let direction = event.event_type.direction();
        totals.amount += event.amount;
        totals.usd_value += usd_value;
        totals.net_amount += event.amount * direction;
        totals.net_usd_value += usd_value * direction;
    }

    totals
}

pub fn sanitize_totals(raw: &RawAggregateTotals) -> Totals {
    Totals {
        amount: read_or_zero(&raw.amount),
        usd_value: read_or_zero(&raw.usd_value),
        net_amount: read_or_zero(&raw.net_amount),
        net_usd_value: read_or_zero(&raw.net_usd_value),
        count: count_or_zero(read_or_zero(&raw.count)),
    }
}

/// Every known type and every observed type gets an entry.
fn with_all_types(
    mut by_type: BTreeMap<EventType, AggregateEntry>,
    events: &[NormalizedEvent],
) -> BTreeMap<EventType, AggregateEntry> {
    for event_type in EventType::KNOWN {
        by_type.entry(event_type).or_default();
    }
    for event in events {
        if !by_type.contains_key(&event.event_type) {
            by_type.insert(event.event_type.clone(), AggregateEntry::default());
        }
    }
    by_type
}

/// Precomputed bounds win; otherwise the oldest and newest dated events.
fn build_range(precomputed: Option<&RawRange>, events: &[NormalizedEvent]) -> DateRange {
    let newest: Option<DateTime<Utc>> = events.iter().find_map(|e| e.timestamp);
    let oldest: Option<DateTime<Utc>> = events.iter().rev().find_map(|e| e.timestamp);

    DateRange {
        start: precomputed
            .and_then(|r| read_timestamp(&r.start))
            .or(oldest),
        end: precomputed.and_then(|r| read_timestamp(&r.end)).or(newest),
    }
}

/// Wallet-level inflow/outflow and categorized flow buckets.
///
/// Wallet flow only counts events whose `walletDelta` exceeds
/// [`WALLET_DELTA_THRESHOLD`]; the USD side is prorated from the event's USD
/// value by `|walletDelta| / amount`. A `stake_deposit` is split into
/// principal (the part matched by this event's wallet outflow, capped at the
/// deposit amount) and restaked reward (the remainder).
pub fn build_flow_summary(events: &[NormalizedEvent]) -> FlowSummary {
    let mut flow = FlowSummary::default();

    for event in events {
        let amount = event.amount;
        let usd_value = event.usd_value_or_zero();

        let mut wallet_outflow = 0.0;
        if let Some(delta) = event.wallet_delta() {
            if delta.abs() > WALLET_DELTA_THRESHOLD {
                let prorated_usd = if amount > 0.0 {
                    finite_or_zero(usd_value * delta.abs() / amount)
                } else {
                    0.0
                };

                if delta > 0.0 {
                    flow.wallet_inflow += delta;
                    flow.wallet_inflow_usd += prorated_usd;
                } else {
                    wallet_outflow = delta.abs();
                    flow.wallet_outflow += wallet_outflow;
                    flow.wallet_outflow_usd += prorated_usd;
                }
            }
        }

        let categories = &mut flow.categories;
        match &event.event_type {
            EventType::Purchase => categories.purchases.add(amount, usd_value),
            EventType::TransferIn => categories.transfers_in.add(amount, usd_value),
            EventType::StakeWithdrawal => categories.stake_withdrawals.add(amount, usd_value),
            EventType::Sale => categories.sales.add(amount, usd_value),
            EventType::TransferOut => categories.transfers_out.add(amount, usd_value),
            EventType::StakeSlash => categories.stake_slashes.add(amount, usd_value),
            EventType::StakeDeposit => {
                let principal = wallet_outflow.min(amount.max(0.0));
                let reward = amount - principal;
                let principal_usd = if amount > 0.0 {
                    finite_or_zero(usd_value * principal / amount)
                } else {
                    0.0
                };

                if reward > 0.0 {
                    tracing::trace!(
                        signature = %event.signature,
                        principal,
                        reward,
                        "Stake deposit split into principal and restaked reward"
                    );
                }

                categories.stake_principal_deposits.add(principal, principal_usd);
                categories
                    .stake_reward_restaked
                    .add(reward, usd_value - principal_usd);
            }
            EventType::Other(_) => {}
        }
    }

    flow.net = flow.wallet_inflow - flow.wallet_outflow;
    flow.net_usd = flow.wallet_inflow_usd - flow.wallet_outflow_usd;

    flow
}
