//! Portfolio performance metrics
//!
//! Combines upstream totals and metadata with the derived aggregates, the
//! reference widget and the stake account snapshot. Every read cascades
//! through its fallbacks and ends at zero; every output is finite.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::coerce::{first_finite, first_positive, read, read_timestamp};
use crate::models::{
    AggregateEntry, Aggregates, EventType, NormalizedEvent, PerformanceMetrics, RawMetadata,
    RawStakeAccount, RawTotals, RawWidget,
};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Everything the performance calculator reads.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceInputs<'a> {
    pub totals: Option<&'a RawTotals>,
    pub metadata: Option<&'a RawMetadata>,
    pub aggregates: &'a Aggregates,
    pub widget: Option<&'a RawWidget>,
    /// Normalized events, newest first
    pub events: &'a [NormalizedEvent],
    pub stake_account: Option<&'a RawStakeAccount>,
}

impl<'a> PerformanceInputs<'a> {
    pub fn new(aggregates: &'a Aggregates, events: &'a [NormalizedEvent]) -> Self {
        Self {
            totals: None,
            metadata: None,
            aggregates,
            widget: None,
            events,
            stake_account: None,
        }
    }
}

pub fn build_performance_metrics(inputs: &PerformanceInputs<'_>) -> PerformanceMetrics {
    let default_totals = RawTotals::default();
    let default_metadata = RawMetadata::default();
    let totals = inputs.totals.unwrap_or(&default_totals);
    let metadata = inputs.metadata.unwrap_or(&default_metadata);
    let aggregates = inputs.aggregates;
    let entry = move |event_type: EventType| aggregates.entry(&event_type);
    let restaked_flow = aggregates.flow.categories.stake_reward_restaked;

    // Stake position
    let total_deposits = first_finite([
        read(&totals.stake_deposited),
        entry(EventType::StakeDeposit).map(|e| e.amount),
    ])
    .unwrap_or(0.0);
    let total_withdrawals = first_finite([
        read(&totals.stake_withdrawn),
        entry(EventType::StakeWithdrawal).map(|e| e.amount),
    ])
    .unwrap_or(0.0);
    let total_staked = read(&totals.total_staked).unwrap_or(total_deposits);
    let active_stake = read(&totals.current_staked_amount)
        .unwrap_or_else(|| (total_deposits - total_withdrawals).max(0.0));

    // Rewards
    let restaked_rewards =
        first_finite([read(&totals.restaked_rewards), Some(restaked_flow.amount)]).unwrap_or(0.0);
    let restaked_rewards_usd = first_finite([
        read(&totals.restaked_rewards_usd),
        Some(restaked_flow.usd_value),
    ])
    .unwrap_or(0.0);
    let claimed_rewards = read(&totals.claimed_rewards).unwrap_or(0.0);
    let claimed_rewards_usd = read(&totals.claimed_rewards_usd).unwrap_or(0.0);
    let realized_rewards = read(&totals.realized_rewards).unwrap_or(0.0);
    let realized_rewards_usd = read(&totals.realized_rewards_usd).unwrap_or(0.0);
    let total_rewards_accrued = read(&totals.total_rewards_accrued)
        .unwrap_or(restaked_rewards + claimed_rewards + realized_rewards);
    let total_rewards_accrued_usd = read(&totals.total_rewards_accrued_usd)
        .unwrap_or(restaked_rewards_usd + claimed_rewards_usd + realized_rewards_usd);

    // Cost and valuation
    let purchase_cost = first_finite([
        read(&totals.purchase_cost_usd),
        entry(EventType::Purchase).map(|e| e.usd_value),
    ])
    .unwrap_or(0.0);
    let sales_proceeds = first_finite([
        read(&totals.sales_proceeds_usd),
        entry(EventType::Sale).map(|e| e.usd_value),
    ])
    .unwrap_or(0.0);
    let cost_basis = read(&totals.current_cost_basis_usd).unwrap_or(purchase_cost);
    let tokens_held = read(&totals.current_tokens_held).unwrap_or_else(|| {
        let bought = entry(EventType::Purchase).map_or(0.0, |e: &AggregateEntry| e.amount);
        let sold = entry(EventType::Sale).map_or(0.0, |e: &AggregateEntry| e.amount);
        (bought - sold).max(0.0)
    });

    let reference_price = reference_price(totals, inputs.events);
    let current_value = if reference_price > 0.0 {
        tokens_held * reference_price
    } else {
        cost_basis
    };

    let realized_pnl =
        sales_proceeds - (purchase_cost - cost_basis).max(0.0) + realized_rewards_usd;
    let unrealized_pnl = current_value - cost_basis;
    let roi = if purchase_cost > 0.0 {
        (sales_proceeds + realized_rewards_usd + current_value - purchase_cost) / purchase_cost
            * 100.0
    } else {
        0.0
    };

    let average_apr = average_apr(metadata, inputs.widget);
    let staking_duration = staking_duration(totals, metadata, aggregates, inputs.stake_account);

    let dca_value =
        first_finite([read(&totals.dca_value), read(&metadata.dca_value)]).unwrap_or(0.0);
    let dca_value_with_rewards = first_finite([
        read(&totals.dca_value_with_rewards),
        read(&metadata.dca_value_with_rewards),
    ])
    .unwrap_or(0.0);

    tracing::debug!(
        reference_price,
        tokens_held,
        purchase_cost,
        sales_proceeds,
        roi,
        "Performance metrics computed"
    );

    PerformanceMetrics {
        total_staked,
        total_rewards_accrued,
        total_rewards_accrued_usd,
        realized_rewards,
        realized_rewards_usd,
        restaked_rewards,
        restaked_rewards_usd,
        claimed_rewards,
        claimed_rewards_usd,
        realized_pnl,
        unrealized_pnl,
        average_apr,
        staking_duration,
        total_deposits,
        total_withdrawals,
        active_stake,
        cost_basis,
        current_value,
        roi,
        dca_value,
        dca_value_with_rewards,
    }
    .sanitized()
}

/// The most recent positive event price wins over the totals' averages.
fn reference_price(totals: &RawTotals, events: &[NormalizedEvent]) -> f64 {
    let freshest = events
        .iter()
        .filter_map(|e| e.price_usd)
        .find(|price| price.is_finite() && *price > 0.0);

    freshest
        .or_else(|| {
            first_positive([
                read(&totals.effective_average_price),
                read(&totals.average_purchase_price),
            ])
        })
        .unwrap_or(0.0)
}

fn average_apr(metadata: &RawMetadata, widget: Option<&RawWidget>) -> f64 {
    let apr = widget.and_then(|w| w.apr.as_ref());

    read(&metadata.average_apr)
        .or_else(|| apr.and_then(|a| read(&a.current)))
        .or_else(|| apr.and_then(|a| a.display.as_ref()).and_then(parse_apr_display))
        .unwrap_or(0.0)
}

fn non_numeric_re() -> &'static Regex {
    static NON_NUMERIC_RE: OnceLock<Regex> = OnceLock::new();
    NON_NUMERIC_RE.get_or_init(|| Regex::new(r"[^0-9.\-]").expect("valid non-numeric regex"))
}

fn leading_number_re() -> &'static Regex {
    static LEADING_NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    LEADING_NUMBER_RE
        .get_or_init(|| Regex::new(r"^-?(?:\d+\.?\d*|\.\d+)").expect("valid leading number regex"))
}

/// Parses a display value like `"12.5%"` or `"APR 8.1 %"`.
fn parse_apr_display(display: &Value) -> Option<f64> {
    let parsed = match display {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = non_numeric_re().replace_all(s, "");
            leading_number_re()
                .find(&cleaned)
                .and_then(|m| m.as_str().parse::<f64>().ok())
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Configured duration if known, otherwise the span between first and last event.
fn staking_duration(
    totals: &RawTotals,
    metadata: &RawMetadata,
    aggregates: &Aggregates,
    stake_account: Option<&RawStakeAccount>,
) -> f64 {
    let configured = first_finite([
        stake_account.and_then(|s| read(&s.duration_days)),
        read(&metadata.stake_duration_days),
    ]);
    if let Some(days) = configured {
        return days.round().max(0.0);
    }

    let first: Option<DateTime<Utc>> = read_timestamp(&totals.first_event_at)
        .or_else(|| read_timestamp(&metadata.first_event_at))
        .or(aggregates.range.start);
    let last: Option<DateTime<Utc>> = read_timestamp(&totals.last_event_at)
        .or_else(|| read_timestamp(&metadata.last_event_at))
        .or(aggregates.range.end);

    match (first, last) {
        (Some(first), Some(last)) => {
            let millis = (last - first).num_milliseconds() as f64;
            if millis > 0.0 {
                (millis / MILLIS_PER_DAY).round()
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}
