//! Data models for staking analytics
//!
//! Two families live here: the loosely typed `Raw*` records that mirror the
//! upstream API payload, and the canonical records the pipeline produces for
//! the rendering layer. Both use camelCase on the wire.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::{
    finite_or_zero, iso_or_empty, lenient_list, lenient_map, lenient_option, lenient_string,
    RawNumber, RawTimestamp,
};

// =============================================================================
// Event Type
// =============================================================================

/// Classification of an on-chain event.
///
/// The known variants are the ones the analytics understand. Anything else
/// upstream sends is kept verbatim in `Other` so it can still be displayed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Purchase,
    Sale,
    TransferIn,
    TransferOut,
    StakeDeposit,
    StakeWithdrawal,
    StakeSlash,
    Other(String),
}

impl EventType {
    /// Every classified type, in display order.
    pub const KNOWN: [EventType; 7] = [
        EventType::Purchase,
        EventType::Sale,
        EventType::TransferIn,
        EventType::TransferOut,
        EventType::StakeDeposit,
        EventType::StakeWithdrawal,
        EventType::StakeSlash,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Purchase => "purchase",
            EventType::Sale => "sale",
            EventType::TransferIn => "transfer_in",
            EventType::TransferOut => "transfer_out",
            EventType::StakeDeposit => "stake_deposit",
            EventType::StakeWithdrawal => "stake_withdrawal",
            EventType::StakeSlash => "stake_slash",
            EventType::Other(s) => s,
        }
    }

    /// Sign applied when computing net totals: tokens coming back to the
    /// holder count positive, tokens leaving count negative.
    pub fn direction(&self) -> f64 {
        match self {
            EventType::Purchase | EventType::TransferIn | EventType::StakeWithdrawal => 1.0,
            EventType::Sale
            | EventType::TransferOut
            | EventType::StakeDeposit
            | EventType::StakeSlash => -1.0,
            EventType::Other(_) => 0.0,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "purchase" => EventType::Purchase,
            "sale" => EventType::Sale,
            "transfer_in" => EventType::TransferIn,
            "transfer_out" => EventType::TransferOut,
            "stake_deposit" => EventType::StakeDeposit,
            "stake_withdrawal" => EventType::StakeWithdrawal,
            "stake_slash" => EventType::StakeSlash,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Raw Payload (upstream API shape)
// =============================================================================

/// One event record as the API sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<RawNumber>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub signature: String,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub event_type: String,
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub price_usd: Option<RawNumber>,
    #[serde(default)]
    pub usd_value: Option<RawNumber>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub metadata: Option<RawEventMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventMetadata {
    #[serde(default)]
    pub wallet_delta: Option<RawNumber>,
    #[serde(default)]
    pub vault_delta: Option<RawNumber>,
    #[serde(default)]
    pub accounts: Option<Value>,
}

/// Aggregates an upstream service may have precomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAggregates {
    #[serde(default, deserialize_with = "lenient_map")]
    pub by_type: Option<BTreeMap<String, RawAggregateEntry>>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub totals: Option<RawAggregateTotals>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub range: Option<RawRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAggregateEntry {
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub usd_value: Option<RawNumber>,
    #[serde(default)]
    pub count: Option<RawNumber>,
    #[serde(default)]
    pub average_amount: Option<RawNumber>,
    #[serde(default)]
    pub average_usd_value: Option<RawNumber>,
    #[serde(default)]
    pub first_seen: Option<RawTimestamp>,
    #[serde(default)]
    pub last_seen: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAggregateTotals {
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub usd_value: Option<RawNumber>,
    #[serde(default)]
    pub net_amount: Option<RawNumber>,
    #[serde(default)]
    pub net_usd_value: Option<RawNumber>,
    #[serde(default)]
    pub count: Option<RawNumber>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRange {
    #[serde(default)]
    pub start: Option<RawTimestamp>,
    #[serde(default)]
    pub end: Option<RawTimestamp>,
}

/// Wallet-level totals reported alongside the event list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTotals {
    /// Lifetime NOS staked
    #[serde(default)]
    pub total_staked: Option<RawNumber>,

    /// NOS deposited into stake
    #[serde(default)]
    pub stake_deposited: Option<RawNumber>,

    /// NOS withdrawn from stake
    #[serde(default)]
    pub stake_withdrawn: Option<RawNumber>,

    /// NOS currently staked
    #[serde(default)]
    pub current_staked_amount: Option<RawNumber>,

    /// Rewards earned in NOS, any disposition
    #[serde(default)]
    pub total_rewards_accrued: Option<RawNumber>,

    /// Rewards earned in USD
    #[serde(default)]
    pub total_rewards_accrued_usd: Option<RawNumber>,

    /// Rewards compounded back into stake, in NOS
    #[serde(default)]
    pub restaked_rewards: Option<RawNumber>,

    #[serde(default)]
    pub restaked_rewards_usd: Option<RawNumber>,

    /// Rewards claimed to the wallet, in NOS
    #[serde(default)]
    pub claimed_rewards: Option<RawNumber>,

    #[serde(default)]
    pub claimed_rewards_usd: Option<RawNumber>,

    /// Realized rewards, in NOS
    #[serde(default)]
    pub realized_rewards: Option<RawNumber>,

    #[serde(default)]
    pub realized_rewards_usd: Option<RawNumber>,

    /// Effective average USD price per NOS held
    #[serde(default)]
    pub effective_average_price: Option<RawNumber>,

    /// USD per NOS over purchases only
    #[serde(default)]
    pub average_purchase_price: Option<RawNumber>,

    /// Total USD spent on purchases
    #[serde(default)]
    pub purchase_cost_usd: Option<RawNumber>,

    /// Total USD received from sales
    #[serde(default)]
    pub sales_proceeds_usd: Option<RawNumber>,

    /// USD cost of the tokens still held
    #[serde(default)]
    pub current_cost_basis_usd: Option<RawNumber>,

    /// NOS held across wallet and stake
    #[serde(default)]
    pub current_tokens_held: Option<RawNumber>,

    /// Value of a dollar-cost-averaged position, in USD
    #[serde(default)]
    pub dca_value: Option<RawNumber>,

    #[serde(default)]
    pub dca_value_with_rewards: Option<RawNumber>,

    /// Oldest event in the wallet history
    #[serde(default)]
    pub first_event_at: Option<RawTimestamp>,

    /// Newest event in the wallet history
    #[serde(default)]
    pub last_event_at: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    #[serde(default)]
    pub average_apr: Option<RawNumber>,
    #[serde(default)]
    pub stake_duration_days: Option<RawNumber>,
    #[serde(default)]
    pub dca_value: Option<RawNumber>,
    #[serde(default)]
    pub dca_value_with_rewards: Option<RawNumber>,
    #[serde(default)]
    pub first_event_at: Option<RawTimestamp>,
    #[serde(default)]
    pub last_event_at: Option<RawTimestamp>,
}

/// Price/APR reference widget snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawWidget {
    #[serde(default, deserialize_with = "lenient_option")]
    pub apr: Option<RawApr>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawApr {
    #[serde(default)]
    pub current: Option<RawNumber>,
    /// Human formatted value such as `"12.5%"`
    #[serde(default)]
    pub display: Option<Value>,
}

/// Snapshot of the wallet's stake account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStakeAccount {
    #[serde(default, deserialize_with = "lenient_option")]
    pub address: Option<String>,
    #[serde(default)]
    pub duration_days: Option<RawNumber>,
}

/// The full staking-analysis response, as handed to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingPayload {
    /// Non-object elements are dropped
    #[serde(default, deserialize_with = "lenient_list")]
    pub events: Option<Vec<RawEvent>>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub aggregates: Option<RawAggregates>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub totals: Option<RawTotals>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub metadata: Option<RawMetadata>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub widget: Option<RawWidget>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub stake_account: Option<RawStakeAccount>,
}

// =============================================================================
// Normalized Events
// =============================================================================

/// Canonical event. Built once by the normalizer and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub id: i64,
    pub signature: String,
    /// `None` when the source timestamp was missing or unparseable
    #[serde(default, with = "iso_or_empty")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Always finite
    pub amount: f64,
    /// Raw cast, may be NaN
    pub price_usd: Option<f64>,
    /// Raw cast, may be NaN
    pub usd_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl NormalizedEvent {
    /// USD value with missing and non-finite values read as zero.
    pub fn usd_value_or_zero(&self) -> f64 {
        finite_or_zero(self.usd_value.unwrap_or(0.0))
    }

    pub fn wallet_delta(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.wallet_delta)
    }

    /// Calendar day (`YYYY-MM-DD`, UTC) of the event, if it is dated.
    pub fn date_key(&self) -> Option<String> {
        self.timestamp.map(|ts| ts.format("%Y-%m-%d").to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<String>,
}

// =============================================================================
// Aggregates
// =============================================================================

/// Running statistics for one event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEntry {
    pub amount: f64,
    pub usd_value: f64,
    pub count: u64,
    pub average_amount: f64,
    pub average_usd_value: f64,
    #[serde(default, with = "iso_or_empty")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, with = "iso_or_empty")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub amount: f64,
    pub usd_value: f64,
    pub net_amount: f64,
    pub net_usd_value: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, with = "iso_or_empty")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, with = "iso_or_empty")]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowAmount {
    pub amount: f64,
    pub usd_value: f64,
}

impl FlowAmount {
    pub fn add(&mut self, amount: f64, usd_value: f64) {
        self.amount += finite_or_zero(amount);
        self.usd_value += finite_or_zero(usd_value);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowCategories {
    pub purchases: FlowAmount,
    pub transfers_in: FlowAmount,
    pub stake_withdrawals: FlowAmount,
    pub sales: FlowAmount,
    pub transfers_out: FlowAmount,
    pub stake_principal_deposits: FlowAmount,
    pub stake_reward_restaked: FlowAmount,
    pub stake_slashes: FlowAmount,
}

/// Wallet-level fund flow.
///
/// `net` is always `wallet_inflow - wallet_outflow`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub wallet_inflow: f64,
    pub wallet_outflow: f64,
    pub wallet_inflow_usd: f64,
    pub wallet_outflow_usd: f64,
    pub net: f64,
    pub net_usd: f64,
    pub categories: FlowCategories,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub by_type: BTreeMap<EventType, AggregateEntry>,
    pub totals: Totals,
    pub range: DateRange,
    pub flow: FlowSummary,
}

impl Aggregates {
    pub fn entry(&self, event_type: &EventType) -> Option<&AggregateEntry> {
        self.by_type.get(event_type)
    }
}

// =============================================================================
// Timeline
// =============================================================================

/// Per-day activity plus running totals through that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDataPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub deposits: f64,
    pub withdrawals: f64,
    pub purchases: f64,
    pub sales: f64,
    pub transfers: f64,
    pub total_volume: f64,
    pub net_flow: f64,
    pub cumulative_deposits: f64,
    pub cumulative_withdrawals: f64,
    pub cumulative_purchases: f64,
    pub cumulative_sales: f64,
    pub cumulative_transfers: f64,
    pub cumulative_total_volume: f64,
    pub cumulative_net_flow: f64,
}

impl TimelineDataPoint {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Performance
// =============================================================================

/// Portfolio performance summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Lifetime NOS staked
    pub total_staked: f64,

    /// Rewards earned, NOS
    pub total_rewards_accrued: f64,

    /// Rewards earned, USD
    pub total_rewards_accrued_usd: f64,

    /// Realized rewards, NOS
    pub realized_rewards: f64,

    /// Realized rewards, USD
    pub realized_rewards_usd: f64,

    /// Rewards compounded into stake, NOS
    pub restaked_rewards: f64,

    /// Rewards compounded into stake, USD
    pub restaked_rewards_usd: f64,

    /// Rewards claimed to the wallet, NOS
    pub claimed_rewards: f64,

    /// Rewards claimed to the wallet, USD
    pub claimed_rewards_usd: f64,

    /// Sales proceeds less the cost of tokens sold, plus realized rewards, USD
    pub realized_pnl: f64,

    /// Current value less cost basis, USD
    pub unrealized_pnl: f64,

    /// Staking APR, percent
    pub average_apr: f64,

    /// Days since the first stake
    pub staking_duration: f64,

    /// NOS deposited into stake
    pub total_deposits: f64,

    /// NOS withdrawn from stake
    pub total_withdrawals: f64,

    /// NOS currently staked
    pub active_stake: f64,

    /// USD cost of tokens still held
    pub cost_basis: f64,

    /// Tokens held at the reference price, or cost basis without one, USD
    pub current_value: f64,

    /// Return on purchase cost, percent
    pub roi: f64,

    /// Dollar-cost-averaged position value, USD
    pub dca_value: f64,

    /// Dollar-cost-averaged position value including rewards, USD
    pub dca_value_with_rewards: f64,
}

impl PerformanceMetrics {
    /// Replaces every non-finite field with zero.
    pub fn sanitized(self) -> Self {
        Self {
            total_staked: finite_or_zero(self.total_staked),
            total_rewards_accrued: finite_or_zero(self.total_rewards_accrued),
            total_rewards_accrued_usd: finite_or_zero(self.total_rewards_accrued_usd),
            realized_rewards: finite_or_zero(self.realized_rewards),
            realized_rewards_usd: finite_or_zero(self.realized_rewards_usd),
            restaked_rewards: finite_or_zero(self.restaked_rewards),
            restaked_rewards_usd: finite_or_zero(self.restaked_rewards_usd),
            claimed_rewards: finite_or_zero(self.claimed_rewards),
            claimed_rewards_usd: finite_or_zero(self.claimed_rewards_usd),
            realized_pnl: finite_or_zero(self.realized_pnl),
            unrealized_pnl: finite_or_zero(self.unrealized_pnl),
            average_apr: finite_or_zero(self.average_apr),
            staking_duration: finite_or_zero(self.staking_duration),
            total_deposits: finite_or_zero(self.total_deposits),
            total_withdrawals: finite_or_zero(self.total_withdrawals),
            active_stake: finite_or_zero(self.active_stake),
            cost_basis: finite_or_zero(self.cost_basis),
            current_value: finite_or_zero(self.current_value),
            roi: finite_or_zero(self.roi),
            dca_value: finite_or_zero(self.dca_value),
            dca_value_with_rewards: finite_or_zero(self.dca_value_with_rewards),
        }
    }
}

// =============================================================================
// Pipeline Output
// =============================================================================

/// Everything the rendering layer needs for one payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingAnalytics {
    pub events: Vec<NormalizedEvent>,
    pub aggregates: Aggregates,
    pub timeline: Vec<TimelineDataPoint>,
    pub performance: PerformanceMetrics,
}
