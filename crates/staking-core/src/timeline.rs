//! Daily and cumulative activity series

use std::collections::BTreeMap;

use crate::models::{EventType, NormalizedEvent, TimelineDataPoint};

/// Bucket events by UTC calendar day, oldest day first.
///
/// Undated events are skipped. Transfers count toward `transfers` but are
/// neutral for `net_flow`; unknown types only add to `total_volume`.
pub fn build_timeline_data(events: &[NormalizedEvent]) -> Vec<TimelineDataPoint> {
    let mut days: BTreeMap<String, TimelineDataPoint> = BTreeMap::new();

    for event in events {
        let Some(date) = event.date_key() else {
            continue;
        };

        let point = days
            .entry(date)
            .or_insert_with_key(|date| TimelineDataPoint::new(date.as_str()));
        let amount = event.amount;

        match event.event_type {
            EventType::StakeDeposit => {
                point.deposits += amount;
                point.net_flow -= amount;
            }
            EventType::StakeWithdrawal => {
                point.withdrawals += amount;
                point.net_flow += amount;
            }
            EventType::Purchase => {
                point.purchases += amount;
                point.net_flow += amount;
            }
            EventType::Sale => {
                point.sales += amount;
                point.net_flow -= amount;
            }
            EventType::TransferIn | EventType::TransferOut => {
                point.transfers += amount;
            }
            EventType::StakeSlash | EventType::Other(_) => {}
        }

        point.total_volume += amount;
    }

    // `YYYY-MM-DD` keys sort lexicographically in date order.
    let mut timeline: Vec<TimelineDataPoint> = days.into_values().collect();
    accumulate(&mut timeline);

    tracing::debug!(days = timeline.len(), "Timeline built");

    timeline
}

/// Fill every `cumulative_*` field with the running total through that day.
fn accumulate(timeline: &mut [TimelineDataPoint]) {
    let mut running = TimelineDataPoint::default();

    for point in timeline.iter_mut() {
        running.deposits += point.deposits;
        running.withdrawals += point.withdrawals;
        running.purchases += point.purchases;
        running.sales += point.sales;
        running.transfers += point.transfers;
        running.total_volume += point.total_volume;
        running.net_flow += point.net_flow;

        point.cumulative_deposits = running.deposits;
        point.cumulative_withdrawals = running.withdrawals;
        point.cumulative_purchases = running.purchases;
        point.cumulative_sales = running.sales;
        point.cumulative_transfers = running.transfers;
        point.cumulative_total_volume = running.total_volume;
        point.cumulative_net_flow = running.net_flow;
    }
}
