//! End-to-end tests: API payload JSON in, rendered analytics JSON out.

use serde_json::json;
use staking_core::{analyze, parse_payload, to_json, EventType, StakingPayload};

fn scenario_payload() -> StakingPayload {
    let payload = json!({
        "events": [
            {
                "id": 1,
                "signature": "sig-purchase",
                "type": "purchase",
                "amount": 100,
                "usdValue": 50,
                "priceUsd": null,
                "timestamp": "2024-01-02T00:00:00Z"
            },
            {
                "id": 2,
                "signature": "sig-deposit",
                "type": "stake_deposit",
                "amount": 80,
                "usdValue": 40,
                "timestamp": "2024-01-03T00:00:00Z",
                "metadata": { "walletDelta": -80 }
            },
            {
                "id": 3,
                "signature": "sig-withdrawal",
                "type": "stake_withdrawal",
                "amount": 20,
                "usdValue": 12,
                "timestamp": "2024-01-04T00:00:00Z"
            }
        ]
    });
    parse_payload(&payload.to_string()).expect("valid payload")
}

#[test]
fn test_scenario_normalized_order() {
    let analytics = analyze(&scenario_payload());
    let types: Vec<&EventType> = analytics.events.iter().map(|e| &e.event_type).collect();
    assert_eq!(
        types,
        vec![
            &EventType::StakeWithdrawal,
            &EventType::StakeDeposit,
            &EventType::Purchase
        ]
    );
}

#[test]
fn test_scenario_aggregates_and_flow() {
    let analytics = analyze(&scenario_payload());
    let aggregates = &analytics.aggregates;

    assert_eq!(aggregates.totals.amount, 200.0);
    assert_eq!(aggregates.totals.usd_value, 102.0);
    assert_eq!(aggregates.totals.count, analytics.events.len() as u64);
    assert_eq!(aggregates.totals.net_amount, 40.0);

    let flow = &aggregates.flow;
    assert_eq!(flow.categories.stake_principal_deposits.amount, 80.0);
    assert_eq!(flow.categories.stake_reward_restaked.amount, 0.0);
    assert_eq!(flow.wallet_outflow, 80.0);
    assert_eq!(flow.net, flow.wallet_inflow - flow.wallet_outflow);
    assert_eq!(flow.net, -80.0);

    assert_eq!(aggregates.range.start, analytics.events[2].timestamp);
    assert_eq!(aggregates.range.end, analytics.events[0].timestamp);
}

#[test]
fn test_scenario_timeline_chain() {
    let analytics = analyze(&scenario_payload());
    let timeline = &analytics.timeline;
    assert_eq!(timeline.len(), 3);

    assert_eq!(timeline[0].date, "2024-01-02");
    assert_eq!(timeline[0].purchases, 100.0);
    assert_eq!(timeline[0].cumulative_net_flow, 100.0);

    assert_eq!(timeline[1].date, "2024-01-03");
    assert_eq!(timeline[1].deposits, 80.0);
    assert_eq!(timeline[1].net_flow, -80.0);
    assert_eq!(timeline[1].cumulative_net_flow, 20.0);

    assert_eq!(timeline[2].date, "2024-01-04");
    assert_eq!(timeline[2].withdrawals, 20.0);
    assert_eq!(timeline[2].net_flow, 20.0);
    assert_eq!(timeline[2].cumulative_net_flow, 40.0);
    assert_eq!(timeline[2].cumulative_deposits, 80.0);
}

#[test]
fn test_scenario_performance_from_events_only() {
    let performance = analyze(&scenario_payload()).performance;

    assert_eq!(performance.total_deposits, 80.0);
    assert_eq!(performance.total_withdrawals, 20.0);
    assert_eq!(performance.active_stake, 60.0);
    assert_eq!(performance.cost_basis, 50.0);
    // No price known anywhere: valued at cost.
    assert_eq!(performance.current_value, 50.0);
    assert_eq!(performance.roi, 0.0);
    assert_eq!(performance.staking_duration, 2.0);
}

#[test]
fn test_full_payload_with_snapshots() {
    let payload = json!({
        "events": [
            {
                "id": "1", "type": "purchase", "amount": "100", "usdValue": "50",
                "timestamp": "2024-01-02"
            },
            {
                "id": 2, "type": "stake_withdrawal", "amount": 20, "priceUsd": 0.6,
                "timestamp": 1704326400000u64
            },
            { "id": 3, "type": "airdrop", "amount": 5, "timestamp": null }
        ],
        "totals": { "purchaseCostUsd": 50, "effectiveAveragePrice": 0.4 },
        "metadata": { "averageApr": null },
        "widget": { "apr": { "current": null, "display": "7.5 %" } },
        "stakeAccount": { "address": "stake-1", "durationDays": 30 }
    });
    let analytics = analyze(&parse_payload(&payload.to_string()).unwrap());

    // Undated unknown event sorts last but is still aggregated.
    assert_eq!(analytics.events[2].event_type, EventType::from("airdrop"));
    assert_eq!(analytics.events[2].timestamp, None);
    assert_eq!(
        analytics
            .aggregates
            .entry(&EventType::from("airdrop"))
            .map(|e| e.count),
        Some(1)
    );
    assert_eq!(analytics.timeline.len(), 2);

    let performance = &analytics.performance;
    // Freshest event price (0.6) beats the totals average (0.4).
    assert!((performance.current_value - 60.0).abs() < 1e-9);
    assert!((performance.unrealized_pnl - 10.0).abs() < 1e-9);
    assert!((performance.roi - 20.0).abs() < 1e-9);
    assert_eq!(performance.average_apr, 7.5);
    assert_eq!(performance.staking_duration, 30.0);
}

#[test]
fn test_rendered_json_shape() {
    let analytics = analyze(&scenario_payload());
    let rendered: serde_json::Value =
        serde_json::from_str(&to_json(&analytics, true).unwrap()).unwrap();

    assert_eq!(rendered["events"][0]["timestamp"], "2024-01-04T00:00:00.000Z");
    assert_eq!(rendered["events"][0]["type"], "stake_withdrawal");
    assert!(rendered["events"][0].get("metadata").is_none());
    assert_eq!(rendered["events"][1]["metadata"]["walletDelta"], -80.0);
    assert_eq!(
        rendered["aggregates"]["byType"]["stake_slash"]["firstSeen"],
        ""
    );
    assert_eq!(
        rendered["aggregates"]["flow"]["categories"]["stakePrincipalDeposits"]["amount"],
        80.0
    );
    assert_eq!(rendered["timeline"][2]["cumulativeNetFlow"], 40.0);
    assert!(rendered["performance"]["roi"].is_number());
}

#[test]
fn test_mistyped_side_fields_read_as_absent() {
    let payload = json!({
        "events": [
            { "id": 1, "type": "purchase", "amount": 10, "timestamp": "2024-01-02" },
            null,
            "not-an-event",
            { "id": 2, "type": "sale", "amount": 4, "timestamp": "2024-03", "metadata": 7 }
        ],
        "aggregates": { "byType": { "sale": null, "purchase": { "amount": 99 } }, "range": 3 },
        "totals": "broken",
        "metadata": [1, 2],
        "widget": { "apr": 12 },
        "stakeAccount": { "address": 5, "durationDays": 14 }
    });
    let parsed = parse_payload(&payload.to_string()).expect("shape errors are not fatal");

    assert_eq!(parsed.events.as_ref().map(Vec::len), Some(2));
    assert!(parsed.totals.is_none());
    assert!(parsed.metadata.is_none());
    assert!(parsed.widget.as_ref().is_some_and(|w| w.apr.is_none()));
    let stake_account = parsed.stake_account.as_ref().expect("stake account kept");
    assert!(stake_account.address.is_none());

    let analytics = analyze(&parsed);
    assert_eq!(analytics.events.len(), 2);
    assert!(analytics.events[0].metadata.is_none());

    // Only the well-formed precomputed entry survives; the rest is derived.
    let aggregates = &analytics.aggregates;
    assert_eq!(aggregates.entry(&EventType::Purchase).map(|e| e.amount), Some(99.0));
    assert_eq!(aggregates.entry(&EventType::Sale).map(|e| e.count), Some(0));
    assert_eq!(
        aggregates.range.end,
        analytics.events[0].timestamp,
        "range falls back to the events"
    );

    // "2024-03" is dated, so it lands on its own day.
    let dates: Vec<&str> = analytics.timeline.iter().map(|p| p.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-01-02", "2024-03-01"]);

    assert_eq!(analytics.performance.average_apr, 0.0);
    assert_eq!(analytics.performance.staking_duration, 14.0);
}
