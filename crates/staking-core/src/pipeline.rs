//! End-to-end analytics pipeline
//!
//! One call per payload: normalize, then aggregates and timeline from the
//! normalized events, then performance on top of the aggregates.

use serde_json::Value;

use crate::aggregate::build_aggregates;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{StakingAnalytics, StakingPayload};
use crate::normalize::normalize_events;
use crate::performance::{build_performance_metrics, PerformanceInputs};
use crate::timeline::build_timeline_data;

/// Run every stage over one payload.
///
/// Pure and deterministic: the same payload always yields the same output.
pub fn analyze(payload: &StakingPayload) -> StakingAnalytics {
    let events = normalize_events(payload.events.as_deref().unwrap_or_default());
    let aggregates = build_aggregates(payload.aggregates.as_ref(), &events);
    let timeline = build_timeline_data(&events);

    let performance = build_performance_metrics(&PerformanceInputs {
        totals: payload.totals.as_ref(),
        metadata: payload.metadata.as_ref(),
        aggregates: &aggregates,
        widget: payload.widget.as_ref(),
        events: &events,
        stake_account: payload.stake_account.as_ref(),
    });

    tracing::debug!(
        events = events.len(),
        types = aggregates.by_type.len(),
        days = timeline.len(),
        precomputed = payload.aggregates.is_some(),
        "Staking analytics built"
    );

    StakingAnalytics {
        events,
        aggregates,
        timeline,
        performance,
    }
}

/// Parse a staking-analysis API response.
///
/// Only unreadable JSON is an error. A well-formed document of the wrong
/// shape yields an empty payload, and mistyped fields inside it read as
/// absent.
pub fn parse_payload(json: &str) -> AnalyticsResult<StakingPayload> {
    if json.trim().is_empty() {
        return Err(AnalyticsError::EmptyPayload);
    }
    let value: Value = serde_json::from_str(json)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Payload is not an object, analyzing as empty");
        StakingPayload::default()
    }))
}

/// Serialize analytics for the rendering layer.
pub fn to_json(analytics: &StakingAnalytics, pretty: bool) -> AnalyticsResult<String> {
    let json = if pretty {
        serde_json::to_string_pretty(analytics)?
    } else {
        serde_json::to_string(analytics)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_text_is_rejected() {
        assert!(matches!(parse_payload("  \n"), Err(AnalyticsError::EmptyPayload)));
        assert!(matches!(parse_payload("{"), Err(AnalyticsError::Json(_))));
    }

    #[test]
    fn test_non_object_payload_is_empty() {
        for json in ["[]", "42", "null", "\"events\""] {
            let payload = parse_payload(json).unwrap();
            assert!(payload.events.is_none(), "{}", json);
            assert!(analyze(&payload).events.is_empty());
        }
    }

    #[test]
    fn test_empty_object_payload() {
        let payload = parse_payload("{}").unwrap();
        let analytics = analyze(&payload);
        assert!(analytics.events.is_empty());
        assert!(analytics.timeline.is_empty());
        assert_eq!(analytics.aggregates.totals.count, 0);
        assert_eq!(analytics.performance.roi, 0.0);
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let payload = parse_payload(
            r#"{"events": [
                {"id": 1, "type": "purchase", "amount": 5, "usdValue": 2,
                 "timestamp": "2024-01-01T00:00:00Z"},
                {"id": 2, "type": "sale", "amount": "1", "timestamp": 1704153600000}
            ]}"#,
        )
        .unwrap();

        let first = to_json(&analyze(&payload), false).unwrap();
        let second = to_json(&analyze(&payload), false).unwrap();
        assert_eq!(first, second);
    }
}
