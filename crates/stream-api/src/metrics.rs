use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;

use stream_core::LiveState;

use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(2048);
    let id = state.monitor.broadcaster_id();
    let status = state.monitor.status().await;
    let stats = state.monitor.stats().await;

    writeln!(out, "# TYPE stream_events_info info").unwrap();
    writeln!(out, "# HELP stream_events_info Information about the monitored channel").unwrap();
    writeln!(
        out,
        "stream_events_info{{broadcaster_id=\"{}\",created=\"{}\"}} 1",
        id,
        state.monitor.created_at().to_rfc3339()
    )
    .unwrap();

    writeln!(out, "# TYPE stream_events_live gauge").unwrap();
    writeln!(out, "# HELP stream_events_live Whether the channel is believed live").unwrap();
    writeln!(
        out,
        "stream_events_live{{broadcaster_id=\"{}\"}} {}",
        id,
        if status.state == LiveState::Online { 1 } else { 0 }
    )
    .unwrap();

    writeln!(out, "# TYPE stream_events_stream_uptime_seconds gauge").unwrap();
    writeln!(
        out,
        "# HELP stream_events_stream_uptime_seconds Time since the current stream started"
    )
    .unwrap();
    if let Some(started) = status.started_at {
        let secs = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
        writeln!(
            out,
            "stream_events_stream_uptime_seconds{{broadcaster_id=\"{}\"}} {:.3}",
            id, secs
        )
        .unwrap();
    }

    writeln!(out, "# TYPE stream_events_subscribers gauge").unwrap();
    writeln!(out, "# HELP stream_events_subscribers Connected push-channel clients").unwrap();
    writeln!(out, "stream_events_subscribers {}", state.clients.len()).unwrap();

    writeln!(out, "# TYPE stream_events_batches counter").unwrap();
    writeln!(out, "# HELP stream_events_batches Stream notifications processed").unwrap();
    writeln!(
        out,
        "stream_events_batches_total{{broadcaster_id=\"{}\"}} {}",
        id, stats.batches
    )
    .unwrap();

    writeln!(out, "# TYPE stream_events_follow_notifications counter").unwrap();
    writeln!(
        out,
        "# HELP stream_events_follow_notifications Follower notifications processed"
    )
    .unwrap();
    writeln!(
        out,
        "stream_events_follow_notifications_total{{broadcaster_id=\"{}\"}} {}",
        id, stats.follow_notifications
    )
    .unwrap();

    writeln!(out, "# TYPE stream_events_malformed_records counter").unwrap();
    writeln!(
        out,
        "# HELP stream_events_malformed_records Records skipped because they could not be decoded"
    )
    .unwrap();
    writeln!(
        out,
        "stream_events_malformed_records_total{{broadcaster_id=\"{}\"}} {}",
        id, stats.malformed_records
    )
    .unwrap();

    writeln!(out, "# TYPE stream_events_emitted counter").unwrap();
    writeln!(out, "# HELP stream_events_emitted Messages pushed downstream by name").unwrap();
    let mut emitted: Vec<_> = stats.emitted.iter().collect();
    emitted.sort();
    for (event, count) in emitted {
        writeln!(
            out,
            "stream_events_emitted_total{{broadcaster_id=\"{}\",event=\"{}\"}} {}",
            id, event, count
        )
        .unwrap();
    }

    if let Some(leases) = &state.leases {
        writeln!(out, "# TYPE stream_events_lease_renewals counter").unwrap();
        writeln!(
            out,
            "# HELP stream_events_lease_renewals Hub subscribe attempts by topic and outcome"
        )
        .unwrap();
        let mut counts: Vec<_> = leases.snapshot().await.into_iter().collect();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        for (topic, c) in &counts {
            for (outcome, n) in [("success", c.successes), ("failure", c.failures)] {
                writeln!(
                    out,
                    "stream_events_lease_renewals_total{{topic=\"{}\",outcome=\"{}\"}} {}",
                    topic, outcome, n
                )
                .unwrap();
            }
        }
    }

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}
