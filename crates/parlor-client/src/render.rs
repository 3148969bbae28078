use std::fmt::Write;

use chrono::{DateTime, TimeZone};

use parlor_sync::{SearchStatus, StoreState, ViewSnapshot};
use parlor_types::{Message, MessageBody, UserIdentity};

/// Format a snapshot as terminal text: header, then one line per message.
pub fn render<Tz: TimeZone>(snapshot: &ViewSnapshot, me: &UserIdentity, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();

    let Some(channel) = &snapshot.channel else {
        out.push_str("-- not in a channel (/join <channel>) --\n");
        return out;
    };

    // channels have no title of their own; the id is the name
    let _ = write!(
        out,
        "-- {} | {}",
        channel.display_name(channel.channel_id.as_str()),
        snapshot.participant_label()
    );
    if let Some(query) = &snapshot.query {
        let status = match snapshot.search_status {
            SearchStatus::Loading => "searching...",
            _ => "done",
        };
        let _ = write!(
            out,
            " | search \"{}\": {} of {} ({})",
            query,
            snapshot.messages.len(),
            snapshot.live_count,
            status
        );
    }
    out.push_str(" --\n");

    match snapshot.state {
        StoreState::Loading if snapshot.messages.is_empty() => out.push_str("   loading...\n"),
        StoreState::Idle => out.push_str("   (unavailable)\n"),
        _ => {
            for message in snapshot.messages.read().iter() {
                out.push_str(&message_line(message, me, tz));
                out.push('\n');
            }
        }
    }
    out
}

fn message_line<Tz: TimeZone>(message: &Message, me: &UserIdentity, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let time = DateTime::from_timestamp_millis(message.timestamp.0)
        .map(|t| t.with_timezone(tz).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let marker = if message.is_from(me) { '*' } else { ' ' };
    let body = match &message.body {
        MessageBody::Text(text) => text.clone(),
        MessageBody::Media(url) => format!("[image] {}", url),
    };
    format!("{} [{}] {}: {}", marker, time, message.author.name, body)
}
