use serde::Deserialize;

/// Outer Events API payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event: InnerEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InnerEvent {
    AppMention(AppMention),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppMention {
    pub user: String,
    pub text: String,
    pub ts: String,
    pub channel: String,
    /// Set when the mention was made inside an existing thread
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl AppMention {
    /// Thread that replies belong in
    pub fn reply_thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// Everything after the leading mention token, trimmed
    pub fn prompt(&self) -> &str {
        prompt_from_mention(&self.text)
    }
}

/// `"<@U123> what time is it"` yields `"what time is it"`. Text with no
/// whitespace yields an empty prompt.
pub fn prompt_from_mention(text: &str) -> &str {
    text.split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_from_mention() {
        assert_eq!(prompt_from_mention("<@U1> what's up?"), "what's up?");
        assert_eq!(prompt_from_mention("<@U1>\n  multi\nline "), "multi\nline");
        assert_eq!(prompt_from_mention("<@U1>"), "");
        assert_eq!(prompt_from_mention("<@U1>   "), "");
    }

    #[test]
    fn test_parse_url_verification() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "token": "x", "challenge": "abc123", "type": "url_verification"
        }))
        .unwrap();
        assert_eq!(
            envelope,
            EventEnvelope::UrlVerification {
                challenge: "abc123".into()
            }
        );
    }

    #[test]
    fn test_parse_app_mention_in_thread() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": {
                "type": "app_mention",
                "user": "U1",
                "text": "<@UBOT> summarize",
                "ts": "2.0",
                "thread_ts": "1.0",
                "channel": "C1",
                "event_ts": "2.0"
            }
        }))
        .unwrap();
        let EventEnvelope::EventCallback {
            event: InnerEvent::AppMention(mention),
        } = envelope
        else {
            panic!("expected app_mention");
        };
        assert_eq!(mention.reply_thread(), "1.0");
        assert_eq!(mention.prompt(), "summarize");
    }

    #[test]
    fn test_other_events_are_tolerated() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "type": "event_callback",
            "event": {"type": "message", "text": "hi"}
        }))
        .unwrap();
        assert_eq!(
            envelope,
            EventEnvelope::EventCallback {
                event: InnerEvent::Other
            }
        );
        let envelope: EventEnvelope =
            serde_json::from_value(json!({"type": "app_rate_limited"})).unwrap();
        assert_eq!(envelope, EventEnvelope::Other);
    }
}
