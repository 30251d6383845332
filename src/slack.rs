//! Slack integration: Web API client, Events API payloads and request signing

mod client;
mod events;
mod signature;

pub use client::{SlackClient, SlackUser};
pub use events::{AppMention, EventEnvelope, InnerEvent};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
