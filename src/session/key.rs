use std::fmt;

/// Identity of one in-flight mention: the channel, the timestamp of the
/// mention message and the mentioning user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub channel: String,
    pub ts: String,
    pub user: String,
}

impl ConversationKey {
    pub fn new(
        channel: impl Into<String>,
        ts: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            ts: ts.into(),
            user: user.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.channel, self.ts, self.user)
    }
}
