use self::channel::Channel;
use serde::{Deserialize, Serialize};

/// Notification [`Channel`] enumeration.
pub mod channel;

/// [`Sink`](dispatch::Sink) abstraction and the channel routing [`Dispatcher`](dispatch::Dispatcher).
pub mod dispatch;

/// Fixed-width table rendering of rankings.
pub mod format;

/// Outbound alert payload.
///
/// `description` carries the rendered table (or free text) and, together with `title` and
/// `channel`, forms the de-duplication fingerprint. `fields` are optional structured extras.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Notification {
    pub channel: Channel,
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
}

impl Notification {
    pub fn new(channel: Channel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            channel,
            title: title.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}
