use crate::error::ConfigError;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Notification destination. Each channel is routed to at most one
/// [`Sink`](super::dispatch::Sink).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[display("funding_rate")]
    FundingRate,
    #[display("position")]
    Position,
    #[display("price_alert")]
    PriceAlert,
    #[display("swing_strategy")]
    SwingStrategy,
    #[display("default")]
    Default,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::FundingRate,
        Channel::Position,
        Channel::PriceAlert,
        Channel::SwingStrategy,
        Channel::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::FundingRate => "funding_rate",
            Channel::Position => "position",
            Channel::PriceAlert => "price_alert",
            Channel::SwingStrategy => "swing_strategy",
            Channel::Default => "default",
        }
    }
}

impl FromStr for Channel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase();
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == normalised)
            .ok_or(ConfigError::UnknownChannel(normalised))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_and_display() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
            assert_eq!(channel.to_string(), channel.as_str());
            assert_eq!(
                serde_json::to_string(&channel).unwrap(),
                format!("\"{}\"", channel.as_str())
            );
        }

        assert_eq!("  PRICE_ALERT ".parse::<Channel>().unwrap(), Channel::PriceAlert);
        assert_eq!(
            "telegram".parse::<Channel>(),
            Err(ConfigError::UnknownChannel("telegram".to_string()))
        );
    }
}
