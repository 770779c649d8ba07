//! Topic addressing for the highway toll network
//!
//! Two grammars share the `highway/` prefix:
//! - booth-scoped: `highway/{tollboothId}/{direction}/{channel}/{leaf}`
//! - global:       `highway/requests/{leaf}` (the pricing service)
//!
//! Parsing is purely syntactic. Whether a booth-scoped address belongs to
//! "this" tollbooth is the subscriber's decision, not the parser's.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First segment of every topic in the network
pub const TOPIC_PREFIX: &str = "highway";

/// Global address of the toll-price responder
pub const TOLLPRICE_REQUESTS: &str = "highway/requests/tollprice";

/// Wildcard subscription filters (`+` matches one segment)
pub mod filters {
    pub const ENTRY_COMMANDS: &str = "highway/+/entry/+/commands";
    pub const EXIT_COMMANDS: &str = "highway/+/exit/+/commands";
    pub const ENTRY_EVENTS: &str = "highway/+/entry/+/events";
    pub const EXIT_EVENTS: &str = "highway/+/exit/+/events";
    pub const CAMERA_REQUESTS: &str = "highway/+/+/camera/requests";
    pub const STATE: &str = "highway/+/+/+/state";
}

/// Errors in topic handling
#[derive(Debug, Error)]
pub enum TopicError {
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}

/// Travel direction through a tollbooth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Entry => write!(f, "entry"),
            Direction::Exit => write!(f, "exit"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Direction::Entry),
            "exit" => Ok(Direction::Exit),
            _ => Err(TopicError::InvalidTopic(s.to_string())),
        }
    }
}

/// Lane technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Ticket-based lane
    Manual,
    /// Automated-tag lane
    Telepass,
    /// Plate-recognition service
    Camera,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Manual => write!(f, "manual"),
            Channel::Telepass => write!(f, "telepass"),
            Channel::Camera => write!(f, "camera"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Channel::Manual),
            "telepass" => Ok(Channel::Telepass),
            "camera" => Ok(Channel::Camera),
            _ => Err(TopicError::InvalidTopic(s.to_string())),
        }
    }
}

/// Final topic segment, selecting the message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf {
    Commands,
    Events,
    Responses,
    State,
    Requests,
}

impl std::fmt::Display for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leaf::Commands => write!(f, "commands"),
            Leaf::Events => write!(f, "events"),
            Leaf::Responses => write!(f, "responses"),
            Leaf::State => write!(f, "state"),
            Leaf::Requests => write!(f, "requests"),
        }
    }
}

impl std::str::FromStr for Leaf {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commands" => Ok(Leaf::Commands),
            "events" => Ok(Leaf::Events),
            "responses" => Ok(Leaf::Responses),
            "state" => Ok(Leaf::State),
            "requests" => Ok(Leaf::Requests),
            _ => Err(TopicError::InvalidTopic(s.to_string())),
        }
    }
}

/// Parsed topic address (either grammar)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicAddress {
    /// `highway/{tollboothId}/{direction}/{channel}/{leaf}`
    Booth {
        tollbooth_id: String,
        direction: Direction,
        channel: Channel,
        leaf: Leaf,
    },
    /// `highway/requests/{leaf}`, e.g. `highway/requests/tollprice`
    Global { leaf: String },
}

impl TopicAddress {
    /// Parse a topic string into a structured address.
    ///
    /// Wrong prefix, wrong segment count, or an unknown
    /// direction/channel/leaf value all fail with [`TopicError::InvalidTopic`].
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let parts: Vec<&str> = topic.split('/').collect();

        if parts.len() < 2 || parts[0] != TOPIC_PREFIX {
            return Err(TopicError::InvalidTopic(topic.to_string()));
        }

        // Global form: highway/requests/{leaf}
        if parts.len() == 3 && parts[1] == "requests" {
            return Ok(TopicAddress::Global {
                leaf: parts[2].to_string(),
            });
        }

        if parts.len() != 5 {
            return Err(TopicError::InvalidTopic(topic.to_string()));
        }

        Ok(TopicAddress::Booth {
            tollbooth_id: parts[1].to_string(),
            direction: parts[2]
                .parse()
                .map_err(|_| TopicError::InvalidTopic(topic.to_string()))?,
            channel: parts[3]
                .parse()
                .map_err(|_| TopicError::InvalidTopic(topic.to_string()))?,
            leaf: parts[4]
                .parse()
                .map_err(|_| TopicError::InvalidTopic(topic.to_string()))?,
        })
    }
}

impl std::fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicAddress::Booth {
                tollbooth_id,
                direction,
                channel,
                leaf,
            } => write!(
                f,
                "{}/{}/{}/{}/{}",
                TOPIC_PREFIX, tollbooth_id, direction, channel, leaf
            ),
            TopicAddress::Global { leaf } => write!(f, "{}/requests/{}", TOPIC_PREFIX, leaf),
        }
    }
}

/// Build a booth-scoped topic for the given leaf
pub fn booth_topic(tollbooth_id: &str, direction: Direction, channel: Channel, leaf: Leaf) -> String {
    format!("{}/{}/{}/{}/{}", TOPIC_PREFIX, tollbooth_id, direction, channel, leaf)
}

/// `highway/{id}/{direction}/{channel}/commands`
pub fn commands_topic(tollbooth_id: &str, direction: Direction, channel: Channel) -> String {
    booth_topic(tollbooth_id, direction, channel, Leaf::Commands)
}

/// `highway/{id}/{direction}/{channel}/events`
pub fn events_topic(tollbooth_id: &str, direction: Direction, channel: Channel) -> String {
    booth_topic(tollbooth_id, direction, channel, Leaf::Events)
}

/// `highway/{id}/{direction}/{channel}/responses`
pub fn responses_topic(tollbooth_id: &str, direction: Direction, channel: Channel) -> String {
    booth_topic(tollbooth_id, direction, channel, Leaf::Responses)
}

/// `highway/{id}/{direction}/{channel}/state`
pub fn state_topic(tollbooth_id: &str, direction: Direction, channel: Channel) -> String {
    booth_topic(tollbooth_id, direction, channel, Leaf::State)
}

/// `highway/{id}/{direction}/camera/requests`
pub fn camera_requests_topic(tollbooth_id: &str, direction: Direction) -> String {
    booth_topic(tollbooth_id, direction, Channel::Camera, Leaf::Requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_booth_topic() {
        let addr = TopicAddress::parse("highway/MI/entry/telepass/commands").unwrap();
        assert_eq!(
            addr,
            TopicAddress::Booth {
                tollbooth_id: "MI".to_string(),
                direction: Direction::Entry,
                channel: Channel::Telepass,
                leaf: Leaf::Commands,
            }
        );
    }

    #[test]
    fn test_parse_global_topic() {
        let addr = TopicAddress::parse("highway/requests/tollprice").unwrap();
        assert_eq!(
            addr,
            TopicAddress::Global {
                leaf: "tollprice".to_string()
            }
        );
    }

    #[test]
    fn test_roundtrip_all_booth_forms() {
        for dir in [Direction::Entry, Direction::Exit] {
            for ch in [Channel::Manual, Channel::Telepass, Channel::Camera] {
                for leaf in [
                    Leaf::Commands,
                    Leaf::Events,
                    Leaf::Responses,
                    Leaf::State,
                    Leaf::Requests,
                ] {
                    let topic = booth_topic("TO_Nord", dir, ch, leaf);
                    let parsed = TopicAddress::parse(&topic).unwrap();
                    assert_eq!(parsed.to_string(), topic);
                }
            }
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TopicAddress::parse("").is_err());
        assert!(TopicAddress::parse("highway").is_err());
        assert!(TopicAddress::parse("freeway/MI/entry/manual/commands").is_err());
        assert!(TopicAddress::parse("highway/MI/entry/manual").is_err());
        assert!(TopicAddress::parse("highway/MI/entry/manual/commands/extra").is_err());
        assert!(TopicAddress::parse("highway/MI/sideways/manual/commands").is_err());
        assert!(TopicAddress::parse("highway/MI/entry/bicycle/commands").is_err());
        assert!(TopicAddress::parse("highway/MI/entry/manual/junk").is_err());
    }

    #[test]
    fn test_global_needs_requests_segment() {
        // 3 segments without the `requests` marker is not the global form
        assert!(TopicAddress::parse("highway/MI/tollprice").is_err());
    }

    #[test]
    fn test_topic_helpers() {
        assert_eq!(
            camera_requests_topic("MI", Direction::Entry),
            "highway/MI/entry/camera/requests"
        );
        assert_eq!(
            responses_topic("MI", Direction::Exit, Channel::Manual),
            "highway/MI/exit/manual/responses"
        );
    }
}
