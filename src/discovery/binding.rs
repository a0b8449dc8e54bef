//! Pure parsing of the connection binding file
//!
//! The file maps a topic to a broker address, one `topic=address` pair per
//! line. Only the first pair is used, but every line is validated so that a
//! broken file fails loudly instead of half-working.

use super::DiscoveryError;
use serde::Serialize;
use std::fmt;

/// One parsed `topic=address` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingEntry {
    /// 1-based line number in the source file
    pub line: usize,
    pub topic: String,
    pub address: String,
}

/// Topic the device publishes on, split into its two segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicBinding {
    pub topic: String,
    pub component: String,
    pub component_id: String,
}

impl TopicBinding {
    /// Split `component/component_id`; anything but exactly two non-empty
    /// segments is rejected.
    pub fn parse(topic: &str) -> Result<Self, DiscoveryError> {
        let segments: Vec<&str> = topic.split('/').collect();
        match segments.as_slice() {
            [component, component_id] if !component.is_empty() && !component_id.is_empty() => {
                Ok(Self {
                    topic: topic.to_string(),
                    component: component.to_string(),
                    component_id: component_id.to_string(),
                })
            }
            _ => Err(DiscoveryError::InvalidTopic {
                topic: topic.to_string(),
                reason: format!(
                    "expected exactly one '/' separating component and id, found {}",
                    segments.len().saturating_sub(1)
                ),
            }),
        }
    }
}

impl fmt::Display for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic)
    }
}

/// Broker network location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse every binding line, preserving file order. Blank lines are skipped.
pub fn parse_bindings(content: &str) -> Result<Vec<BindingEntry>, DiscoveryError> {
    let mut entries = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        entries.push(parse_line(line, raw)?);
    }

    Ok(entries)
}

fn parse_line(line: usize, raw: &str) -> Result<BindingEntry, DiscoveryError> {
    let pair: Vec<&str> = raw.split('=').collect();
    let (topic, address) = match pair.as_slice() {
        [topic, address] => (topic.trim(), address.trim()),
        _ => {
            return Err(DiscoveryError::Malformed {
                line,
                reason: format!(
                    "expected 'topic=address', found {} '=' separators",
                    pair.len() - 1
                ),
            })
        }
    };

    if topic.is_empty() {
        return Err(DiscoveryError::Malformed {
            line,
            reason: "empty topic".to_string(),
        });
    }
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return Err(DiscoveryError::Malformed {
            line,
            reason: format!("invalid broker address '{address}'"),
        });
    }

    Ok(BindingEntry {
        line,
        topic: topic.to_string(),
        address: address.to_string(),
    })
}

/// Pick the active binding: the first entry wins.
pub fn select_binding(
    entries: &[BindingEntry],
    port: u16,
) -> Result<(TopicBinding, BrokerAddress), DiscoveryError> {
    let first = entries.first().ok_or(DiscoveryError::NoBindings)?;
    let binding = TopicBinding::parse(&first.topic)?;
    Ok((binding, BrokerAddress::new(first.address.clone(), port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_line() {
        let entries = parse_bindings("sensor/dev01=10.0.0.5\n").unwrap();
        assert_eq!(
            entries,
            vec![BindingEntry {
                line: 1,
                topic: "sensor/dev01".to_string(),
                address: "10.0.0.5".to_string(),
            }]
        );
    }

    #[test]
    fn test_whitespace_trimmed() {
        let entries = parse_bindings("  sensor/dev01 =  10.0.0.5  \r\n").unwrap();
        assert_eq!(entries[0].topic, "sensor/dev01");
        assert_eq!(entries[0].address, "10.0.0.5");
    }

    #[test]
    fn test_order_preserved_and_blank_lines_skipped() {
        let entries =
            parse_bindings("sensor/a=10.0.0.1\n\n   \nsensor/b=10.0.0.2\nsensor/c=10.0.0.3")
                .unwrap();
        let topics: Vec<&str> = entries.iter().map(|e| e.topic.as_str()).collect();
        assert_eq!(topics, vec!["sensor/a", "sensor/b", "sensor/c"]);
        assert_eq!(entries[1].line, 4);
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        let err = parse_bindings("sensor/a=10.0.0.1\nsensor/b 10.0.0.2\n").unwrap_err();
        assert!(matches!(err, DiscoveryError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_extra_separator_is_malformed() {
        let err = parse_bindings("sensor/a=10.0.0.1=extra\n").unwrap_err();
        assert!(matches!(err, DiscoveryError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_empty_address_is_malformed() {
        let err = parse_bindings("sensor/a=   \n").unwrap_err();
        assert!(matches!(err, DiscoveryError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_topic_split() {
        let binding = TopicBinding::parse("sensor/dev01").unwrap();
        assert_eq!(binding.component, "sensor");
        assert_eq!(binding.component_id, "dev01");
        assert_eq!(binding.to_string(), "sensor/dev01");
    }

    #[test]
    fn test_topic_without_slash_rejected() {
        let err = TopicBinding::parse("sensor").unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidTopic { .. }));
    }

    #[test]
    fn test_topic_with_two_slashes_rejected() {
        assert!(TopicBinding::parse("home/sensor/dev01").is_err());
        assert!(TopicBinding::parse("sensor/").is_err());
        assert!(TopicBinding::parse("/dev01").is_err());
    }

    #[test]
    fn test_select_first_binding() {
        let entries = parse_bindings("sensor/dev01=10.0.0.5\nactuator/x=10.0.0.9\n").unwrap();
        let (binding, broker) = select_binding(&entries, 1883).unwrap();
        assert_eq!(binding.topic, "sensor/dev01");
        assert_eq!(broker, BrokerAddress::new("10.0.0.5", 1883));
        assert_eq!(broker.to_string(), "10.0.0.5:1883");
    }

    #[test]
    fn test_select_from_empty_file() {
        let entries = parse_bindings("\n\n").unwrap();
        assert!(matches!(
            select_binding(&entries, 1883),
            Err(DiscoveryError::NoBindings)
        ));
    }

    #[test]
    fn test_first_topic_validated_even_if_later_lines_fine() {
        let entries = parse_bindings("sensor=10.0.0.5\nsensor/b=10.0.0.2\n").unwrap();
        assert!(matches!(
            select_binding(&entries, 1883),
            Err(DiscoveryError::InvalidTopic { .. })
        ));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,12}"
    }

    fn host() -> impl Strategy<Value = String> {
        "[a-z0-9.]{1,20}"
    }

    proptest! {
        #[test]
        fn prop_first_line_always_selected(
            first in (segment(), segment(), host()),
            rest in proptest::collection::vec((segment(), segment(), host()), 0..8),
        ) {
            let mut content = format!("{}/{}={}\n", first.0, first.1, first.2);
            for (c, id, h) in &rest {
                content.push_str(&format!("{c}/{id}={h}\n"));
            }

            let entries = parse_bindings(&content).unwrap();
            prop_assert_eq!(entries.len(), rest.len() + 1);

            let (binding, broker) = select_binding(&entries, 1883).unwrap();
            prop_assert_eq!(&binding.component, &first.0);
            prop_assert_eq!(&binding.component_id, &first.1);
            prop_assert_eq!(&broker.host, &first.2);
        }
    }
}
