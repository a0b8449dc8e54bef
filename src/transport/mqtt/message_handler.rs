//! Pure routing of MQTT event loop output
//!
//! The device only publishes, so incoming traffic reduces to connection
//! acknowledgements, broker disconnects and keepalive noise.

use rumqttc::{ConnectReturnCode, ConnectionError, Event, Outgoing, Packet};

/// Routing decisions for event loop output
pub struct MessageHandler;

impl MessageHandler {
    /// Route an event loop event
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => EventRoute::ConnectionAcknowledged {
                accepted: matches!(ack.code, ConnectReturnCode::Success),
                return_code: format!("{:?}", ack.code),
                session_present: ack.session_present,
            },
            Event::Incoming(Packet::Disconnect) => EventRoute::Disconnected,
            Event::Incoming(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Return code of a refused CONNECT, if that is what the error is
    pub fn refusal_code(error: &ConnectionError) -> Option<String> {
        match error {
            ConnectionError::ConnectionRefused(code) => Some(format!("{code:?}")),
            _ => None,
        }
    }

    /// Whether a refusal means the broker rejected the access token
    pub fn is_auth_refusal(error: &ConnectionError) -> bool {
        matches!(
            error,
            ConnectionError::ConnectionRefused(
                ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized
            )
        )
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK received
    ConnectionAcknowledged {
        accepted: bool,
        return_code: String,
        session_present: bool,
    },
    /// Broker closed the session
    Disconnected,
    /// Our DISCONNECT left the client
    DisconnectSent,
    /// PingResp and the like
    InfrastructureEvent(String),
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::ConnAck;

    #[test]
    fn test_route_connack_success() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));

        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionAcknowledged {
                accepted: true,
                return_code: "Success".to_string(),
                session_present: false,
            }
        );
    }

    #[test]
    fn test_route_connack_refused() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));

        match MessageHandler::route_mqtt_event(&event) {
            EventRoute::ConnectionAcknowledged {
                accepted,
                return_code,
                ..
            } => {
                assert!(!accepted);
                assert_eq!(return_code, "NotAuthorized");
            }
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn test_route_disconnects() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::Disconnect)),
            EventRoute::Disconnected
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::DisconnectSent
        );
    }

    #[test]
    fn test_route_keepalive_traffic() {
        assert!(matches!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PingResp)),
            EventRoute::InfrastructureEvent(_)
        ));
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_refusal_code() {
        let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword);
        assert_eq!(
            MessageHandler::refusal_code(&refused),
            Some("BadUserNamePassword".to_string())
        );
        assert!(MessageHandler::is_auth_refusal(&refused));

        let unavailable = ConnectionError::ConnectionRefused(ConnectReturnCode::ServiceUnavailable);
        assert!(!MessageHandler::is_auth_refusal(&unavailable));

        assert_eq!(
            MessageHandler::refusal_code(&ConnectionError::RequestsDone),
            None
        );
    }
}
