//! Page → relay message protocol.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::SessionToken;

/// The two commands a page context can send to the relay.
///
/// Wire shape: `{"type": "SET_AUTH_TOKEN", "token": "..."}` or
/// `{"type": "GET_AUTH_TOKEN"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    /// Overwrite the token mirror. `None` (or an empty string) clears it.
    SetAuthToken {
        #[serde(default, deserialize_with = "non_empty_token")]
        token: Option<SessionToken>,
    },
    /// Ask for the current mirror; answered over the reply port.
    GetAuthToken,
}

impl RelayMessage {
    pub fn set_token(token: Option<SessionToken>) -> Self {
        Self::SetAuthToken { token }
    }
}

/// Reply to [`RelayMessage::GetAuthToken`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReply {
    pub token: Option<SessionToken>,
}

fn non_empty_token<'de, D>(deserializer: D) -> Result<Option<SessionToken>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(SessionToken::parse))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_token_wire_format() {
        let msg = RelayMessage::set_token(Some(SessionToken::new("abc123")));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "SET_AUTH_TOKEN", "token": "abc123"})
        );

        let cleared = serde_json::to_value(RelayMessage::set_token(None)).unwrap();
        assert_eq!(
            cleared,
            serde_json::json!({"type": "SET_AUTH_TOKEN", "token": null})
        );
    }

    #[test]
    fn empty_or_missing_token_clears() {
        let msg: RelayMessage =
            serde_json::from_str(r#"{"type":"SET_AUTH_TOKEN","token":""}"#).unwrap();
        assert_eq!(msg, RelayMessage::SetAuthToken { token: None });

        let msg: RelayMessage = serde_json::from_str(r#"{"type":"SET_AUTH_TOKEN"}"#).unwrap();
        assert_eq!(msg, RelayMessage::SetAuthToken { token: None });
    }

    #[test]
    fn get_token_parses() {
        let msg: RelayMessage = serde_json::from_str(r#"{"type":"GET_AUTH_TOKEN"}"#).unwrap();
        assert_eq!(msg, RelayMessage::GetAuthToken);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<RelayMessage>(r#"{"type":"PING"}"#).is_err());
    }

    #[test]
    fn reply_shape() {
        let reply = TokenReply { token: None };
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"token":null}"#);
    }
}
