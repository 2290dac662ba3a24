//! Branded ID newtypes.
//!
//! Messages, thought steps, tool calls, and threads each get a distinct ID
//! type wrapping a `String`, so a tool call ID can never be passed where a
//! message ID is expected. Remote events usually carry their own IDs; when
//! one is missing the client mints a prefixed UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new client-side ID (`<prefix>-<uuid v7>`).
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an ID received from the remote side.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

branded_id!(
    /// Identifies one chat message.
    MessageId,
    "msg"
);
branded_id!(
    /// Identifies one step of the agent's thought chain.
    ThoughtId,
    "thought"
);
branded_id!(
    /// Identifies one tool invocation and correlates its result.
    ToolCallId,
    "tool"
);
branded_id!(
    /// Identifies a conversation thread on the remote agent.
    ThreadId,
    "thread"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_prefixed_and_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert!(a.as_str().starts_with("msg-"));
        assert_ne!(a, b);
        assert!(ToolCallId::new().as_str().starts_with("tool-"));
        assert!(ThoughtId::new().as_str().starts_with("thought-"));
    }

    #[test]
    fn remote_ids_are_kept_verbatim() {
        let id = ToolCallId::from("tc1");
        assert_eq!(id, "tc1");
        assert_eq!(id.to_string(), "tc1");
        assert_eq!(id.into_inner(), "tc1");
    }

    #[test]
    fn serializes_transparently() {
        let id = ThreadId::from("default_session");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"default_session\"");
        let back: ThreadId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
