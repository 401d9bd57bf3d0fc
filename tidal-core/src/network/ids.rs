//! Identifier newtypes for nodes, links and flows.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns identifier as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Router, sender or receiver in the topology graph.
    NodeId
);

string_id!(
    /// Link identifier of the form `{a}-{b}`, registered under both directions.
    LinkKey
);

string_id!(
    /// Flow identifier, unique within one simulation request.
    FlowId
);

impl LinkKey {
    /// Builds the key for a link between `a` and `b` in registration order.
    pub fn between(a: &NodeId, b: &NodeId) -> Self {
        Self(format!("{a}-{b}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_key_between() {
        let key = LinkKey::between(&NodeId::from("S1"), &NodeId::from("R1"));
        assert_eq!(key.as_str(), "S1-R1");
        assert_eq!(key.to_string(), "S1-R1");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&FlowId::from("f1")).unwrap();
        assert_eq!(json, "\"f1\"");
        let node: NodeId = serde_json::from_str("\"R2\"").unwrap();
        assert_eq!(node, NodeId::from("R2"));
    }
}
