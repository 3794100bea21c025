//! Route discriminators dispatched at the transport layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Which transport event an invocation of the relay is handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKey {
    /// Session established; no payload.
    #[serde(rename = "$connect")]
    Connect,
    /// Session ended.
    #[serde(rename = "$disconnect")]
    Disconnect,
    /// Message carrying an envelope in its body.
    #[serde(rename = "$default")]
    Default,
}

impl RouteKey {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteKey::Connect => "$connect",
            RouteKey::Disconnect => "$disconnect",
            RouteKey::Default => "$default",
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteKey {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "$connect" => Ok(RouteKey::Connect),
            "$disconnect" => Ok(RouteKey::Disconnect),
            "$default" => Ok(RouteKey::Default),
            other => Err(MeshError::BadRequest(format!("unknown route: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_known_routes() {
        assert_eq!("$connect".parse::<RouteKey>().unwrap(), RouteKey::Connect);
        assert_eq!("$disconnect".parse::<RouteKey>().unwrap(), RouteKey::Disconnect);
        assert_eq!("$default".parse::<RouteKey>().unwrap(), RouteKey::Default);
        assert!("default".parse::<RouteKey>().is_err());
    }

    #[test]
    fn serde_uses_dollar_names() {
        let s = serde_json::to_string(&RouteKey::Default).unwrap();
        assert_eq!(s, "\"$default\"");
    }
}
