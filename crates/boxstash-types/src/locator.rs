use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::keys::OwnerKey;

/// Locates a stored document: which application holds it and whose it is.
///
/// Text form is `did:algo:<owner-hex>-<app-id>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentLocator {
    pub owner: OwnerKey,
    pub app_id: u64,
}

impl DocumentLocator {
    pub const SCHEME: &'static str = "did";
    pub const METHOD: &'static str = "algo";

    pub fn new(owner: OwnerKey, app_id: u64) -> Self {
        Self { owner, app_id }
    }
}

impl FromStr for DocumentLocator {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason: String| TypeError::InvalidLocator {
            locator: s.to_string(),
            reason,
        };
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        if scheme != Self::SCHEME {
            return Err(fail(format!("expected scheme `did`, got `{scheme}`")));
        }
        let method = parts.next().unwrap_or_default();
        if method != Self::METHOD {
            return Err(fail(format!("expected method `algo`, got `{method}`")));
        }
        let id = parts.next().ok_or_else(|| fail("missing identifier".into()))?;
        let (owner, app) = id
            .split_once('-')
            .ok_or_else(|| fail("identifier must be `<owner>-<app-id>`".into()))?;
        let owner = OwnerKey::from_hex(owner).map_err(|e| fail(format!("invalid owner key: {e}")))?;
        let app_id = app
            .parse::<u64>()
            .map_err(|_| fail(format!("invalid application id `{app}`")))?;
        Ok(Self { owner, app_id })
    }
}

impl fmt::Display for DocumentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}-{}", Self::SCHEME, Self::METHOD, self.owner, self.app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_roundtrip() {
        let locator = DocumentLocator::new(OwnerKey::from_bytes([0x11; 32]), 1234);
        let text = locator.to_string();
        assert!(text.starts_with("did:algo:1111"));
        assert!(text.ends_with("-1234"));
        assert_eq!(text.parse::<DocumentLocator>().unwrap(), locator);
    }

    #[test]
    fn rejects_wrong_scheme() {
        let err = "uri:algo:00-1".parse::<DocumentLocator>().unwrap_err();
        assert!(err.to_string().contains("expected scheme"));
    }

    #[test]
    fn rejects_wrong_method() {
        let err = "did:web:00-1".parse::<DocumentLocator>().unwrap_err();
        assert!(err.to_string().contains("expected method"));
    }

    #[test]
    fn rejects_bad_owner_and_app() {
        let owner = OwnerKey::from_bytes([1; 32]);
        assert!(format!("did:algo:zz-{}", 1).parse::<DocumentLocator>().is_err());
        assert!(format!("did:algo:{owner}-abc").parse::<DocumentLocator>().is_err());
        assert!(format!("did:algo:{owner}").parse::<DocumentLocator>().is_err());
    }
}
