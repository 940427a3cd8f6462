use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-host ceiling on concurrently running instances of a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum MaxConcurrent {
    /// No ceiling; admission control is skipped.
    #[default]
    Unlimited,
    /// At most this many instances may run on one host.
    Limit(u32),
}

impl MaxConcurrent {
    /// Returns the ceiling, or `None` when unlimited.
    pub fn limit(&self) -> Option<u32> {
        match self {
            MaxConcurrent::Unlimited => None,
            MaxConcurrent::Limit(n) => Some(*n),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, MaxConcurrent::Unlimited)
    }
}

impl From<Option<u32>> for MaxConcurrent {
    fn from(v: Option<u32>) -> Self {
        match v {
            Some(n) => MaxConcurrent::Limit(n),
            None => MaxConcurrent::Unlimited,
        }
    }
}

impl From<MaxConcurrent> for Option<u32> {
    fn from(v: MaxConcurrent) -> Self {
        v.limit()
    }
}

impl fmt::Display for MaxConcurrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxConcurrent::Unlimited => f.write_str("unlimited"),
            MaxConcurrent::Limit(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_maps_null_to_unlimited() {
        let v: MaxConcurrent = serde_json::from_str("null").unwrap();
        assert_eq!(v, MaxConcurrent::Unlimited);

        let v: MaxConcurrent = serde_json::from_str("3").unwrap();
        assert_eq!(v, MaxConcurrent::Limit(3));
        assert_eq!(serde_json::to_string(&v).unwrap(), "3");
    }

    #[test]
    fn limit_accessor() {
        assert_eq!(MaxConcurrent::Unlimited.limit(), None);
        assert_eq!(MaxConcurrent::Limit(0).limit(), Some(0));
        assert!(MaxConcurrent::default().is_unlimited());
    }
}
