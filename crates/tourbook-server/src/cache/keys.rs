//! Cache key conventions for the booking resources.
//!
//! Keys are namespaced by resource kind so a whole family can be dropped
//! with one `{kind}:*` pattern:
//!
//! | Key | Format |
//! |-----|--------|
//! | single item | `{kind}:item:{id}` |
//! | collection query | `{kind}:list:{normalized query}` |

use std::fmt;
use std::str::FromStr;

/// Resource families served through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Tours,
    Hotels,
    Flights,
    Bookings,
    Payments,
    Reports,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Tours,
        ResourceKind::Hotels,
        ResourceKind::Flights,
        ResourceKind::Bookings,
        ResourceKind::Payments,
        ResourceKind::Reports,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Tours => "tours",
            ResourceKind::Hotels => "hotels",
            ResourceKind::Flights => "flights",
            ResourceKind::Bookings => "bookings",
            ResourceKind::Payments => "payments",
            ResourceKind::Reports => "reports",
        }
    }

    /// Pattern matching every key of this family.
    pub fn family_pattern(self) -> String {
        format!("{}:*", self.as_str())
    }

    /// Key for a single item.
    pub fn item_key(self, id: impl fmt::Display) -> String {
        format!("{}:item:{}", self.as_str(), id)
    }

    /// Key for a collection query. Parameters are sorted so equivalent
    /// queries share one entry; empty segments are dropped.
    pub fn list_key(self, query: &str) -> String {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
        params.sort_unstable();
        format!("{}:list:{}", self.as_str(), params.join("&"))
    }

    /// Families whose cached values embed this one.
    pub fn dependents(self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::Tours | ResourceKind::Hotels | ResourceKind::Flights => {
                &[ResourceKind::Bookings, ResourceKind::Reports]
            }
            ResourceKind::Bookings | ResourceKind::Payments => &[ResourceKind::Reports],
            ResourceKind::Reports => &[],
        }
    }

    /// Patterns to invalidate after a write to this family.
    pub fn invalidation_patterns(self) -> Vec<String> {
        std::iter::once(self)
            .chain(self.dependents().iter().copied())
            .map(ResourceKind::family_pattern)
            .collect()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}
