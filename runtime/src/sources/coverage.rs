//! District coverage for sources that need a postal town in their URLs.
//!
//! Such sources answer unknown districts with the default town's page
//! instead of an error, so the orchestrator must not ask them at all.

use areascope::LocationKey;

/// Outward code (or district prefix) to postal-town URL slug.
const DISTRICT_TOWNS: &[(&str, &str)] = &[
    // Central London
    ("EC1", "london"),
    ("EC2", "london"),
    ("EC3", "london"),
    ("EC4", "london"),
    ("WC1", "london"),
    ("WC2", "london"),
    ("SW1", "london"),
    ("W1", "london"),
    ("SE1", "london"),
    ("N1", "london"),
    ("E1", "london"),
    ("NW1", "london"),
    // West London and Middlesex
    ("UB1", "southall"),
    ("UB2", "southall"),
    ("UB3", "hayes"),
    ("UB4", "hayes"),
    ("UB5", "northolt"),
    ("UB6", "greenford"),
    ("UB7", "west-drayton"),
    ("UB8", "uxbridge"),
    ("UB9", "uxbridge"),
    ("UB10", "uxbridge"),
    ("HA0", "wembley"),
    ("HA1", "harrow"),
    ("HA2", "harrow"),
    ("HA3", "harrow"),
    ("HA4", "ruislip"),
    ("HA5", "pinner"),
    ("HA8", "edgware"),
    ("HA9", "wembley"),
    ("TW1", "twickenham"),
    ("TW3", "hounslow"),
    ("TW4", "hounslow"),
    ("TW5", "hounslow"),
    ("TW7", "isleworth"),
    ("TW8", "brentford"),
    // Home counties
    ("OX1", "oxford"),
    ("OX2", "oxford"),
    ("OX3", "oxford"),
    ("OX4", "oxford"),
    ("SL1", "slough"),
    ("SL2", "slough"),
    ("SL3", "slough"),
    ("RG1", "reading"),
    ("RG2", "reading"),
    ("RG30", "reading"),
    ("GU1", "guildford"),
    ("GU2", "guildford"),
    ("WD17", "watford"),
    ("WD18", "watford"),
    ("WD24", "watford"),
    ("AL1", "st-albans"),
    ("LU1", "luton"),
    ("MK9", "milton-keynes"),
];

/// Static district → town membership table.
#[derive(Debug, Clone, Copy)]
pub struct CoverageTable {
    entries: &'static [(&'static str, &'static str)],
}

impl Default for CoverageTable {
    fn default() -> Self {
        Self {
            entries: DISTRICT_TOWNS,
        }
    }
}

impl CoverageTable {
    pub fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    /// Town slug for `key`: exact outward-code match first, then the
    /// normalized district prefix (`SW1A` → `SW1`).
    pub fn town_for(&self, key: &LocationKey) -> Option<&'static str> {
        self.lookup(key.outward())
            .or_else(|| self.lookup(key.district_prefix()))
    }

    pub fn contains(&self, key: &LocationKey) -> bool {
        self.town_for(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, district: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(d, _)| *d == district)
            .map(|(_, town)| *town)
    }
}
