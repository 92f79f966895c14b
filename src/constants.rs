//! Constants shared by discovery, scraping and normalization.

// Suffixes stripped from jurisdiction names before building URL tokens.
// Longer suffixes first so "City and Borough" wins over "Borough".
pub const JURISDICTION_SUFFIXES: &[&str] = &[
    "City and Borough",
    "Census Area",
    "Municipality",
    "Borough",
    "County",
    "Parish",
];

/// Words that indicate a page carries property-record data.
pub const PROPERTY_KEYWORDS: &[&str] = &[
    "property",
    "address",
    "owner",
    "assessor",
    "assessment",
    "assessed",
    "parcel",
    "tax",
    "deed",
    "appraisal",
    "valuation",
    "real estate",
    "recorder",
    "treasurer",
];

/// Candidate URL templates. `{county}` is the URL-safe county token and
/// `{st}` the lowercase postal code.
pub const URL_TEMPLATES: &[&str] = &[
    "https://{county}county{st}.gov",
    "https://www.{county}county{st}.gov",
    "https://www.{county}county.{st}.gov",
    "https://{county}county.{st}.gov",
    "https://www.co.{county}.{st}.us",
    "https://assessor.{county}county{st}.gov",
    "https://www.{county}countyassessor.com",
    "https://www.{county}countytreasurer.org",
    "https://{county}county{st}.gov/assessor",
    "https://{county}county{st}.gov/treasurer",
    "https://{county}county{st}.gov/recorder",
    "https://{county}county{st}.gov/clerk",
    "https://{county}county{st}.gov/sheriff",
];

/// Upper bound on candidates generated per jurisdiction.
pub const MAX_CANDIDATE_URLS: usize = 12;

/// Browser identities rotated across scraper attempts.
pub const CLIENT_IDENTITIES: &[ClientIdentity] = &[
    ClientIdentity {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
    },
    ClientIdentity {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.8",
    },
    ClientIdentity {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        accept: "text/html,application/json;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
    },
];

#[derive(Debug, Clone, Copy)]
pub struct ClientIdentity {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
}

impl ClientIdentity {
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("User-Agent".to_string(), self.user_agent.to_string()),
            ("Accept".to_string(), self.accept.to_string()),
            ("Accept-Language".to_string(), self.accept_language.to_string()),
        ]
    }
}

// Confidence points awarded per field present on a candidate.
pub const CONFIDENCE_ADDRESS: u32 = 30;
pub const CONFIDENCE_OWNER: u32 = 25;
pub const CONFIDENCE_VALUE: u32 = 20;
pub const CONFIDENCE_STATE: u32 = 15;
pub const CONFIDENCE_COUNTY: u32 = 10;
pub const MAX_CONFIDENCE: u32 = 100;

pub const UNKNOWN_STATE: &str = "Unknown";

// US and territories envelope (Alaska, Hawaii included; Guam excluded).
pub const MIN_LATITUDE: f64 = 18.0;
pub const MAX_LATITUDE: f64 = 72.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = -60.0;

/// Directional and street-suffix abbreviations (USPS Publication 28 subset).
pub const ADDRESS_ABBREVIATIONS: &[(&str, &str)] = &[
    ("NORTHEAST", "NE"),
    ("NORTHWEST", "NW"),
    ("SOUTHEAST", "SE"),
    ("SOUTHWEST", "SW"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("DRIVE", "DR"),
    ("ROAD", "RD"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("CIRCLE", "CIR"),
    ("PLACE", "PL"),
    ("PARKWAY", "PKWY"),
    ("HIGHWAY", "HWY"),
    ("TERRACE", "TER"),
    ("TRAIL", "TRL"),
    ("SQUARE", "SQ"),
    ("EXPRESSWAY", "EXPY"),
    ("FREEWAY", "FWY"),
    ("APARTMENT", "APT"),
    ("SUITE", "STE"),
];

/// Street-suffix abbreviations accepted by the street-grammar check.
pub const STREET_SUFFIXES: &[&str] = &[
    "ST", "AVE", "BLVD", "DR", "RD", "LN", "CT", "CIR", "PL", "PKWY", "HWY", "TER", "TRL", "SQ",
    "EXPY", "FWY", "WAY", "LOOP", "RUN", "PATH", "PIKE", "ROW", "XING",
];

/// Owner-name endings that mark an entity rather than a person.
pub const ENTITY_SUFFIXES: &[&str] = &[
    "LLC", "L.L.C.", "INC", "INC.", "CORP", "CORPORATION", "CO", "COMPANY", "LP", "LLP", "LTD",
    "TRUST", "TR", "TRUSTEE", "ESTATE", "ETAL", "ET AL", "HOLDINGS", "PROPERTIES", "PARTNERS",
    "ASSOCIATION", "CHURCH", "BANK",
];

/// State FIPS code to postal abbreviation.
pub const STATE_FIPS: &[(&str, &str)] = &[
    ("01", "AL"),
    ("02", "AK"),
    ("04", "AZ"),
    ("05", "AR"),
    ("06", "CA"),
    ("08", "CO"),
    ("09", "CT"),
    ("10", "DE"),
    ("11", "DC"),
    ("12", "FL"),
    ("13", "GA"),
    ("15", "HI"),
    ("16", "ID"),
    ("17", "IL"),
    ("18", "IN"),
    ("19", "IA"),
    ("20", "KS"),
    ("21", "KY"),
    ("22", "LA"),
    ("23", "ME"),
    ("24", "MD"),
    ("25", "MA"),
    ("26", "MI"),
    ("27", "MN"),
    ("28", "MS"),
    ("29", "MO"),
    ("30", "MT"),
    ("31", "NE"),
    ("32", "NV"),
    ("33", "NH"),
    ("34", "NJ"),
    ("35", "NM"),
    ("36", "NY"),
    ("37", "NC"),
    ("38", "ND"),
    ("39", "OH"),
    ("40", "OK"),
    ("41", "OR"),
    ("42", "PA"),
    ("44", "RI"),
    ("45", "SC"),
    ("46", "SD"),
    ("47", "TN"),
    ("48", "TX"),
    ("49", "UT"),
    ("50", "VT"),
    ("51", "VA"),
    ("53", "WA"),
    ("54", "WV"),
    ("55", "WI"),
    ("56", "WY"),
    ("72", "PR"),
];

/// Map a state FIPS code to its postal abbreviation.
pub fn state_code_for_fips(fips: &str) -> Option<&'static str> {
    STATE_FIPS
        .iter()
        .find(|(code, _)| *code == fips)
        .map(|(_, abbr)| *abbr)
}

/// Map a full state name (as returned by geocoders) to its postal abbreviation.
pub fn state_code_for_name(name: &str) -> Option<&'static str> {
    const NAMES: &[(&str, &str)] = &[
        ("alabama", "AL"),
        ("alaska", "AK"),
        ("arizona", "AZ"),
        ("arkansas", "AR"),
        ("california", "CA"),
        ("colorado", "CO"),
        ("connecticut", "CT"),
        ("delaware", "DE"),
        ("district of columbia", "DC"),
        ("florida", "FL"),
        ("georgia", "GA"),
        ("hawaii", "HI"),
        ("idaho", "ID"),
        ("illinois", "IL"),
        ("indiana", "IN"),
        ("iowa", "IA"),
        ("kansas", "KS"),
        ("kentucky", "KY"),
        ("louisiana", "LA"),
        ("maine", "ME"),
        ("maryland", "MD"),
        ("massachusetts", "MA"),
        ("michigan", "MI"),
        ("minnesota", "MN"),
        ("mississippi", "MS"),
        ("missouri", "MO"),
        ("montana", "MT"),
        ("nebraska", "NE"),
        ("nevada", "NV"),
        ("new hampshire", "NH"),
        ("new jersey", "NJ"),
        ("new mexico", "NM"),
        ("new york", "NY"),
        ("north carolina", "NC"),
        ("north dakota", "ND"),
        ("ohio", "OH"),
        ("oklahoma", "OK"),
        ("oregon", "OR"),
        ("pennsylvania", "PA"),
        ("rhode island", "RI"),
        ("south carolina", "SC"),
        ("south dakota", "SD"),
        ("tennessee", "TN"),
        ("texas", "TX"),
        ("utah", "UT"),
        ("vermont", "VT"),
        ("virginia", "VA"),
        ("washington", "WA"),
        ("west virginia", "WV"),
        ("wisconsin", "WI"),
        ("wyoming", "WY"),
        ("puerto rico", "PR"),
    ];
    let lower = name.trim().to_lowercase();
    if lower.len() == 2 {
        let upper = lower.to_uppercase();
        return STATE_FIPS
            .iter()
            .find(|(_, abbr)| *abbr == upper)
            .map(|(_, abbr)| *abbr);
    }
    NAMES
        .iter()
        .find(|(full, _)| *full == lower)
        .map(|(_, abbr)| *abbr)
}
