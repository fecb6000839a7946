/// Site and service constants shared across the crate

pub const SITE_BASE_URL: &str = "https://www.nepremicnine.net";

// Default search: rentals in Ljubljana, 300-900 EUR a month, 30 m2 and up
pub const DEFAULT_REGION: &str = "ljubljana-mesto";
pub const DEFAULT_ROOMS: &[&str] = &[
    "2-sobno",
    "2.5-sobno",
    "3-sobno",
    "3.5-sobno",
    "4-sobno",
    "4.5-sobno",
    "5-in-vecsobno",
    "apartma",
];
pub const DEFAULT_PRICE_MIN: u32 = 300;
pub const DEFAULT_PRICE_MAX: u32 = 900;
pub const DEFAULT_SIZE_MIN: u32 = 30;

pub const DEFAULT_DB_PATH: &str = "nepremicnine_database.sqlite";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_MAX_PAGES: u32 = 5;
pub const DEFAULT_REQUESTS_PER_MIN: u64 = 12;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DISCORD_MAX_ATTEMPTS: u32 = 3;
pub const EMBED_TITLE_LIMIT: usize = 256;
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;
pub const EMBED_COLOR_NEW: u32 = 0x3498DB;
pub const EMBED_COLOR_PRICE_CHANGE: u32 = 0xE67E22;

/// Resource types the browser service is told not to load.
pub const REJECTED_RESOURCE_TYPES: &[&str] = &["image", "media", "font", "stylesheet"];

/// Shown in embed fields when the listing does not carry a value
pub const MISSING_VALUE: &str = "/";
