use std::time::Duration;

const DEFAULT_DEBOUNCE_MS: u64 = 250;
const DEFAULT_MIN_QUERY_CHARS: usize = 2;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

const DEBOUNCE_MS_MIN: u64 = 0;
const DEBOUNCE_MS_MAX: u64 = 5_000;
const MIN_QUERY_CHARS_MIN: u64 = 0;
const MIN_QUERY_CHARS_MAX: u64 = 32;
const REQUEST_TIMEOUT_MS_MIN: u64 = 100;
const REQUEST_TIMEOUT_MS_MAX: u64 = 120_000;

const DEBOUNCE_MS_ENV: &str = "STRIDE_DEBOUNCE_MS";
const MIN_QUERY_CHARS_ENV: &str = "STRIDE_MIN_QUERY_CHARS";
const REQUEST_TIMEOUT_MS_ENV: &str = "STRIDE_REQUEST_TIMEOUT_MS";

/// Options for one debounced query controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryConfig {
    /// Quiet period after the last keystroke before a fetch is issued
    pub debounce: Duration,
    /// Normalized queries shorter than this clear results without a fetch
    pub min_chars: usize,
    /// Upper bound on a single fetch. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            min_chars: DEFAULT_MIN_QUERY_CHARS,
            request_timeout: Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
        }
    }
}

/// Options for an optimistic mutation coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationConfig {
    /// Upper bound on a single commit. A timeout marks the mutation failed.
    pub request_timeout: Option<Duration>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub query: QueryConfig,
    pub mutation: MutationConfig,
    /// True when at least one value came from the environment
    pub configured_via_env: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        parse_engine_config_from_raw(
            std::env::var(DEBOUNCE_MS_ENV).ok(),
            std::env::var(MIN_QUERY_CHARS_ENV).ok(),
            std::env::var(REQUEST_TIMEOUT_MS_ENV).ok(),
        )
    }
}

fn parse_env_u64_with_bounds(raw: Option<String>, min: u64, max: u64, default: u64) -> (u64, bool) {
    match raw.and_then(|value| value.trim().parse::<u64>().ok()) {
        Some(parsed) => (parsed.clamp(min, max), true),
        None => (default, false),
    }
}

/// `0` disables the timeout; anything else is clamped into range.
fn parse_timeout_ms(raw: Option<String>, default: u64) -> (Option<Duration>, bool) {
    match raw.and_then(|value| value.trim().parse::<u64>().ok()) {
        Some(0) => (None, true),
        Some(parsed) => (
            Some(Duration::from_millis(
                parsed.clamp(REQUEST_TIMEOUT_MS_MIN, REQUEST_TIMEOUT_MS_MAX),
            )),
            true,
        ),
        None => (Some(Duration::from_millis(default)), false),
    }
}

fn parse_engine_config_from_raw(
    debounce_raw: Option<String>,
    min_chars_raw: Option<String>,
    timeout_raw: Option<String>,
) -> EngineConfig {
    let (debounce_ms, debounce_set) = parse_env_u64_with_bounds(
        debounce_raw,
        DEBOUNCE_MS_MIN,
        DEBOUNCE_MS_MAX,
        DEFAULT_DEBOUNCE_MS,
    );
    let (min_chars, min_chars_set) = parse_env_u64_with_bounds(
        min_chars_raw,
        MIN_QUERY_CHARS_MIN,
        MIN_QUERY_CHARS_MAX,
        DEFAULT_MIN_QUERY_CHARS as u64,
    );
    let (request_timeout, timeout_set) = parse_timeout_ms(timeout_raw, DEFAULT_REQUEST_TIMEOUT_MS);

    EngineConfig {
        query: QueryConfig {
            debounce: Duration::from_millis(debounce_ms),
            min_chars: min_chars as usize,
            request_timeout,
        },
        mutation: MutationConfig { request_timeout },
        configured_via_env: debounce_set || min_chars_set || timeout_set,
    }
}
