const DEFAULT_FILTER: &str = "usermgmt=debug,axum=info,tower_http=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
}

impl LogSettings {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            filter: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }
}

/// Installs the global subscriber. `LOG_FORMAT=json` switches to one JSON
/// object per line.
pub fn init_tracing() {
    let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
    let builder = tracing_subscriber::fmt().with_env_filter(settings.filter);
    if settings.json {
        builder.with_target(false).json().init();
    } else {
        builder.init();
    }
}
