use std::env;
use std::time::Duration;

/// One routed service: requests under `prefix` go to `base_url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRoute {
    pub name: &'static str,
    pub prefix: &'static str,
    pub base_url: String,
}

impl ServiceRoute {
    /// Whether `path` is the prefix itself or below it
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// (name, path prefix, env var, default base URL)
const SERVICES: [(&str, &str, &str, &str); 5] = [
    ("restaurants", "/api/restaurants", "RESTAURANT_SERVICE_URL", "http://localhost:3001"),
    ("menus", "/api/menus", "MENU_SERVICE_URL", "http://localhost:3002"),
    ("orders", "/api/orders", "ORDER_SERVICE_URL", "http://localhost:3003"),
    ("deliveries", "/api/deliveries", "DELIVERY_SERVICE_URL", "http://localhost:3004"),
    ("ratings", "/api/ratings", "RATING_SERVICE_URL", "http://localhost:3005"),
];

/// Gateway configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub routes: Vec<ServiceRoute>,
    /// Upper bound on one upstream exchange
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let timeout_secs: u64 = env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| "UPSTREAM_TIMEOUT_SECS must be a whole number of seconds".to_string())?;

        let routes = SERVICES
            .iter()
            .map(|&(name, prefix, var, default)| {
                let base_url = env::var(var).unwrap_or_else(|_| default.to_string());
                validate_base_url(var, &base_url)?;
                Ok(ServiceRoute {
                    name,
                    prefix,
                    base_url: base_url.trim_end_matches('/').to_string(),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Config {
            host,
            port,
            routes,
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn validate_base_url(var: &str, url: &str) -> Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("{var} must be an http(s) URL, got '{url}'"))
    }
}
