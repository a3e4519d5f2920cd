use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,
    pub password_reset_ttl_secs: i64,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_default_model: String,
    pub openai_vision_model: String,
    pub ai_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,

    // Object storage
    pub media_dir: String,
    pub public_base_url: String,

    pub auth_rate_limit_max: u32,
    pub auth_rate_limit_window_secs: u64,
    pub analyze_rate_limit_max: u32,

    pub empty_meal_sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a number");

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: parse_or("JWT_ACCESS_TTL_SECS", 900),
            jwt_refresh_ttl_secs: parse_or("JWT_REFRESH_TTL_SECS", 604800),
            password_reset_ttl_secs: parse_or("PASSWORD_RESET_TTL_SECS", 3600),

            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            openai_default_model: env::var("OPENAI_DEFAULT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".into()),
            openai_vision_model: env::var("OPENAI_VISION_MODEL")
                .unwrap_or_else(|_| "gpt-4o".into()),
            ai_timeout_secs: parse_or("AI_TIMEOUT_SECS", 30),
            stream_idle_timeout_secs: parse_or("STREAM_IDLE_TIMEOUT_SECS", 20),

            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "./media".into()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),

            auth_rate_limit_max: parse_or("AUTH_RATE_LIMIT_MAX", 5),
            auth_rate_limit_window_secs: parse_or("AUTH_RATE_LIMIT_WINDOW_SECS", 60),
            analyze_rate_limit_max: parse_or("ANALYZE_RATE_LIMIT_MAX", 20),

            empty_meal_sweep_interval_secs: parse_or("EMPTY_MEAL_SWEEP_INTERVAL_SECS", 900),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    /// Public URL prefix under which uploaded objects are served.
    pub fn media_base_url(&self) -> String {
        format!("{}/media", self.public_base_url.trim_end_matches('/'))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl Config {
    /// Config for in-process tests; nothing here reaches the network.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            jwt_secret: "test-secret-please-ignore".into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604800,
            password_reset_ttl_secs: 3600,
            openai_api_key: String::new(),
            openai_base_url: "http://127.0.0.1:9".into(),
            openai_default_model: "gpt-4o-mini".into(),
            openai_vision_model: "gpt-4o".into(),
            ai_timeout_secs: 5,
            stream_idle_timeout_secs: 5,
            media_dir: "./media".into(),
            public_base_url: "http://localhost:8080".into(),
            auth_rate_limit_max: 5,
            auth_rate_limit_window_secs: 60,
            analyze_rate_limit_max: 20,
            empty_meal_sweep_interval_secs: 900,
        }
    }
}
