use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Advisor Backend Args ---
    /// Base URL of the advisor REST backend (portfolio, risk, recommendations, market data)
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:5000")]
    pub backend_url: String,

    /// Request timeout in seconds for backend calls
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value = "30")]
    pub backend_timeout_secs: u64,

    // --- Local Store Args ---
    /// Store for cached backend payloads and session records (memory, file, redis)
    #[arg(long, env = "STORE_TYPE", default_value = "file")]
    pub store_type: String,

    /// Directory used by the file store
    #[arg(long, env = "STORE_PATH", default_value = ".advisor-cache")]
    pub store_path: String,

    /// Redis URL used by the redis store
    #[arg(long, env = "STORE_REDIS_URL", default_value = "redis://127.0.0.1:6379/1")] // Use DB 1 to avoid collision
    pub store_redis_url: String,

    /// Prefix for Redis store keys.
    #[arg(long, env = "STORE_REDIS_PREFIX", default_value = "advisor:")]
    pub store_redis_prefix: String,

    // --- Cache TTL Args ---
    /// Freshness window in seconds for cached recommendations
    #[arg(long, env = "RECOMMENDATIONS_TTL_SECS", default_value = "300")]
    pub recommendations_ttl_secs: u64,

    /// Freshness window in seconds for cached risk analysis
    #[arg(long, env = "RISK_ANALYSIS_TTL_SECS", default_value = "600")]
    pub risk_analysis_ttl_secs: u64,

    /// Freshness window in seconds for cached market trends
    #[arg(long, env = "MARKET_TRENDS_TTL_SECS", default_value = "300")]
    pub market_trends_ttl_secs: u64,

    /// Freshness window in seconds for the cached portfolio snapshot
    #[arg(long, env = "PORTFOLIO_TTL_SECS", default_value = "300")]
    pub portfolio_ttl_secs: u64,

    // --- Chat Args ---
    /// Optional JSON file overriding the built-in canned responses.
    #[arg(long, env = "RESPONSES_PATH")]
    pub responses_path: Option<String>,

    /// Lower bound of the simulated typing delay, in milliseconds.
    #[arg(long, env = "TYPING_DELAY_MIN_MS", default_value = "1000")]
    pub typing_delay_min_ms: u64,

    /// Upper bound of the simulated typing delay, in milliseconds.
    #[arg(long, env = "TYPING_DELAY_MAX_MS", default_value = "2000")]
    pub typing_delay_max_ms: u64,

    // --- Server Args ---
    /// Host address and port for the WebSocket chat server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional secret for WebSocket clients. If set, clients must sign the `ts` query
    /// parameter with HMAC-SHA256 and pass it as `sig`.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Port for the HTTP data API. Disabled when not set.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_ttls() {
        let args = Args::parse_from(["robo-advisor"]);
        assert_eq!(args.recommendations_ttl_secs, 300);
        assert_eq!(args.risk_analysis_ttl_secs, 600);
        assert_eq!(args.market_trends_ttl_secs, 300);
        assert_eq!(args.store_type, "file");
        assert!(args.http_port.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "robo-advisor",
            "--store-type",
            "memory",
            "--typing-delay-max-ms",
            "0",
            "--http-port",
            "8080",
        ]);
        assert_eq!(args.store_type, "memory");
        assert_eq!(args.typing_delay_max_ms, 0);
        assert_eq!(args.http_port, Some(8080));
    }
}
