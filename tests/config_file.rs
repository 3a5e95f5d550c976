//! The shipped example configuration loads and builds.

use std::path::Path;

use filter_proxy::config::{load_config, ConfigError};
use filter_proxy::{HttpServer, Registry};

#[tokio::test]
async fn test_example_config_builds_pipeline() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("filter-proxy.toml");
    let config = load_config(&path).unwrap();

    let names: Vec<_> = config.filters.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["private", "security-headers", "tokens", "links", "footer", "compress"]
    );
    assert_eq!(config.producer.0.kind, "upstream");

    let server = HttpServer::from_config(config, &Registry::builtin());
    assert!(server.is_ok());
}

#[test]
fn test_bad_handler_settings_stop_startup() {
    let config = filter_proxy::config::parse_config(
        r#"
        [[filters]]
        name = "compress"
        kind = "gzip"
        [filters.settings]
        level = 42
        "#,
    )
    .unwrap();

    match HttpServer::from_config(config, &Registry::builtin()) {
        Err(ConfigError::Handler { name, .. }) => assert_eq!(name, "compress"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("server built with invalid gzip level"),
    }
}
