use mccgraph_core::{
    format_customer_id, ChildAccount, ConfigError, ConfigManager, MccGraphConfig,
    TraversalStrategy,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let config = MccGraphConfig::default();
    assert!(ConfigManager::validate_config(&config).is_ok());
    assert_eq!(config.traversal.strategy, TraversalStrategy::Deep);
}

#[test]
fn test_config_file_with_credentials() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("mccgraph.toml");
    fs::write(
        &path,
        r#"
[traversal]
strategy = "flat"
max_concurrency = 4

[credentials]
client_id = "client"
client_secret = "secret"
refresh_token = "refresh"
developer_token = "dev"
login_customer_id = "987-654-3210"

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let manager = ConfigManager::from_path(&path).unwrap();
    let config = manager.config();
    assert_eq!(config.traversal.effective_max_depth(), 1);
    assert_eq!(config.logging.format, "json");

    let ctx = config.credentials.to_context().unwrap();
    assert_eq!(ctx.login_customer_id(), Some("9876543210"));
    assert_eq!(format_customer_id(ctx.login_customer_id().unwrap()), "987-654-3210");

    // listing a sub-manager switches identity, a client keeps the parent's
    let sub = ctx.for_child(&ChildAccount::new("1112223333", true));
    let leaf = sub.for_child(&ChildAccount::new("4445556666", false));
    assert_eq!(sub.login_customer_id(), Some("1112223333"));
    assert_eq!(leaf.login_customer_id(), Some("1112223333"));
    assert!(leaf.shares_credentials_with(&ctx));
}

#[test]
fn test_invalid_config_files() {
    let tmp = TempDir::new().unwrap();

    let unparsable = tmp.path().join("broken.toml");
    fs::write(&unparsable, "[traversal]\nstrategy = \"sideways\"\n").unwrap();
    assert!(matches!(
        ConfigManager::from_path(&unparsable),
        Err(ConfigError::ParseError(_))
    ));

    let invalid = tmp.path().join("invalid.toml");
    fs::write(&invalid, "[logging]\nformat = \"xml\"\n").unwrap();
    assert!(matches!(
        ConfigManager::from_path(&invalid),
        Err(ConfigError::ValidationError(_))
    ));
}
