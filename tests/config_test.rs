use verifyq::Error;
use verifyq::config::{Config, DEFAULT_CONCURRENCY, DEFAULT_VERIFIER_DIR};

// Environment variables are process-global, so every case runs in one test.
#[test]
fn config_from_env() {
    unsafe {
        std::env::remove_var("VERIFYQ_CONCURRENCY");
        std::env::remove_var("VERIFYQ_VERIFIER_DIR");
        std::env::remove_var("OTEL_ENDPOINT");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    assert_eq!(config.verifier_dir, std::path::PathBuf::from(DEFAULT_VERIFIER_DIR));
    assert!(config.otel_endpoint.is_none());
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("VERIFYQ_CONCURRENCY", "4");
        std::env::set_var("VERIFYQ_VERIFIER_DIR", "/etc/verifyq/verifiers");
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.concurrency, 4);
    assert_eq!(
        config.verifier_dir,
        std::path::PathBuf::from("/etc/verifyq/verifiers")
    );
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));

    for bad in ["0", "-1", "many"] {
        unsafe {
            std::env::set_var("VERIFYQ_CONCURRENCY", bad);
        }
        let result = Config::from_env();
        assert!(matches!(result, Err(Error::Config(_))), "{bad} should be rejected");
    }

    unsafe {
        std::env::remove_var("VERIFYQ_CONCURRENCY");
        std::env::remove_var("VERIFYQ_VERIFIER_DIR");
        std::env::remove_var("OTEL_ENDPOINT");
    }
}
