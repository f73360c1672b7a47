use anyhow::{Context, Result};
use std::path::Path;

use super::load_config;

const REDACTED: &str = "********";

/// Validate the configuration and print the effective values as TOML
pub fn run(path: Option<&Path>) -> Result<()> {
    let rendered = render(path)?;
    println!("{}", rendered);
    Ok(())
}

fn render(path: Option<&Path>) -> Result<String> {
    let mut config = load_config(path)?;
    config.validate()?;

    for user in &mut config.auth.users {
        if user.password.is_some() {
            user.password = Some(REDACTED.to_string());
        }
    }
    if config.auth.nonce_secret.is_some() {
        config.auth.nonce_secret = Some(REDACTED.to_string());
    }
    config.to_toml().context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_renders() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hestia.toml");
        std::fs::write(&path, "[server]\nport = 9090\n").unwrap();

        let text = render(Some(&path)).unwrap();
        assert!(text.contains("port = 9090"));
        assert!(text.contains("[auth]"));
    }

    #[test]
    fn passwords_are_redacted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hestia.toml");
        std::fs::write(&path, "[[auth.users]]\nname = \"alice\"\npassword = \"wonder\"\nlevel = 3\n")
            .unwrap();

        let text = render(Some(&path)).unwrap();
        assert!(text.contains("alice"));
        assert!(!text.contains("wonder"));
    }

    #[test]
    fn invalid_config_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hestia.toml");
        std::fs::write(&path, "[auth]\nalgorithm = \"SHA-1\"\n").unwrap();

        let err = render(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("algorithm"));
    }

    #[test]
    fn missing_explicit_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(render(Some(&tmp.path().join("absent.toml"))).is_err());
    }
}
