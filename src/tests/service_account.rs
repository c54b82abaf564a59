#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serial_test::serial;
    use tempfile::tempdir;

    use crate::error::TokenError;
    use crate::sources::service_account::{
        parse_inline_tokens, AmbientCredentials, ServiceAccountOutcome, ServiceAccountSource,
    };
    use crate::utils::constants::{ENV_ACCESS_TOKENS, ENV_CREDENTIALS_DIR};

    #[test]
    fn inline_tokens_skip_malformed_entries() {
        let parsed = parse_inline_tokens("mytok=abc, other = def ,broken,=x,empty=");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["mytok"], "abc");
        assert_eq!(parsed["other"], "def");
    }

    #[test]
    fn inline_token_wins_over_credentials_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mytok-token-secret"), "from-file").unwrap();
        let source = AmbientCredentials::new(
            HashMap::from([("mytok".to_owned(), "inline".to_owned())]),
            Some(dir.path().to_path_buf()),
        );

        assert_eq!(
            source.get("mytok").unwrap(),
            ServiceAccountOutcome::Token("inline".to_owned())
        );
    }

    #[test]
    fn secret_file_is_trimmed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mytok-token-secret"), "svcmytok123\n").unwrap();
        let source = AmbientCredentials::new(HashMap::new(), Some(dir.path().to_path_buf()));

        assert_eq!(
            source.get("mytok").unwrap(),
            ServiceAccountOutcome::Token("svcmytok123".to_owned())
        );
    }

    #[test]
    fn absent_or_empty_secret_is_not_configured() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("blank-token-secret"), "  \n").unwrap();
        let source = AmbientCredentials::new(HashMap::new(), Some(dir.path().to_path_buf()));

        assert_eq!(source.get("missing").unwrap(), ServiceAccountOutcome::NotConfigured);
        assert_eq!(source.get("blank").unwrap(), ServiceAccountOutcome::NotConfigured);
        assert_eq!(
            AmbientCredentials::default().get("mytok").unwrap(),
            ServiceAccountOutcome::NotConfigured
        );
    }

    #[test]
    fn unreadable_secret_is_an_error() {
        let dir = tempdir().unwrap();
        // a directory where the secret file should be
        std::fs::create_dir(dir.path().join("mytok-token-secret")).unwrap();
        let source = AmbientCredentials::new(HashMap::new(), Some(dir.path().to_path_buf()));

        let err = source.get("mytok").unwrap_err();
        assert!(matches!(err, TokenError::ServiceAccount(_)), "{:?}", err);
    }

    #[test]
    #[serial]
    fn environment_is_read() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("filetok-token-secret"), "f1").unwrap();
        std::env::set_var(ENV_ACCESS_TOKENS, "envtok=e1");
        std::env::set_var(ENV_CREDENTIALS_DIR, dir.path());

        let source = AmbientCredentials::from_env();

        std::env::remove_var(ENV_ACCESS_TOKENS);
        std::env::remove_var(ENV_CREDENTIALS_DIR);
        assert_eq!(source.get("envtok").unwrap(), ServiceAccountOutcome::Token("e1".to_owned()));
        assert_eq!(source.get("filetok").unwrap(), ServiceAccountOutcome::Token("f1".to_owned()));
    }
}
