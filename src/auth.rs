//! OAuth2 authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{MailError, Result};

/// Gmail scopes needed to read mail, inspect threads, and send replies
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Scope attached to every API call; it covers read, send, and settings listing
pub const CALL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Environment variable consulted when no credentials path is given
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Pick the OAuth client-secret file: explicit path first, then `GOOGLE_APPLICATION_CREDENTIALS`.
///
/// Fails with an authentication error when neither points at an existing file.
pub fn resolve_credentials_path(explicit: Option<&Path>) -> Result<PathBuf> {
    let candidate = match explicit {
        Some(path) => path.to_path_buf(),
        None => env::var_os(CREDENTIALS_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| {
                MailError::AuthError(format!(
                    "No credentials path given and {} is not set",
                    CREDENTIALS_ENV
                ))
            })?,
    };

    if !candidate.is_file() {
        return Err(MailError::AuthError(format!(
            "Gmail credentials file not found at {:?}",
            candidate
        )));
    }

    Ok(candidate)
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Uses the installed-app flow (browser redirect on first use) and persists
/// tokens to `token_cache_path` so later runs refresh silently.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| MailError::AuthError(format!("Failed to read credentials: {}", e)))?;

    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| MailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so concurrent calls never race the consent flow
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| MailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| MailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Restrict the token cache to owner read/write (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "token").await.unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_resolve_credentials_explicit_path() {
        let temp_file = NamedTempFile::new().unwrap();
        let resolved = resolve_credentials_path(Some(temp_file.path())).unwrap();
        assert_eq!(resolved, temp_file.path());
    }

    #[test]
    #[serial]
    fn test_resolve_credentials_from_env() {
        let temp_file = NamedTempFile::new().unwrap();
        env::set_var(CREDENTIALS_ENV, temp_file.path());

        let resolved = resolve_credentials_path(None).unwrap();
        assert_eq!(resolved, temp_file.path());

        env::remove_var(CREDENTIALS_ENV);
    }

    #[test]
    #[serial]
    fn test_resolve_credentials_missing() {
        env::remove_var(CREDENTIALS_ENV);
        let err = resolve_credentials_path(None).unwrap_err();
        assert!(matches!(err, MailError::AuthError(_)));

        let err = resolve_credentials_path(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_scopes_constants() {
        assert_eq!(REQUIRED_SCOPES.len(), 3);
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.send"));
        assert!(REQUIRED_SCOPES.contains(&CALL_SCOPE));
    }
}
