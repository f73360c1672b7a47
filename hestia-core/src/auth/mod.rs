//! HTTP Digest authentication with anonymous fallback
//!
//! [`Authenticator::authenticate`] is consulted for every request whose
//! resource demands a privilege level, and for any request carrying a pending
//! form login. Failures never destroy the session; they surface as
//! [`EngineError::AuthChallenge`] (answered with `WWW-Authenticate`) or
//! [`EngineError::Forbidden`].

pub mod credentials;
pub mod digest;

pub use credentials::{Credential, CredentialTable, Secret};
pub use digest::{DigestAlgorithm, DigestCredentials, NonceSigner, NonceStatus};

use rand::RngCore;
use std::time::Duration;

use crate::config::AuthConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::constants::headers;
use crate::http::request::path_decode;
use crate::http::HttpRequest;
use crate::session::Session;

/// Nonce lifetime when sessions never expire
const NEVER_EXPIRE_NONCE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Authenticator {
    realm: String,
    algorithm: DigestAlgorithm,
    timeout: Duration,
    default_level: u32,
    credentials: CredentialTable,
    nonces: NonceSigner,
    opaque: String,
}

enum DigestOutcome {
    LoggedIn { username: String, level: u32 },
    Stale,
    Rejected(&'static str),
}

impl Authenticator {
    pub fn new(
        realm: &str,
        algorithm: DigestAlgorithm,
        timeout: Duration,
        default_level: u32,
        credentials: CredentialTable,
        secret: Option<&[u8]>,
    ) -> Self {
        let secret = match secret {
            Some(secret) => secret.to_vec(),
            None => {
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        };
        let opaque = algorithm.hash(&format!("{}:{}", realm, hex::encode(&secret)));
        Self {
            realm: realm.to_string(),
            algorithm,
            timeout,
            default_level,
            credentials,
            nonces: NonceSigner::new(secret, realm),
            opaque: opaque[..32.min(opaque.len())].to_string(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let algorithm = config.algorithm.parse::<DigestAlgorithm>().map_err(anyhow::Error::msg)?;
        Ok(Self::new(
            &config.realm,
            algorithm,
            Duration::from_secs(config.timeout),
            config.default_level,
            CredentialTable::from_entries(&config.users),
            config.nonce_secret.as_deref().map(str::as_bytes),
        ))
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn default_level(&self) -> u32 {
        self.default_level
    }

    pub fn credentials(&self) -> &CredentialTable {
        &self.credentials
    }

    pub fn nonce_window(&self) -> Duration {
        if self.timeout.is_zero() {
            NEVER_EXPIRE_NONCE_WINDOW
        } else {
            self.timeout * 9 / 10
        }
    }

    /// Make sure `session` may access a resource requiring `required_level`
    pub fn authenticate(
        &self,
        request: &HttpRequest,
        session: &Session,
        required_level: u32,
    ) -> EngineResult<()> {
        let mut auth = session.auth();

        if auth.forced_logoff {
            log::info!("Forced logoff of {:?} in session {}", auth.username, session.id());
            if self.default_level > 0 {
                auth.login_anonymous(self.default_level);
            } else {
                auth.logoff();
            }
            return Err(EngineError::AuthChallenge { stale: false });
        }

        let offers_digest = request.header_value(headers::AUTHORIZATION).is_some();
        if auth.is_current(self.timeout) && !(auth.anonymous && offers_digest) {
            auth.refresh();
            return self.check_level(auth.level, auth.anonymous, required_level);
        }

        if auth.authenticated && !auth.verified {
            let username = auth.username.clone().unwrap_or_default();
            let password = auth.password.clone().unwrap_or_default();
            match self.credentials.verify_password(&username, &password, self.algorithm, &self.realm)
            {
                Some(level) => {
                    log::info!("Form login of {} verified at level {}", username, level);
                    auth.login(&username, level);
                    return self.check_level(level, false, required_level);
                }
                None => {
                    log::warn!("Form login of {} rejected", username);
                    auth.logoff();
                }
            }
        }

        let outcome = match request.header_value(headers::AUTHORIZATION) {
            Some(header) => self.verify_digest(request, header),
            None => DigestOutcome::Rejected("no credentials"),
        };

        match outcome {
            DigestOutcome::LoggedIn { username, level } => {
                log::info!("Digest login of {} at level {}", username, level);
                auth.login(&username, level);
                self.check_level(level, false, required_level)
            }
            DigestOutcome::Stale => Err(EngineError::AuthChallenge { stale: true }),
            DigestOutcome::Rejected(reason) => {
                if offers_digest {
                    log::warn!("Digest authentication failed for {}: {}", request.path(), reason);
                }
                if self.default_level > 0 {
                    auth.login_anonymous(self.default_level);
                    self.check_level(self.default_level, true, required_level)
                } else if required_level == 0 {
                    // Public resource: a rejected form login leaves the session logged off
                    Ok(())
                } else {
                    Err(EngineError::AuthChallenge { stale: false })
                }
            }
        }
    }

    fn check_level(&self, level: u32, anonymous: bool, required: u32) -> EngineResult<()> {
        if level >= required {
            Ok(())
        } else if anonymous {
            // Anonymous principals can still log in properly
            Err(EngineError::AuthChallenge { stale: false })
        } else {
            Err(EngineError::Forbidden(format!("level {} below required {}", level, required)))
        }
    }

    fn verify_digest(&self, request: &HttpRequest, header: &str) -> DigestOutcome {
        let Some(credentials) = DigestCredentials::parse(header) else {
            return DigestOutcome::Rejected("malformed authorization header");
        };
        if credentials.realm != self.realm {
            return DigestOutcome::Rejected("realm mismatch");
        }
        if let Some(algorithm) = &credentials.algorithm {
            if algorithm.parse::<DigestAlgorithm>().ok() != Some(self.algorithm) {
                return DigestOutcome::Rejected("algorithm mismatch");
            }
        }
        if credentials.opaque.as_deref().is_some_and(|opaque| opaque != self.opaque) {
            return DigestOutcome::Rejected("opaque mismatch");
        }
        let digest_path = credentials.uri.split('?').next().unwrap_or_default();
        if path_decode(digest_path) != request.path() {
            return DigestOutcome::Rejected("uri mismatch");
        }
        let Some(ha1) = self.credentials.ha1(&credentials.username, self.algorithm, &self.realm)
        else {
            return DigestOutcome::Rejected("unknown user");
        };

        let expected = digest::expected_response(
            self.algorithm,
            &ha1,
            request.method().as_str(),
            &credentials,
        );
        if !digest::constant_time_eq(&expected, &credentials.response.to_ascii_lowercase()) {
            return DigestOutcome::Rejected("wrong response");
        }

        match self.nonces.check(&credentials.nonce, self.nonce_window()) {
            NonceStatus::Valid => {}
            NonceStatus::Stale => return DigestOutcome::Stale,
            NonceStatus::Invalid => return DigestOutcome::Rejected("forged nonce"),
        }

        let level = self.credentials.get(&credentials.username).map_or(0, |c| c.level);
        DigestOutcome::LoggedIn { username: credentials.username, level }
    }

    /// `WWW-Authenticate` value carrying a fresh nonce
    pub fn challenge(&self, stale: bool) -> String {
        format!(
            "Digest realm=\"{}\", qop=\"auth\", algorithm={}, nonce=\"{}\", opaque=\"{}\", stale={}",
            self.realm,
            self.algorithm,
            self.nonces.issue(),
            self.opaque,
            if stale { "true" } else { "false" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn authenticator(default_level: u32) -> Authenticator {
        let mut table = CredentialTable::new();
        table.insert("alice", Secret::Password("wonder".into()), 5);
        Authenticator::new(
            "hestia",
            DigestAlgorithm::Md5,
            Duration::from_secs(3600),
            default_level,
            table,
            Some(b"test-secret"),
        )
    }

    fn param(challenge: &str, name: &str) -> String {
        let start = challenge.find(&format!("{}=\"", name)).unwrap() + name.len() + 2;
        let end = challenge[start..].find('"').unwrap() + start;
        challenge[start..end].to_string()
    }

    fn digest_header(auth: &Authenticator, password: &str, uri: &str) -> String {
        let challenge = auth.challenge(false);
        let nonce = param(&challenge, "nonce");
        let opaque = param(&challenge, "opaque");
        let ha1 = digest::ha1(DigestAlgorithm::Md5, "alice", "hestia", password);
        let ha2 = DigestAlgorithm::Md5.hash(&format!("GET:{}", uri));
        let response = DigestAlgorithm::Md5
            .hash(&format!("{}:{}:00000001:c0ffee:auth:{}", ha1, nonce, ha2));
        format!(
            "Digest username=\"alice\", realm=\"hestia\", nonce=\"{}\", uri=\"{}\", \
             qop=auth, nc=00000001, cnonce=\"c0ffee\", response=\"{}\", opaque=\"{}\", algorithm=MD5",
            nonce, uri, response, opaque
        )
    }

    fn session() -> Session {
        Session::new("s1".to_string(), None)
    }

    #[test]
    fn test_digest_round_trip() {
        let auth = authenticator(0);
        let session = session();
        let request = HttpRequest::new(HttpMethod::GET, "/private")
            .header("Authorization", &digest_header(&auth, "wonder", "/private"));

        auth.authenticate(&request, &session, 5).unwrap();
        let state = session.auth_state();
        assert!(session.is_authenticated());
        assert_eq!(state.username.as_deref(), Some("alice"));
        assert_eq!(state.level, 5);

        // Later requests ride on the session
        let bare = HttpRequest::new(HttpMethod::GET, "/private");
        assert!(auth.authenticate(&bare, &session, 5).is_ok());
    }

    #[test]
    fn test_wrong_password_without_fallback_challenges() {
        let auth = authenticator(0);
        let session = session();
        let request = HttpRequest::new(HttpMethod::GET, "/private")
            .header("Authorization", &digest_header(&auth, "guess", "/private"));

        let err = auth.authenticate(&request, &session, 1).unwrap_err();
        assert!(matches!(err, EngineError::AuthChallenge { stale: false }));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_wrong_password_falls_back_to_anonymous() {
        let auth = authenticator(1);
        let session = session();
        let request = HttpRequest::new(HttpMethod::GET, "/private")
            .header("Authorization", &digest_header(&auth, "guess", "/private"));

        auth.authenticate(&request, &session, 1).unwrap();
        let state = session.auth_state();
        assert!(state.anonymous);
        assert_eq!(state.level, 1);
        assert!(state.username.is_none());
    }

    #[test]
    fn test_insufficient_level_is_forbidden() {
        let auth = authenticator(0);
        let session = session();
        let request = HttpRequest::new(HttpMethod::GET, "/admin")
            .header("Authorization", &digest_header(&auth, "wonder", "/admin"));

        let err = auth.authenticate(&request, &session, 9).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_stale_nonce() {
        let auth = authenticator(0);
        let session = session();
        let nonce = auth.nonces.issue_at(chrono::Utc::now().timestamp() - 7200);
        let header = digest_header(&auth, "wonder", "/private");
        let fresh = param(&header, "nonce");
        let ha1 = digest::ha1(DigestAlgorithm::Md5, "alice", "hestia", "wonder");
        let ha2 = DigestAlgorithm::Md5.hash("GET:/private");
        let old_response =
            DigestAlgorithm::Md5.hash(&format!("{}:{}:00000001:c0ffee:auth:{}", ha1, nonce, ha2));
        let new_response = param(&header, "response");
        let stale_header =
            header.replace(&fresh, &nonce).replace(&new_response, &old_response);

        let request =
            HttpRequest::new(HttpMethod::GET, "/private").header("Authorization", &stale_header);
        let err = auth.authenticate(&request, &session, 1).unwrap_err();
        assert!(matches!(err, EngineError::AuthChallenge { stale: true }));
    }

    #[test]
    fn test_pending_form_login_is_verified() {
        let auth = authenticator(0);
        let session = session();
        session.auth().login_pending("alice", "wonder");

        let request = HttpRequest::new(HttpMethod::GET, "/private");
        auth.authenticate(&request, &session, 2).unwrap();
        let state = session.auth_state();
        assert!(state.verified);
        assert_eq!(state.level, 5);
        assert!(state.password.is_none());

        let rejected = Session::new("s2".to_string(), None);
        rejected.auth().login_pending("alice", "nope");
        assert!(auth.authenticate(&request, &rejected, 2).is_err());
        assert!(!rejected.auth_state().authenticated);

        let public = Session::new("s3".to_string(), None);
        public.auth().login_pending("alice", "nope");
        assert!(auth.authenticate(&request, &public, 0).is_ok());
        assert!(!public.auth_state().authenticated);
    }

    #[test]
    fn test_forced_logoff() {
        let auth = authenticator(1);
        let session = session();
        session.auth().login("alice", 5);
        session.force_logoff();

        let request = HttpRequest::new(HttpMethod::GET, "/private");
        let err = auth.authenticate(&request, &session, 1).unwrap_err();
        assert!(matches!(err, EngineError::AuthChallenge { stale: false }));
        let state = session.auth_state();
        assert!(state.anonymous);
        assert!(!state.forced_logoff);

        let strict = authenticator(0);
        let session = Session::new("s3".to_string(), None);
        session.auth().login("alice", 5);
        session.force_logoff();
        assert!(strict.authenticate(&request, &session, 1).is_err());
        assert!(!session.auth_state().authenticated);
    }

    #[test]
    fn test_challenge_format() {
        let auth = authenticator(0);
        let challenge = auth.challenge(true);
        assert!(challenge.starts_with("Digest realm=\"hestia\", qop=\"auth\", algorithm=MD5"));
        assert!(challenge.ends_with("stale=true"));
        assert_eq!(auth.nonce_window(), Duration::from_secs(3240));
    }
}
