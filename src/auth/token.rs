use crate::diagnostics::{DiagnosticKind, Diagnostics};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Schemes that are passed through untouched when already present.
const KNOWN_SCHEMES: &[&str] = &["bearer", "basic", "token", "apikey", "digest"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token provider failed: {0}")]
    Provider(String),
    #[error("token provider returned an empty token")]
    Empty,
    #[error("token handler has been disposed")]
    Disposed,
}

/// A credential that cannot be printed.
///
/// The buffer is zeroed when the value is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value. Only the HTTP sender reads this, when it builds the header.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn scrub(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.fill(0);
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

impl Drop for SecretToken {
    fn drop(&mut self) {
        self.scrub();
    }
}

/// What a token provider hands back.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: SecretToken,
    /// Expiry in epoch milliseconds, if the issuer reports one.
    pub expires_at: Option<i64>,
}

impl IssuedToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretToken::new(value),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl From<String> for IssuedToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for IssuedToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

pub type TokenProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Result<IssuedToken, TokenError>> + Send + Sync>;

#[derive(Clone)]
pub enum TokenSource {
    Static(SecretToken),
    Provider(TokenProvider),
}

impl TokenSource {
    pub fn fixed(value: impl Into<String>) -> Self {
        TokenSource::Static(SecretToken::new(value))
    }

    pub fn provider<F, Fut>(provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<IssuedToken, TokenError>> + Send + 'static,
    {
        TokenSource::Provider(Arc::new(move || provider().boxed()))
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("Static([REDACTED])"),
            TokenSource::Provider(_) => f.write_str("Provider"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLifecycle {
    Uninitialized,
    Resolving,
    Ready,
    /// Transient: set while a failed resolution is reported, then reset to
    /// `Uninitialized` so the next call resolves again.
    Failed,
    Disposed,
}

#[derive(Debug)]
struct TokenState {
    raw_value: Option<SecretToken>,
    expires_hint: Option<i64>,
    lifecycle: TokenLifecycle,
}

/// Owns the credential lifecycle for one transport.
pub struct SecureTokenHandler {
    /// Taken and scrubbed by `dispose()`.
    source: Mutex<Option<TokenSource>>,
    normalize: bool,
    state: Mutex<TokenState>,
    disposed: AtomicBool,
    diagnostics: Diagnostics,
}

impl SecureTokenHandler {
    /// `normalize` adds the `Bearer` scheme to bare tokens. With it off the
    /// header value is sent exactly as supplied.
    pub fn new(source: Option<TokenSource>, normalize: bool, diagnostics: Diagnostics) -> Self {
        let (raw_value, lifecycle) = match &source {
            Some(TokenSource::Static(token)) if !token.is_empty() => {
                (Some(token.clone()), TokenLifecycle::Ready)
            }
            _ => (None, TokenLifecycle::Uninitialized),
        };

        Self {
            source: Mutex::new(source),
            normalize,
            state: Mutex::new(TokenState {
                raw_value,
                expires_hint: None,
                lifecycle,
            }),
            disposed: AtomicBool::new(false),
            diagnostics,
        }
    }

    /// True when a credential source is configured at all.
    pub fn has_credential(&self) -> bool {
        self.source.lock().is_some()
    }

    pub fn has_token(&self) -> bool {
        !self.is_disposed() && self.state.lock().raw_value.is_some()
    }

    pub fn state(&self) -> TokenLifecycle {
        self.state.lock().lifecycle
    }

    pub fn expires_hint(&self) -> Option<i64> {
        self.state.lock().expires_hint
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Resolves the `Authorization` header value.
    ///
    /// Returns `None` when no credential is configured, when the provider
    /// fails, or after [`dispose`](Self::dispose).
    pub async fn authorization_header(&self) -> Option<SecretToken> {
        if self.is_disposed() {
            return None;
        }

        let provider = match self.source.lock().as_ref()? {
            TokenSource::Static(_) => None,
            TokenSource::Provider(provider) => Some(Arc::clone(provider)),
        };
        let Some(provider) = provider else {
            let state = self.state.lock();
            return state.raw_value.as_ref().map(|token| self.header_value(token));
        };

        {
            let mut state = self.state.lock();
            if state.lifecycle == TokenLifecycle::Disposed {
                return None;
            }
            state.lifecycle = TokenLifecycle::Resolving;
        }
        let result = provider().await.and_then(|issued| {
            if issued.value.is_empty() {
                Err(TokenError::Empty)
            } else {
                Ok(issued)
            }
        });

        match result {
            Ok(issued) => {
                let mut state = self.state.lock();
                // dispose() may have run while the provider was pending.
                if self.is_disposed() {
                    return None;
                }
                let header = self.header_value(&issued.value);
                state.raw_value = Some(issued.value);
                state.expires_hint = issued.expires_at;
                state.lifecycle = TokenLifecycle::Ready;
                Some(header)
            }
            Err(_) if self.is_disposed() => None,
            Err(error) => {
                {
                    let mut state = self.state.lock();
                    state.raw_value = None;
                    state.expires_hint = None;
                    state.lifecycle = TokenLifecycle::Failed;
                }
                self.diagnostics.report(
                    DiagnosticKind::TokenFailure,
                    "failed to resolve auth token; sending without credentials",
                    &[("reason", error.to_string())],
                );
                let mut state = self.state.lock();
                if state.lifecycle == TokenLifecycle::Failed {
                    state.lifecycle = TokenLifecycle::Uninitialized;
                }
                None
            }
        }
    }

    /// Scrubs the held credential and drops the source it came from. Every
    /// later call resolves to `None`.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(TokenSource::Static(mut token)) = self.source.lock().take() {
            token.scrub();
        }
        let mut state = self.state.lock();
        if let Some(mut token) = state.raw_value.take() {
            token.scrub();
        }
        state.expires_hint = None;
        state.lifecycle = TokenLifecycle::Disposed;
        tracing::debug!("auth token handler disposed");
    }

    fn header_value(&self, token: &SecretToken) -> SecretToken {
        let raw = token.expose().trim();
        if !self.normalize || has_scheme(raw) {
            SecretToken::new(raw)
        } else {
            SecretToken::new(format!("Bearer {raw}"))
        }
    }
}

impl fmt::Debug for SecureTokenHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureTokenHandler")
            .field("source", &*self.source.lock())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn has_scheme(value: &str) -> bool {
    value
        .split_once(char::is_whitespace)
        .is_some_and(|(scheme, rest)| {
            !rest.trim().is_empty()
                && KNOWN_SCHEMES
                    .iter()
                    .any(|known| scheme.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::sanitizer::Sanitizer;
    use std::sync::atomic::AtomicUsize;

    fn handler(source: Option<TokenSource>) -> (SecureTokenHandler, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let diagnostics = Diagnostics::new("test", Arc::new(Sanitizer::default()), sink.clone());
        (SecureTokenHandler::new(source, true, diagnostics), sink)
    }

    #[test]
    fn secret_debug_is_redacted() {
        let token = SecretToken::new("super-secret-value");
        assert_eq!(format!("{token:?}"), "SecretToken([REDACTED])");
        assert!(!format!("{:?}", TokenSource::fixed("abc")).contains("abc"));
    }

    #[test]
    fn scheme_detection() {
        assert!(has_scheme("Bearer abc"));
        assert!(has_scheme("basic dXNlcjpwYXNz"));
        assert!(has_scheme("ApiKey k-123"));
        assert!(!has_scheme("abc"));
        assert!(!has_scheme("Bearer"));
        assert!(!has_scheme("Custom abc"));
    }

    #[tokio::test]
    async fn static_token_is_normalized() {
        let (handler, _) = handler(Some(TokenSource::fixed("abc123")));
        let header = handler.authorization_header().await.unwrap();
        assert_eq!(header.expose(), "Bearer abc123");
        assert_eq!(handler.state(), TokenLifecycle::Ready);
        assert!(handler.has_token());
    }

    #[tokio::test]
    async fn existing_scheme_is_kept() {
        let (handler, _) = handler(Some(TokenSource::fixed("Basic dXNlcjpwYXNz")));
        let header = handler.authorization_header().await.unwrap();
        assert_eq!(header.expose(), "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn plain_mode_sends_value_verbatim() {
        let diagnostics = Diagnostics::new(
            "test",
            Arc::new(Sanitizer::default()),
            Arc::new(MemorySink::new()),
        );
        let handler =
            SecureTokenHandler::new(Some(TokenSource::fixed("abc123")), false, diagnostics);
        assert_eq!(handler.authorization_header().await.unwrap().expose(), "abc123");
    }

    #[tokio::test]
    async fn no_source_means_no_header() {
        let (handler, _) = handler(None);
        assert!(handler.authorization_header().await.is_none());
        assert!(!handler.has_credential());
        assert_eq!(handler.state(), TokenLifecycle::Uninitialized);
    }

    #[tokio::test]
    async fn provider_is_invoked_on_every_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (handler, _) = handler(Some(TokenSource::provider(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(IssuedToken::new(format!("token-{n}")).expiring_at(1_000)) }
        })));

        assert_eq!(handler.authorization_header().await.unwrap().expose(), "Bearer token-0");
        assert_eq!(handler.authorization_header().await.unwrap().expose(), "Bearer token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(handler.expires_hint(), Some(1_000));
    }

    #[tokio::test]
    async fn provider_failure_is_reported_without_caching() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (handler, sink) = handler(Some(TokenSource::provider(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(TokenError::Provider("upstream said no".into())) }
        })));

        assert!(handler.authorization_header().await.is_none());
        assert_eq!(handler.state(), TokenLifecycle::Uninitialized);
        assert!(handler.authorization_header().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.count(DiagnosticKind::TokenFailure), 2);
        assert!(sink.contains_text("upstream said no"));
    }

    #[tokio::test]
    async fn empty_provider_result_counts_as_failure() {
        let (handler, sink) = handler(Some(TokenSource::provider(|| async {
            Ok(IssuedToken::new("   "))
        })));
        assert!(handler.authorization_header().await.is_none());
        assert_eq!(sink.count(DiagnosticKind::TokenFailure), 1);
    }

    #[tokio::test]
    async fn dispose_blocks_provider_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (handler, _) = handler(Some(TokenSource::provider(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(IssuedToken::new("abc")) }
        })));

        handler.dispose();
        handler.dispose();
        assert!(handler.authorization_header().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handler.state(), TokenLifecycle::Disposed);
        assert!(!handler.has_token());
    }

    #[tokio::test]
    async fn result_after_dispose_is_discarded() {
        let release = Arc::new(tokio::sync::Notify::new());
        let gate = release.clone();
        let (handler, _) = handler(Some(TokenSource::provider(move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(IssuedToken::new("late-token"))
            }
        })));
        let handler = Arc::new(handler);

        let pending = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.authorization_header().await })
        };
        tokio::task::yield_now().await;
        handler.dispose();
        release.notify_one();

        assert!(pending.await.unwrap().is_none());
        assert!(!handler.has_token());
        assert_eq!(handler.state(), TokenLifecycle::Disposed);
    }

    #[tokio::test]
    async fn dispose_scrubs_static_source() {
        let (handler, _) = handler(Some(TokenSource::fixed("s3cr3t-static")));
        assert!(handler.has_credential());

        handler.dispose();

        assert!(handler.source.lock().is_none());
        assert!(!handler.has_credential());
        assert!(!handler.has_token());
        assert!(!format!("{handler:?}").contains("s3cr3t-static"));
        assert!(handler.authorization_header().await.is_none());
    }

    #[tokio::test]
    async fn provider_recovers_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (handler, sink) = handler(Some(TokenSource::provider(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(TokenError::Provider("warming up".into()))
                } else {
                    Ok(IssuedToken::new("fresh"))
                }
            }
        })));

        assert!(handler.authorization_header().await.is_none());
        assert_eq!(handler.state(), TokenLifecycle::Uninitialized);
        assert_eq!(sink.count(DiagnosticKind::TokenFailure), 1);

        assert_eq!(handler.authorization_header().await.unwrap().expose(), "Bearer fresh");
        assert_eq!(handler.state(), TokenLifecycle::Ready);
    }
}
