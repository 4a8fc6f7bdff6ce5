//! Owned handle on one relay event stream.
//!
//! The consumer only sees [`EventSubscription`]: raw `data` payloads or a
//! single transport failure, plus an explicit, idempotent `close`. The
//! production implementation wraps `reqwest_eventsource::EventSource`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tracing::{debug, warn};
use url::Url;

use crate::error::ClientError;
use crate::types::CredentialBundle;

/// Relay route path, relative to the relay base URL.
pub const MARK_ATTENDANCE_PATH: &str = "/api/mark-attendance";

/// What an open subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `data` payload of one SSE message, unparsed.
    Message(String),
    /// The connection failed or ended. Nothing follows.
    Failed(String),
}

#[async_trait]
pub trait EventSubscription: Send {
    /// Next signal, or `None` once the subscription is closed.
    async fn next_signal(&mut self) -> Option<Signal>;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Opens subscriptions for a credential bundle.
pub trait Subscriber: Send + Sync {
    fn open(&self, bundle: &CredentialBundle) -> Result<Box<dyn EventSubscription>, ClientError>;
}

/// Subscribes to the relay's mark-attendance route over HTTP.
#[derive(Debug, Clone)]
pub struct RelaySubscriber {
    client: reqwest::Client,
    endpoint: Url,
}

impl RelaySubscriber {
    pub fn new(relay_url: &str) -> Result<Self, ClientError> {
        Self::with_client(relay_url, reqwest::Client::new())
    }

    pub fn with_client(relay_url: &str, client: reqwest::Client) -> Result<Self, ClientError> {
        let base = Url::parse(relay_url)
            .map_err(|e| ClientError::InvalidRelayUrl(format!("{}: {}", relay_url, e)))?;
        let endpoint = base
            .join(MARK_ATTENDANCE_PATH)
            .map_err(|e| ClientError::InvalidRelayUrl(format!("{}: {}", relay_url, e)))?;
        Ok(Self { client, endpoint })
    }

    /// Full subscription URL for a bundle, continuation tokens included when
    /// the bundle has them.
    pub fn url_for(&self, bundle: &CredentialBundle) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(bundle.query_pairs());
        url
    }
}

impl Subscriber for RelaySubscriber {
    fn open(&self, bundle: &CredentialBundle) -> Result<Box<dyn EventSubscription>, ClientError> {
        let url = self.url_for(bundle);
        debug!(endpoint = %self.endpoint, "opening relay subscription");
        let source = EventSource::new(self.client.get(url))
            .map_err(|e| ClientError::Subscribe(e.to_string()))?;
        Ok(Box::new(EventSourceSubscription {
            source: Some(source),
        }))
    }
}

/// `EventSource` backed subscription. The source is dropped on close so no
/// reconnect can happen afterwards.
pub struct EventSourceSubscription {
    source: Option<EventSource>,
}

#[async_trait]
impl EventSubscription for EventSourceSubscription {
    async fn next_signal(&mut self) -> Option<Signal> {
        loop {
            let source = self.source.as_mut()?;
            match source.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => return Some(Signal::Message(message.data)),
                Some(Err(err)) => {
                    warn!("Relay subscription failed: {}", err);
                    self.close();
                    return Some(Signal::Failed(err.to_string()));
                }
                None => {
                    self.close();
                    return Some(Signal::Failed("stream ended".to_string()));
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            debug!("relay subscription closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn url_carries_required_fields() {
        let subscriber = RelaySubscriber::new("http://127.0.0.1:3000").unwrap();
        let url = subscriber.url_for(&CredentialBundle::new("a@b.c", "p&w", "apppw"));

        assert_eq!(url.path(), MARK_ATTENDANCE_PATH);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("user_email".to_string(), "a@b.c".to_string()),
                ("quickchex_pass".to_string(), "p&w".to_string()),
                ("gmail_app_password".to_string(), "apppw".to_string()),
            ]
        );
    }

    #[test]
    fn url_carries_continuation_tokens_when_present() {
        let subscriber = RelaySubscriber::new("http://relay.local/").unwrap();
        let mut bundle = CredentialBundle::new("a@b.c", "pw", "apppw");
        bundle.session_cookie = Some("s1".to_string());
        bundle.remember_token = Some("r1".to_string());

        let url = subscriber.url_for(&bundle);
        let query = url.query().unwrap_or_default();
        assert!(query.contains("_quikchex_app_session=s1"));
        assert!(query.contains("remember_user_token=r1"));
    }

    #[test]
    fn invalid_relay_url_is_rejected() {
        let err = RelaySubscriber::new("not a url").unwrap_err();
        assert!(matches!(err, ClientError::InvalidRelayUrl(_)));
    }
}
