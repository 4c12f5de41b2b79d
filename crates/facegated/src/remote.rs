//! HTTP clients for the identity-match and enrollment-validation services.

use std::time::Duration;

use facegate_core::{
    EnrollmentValidator, EnrollmentVerdict, IdentityMatcher, MatchResponse, MatcherError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Serialize)]
struct MatchBody<'a> {
    descriptor: &'a [f32],
}

#[derive(Serialize)]
struct EnrollmentBody<'a> {
    descriptors: &'a [Vec<f32>],
}

/// Shared agent configuration: one global timeout per call, and non-2xx
/// statuses are read like any other body so the service's own
/// `{"success": false, ...}` replies reach the gate.
struct JsonClient {
    agent: ureq::Agent,
    url: String,
    timeout: Duration,
}

impl JsonClient {
    fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            url: url.into(),
            timeout,
        }
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T, MatcherError> {
        let mut response = self
            .agent
            .post(&self.url)
            .send_json(body)
            .map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| self.classify(e))?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::warn!(url = %self.url, status = %status, error = %e, "non-JSON reply");
            MatcherError::Malformed(e.to_string())
        })
    }

    fn classify(&self, err: ureq::Error) -> MatcherError {
        match err {
            ureq::Error::Timeout(_) => MatcherError::Timeout(self.timeout.as_millis() as u64),
            other => {
                tracing::error!(url = %self.url, error = %other, "identity service request failed");
                MatcherError::Transport(other.to_string())
            }
        }
    }
}

/// `POST {"descriptor": [...]}` to the identity-match endpoint.
pub struct HttpMatcher {
    client: JsonClient,
}

impl HttpMatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(url, timeout),
        }
    }
}

impl IdentityMatcher for HttpMatcher {
    fn match_descriptor(&self, descriptor: &[f32]) -> Result<MatchResponse, MatcherError> {
        self.client.post(&MatchBody { descriptor })
    }
}

/// `POST {"descriptors": [[...], [...], [...]]}` to the enrollment-validation endpoint.
pub struct HttpEnrollmentValidator {
    client: JsonClient,
}

impl HttpEnrollmentValidator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(url, timeout),
        }
    }
}

impl EnrollmentValidator for HttpEnrollmentValidator {
    fn validate(&self, descriptors: &[Vec<f32>]) -> Result<EnrollmentVerdict, MatcherError> {
        self.client.post(&EnrollmentBody { descriptors })
    }
}
