// src/network/job_client.rs
//! Job server client implementation
//!
//! Speaks the minimal HTTP(S)+JSON protocol the engine needs: fetch a
//! work unit, submit a solution, report the aggregate hashrate. The
//! transport lives behind the [`JobSource`] trait so the session can be
//! driven against scripted sources in tests and against other adapters
//! if the server protocol changes.
//!
//! All calls are blocking and are only ever made from the session's
//! control thread, never from hash workers.

use crate::config::MinerConfig;
use crate::types::{Solution, SubmitOutcome, WorkUnit};
use crate::utils::error::MinerError;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Longest target prefix the engine accepts (a full SHA-1 digest in hex)
pub const MAX_TARGET_LEN: usize = 40;

/// Backoff applied when the server rate-limits without a `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Source of work units and sink of solutions
///
/// The pluggable seam between the mining session and the job server.
pub trait JobSource: Send + Sync {
    /// Fetches the next work unit for `username`
    ///
    /// # Errors
    /// - `Network` on connection failure or server-side errors
    /// - `Protocol` on malformed or invalid payloads
    /// - `RateLimited` when the server signals backoff
    fn fetch_job(&self, username: &str) -> Result<WorkUnit, MinerError>;

    /// Submits a solution and returns the server's verdict
    ///
    /// A `Rejected` verdict is an ordinary outcome; errors follow the
    /// same taxonomy as [`JobSource::fetch_job`].
    fn submit_solution(
        &self,
        username: &str,
        solution: &Solution,
    ) -> Result<SubmitOutcome, MinerError>;

    /// Reports the aggregate hashrate; best-effort telemetry
    fn report_hashrate(&self, username: &str, hashes_per_second: f64) -> Result<(), MinerError>;
}

/// Work unit payload as the server sends it
#[derive(Debug, Deserialize)]
struct JobResponse {
    last_block_hash: String,
    target: String,
    difficulty: u64,
}

/// Solution payload as the server expects it
///
/// The nonce crosses the wire as a decimal string.
#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    user: &'a str,
    nonce: String,
    elapsed_seconds: f64,
    rig: &'a str,
}

/// Server verdict for a submitted solution
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Hashrate telemetry payload
#[derive(Debug, Serialize)]
struct HashrateReport<'a> {
    user: &'a str,
    hashrate: f64,
}

/// HTTP client for the job server
///
/// Stateless between calls apart from the pooled connection inside the
/// underlying HTTP client.
pub struct HttpJobClient {
    /// Server base URL all endpoints are joined onto
    base_url: Url,
    /// Blocking HTTP client with the configured request timeout
    client: reqwest::blocking::Client,
    /// Rig identifier sent along with submissions
    rig_name: String,
}

impl HttpJobClient {
    /// Builds a client from the miner configuration
    ///
    /// # Errors
    /// Returns `Config` when the server URL does not parse or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &MinerConfig) -> Result<Self, MinerError> {
        let base_url = Url::parse(&config.server_url).map_err(|e| {
            MinerError::Config(format!("invalid server URL '{}': {}", config.server_url, e))
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("duco_miner-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MinerError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpJobClient {
            base_url,
            client,
            rig_name: config.rig_name.clone(),
        })
    }

    /// Joins an endpoint path onto the base URL
    fn endpoint(&self, path: &str) -> Result<Url, MinerError> {
        self.base_url
            .join(path)
            .map_err(|e| MinerError::Config(format!("invalid endpoint '{}': {}", path, e)))
    }

    /// Maps HTTP status codes onto the error taxonomy
    ///
    /// 429 becomes `RateLimited` honoring an integral `Retry-After`
    /// header; any other non-success status is a transient network error.
    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, MinerError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(MinerError::RateLimited(delay));
        }
        if !status.is_success() {
            return Err(MinerError::Network(format!("server returned HTTP {}", status)));
        }
        Ok(response)
    }
}

impl JobSource for HttpJobClient {
    fn fetch_job(&self, username: &str) -> Result<WorkUnit, MinerError> {
        let response = self
            .client
            .get(self.endpoint("job")?)
            .query(&[("user", username)])
            .send()?;
        let job: JobResponse = Self::check_status(response)?.json()?;
        work_unit_from_response(job)
    }

    fn submit_solution(
        &self,
        username: &str,
        solution: &Solution,
    ) -> Result<SubmitOutcome, MinerError> {
        let request = SubmitRequest {
            user: username,
            nonce: solution.nonce.to_string(),
            elapsed_seconds: solution.elapsed_seconds,
            rig: &self.rig_name,
        };
        let response = self
            .client
            .post(self.endpoint("submit")?)
            .json(&request)
            .send()?;
        let verdict: SubmitResponse = Self::check_status(response)?.json()?;
        if verdict.accepted {
            Ok(SubmitOutcome::Accepted)
        } else {
            if let Some(reason) = verdict.reason {
                log::debug!("server rejected solution: {}", reason);
            }
            Ok(SubmitOutcome::Rejected)
        }
    }

    fn report_hashrate(&self, username: &str, hashes_per_second: f64) -> Result<(), MinerError> {
        let report = HashrateReport {
            user: username,
            hashrate: hashes_per_second,
        };
        let response = self
            .client
            .post(self.endpoint("hashrate")?)
            .json(&report)
            .send()?;
        Self::check_status(response)?;
        Ok(())
    }
}

/// Validates a raw job payload into a [`WorkUnit`]
///
/// The target is normalized to lowercase; uppercase hex from the server
/// is tolerated, anything non-hex or over-long is a protocol violation,
/// as are an empty block hash and a zero difficulty.
fn work_unit_from_response(job: JobResponse) -> Result<WorkUnit, MinerError> {
    if job.last_block_hash.trim().is_empty() {
        return Err(MinerError::Protocol("job has an empty block hash".into()));
    }
    if job.difficulty == 0 {
        return Err(MinerError::Protocol("job has zero difficulty".into()));
    }
    if job.target.len() > MAX_TARGET_LEN {
        return Err(MinerError::Protocol(format!(
            "target '{}' longer than a SHA-1 digest",
            job.target
        )));
    }
    let target = job.target.to_lowercase();
    if !target.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MinerError::Protocol(format!(
            "target '{}' is not hexadecimal",
            job.target
        )));
    }
    Ok(WorkUnit {
        last_block_hash: job.last_block_hash,
        target,
        difficulty: job.difficulty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(last_block_hash: &str, target: &str, difficulty: u64) -> JobResponse {
        JobResponse {
            last_block_hash: last_block_hash.into(),
            target: target.into(),
            difficulty,
        }
    }

    #[test]
    fn parses_a_job_payload() {
        let payload = r#"{"last_block_hash":"ba29a158","target":"00ff","difficulty":500}"#;
        let response: JobResponse = serde_json::from_str(payload).unwrap();
        let unit = work_unit_from_response(response).unwrap();
        assert_eq!(unit.last_block_hash, "ba29a158");
        assert_eq!(unit.target, "00ff");
        assert_eq!(unit.difficulty, 500);
    }

    #[test]
    fn uppercase_targets_are_normalized() {
        let unit = work_unit_from_response(job("ba29", "AB12", 10)).unwrap();
        assert_eq!(unit.target, "ab12");
    }

    #[test]
    fn empty_target_is_allowed() {
        assert!(work_unit_from_response(job("ba29", "", 10)).is_ok());
    }

    #[test]
    fn empty_block_hash_is_a_protocol_violation() {
        let err = work_unit_from_response(job("  ", "ab", 10)).unwrap_err();
        assert!(matches!(err, MinerError::Protocol(_)));
    }

    #[test]
    fn zero_difficulty_is_a_protocol_violation() {
        let err = work_unit_from_response(job("ba29", "ab", 0)).unwrap_err();
        assert!(matches!(err, MinerError::Protocol(_)));
    }

    #[test]
    fn non_hex_target_is_a_protocol_violation() {
        let err = work_unit_from_response(job("ba29", "xyz", 10)).unwrap_err();
        assert!(matches!(err, MinerError::Protocol(_)));
    }

    #[test]
    fn overlong_target_is_a_protocol_violation() {
        let target = "a".repeat(MAX_TARGET_LEN + 1);
        let err = work_unit_from_response(job("ba29", &target, 10)).unwrap_err();
        assert!(matches!(err, MinerError::Protocol(_)));
    }

    #[test]
    fn parses_submit_verdicts() {
        let accepted: SubmitResponse = serde_json::from_str(r#"{"accepted":true}"#).unwrap();
        assert!(accepted.accepted);
        assert!(accepted.reason.is_none());

        let rejected: SubmitResponse =
            serde_json::from_str(r#"{"accepted":false,"reason":"stale"}"#).unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.reason.as_deref(), Some("stale"));
    }

    #[test]
    fn submit_request_serializes_nonce_as_string() {
        let request = SubmitRequest {
            user: "alice",
            nonce: 4242u64.to_string(),
            elapsed_seconds: 1.5,
            rig: "test-rig",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["nonce"], "4242");
        assert_eq!(json["user"], "alice");
    }

    #[test]
    fn client_rejects_malformed_base_url() {
        let config = MinerConfig {
            server_url: "not a url".into(),
            ..MinerConfig::default()
        };
        assert!(matches!(
            HttpJobClient::new(&config),
            Err(MinerError::Config(_))
        ));
    }
}
