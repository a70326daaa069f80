/*!
 * HTTP store client
 *
 * Speaks the InfluxDB 2.x HTTP API: `/ping` for reachability, `/api/v2/query`
 * (Flux, annotated CSV) for reads, `/api/v2/write` (line protocol) for
 * writes. This is the only module that owns network deadlines; one request
 * timeout covers every call the mirror makes.
 */

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use crate::store::csv;
use crate::store::line;
use crate::store::point::DataPoint;
use crate::store::{StoreClient, StoreError, StoreTarget};

/// Look-back windows for watermark discovery, narrowest first.
///
/// A destination that mirrored recently answers from the first narrow
/// query; only a long-idle or freshly provisioned destination pays for the
/// from-the-epoch scan at the end.
const LOOKBACK_WINDOWS: &[&str] = &[
    "-1m",
    "-1h",
    "-6h",
    "-12h",
    "-1d",
    "-7d",
    "-14d",
    "1970-01-01T00:00:00Z",
];

const REQUEST_TIMEOUT_SECS: u64 = 30;
const ERROR_BODY_LIMIT: usize = 256;

pub struct HttpStoreClient {
    http: reqwest::blocking::Client,
}

impl HttpStoreClient {
    pub fn new() -> Result<Self, StoreError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("tidemark/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Run a Flux query and return the raw annotated-CSV body
    fn query(&self, target: &StoreTarget, flux: &str) -> Result<String, StoreError> {
        let url = format!("{}/api/v2/query", base_url(target));
        let body = json!({
            "query": flux,
            "type": "flux",
            "dialect": {
                "header": true,
                "annotations": ["datatype", "group", "default"],
            },
        });

        let response = self
            .http
            .post(url)
            .query(&[("org", target.org.as_str())])
            .header("Authorization", format!("Token {}", target.token))
            .header("Accept", "application/csv")
            .json(&body)
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), text));
        }
        Ok(text)
    }
}

impl StoreClient for HttpStoreClient {
    fn ping(&self, target: &StoreTarget) -> bool {
        let url = format!("{}/ping", base_url(target));
        self.http
            .get(url)
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn latest_timestamp(
        &self,
        target: &StoreTarget,
        series: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        for window in LOOKBACK_WINDOWS {
            let body = self.query(target, &watermark_flux(series, window))?;
            if let Some(time) = csv::max_time(&body)? {
                return Ok(Some(time));
            }
        }
        Ok(None)
    }

    fn query_after(
        &self,
        target: &StoreTarget,
        series: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StoreError> {
        let body = self.query(target, &delta_flux(series, since))?;
        csv::decode_points(&body)
    }

    fn write(
        &self,
        target: &StoreTarget,
        series: &str,
        points: &[DataPoint],
    ) -> Result<(), StoreError> {
        let url = format!("{}/api/v2/write", base_url(target));
        let response = self
            .http
            .post(url)
            .query(&[
                ("org", target.org.as_str()),
                ("bucket", series),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", target.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line::encode_batch(points))
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), text));
        }
        Ok(())
    }
}

fn base_url(target: &StoreTarget) -> &str {
    target.url.trim_end_matches('/')
}

fn status_error(status: u16, body: String) -> StoreError {
    let mut body = body;
    if body.len() > ERROR_BODY_LIMIT {
        body.truncate(ERROR_BODY_LIMIT);
        body.push_str("...");
    }
    StoreError::Status { status, body }
}

/// Last stored timestamp for a bucket within one look-back window.
///
/// No `group()` before `last()`: a bucket whose series carry different
/// value types cannot be merged into one table. Each series table returns
/// its own last row instead, and the decoder takes the maximum `_time`.
fn watermark_flux(series: &str, window: &str) -> String {
    format!(
        r#"from(bucket: "{}") |> range(start: {}) |> sort(columns: ["_time"]) |> last()"#,
        flux_escape(series),
        window
    )
}

/// Everything in a bucket strictly after `since`
fn delta_flux(series: &str, since: DateTime<Utc>) -> String {
    // Flux range(start:) is inclusive; start one nanosecond past the
    // watermark to get strictly-greater semantics.
    let start = since + chrono::Duration::nanoseconds(1);
    format!(
        r#"from(bucket: "{}") |> range(start: {})"#,
        flux_escape(series),
        start.to_rfc3339_opts(SecondsFormat::Nanos, true)
    )
}

fn flux_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
