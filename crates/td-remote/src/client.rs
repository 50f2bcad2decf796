//! HTTP service client.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use td_jobs::{JobDescription, JobRequest, JobService};
use td_search::{SearchDescription, SearchRequest, SearchService};
use td_types::{RemoteServiceError, ServiceResult};

use crate::wire::{
    CreateJobBody, CreateJobResponse, CreateSearchBody, CreateSearchResponse,
    DescribeJobResponse, DescribeSearchResponse, ErrorBody,
};

/// Per-request timeout used by [`HttpServiceClient::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a job/search service over JSON HTTP.
///
/// Endpoints, relative to `base_url`: `POST /jobs`, `GET /jobs/{id}`,
/// `POST /searches`, `GET /searches/{id}`. Ids are percent-encoded as a
/// single path segment.
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    base_url: Url,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpServiceClient {
    pub fn new(base_url: impl Into<String>) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteServiceError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Self::with_client(base_url, client)
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> ServiceResult<Self> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw).map_err(|e| RemoteServiceError::Transport {
            message: format!("invalid base URL {raw:?}: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteServiceError::Transport {
                message: format!("base URL {raw:?} cannot carry a path"),
            });
        }
        Ok(Self {
            base_url,
            auth_token: None,
            client,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append `segments` to the base path, encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode a 2xx JSON body. `not_found` builds the
    /// error reported for a 404.
    async fn send<T, F>(&self, builder: RequestBuilder, not_found: F) -> ServiceResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> RemoteServiceError,
    {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| RemoteServiceError::Transport {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteServiceError::Transport {
                message: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            let error = classify(status, &body, not_found);
            warn!(status = status.as_u16(), error = %error, "Remote service refused request");
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| RemoteServiceError::MalformedResponse {
            message: format!("failed to parse JSON response: {e}"),
        })
    }
}

fn classify<F>(status: StatusCode, body: &str, not_found: F) -> RemoteServiceError
where
    F: FnOnce() -> RemoteServiceError,
{
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteServiceError::Authentication { message }
        }
        StatusCode::NOT_FOUND => not_found(),
        _ => RemoteServiceError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl JobService for HttpServiceClient {
    async fn create_job(&self, request: JobRequest) -> ServiceResult<String> {
        debug!(job_name = %request.job_name, "POST /jobs");
        let body = CreateJobBody::from(&request);
        let created: CreateJobResponse = self
            .send(self.client.post(self.url(&["jobs"])).json(&body), || {
                RemoteServiceError::Rejected {
                    status: 404,
                    message: "job endpoint not found".to_string(),
                }
            })
            .await?;
        Ok(created.job_id)
    }

    async fn describe_job(&self, job_id: &str) -> ServiceResult<JobDescription> {
        let body: DescribeJobResponse = self
            .send(self.client.get(self.url(&["jobs", job_id])), || {
                RemoteServiceError::UnknownJob {
                    job_id: job_id.to_string(),
                }
            })
            .await?;
        Ok(body.into())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[async_trait]
impl SearchService for HttpServiceClient {
    async fn create_search(&self, request: SearchRequest) -> ServiceResult<String> {
        debug!(search_name = %request.search_name, "POST /searches");
        let body = CreateSearchBody::from(&request);
        let created: CreateSearchResponse = self
            .send(self.client.post(self.url(&["searches"])).json(&body), || {
                RemoteServiceError::Rejected {
                    status: 404,
                    message: "search endpoint not found".to_string(),
                }
            })
            .await?;
        Ok(created.search_id)
    }

    async fn describe_search(&self, search_id: &str) -> ServiceResult<SearchDescription> {
        let body: DescribeSearchResponse = self
            .send(self.client.get(self.url(&["searches", search_id])), || {
                RemoteServiceError::UnknownSearch {
                    search_id: search_id.to_string(),
                }
            })
            .await?;
        Ok(body.into())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use td_search::{ParameterRanges, SearchBudget, SearchSpace, SearchState};
    use td_types::{ExecutionTarget, JobStatus, MetricRule, Scalar, ScalarMap};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serve one canned `(status, body)` per connection, in order, and hand
    /// back each raw request.
    async fn canned(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                let _ = tx.send(request);

                let response = format!(
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), rx)
    }

    /// Read headers plus a `Content-Length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buffer = [0u8; 4096];
        loop {
            let n = socket.read(&mut buffer).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buffer[..n]);
            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn client(base_url: &str) -> HttpServiceClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpServiceClient::with_client(base_url, http).unwrap()
    }

    fn job_request() -> JobRequest {
        let mut hyperparameters = ScalarMap::new();
        hyperparameters.insert("do_lower_case".into(), Scalar::Bool(true));
        JobRequest {
            job_name: "glue-mrpc-2024".into(),
            entry_point: "run_glue.py".into(),
            source_bundle: "s3://bucket/code".into(),
            hyperparameters,
            target: ExecutionTarget::default(),
            role: "role".into(),
            output_location: None,
            inputs: BTreeMap::new(),
            framework: None,
            metric_rules: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_job_posts_wire_body_with_token() {
        let (url, mut requests) = canned(vec![(201, r#"{"job_id":"job-7"}"#)]).await;
        let client = client(&url).with_auth_token("s3cret");

        let id = client.create_job(job_request()).await.unwrap();
        assert_eq!(id, "job-7");

        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("POST /jobs HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer s3cret"));
        assert!(raw.contains(r#""do_lower_case":"True""#));
    }

    #[tokio::test]
    async fn describe_job_decodes_status_and_metrics() {
        let (url, mut requests) = canned(vec![(
            200,
            r#"{"job_id":"job-7","job_name":"glue","status":"succeeded",
                "log_excerpt":"{'acc_': 0.86}","final_metrics":{"accuracy":0.86},
                "created_at":"2024-05-01T12:00:00Z","ended_at":"2024-05-01T13:00:00Z"}"#,
        )])
        .await;

        let description = client(&url).describe_job("job-7").await.unwrap();
        assert_eq!(description.status, JobStatus::Succeeded);
        assert_eq!(description.final_metrics["accuracy"], 0.86);
        assert!(requests.recv().await.unwrap().starts_with("GET /jobs/job-7 "));
    }

    #[tokio::test]
    async fn ids_are_encoded_as_one_path_segment() {
        let (url, mut requests) = canned(vec![(404, "{}"), (404, "{}")]).await;

        let client = client(&format!("{url}/api/"));
        let _ = client.describe_job("job/7 x").await;
        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("GET /api/jobs/job%2F7%20x "), "{raw}");

        let _ = client.describe_search("../admin?all").await;
        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("GET /api/searches/..%2Fadmin%3Fall "), "{raw}");
    }

    #[test]
    fn unusable_base_urls_are_refused() {
        assert!(matches!(
            HttpServiceClient::new("not a url"),
            Err(RemoteServiceError::Transport { .. })
        ));
        assert!(matches!(
            HttpServiceClient::new("mailto:ops@example.com"),
            Err(RemoteServiceError::Transport { .. })
        ));
        assert_eq!(
            HttpServiceClient::new("http://localhost:8080").unwrap().base_url(),
            "http://localhost:8080/"
        );
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let (url, _requests) = canned(vec![
            (401, r#"{"message":"token expired"}"#),
            (404, "{}"),
            (404, "{}"),
            (500, "internal failure"),
        ])
        .await;
        let client = client(&url);

        assert_eq!(
            client.describe_job("a").await,
            Err(RemoteServiceError::Authentication {
                message: "token expired".into()
            })
        );
        assert_eq!(
            client.describe_job("b").await,
            Err(RemoteServiceError::UnknownJob { job_id: "b".into() })
        );
        assert_eq!(
            client.describe_search("c").await,
            Err(RemoteServiceError::UnknownSearch {
                search_id: "c".into()
            })
        );
        assert_eq!(
            client.describe_job("d").await,
            Err(RemoteServiceError::Rejected {
                status: 500,
                message: "internal failure".into()
            })
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let (url, _requests) = canned(vec![(200, r#"{"unexpected":true}"#)]).await;
        assert!(matches!(
            client(&url).describe_job("x").await,
            Err(RemoteServiceError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            client(&format!("http://{addr}")).describe_job("x").await,
            Err(RemoteServiceError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn search_round_trip() {
        let (url, mut requests) = canned(vec![
            (200, r#"{"search_id":"hpo-1"}"#),
            (
                200,
                r#"{"search_id":"hpo-1","search_name":"glue","state":"completed","max_trials":1,
                    "trials":[{"trial_name":"hpo-1-001","created_at":"2024-05-01T12:00:00Z",
                    "status":"succeeded","tuned_hyperparameters":{"num_train_epochs":"3"},
                    "objective":0.88}]}"#,
            ),
        ])
        .await;
        let client = client(&url);
        let space = SearchSpace::new().add_int("num_train_epochs", 1, 4);
        let request = SearchRequest {
            search_name: "glue".into(),
            template: job_request(),
            ranges: ParameterRanges::from_space(&space).unwrap(),
            objective: MetricRule::new("accuracy", r"'acc_': ([0-9.]+)").unwrap(),
            budget: SearchBudget::new(1, 1),
        };

        let id = client.create_search(request).await.unwrap();
        let raw = requests.recv().await.unwrap();
        assert!(raw.starts_with("POST /searches HTTP/1.1"));
        assert!(raw.contains(r#""IntegerParameterRanges""#));

        let description = client.describe_search(&id).await.unwrap();
        assert_eq!(description.state, SearchState::Completed);
        assert_eq!(description.trials[0].objective, Some(0.88));
        assert_eq!(description.trials[0].tuned_hyperparameters["num_train_epochs"], "3");
    }
}
