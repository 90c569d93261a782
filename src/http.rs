use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReqParam {
    pub key: String,
    pub value: String,
}

impl ReqParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        ReqParam { key: key.into(), value: value.into() }
    }
}

pub enum ReqBody {
    Empty,
    Json(Value),
    Form(Vec<ReqParam>),
}

pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub query_params: Vec<ReqParam>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path: String, query_params: Vec<ReqParam>) -> Endpoint {
        Endpoint {
            method,
            path,
            query_params,
        }
    }

    pub fn to_url(&self, base_url: &str) -> Result<Url, HttpError> {
        let raw = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let mut url = Url::parse(&raw).map_err(|err| HttpError::InvalidUrl(format!("{}: {}", raw, err)))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for param in &self.query_params {
                pairs.append_pair(&param.key, &param.value);
            }
        }
        Ok(url)
    }
}

pub struct HttpRequest {
    pub endpoint: Endpoint,
    pub req_body: ReqBody,
}

impl HttpRequest {
    pub fn new(endpoint: Endpoint, req_body: ReqBody) -> HttpRequest {
        HttpRequest { endpoint, req_body }
    }
}

pub struct HttpResult {
    pub body: String,
    pub status_code: u16,
}

#[derive(Clone, Debug, Error)]
pub enum HttpError {
    #[error("status {0}: {1}")]
    Status(u16, StatusError),
    #[error("{0}")]
    Io(String),
    #[error("could not decode response body: {0}")]
    Decode(String),
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Error)]
pub enum StatusError {
    #[error("client error: {0}")]
    ClientError(String),
    #[error("server error: {0}")]
    ServerError(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpMethod {
    GET,
    POST,
}

impl HttpMethod {
    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
        }
    }
}

/// Thin client bound to one server root. Shared by the build request store
/// and the buildbot syncers.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub async fn get_json(&self, path: &str, query_params: Vec<ReqParam>) -> Result<Value, HttpError> {
        let endpoint = Endpoint::new(HttpMethod::GET, path.to_string(), query_params);
        let result = self.execute(HttpRequest::new(endpoint, ReqBody::Empty)).await?;
        parse_json(&result.body)
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, HttpError> {
        let endpoint = Endpoint::new(HttpMethod::POST, path.to_string(), vec![]);
        let result = self.execute(HttpRequest::new(endpoint, ReqBody::Json(body))).await?;
        parse_json(&result.body)
    }

    pub async fn post_form(&self, path: &str, fields: Vec<ReqParam>) -> Result<u16, HttpError> {
        let endpoint = Endpoint::new(HttpMethod::POST, path.to_string(), vec![]);
        let result = self.execute(HttpRequest::new(endpoint, ReqBody::Form(fields))).await?;
        Ok(result.status_code)
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResult, HttpError> {
        let req = self.build_reqwest(request)?;
        let response = req.send().await.map_err(|error| {
            debug!("http request failed: {}", error);
            HttpError::Io(error.to_string())
        })?;
        let status_code = response.status();
        debug!("http request executed, status_code: {}", status_code);
        let text = response
            .text()
            .await
            .map_err(|error| HttpError::Io(error.to_string()))?;
        if status_code.is_success() || status_code.is_redirection() {
            Ok(HttpResult {
                body: text,
                status_code: status_code.as_u16(),
            })
        } else if status_code.is_client_error() {
            Err(HttpError::Status(status_code.as_u16(), StatusError::ClientError(text)))
        } else {
            Err(HttpError::Status(status_code.as_u16(), StatusError::ServerError(text)))
        }
    }

    fn build_reqwest(&self, request: HttpRequest) -> Result<RequestBuilder, HttpError> {
        let url = request.endpoint.to_url(&self.base_url)?;
        debug!("{:?} {}", request.endpoint.method, url);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let req = self
            .client
            .request(request.endpoint.method.to_reqwest(), url)
            .headers(headers);

        Ok(match request.req_body {
            ReqBody::Empty => req,
            ReqBody::Json(body) => req.json(&body),
            ReqBody::Form(fields) => {
                let pairs: Vec<(String, String)> = fields
                    .into_iter()
                    .map(|field| (field.key, field.value))
                    .collect();
                req.form(&pairs)
            }
        })
    }
}

fn parse_json(body: &str) -> Result<Value, HttpError> {
    serde_json::from_str(body).map_err(|err| HttpError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_keeps_repeated_query_params() {
        let endpoint = Endpoint::new(
            HttpMethod::GET,
            "/json/builders/some-builder/builds/".to_string(),
            vec![ReqParam::new("select", "-1"), ReqParam::new("select", "-2")],
        );
        let url = endpoint.to_url("http://build.example.org:8010/").unwrap();
        assert_eq!(
            url.as_str(),
            "http://build.example.org:8010/json/builders/some-builder/builds/?select=-1&select=-2"
        );
    }

    #[test]
    fn url_without_query() {
        let endpoint = Endpoint::new(HttpMethod::POST, "/api/update-triggerable/".to_string(), vec![]);
        let url = endpoint.to_url("https://perf.example.org").unwrap();
        assert_eq!(url.as_str(), "https://perf.example.org/api/update-triggerable/");
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let endpoint = Endpoint::new(HttpMethod::GET, "/x".to_string(), vec![]);
        assert!(matches!(endpoint.to_url("not a url"), Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn undecodable_json_is_a_decode_error() {
        assert!(matches!(parse_json("<html>"), Err(HttpError::Decode(_))));
    }
}
