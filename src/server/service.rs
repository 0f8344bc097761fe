use super::api::{OperationResponse, ProgressResponse};
use super::error::ApiError;
use crate::operation::OperationRequest;
use crate::orchestrator::Orchestrator;
use crate::types::OperationKind;

use http_body_util::{BodyExt, Full};
use percent_encoding::percent_decode_str;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ApiRoute {
    Progress,
    Operation {
        volume: String,
        kind: OperationKind,
    },
}

impl ApiRoute {
    fn from_path(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["progress"] => Some(Self::Progress),
            ["volumes", volume, action] if !volume.is_empty() => {
                let volume = percent_decode_str(volume).decode_utf8().ok()?;
                let kind = match *action {
                    "clone" => OperationKind::Clone,
                    "import" => OperationKind::Import,
                    "export" => OperationKind::Export,
                    "save" => OperationKind::Save,
                    "load" => OperationKind::Load,
                    "pull" => OperationKind::Pull,
                    "push" => OperationKind::Push,
                    _ => return None,
                };
                Some(Self::Operation {
                    volume: volume.to_string(),
                    kind,
                })
            }
            _ => None,
        }
    }

    fn method(&self) -> Method {
        match self {
            ApiRoute::Progress => Method::GET,
            ApiRoute::Operation { kind, .. } => match kind {
                OperationKind::Clone | OperationKind::Pull | OperationKind::Push => Method::POST,
                OperationKind::Import
                | OperationKind::Export
                | OperationKind::Save
                | OperationKind::Load => Method::GET,
            },
        }
    }
}

/// Status returned when an operation succeeds.
fn success_status(kind: OperationKind) -> StatusCode {
    match kind {
        OperationKind::Clone | OperationKind::Save | OperationKind::Pull | OperationKind::Push => {
            StatusCode::CREATED
        }
        OperationKind::Import | OperationKind::Export | OperationKind::Load => StatusCode::OK,
    }
}

#[derive(Clone)]
pub struct VolumeApiService {
    orchestrator: Orchestrator,
}

impl VolumeApiService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Answer one request, turning failures into JSON error responses.
    pub async fn respond<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Display,
    {
        match self.handle(req).await {
            Ok(resp) => resp,
            Err(e) => e.into_response(),
        }
    }

    async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, ApiError>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Display,
    {
        let path = req.uri().path().to_string();
        info!(method = ?req.method(), path = %path, "Received request");

        let route = ApiRoute::from_path(&path).ok_or_else(|| ApiError::NotFound(path.clone()))?;
        if req.method() != route.method() {
            return Err(ApiError::MethodNotAllowed {
                method: req.method().clone(),
                path,
            });
        }

        match route {
            ApiRoute::Progress => self.handle_progress(),
            ApiRoute::Operation { volume, kind } => self.handle_operation(req, volume, kind).await,
        }
    }

    fn handle_progress(&self) -> Result<Response<Full<Bytes>>, ApiError> {
        let progress: ProgressResponse = self.orchestrator.progress();
        json_response(StatusCode::OK, &progress)
    }

    async fn handle_operation<B>(
        &self,
        req: Request<B>,
        volume: String,
        kind: OperationKind,
    ) -> Result<Response<Full<Bytes>>, ApiError>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Display,
    {
        let mut request = match kind {
            OperationKind::Pull | OperationKind::Push => decode(req).await?,
            _ => query(&req)?,
        };
        request.volume = Some(volume);
        let op = request.validate(kind)?;

        // The pipeline runs detached so a dropped connection cannot abandon
        // stopped containers or a half written volume.
        let outcome = self
            .orchestrator
            .spawn(op)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;

        json_response(success_status(kind), &OperationResponse::from(outcome))
    }
}

impl Service<Request<Incoming>> for VolumeApiService {
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move { Ok(svc.respond(req).await) })
    }
}

fn query<B>(req: &Request<B>) -> Result<OperationRequest, ApiError> {
    let raw = req.uri().query().unwrap_or("");
    Ok(serde_urlencoded::from_str(raw)?)
}

async fn decode<B>(req: Request<B>) -> Result<OperationRequest, ApiError>
where
    B: Body,
    B::Error: Display,
{
    let body_bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .to_bytes();
    Ok(serde_json::from_slice(&body_bytes)?)
}

fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Result<Response<Full<Bytes>>, ApiError> {
    let json = serde_json::to_vec(data).map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut resp = Response::new(Full::new(Bytes::from(json)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(resp)
}
