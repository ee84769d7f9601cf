//! Request identification and form extraction.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every request
//! - Collect form fields from the query string and the body (urlencoded
//!   or multipart), plus uploaded files

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::Form;
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::error::RequestError;
use crate::http::response::error_response;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Makes a fresh UUID v4 request ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestUuid;

impl MakeRequestId for RequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID of a request, or `unknown`.
pub fn request_id<B>(request: &axum::http::Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// A file uploaded with a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name as declared by the client, unsanitized.
    pub filename: String,
    pub data: Bytes,
}

/// Form fields and uploads of a request.
///
/// Body fields override query string fields of the same name.
#[derive(Debug, Clone, Default)]
pub struct QueryForm {
    fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl QueryForm {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field value, or `default` when missing.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Non-empty field value.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }
}

impl<S: Send + Sync> FromRequest<S> for QueryForm {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut form = QueryForm::default();
        if let Ok(Query(query)) = Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
            form.fields.extend(query);
        }

        if req.method() == Method::GET || req.method() == Method::HEAD {
            return Ok(form);
        }

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| error_response(&RequestError::BadRequest(e.body_text())))?;
            read_multipart(&mut multipart, &mut form)
                .await
                .map_err(|e| error_response(&e))?;
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| error_response(&RequestError::BadRequest(e.body_text())))?;
            form.fields.extend(fields);
        }

        Ok(form)
    }
}

async fn read_multipart(multipart: &mut Multipart, form: &mut QueryForm) -> Result<(), RequestError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RequestError::BadRequest(e.body_text()))?
    {
        let Some(key) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| RequestError::BadRequest(e.body_text()))?;
                tracing::debug!(field = %key, filename = %filename, size = data.len(), "Received upload");
                form.files.push(UploadedFile { filename, data });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| RequestError::BadRequest(e.body_text()))?;
                form.fields.insert(key, value);
            }
        }
    }
    Ok(())
}
