use crate::common::error::FriendlyError;
use crate::common::types::{Order, ValueObject};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// The JSON envelope every error response is wrapped in, regardless of
/// what error body it carries.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse<T>
where
    T: Serialize,
{
    #[serde(skip)]
    pub status_code: StatusCode,
    pub error: T,
}

impl<T> IntoResponse for ErrorResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (self.status_code, Json(self.error)).into_response()
    }
}

/// A generic, user-facing error message with no structured fields attached.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct GeneralError {
    pub message: String,
}

impl Display for GeneralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A validation error that also carries per-field detail, used by
/// [`crate::common::error::FormErrorResponse`].
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FormError<T>
where
    T: Serialize,
{
    pub message: String,
    pub fields: T,
}

impl<T> Display for FormError<T>
where
    T: Serialize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Stand-in error body for handlers whose failures never need structured
/// detail beyond the HTTP status itself.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct EmptyType;

impl Display for EmptyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "")
    }
}

pub(crate) type HandlerResult<T> = Result<Response, FriendlyError<T>>;

/// Pagination metadata echoed back alongside a list response.
#[derive(Debug, Clone, Serialize, Default)]
pub(crate) struct PaginatorMeta {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

/// Raw `?page=&per_page=` query-string input.
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct PaginatorParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginatorParams {
    const DEFAULT_PER_PAGE: i64 = 25;
    const MAX_PER_PAGE: i64 = 200;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Raw `?order_by=&order=` query-string input, column whitelisting is left
/// to each listing's own `OrderBy` value object.
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct OrderingParams {
    pub order_by: Option<String>,
    pub order: Option<String>,
}

impl OrderingParams {
    pub fn order(&self) -> Result<ValueObject<Order>, String> {
        ValueObject::new(Order(
            self.order.clone().unwrap_or_else(|| "asc".to_string()),
        ))
    }
}

pub(crate) type QueryParam<T> = axum::extract::Query<T>;

/// Builds the `{"status": "success", "data": ...}` envelope every
/// successful handler response is wrapped in.
pub(crate) struct SuccessResponseBuilder<T>
where
    T: Serialize,
{
    status_code: StatusCode,
    data: Option<T>,
    meta: Option<PaginatorMeta>,
}

#[derive(Serialize)]
struct SuccessResponse<T>
where
    T: Serialize,
{
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<PaginatorMeta>,
}

impl<T> SuccessResponseBuilder<T>
where
    T: Serialize,
{
    pub fn new() -> Self {
        Self {
            status_code: StatusCode::OK,
            data: None,
            meta: None,
        }
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn meta(mut self, meta: PaginatorMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn build(self) -> Response {
        (
            self.status_code,
            Json(SuccessResponse {
                status: "success",
                data: self.data,
                meta: self.meta,
            }),
        )
            .into_response()
    }
}

impl<T> Default for SuccessResponseBuilder<T>
where
    T: Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginator_defaults() {
        let p = PaginatorParams::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 25);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn paginator_clamps_per_page() {
        let p = PaginatorParams {
            page: Some(3),
            per_page: Some(10_000),
        };
        assert_eq!(p.per_page(), 200);
        assert_eq!(p.offset(), 400);
    }
}
