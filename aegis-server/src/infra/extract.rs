use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::request::Parts,
};
use tracing::debug;

use super::errors::AppError;

/// `Json` whose rejections use the API error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "rejected request body");
                Err(AppError::unprocessable(rejection.body_text()))
            }
        }
    }
}

/// `Query` whose rejections use the API error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "rejected query string");
                Err(AppError::unprocessable(rejection.body_text()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{self, StatusCode},
    };
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Page {
        n: u32,
    }

    #[tokio::test]
    async fn bad_query_is_unprocessable() {
        let (mut parts, _) = http::Request::builder()
            .uri("/?n=abc")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let err = ApiQuery::<Page>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        let (mut parts, _) = http::Request::builder()
            .uri("/?n=7")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let ApiQuery(page) = ApiQuery::<Page>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(page.n, 7);
    }

    #[tokio::test]
    async fn malformed_json_is_unprocessable() {
        let request = http::Request::builder()
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = ApiJson::<serde_json::Value>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
