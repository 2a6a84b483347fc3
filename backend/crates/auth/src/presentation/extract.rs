//! Request extractors whose rejections use the auth error envelope

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AuthError;

/// JSON body; malformed input becomes `ValidationFailed`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AuthError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AuthError))]
pub struct Query<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AuthError))]
pub struct Path<T>(pub T);
