//! Password checks for uploads and administrative actions
//!
//! Credentials are a bearer token or a `password` query parameter. A missing
//! credential yields 401 with a `WWW-Authenticate` challenge naming the server, a
//! wrong one yields 403.

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use depot_core::{AppError, ServerConfig};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// What a request needs to be allowed through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Upload,
    Admin,
}

impl Access {
    pub fn for_request(method: &Method, path: &str) -> Self {
        if *method == Method::POST || *method == Method::PUT {
            Access::Upload
        } else if *method == Method::DELETE || path == "/delete" || path == "/list" {
            Access::Admin
        } else {
            Access::Public
        }
    }
}

#[derive(Debug, Deserialize)]
struct PasswordQuery {
    password: Option<String>,
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn presented_password(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    Query::<PasswordQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.password)
}

/// Decide whether `presented` grants `access`.
pub fn authorize(
    server: &ServerConfig,
    access: Access,
    presented: Option<&str>,
) -> Result<(), AppError> {
    let expected = match access {
        Access::Public => return Ok(()),
        Access::Upload => {
            if server.read_only {
                return Err(AppError::Forbidden("Server is read-only".to_string()));
            }
            server.upload_password.as_deref()
        }
        Access::Admin => server.admin_password.as_deref(),
    };

    let Some(expected) = expected else {
        return Ok(());
    };

    match presented {
        None => Err(AppError::Unauthorized("Password required".to_string())),
        Some(password) if secure_compare(password, expected) => Ok(()),
        Some(_) => Err(AppError::Forbidden("Invalid password".to_string())),
    }
}

pub async fn access_control(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let access = Access::for_request(request.method(), request.uri().path());
    let presented = presented_password(&request);

    match authorize(&state.config.server, access, presented.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            let challenge = matches!(err, AppError::Unauthorized(_));
            tracing::debug!(?access, path = %request.uri().path(), "Access denied");

            let mut response = HttpAppError(err).into_response();
            if challenge {
                let realm = format!("Bearer realm=\"{}\"", state.config.server.name);
                let value = HeaderValue::from_str(&realm)
                    .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(upload: Option<&str>, admin: Option<&str>) -> ServerConfig {
        ServerConfig {
            upload_password: upload.map(String::from),
            admin_password: admin.map(String::from),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_access_for_request() {
        assert_eq!(Access::for_request(&Method::POST, "/"), Access::Upload);
        assert_eq!(Access::for_request(&Method::PUT, "/upload"), Access::Upload);
        assert_eq!(Access::for_request(&Method::DELETE, "/"), Access::Admin);
        assert_eq!(Access::for_request(&Method::GET, "/list"), Access::Admin);
        assert_eq!(Access::for_request(&Method::GET, "/download"), Access::Public);
        assert_eq!(Access::for_request(&Method::GET, "/"), Access::Public);
    }

    #[test]
    fn test_open_server_allows_everything() {
        let config = server(None, None);
        assert!(authorize(&config, Access::Upload, None).is_ok());
        assert!(authorize(&config, Access::Admin, None).is_ok());
    }

    #[test]
    fn test_missing_and_wrong_passwords() {
        let config = server(Some("up"), Some("admin"));
        assert!(matches!(
            authorize(&config, Access::Upload, None),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize(&config, Access::Upload, Some("nope")),
            Err(AppError::Forbidden(_))
        ));
        assert!(authorize(&config, Access::Upload, Some("up")).is_ok());
        // The upload password does not grant admin access
        assert!(matches!(
            authorize(&config, Access::Admin, Some("up")),
            Err(AppError::Forbidden(_))
        ));
        assert!(authorize(&config, Access::Public, None).is_ok());
    }

    #[test]
    fn test_read_only_refuses_uploads() {
        let config = ServerConfig {
            read_only: true,
            ..ServerConfig::default()
        };
        assert!(matches!(
            authorize(&config, Access::Upload, None),
            Err(AppError::Forbidden(_))
        ));
        assert!(authorize(&config, Access::Public, None).is_ok());
    }
}
