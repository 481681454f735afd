use axum::async_trait;
use axum::body::HttpBody;
use axum::{
    extract::{Form, FromRequest, FromRequestParts, Query},
    http::{request::Parts, Request, StatusCode},
    BoxError,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::convert::Infallible;

#[derive(Deserialize)]
struct Claims {
    sub: i32,
    #[allow(dead_code)]
    exp: usize,
}

/// Authenticated dashboard session. `account_id` is the JWT subject issued at
/// login by the hosted auth frontend.
pub struct AuthAccount {
    pub account_id: i32,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token_opt = if let Some(cookie_header) = parts.headers.get(axum::http::header::COOKIE) {
            let cookies = cookie_header.to_str().unwrap_or("");
            cookies.split(';').find_map(|c| {
                let c = c.trim();
                c.strip_prefix("auth_token=").map(|s| s.to_string())
            })
        } else if let Some(authz) = parts.headers.get(axum::http::header::AUTHORIZATION) {
            authz
                .to_str()
                .ok()
                .and_then(|s| s.strip_prefix("Bearer ").map(|s| s.to_string()))
        } else {
            None
        };
        let token = token_opt.ok_or((StatusCode::UNAUTHORIZED, "Missing token".into()))?;
        let secret = crate::config::JWT_SECRET.as_str();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid token".into()))?;
        Ok(AuthAccount {
            account_id: decoded.claims.sub,
        })
    }
}

/// Field extractor for the carrier webhooks. Never rejects: takes the
/// form-encoded body when one parses, falls back to query-string fields, and
/// finally to the type's default. The carrier requires a well-formed markup
/// response on every request, so an extraction failure must reach the
/// handler's apology path instead of becoming a plain-text rejection.
pub struct LenientForm<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for LenientForm<T>
where
    T: DeserializeOwned + Default + Send,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();
        let from_query = Query::<T>::from_request_parts(&mut parts, state)
            .await
            .ok()
            .map(|Query(value)| value);
        let req = Request::from_parts(parts, body);
        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(LenientForm(value)),
            Err(_) => Ok(LenientForm(from_query.unwrap_or_default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[derive(Debug, Default, Deserialize, PartialEq, Eq)]
    struct CallFields {
        #[serde(rename = "From")]
        from: Option<String>,
        #[serde(rename = "CallSid")]
        call_sid: Option<String>,
    }

    #[tokio::test]
    async fn lenient_form_reads_a_form_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("From=%2B15550101234&CallSid=CA1"))
            .unwrap();
        let LenientForm(fields) = LenientForm::<CallFields>::from_request(request, &())
            .await
            .unwrap();
        assert_eq!(fields.from.as_deref(), Some("+15550101234"));
        assert_eq!(fields.call_sid.as_deref(), Some("CA1"));
    }

    #[tokio::test]
    async fn lenient_form_falls_back_to_query_fields() {
        let request = Request::builder()
            .method("POST")
            .uri("/?From=%2B15550101234&CallSid=CA2")
            .body(Body::empty())
            .unwrap();
        let LenientForm(fields) = LenientForm::<CallFields>::from_request(request, &())
            .await
            .unwrap();
        assert_eq!(fields.from.as_deref(), Some("+15550101234"));
        assert_eq!(fields.call_sid.as_deref(), Some("CA2"));
    }

    #[tokio::test]
    async fn lenient_form_never_rejects_unparseable_input() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from("{\"not\":\"a form\"}"))
            .unwrap();
        let LenientForm(fields) = LenientForm::<CallFields>::from_request(request, &())
            .await
            .unwrap();
        assert_eq!(fields, CallFields::default());
    }

    #[tokio::test]
    async fn token_parsed_from_header() {
        let claims = serde_json::json!({"sub": 7, "exp": 9999999999u64});
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        std::env::set_var("JWT_SECRET", "secret");
        let request = Request::builder()
            .header("Authorization", format!("Bearer {}", token))
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let account = AuthAccount::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(account.account_id, 7);
    }

    #[tokio::test]
    async fn invalid_token_rejected() {
        std::env::set_var("JWT_SECRET", "secret");
        let request = Request::builder()
            .header("Authorization", "Bearer invalid")
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let res = AuthAccount::from_request_parts(&mut parts, &()).await;
        assert!(res.is_err());
    }
}
