//! Tests for credential extraction and the static token table.

use super::principal;
use crate::agent::domain::OrgId;
use crate::transport::auth::{AgentAuthenticator, AuthError, StaticTokenAuthenticator, bearer_token};
use axum::http::{HeaderMap, HeaderValue, header};
use rstest::rstest;

fn headers(authorization: Option<&'static str>) -> HeaderMap {
    let mut map = HeaderMap::new();
    if let Some(value) = authorization {
        map.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
    }
    map
}

#[rstest]
#[case::header(Some("Bearer s3cret"), None, Some("s3cret"))]
#[case::lowercase_scheme(Some("bearer s3cret"), None, Some("s3cret"))]
#[case::header_wins(Some("Bearer from-header"), Some("from-query"), Some("from-header"))]
#[case::query(None, Some("from-query"), Some("from-query"))]
#[case::other_scheme(Some("Basic dXNlcjpwYXNz"), Some("from-query"), Some("from-query"))]
#[case::blank_query(None, Some("  "), None)]
#[case::absent(None, None, None)]
fn credentials_come_from_header_or_query(
    #[case] authorization: Option<&'static str>,
    #[case] query: Option<&str>,
    #[case] expected: Option<&str>,
) {
    let map = headers(authorization);

    assert_eq!(bearer_token(&map, query), expected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn static_tokens_resolve_to_their_principal() {
    let org_id = OrgId::new();
    let authenticator = StaticTokenAuthenticator::new()
        .with_token("alpha", principal(org_id, "collector-a"))
        .with_token("beta", principal(org_id, "collector-b"));

    let resolved = authenticator
        .authenticate("beta")
        .await
        .expect("known token resolves");
    let unknown = authenticator.authenticate("gamma").await;

    assert_eq!(authenticator.len(), 2);
    assert_eq!(resolved, principal(org_id, "collector-b"));
    assert!(matches!(unknown, Err(AuthError::InvalidCredential)));
}
