#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    use crate::cache::token::TokenRecord;
    use crate::cache::token_store::{InMemoryTokenStore, TokenStore};
    use crate::config::connection::{ConnectionConfig, ImplicitFlowConnection};
    use crate::error::TokenError;
    use crate::resolver::token_resolver::TokenResolver;
    use crate::sources::implicit_flow::{
        authorize_url, record_from_redirect, FlowState, ImplicitFlowAcquirer, ImplicitFlowSettings,
        RedirectListener,
    };
    use crate::tests::common::{auth_client, build_reqwest_client, IdleBrowser, MissingBrowser, RedirectingBrowser};

    fn connection() -> ImplicitFlowConnection {
        ImplicitFlowConnection {
            authorize_url: "https://localhost/authorize".to_owned(),
            token_url: "https://localhost/token".to_owned(),
            client_id: "foobar".to_owned(),
            business_partner_id: "123".to_owned(),
        }
    }

    fn settings(timeout_ms: u64) -> ImplicitFlowSettings {
        ImplicitFlowSettings {
            port: 0,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn redirect_is_captured_into_a_record() {
        let browser = RedirectingBrowser::with_params(&[
            ("access_token", "123"),
            ("refresh_token", "456"),
            ("expires_in", "3600"),
            ("token_type", "Bearer"),
        ]);
        let acquirer = ImplicitFlowAcquirer::new(Arc::new(browser.clone()), settings(5_000));

        let record = acquirer.acquire(&connection()).await.unwrap();

        assert_eq!(record.access_token, "123");
        assert_eq!(record.refresh_token.as_deref(), Some("456"));
        assert_eq!(record.expires_in, Some(3600));
        assert_eq!(record.token_type.as_deref(), Some("Bearer"));
        assert!(record.creation_time.is_some());

        let opened = browser.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("https://localhost/authorize?"));
        assert!(opened[0].contains("client_id=foobar"));
        assert!(opened[0].contains("business_partner_id=123"));
        assert!(opened[0].contains("response_type=token"));
    }

    #[tokio::test]
    async fn no_redirect_times_out_and_frees_the_port() {
        let mut listener = RedirectListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        assert_eq!(listener.state(), FlowState::Listening);

        let err = listener.wait(Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(err, TokenError::Timeout(_)), "{:?}", err);
        assert_eq!(listener.state(), FlowState::TimedOut);
        drop(listener);

        let rebound = RedirectListener::bind(addr.port()).await;
        assert!(rebound.is_ok(), "port {} still held", addr.port());
    }

    #[tokio::test]
    async fn missing_browser_still_waits_for_redirect() {
        let acquirer = ImplicitFlowAcquirer::new(Arc::new(MissingBrowser), settings(100));

        let err = acquirer.acquire(&connection()).await.unwrap_err();
        assert!(matches!(err, TokenError::Timeout(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn idle_browser_is_offered_the_authorize_url() {
        let browser = IdleBrowser::default();
        let acquirer = ImplicitFlowAcquirer::new(Arc::new(browser.clone()), settings(100));

        let _ = acquirer.acquire(&connection()).await;

        let opened = browser.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].contains("redirect_uri=http%3A%2F%2Flocalhost%3A"));
    }

    #[tokio::test]
    async fn fragment_only_request_gets_landing_page() {
        let mut listener = RedirectListener::bind(0).await.unwrap();
        let base = format!("http://127.0.0.1:{}/", listener.local_addr().port());
        let client = build_reqwest_client();

        let landing = client.get(&base).send().await.unwrap();
        assert_eq!(landing.status(), 200);
        assert!(landing.text().await.unwrap().contains("window.location.hash"));

        let captured = client
            .get(format!("{}?access_token=abc&expires_in=60", base))
            .send()
            .await
            .unwrap();
        assert_eq!(captured.status(), 200);

        let params = listener.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(params.get("access_token").map(String::as_str), Some("abc"));
        assert_eq!(listener.state(), FlowState::Captured);
    }

    #[test]
    fn authorize_url_carries_flow_parameters() {
        let url = authorize_url(&connection(), "http://localhost:8081/").unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(query["response_type"], "token");
        assert_eq!(query["client_id"], "foobar");
        assert_eq!(query["business_partner_id"], "123");
        assert_eq!(query["redirect_uri"], "http://localhost:8081/");
    }

    #[test]
    fn invalid_authorize_url_is_configuration_error() {
        let mut conn = connection();
        conn.authorize_url = "not a url".to_owned();

        let err = authorize_url(&conn, "http://localhost:8081/").unwrap_err();
        assert!(matches!(err, TokenError::InvalidConfiguration(_)), "{:?}", err);
    }

    #[test]
    fn error_redirect_is_authentication_failure() {
        let params = HashMap::from([
            ("error".to_owned(), "access_denied".to_owned()),
            ("error_description".to_owned(), "user cancelled".to_owned()),
        ]);

        let err = record_from_redirect(&params).unwrap_err();
        assert!(matches!(err, TokenError::AuthenticationFailed(_)));
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn redirect_scope_is_split() {
        let params = HashMap::from([
            ("access_token".to_owned(), "t".to_owned()),
            ("scope".to_owned(), "uid cn".to_owned()),
        ]);

        let record = record_from_redirect(&params).unwrap();
        assert_eq!(record.scope, Some(vec!["uid".to_owned(), "cn".to_owned()]));
        assert_eq!(record.expires_in, None);
    }

    fn implicit_config(token_url: String) -> ConnectionConfig {
        ConnectionConfig {
            authorize_url: Some("https://localhost/authorize".to_owned()),
            token_url: Some(token_url),
            client_id: Some("foobar".to_owned()),
            business_partner_id: Some("123".to_owned()),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn stored_refresh_token_avoids_the_browser() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .json_body(json!({"access_token": "refreshed", "expires_in": 3600}));
        });
        let expired = TokenRecord {
            creation_time: Some(1),
            expires_in: Some(60),
            refresh_token: Some("r1".to_owned()),
            ..TokenRecord::bare("old")
        };
        let store = InMemoryTokenStore::new();
        store.put("mytok", expired).await.unwrap();
        let browser = IdleBrowser::default();
        let resolver = TokenResolver::new(Arc::new(store.clone()), implicit_config(server.url("/token")))
            .unwrap()
            .with_auth_client(auth_client())
            .with_implicit_flow(ImplicitFlowAcquirer::new(Arc::new(browser.clone()), settings(100)));

        let record = resolver.get_token_implicit_flow(Some("mytok"), false).await.unwrap();

        assert_eq!(record.access_token, "refreshed");
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));
        assert!(browser.opened.lock().unwrap().is_empty());
        assert_eq!(store.get("mytok").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn rejected_refresh_token_falls_back_to_browser() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(401);
        });
        let store = InMemoryTokenStore::new();
        store
            .put(
                "mytok",
                TokenRecord {
                    refresh_token: Some("stale".to_owned()),
                    ..TokenRecord::bare("old")
                },
            )
            .await
            .unwrap();
        let browser = RedirectingBrowser::with_params(&[("access_token", "fresh"), ("expires_in", "3600")]);
        let resolver = TokenResolver::new(Arc::new(store.clone()), implicit_config(server.url("/token")))
            .unwrap()
            .with_auth_client(auth_client())
            .with_implicit_flow(ImplicitFlowAcquirer::new(Arc::new(browser.clone()), settings(5_000)));

        let record = resolver.get_token_implicit_flow(Some("mytok"), false).await.unwrap();

        assert_eq!(record.access_token, "fresh");
        assert_eq!(browser.opened.lock().unwrap().len(), 1);
        assert_eq!(store.get("mytok").await.unwrap().unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn implicit_flow_requires_its_configuration() {
        let store = InMemoryTokenStore::new();
        let resolver = TokenResolver::new(Arc::new(store), ConnectionConfig::default())
            .unwrap()
            .with_implicit_flow(ImplicitFlowAcquirer::new(Arc::new(IdleBrowser::default()), settings(100)));

        let err = resolver.get_token_implicit_flow(None, false).await.unwrap_err();
        match err {
            TokenError::MissingConfiguration(fields) => assert_eq!(fields.len(), 4),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
