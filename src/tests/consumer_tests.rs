#[cfg(test)]
mod consumer_tests {
    use std::sync::Arc;

    use url::Url;

    use crate::association::{
        Association, AssociationType, ConsumerAssociationStore, InMemoryConsumerAssociationStore,
    };
    use crate::consumer::{ConsumerManager, VerificationResult, RP_NONCE_PARAMETER};
    use crate::discovery::Discovery;
    use crate::helpers::now;
    use crate::message::{
        AuthRequest, AuthRequestParams, Message, OpenIdMessage, ParameterList, ProtocolMessage,
        ProtocolVersion, OPENID2_NS,
    };
    use crate::server::{AuthResponse, ServerManager};
    use crate::tests::stubs::{endpoint, StubXrdsParser};
    use crate::tests::test_http_client::{ServerHttpClient, TestHttpClient, TestHttpReqRes};
    use crate::types::{
        codes, ConsumerOptions, HttpMethod, Identifier, ServerOptions, ServiceEndpoint,
        ServiceType,
    };

    const OP: &str = "https://op.example.com/server";
    const CLAIMED: &str = "https://alice.example.com/";
    const REALM: &str = "https://rp.example.com/";
    const RETURN_TO: &str = "https://rp.example.com/return?session=abc";

    fn server() -> ServerManager {
        ServerManager::new(ServerOptions::new(OP)).unwrap()
    }

    fn consumer(options: ConsumerOptions) -> ConsumerManager {
        ConsumerManager::new(
            Discovery::new(Arc::new(StubXrdsParser::new(vec![]))),
            options,
        )
    }

    fn signon(service_type: ServiceType) -> ServiceEndpoint {
        ServiceEndpoint::new(Url::parse(OP).unwrap(), service_type)
            .with_claimed_identifier(Identifier::parse(CLAIMED).unwrap())
    }

    fn return_to() -> Url {
        Url::parse(RETURN_TO).unwrap()
    }

    /// What the provider reads from the redirected user agent
    fn received_by_provider(request: &AuthRequest, server: &ServerManager) -> AuthRequest {
        let url = request.destination_url(server.op_endpoint());
        match OpenIdMessage::from_request_parameters(url.query_pairs(), server.extensions()) {
            Ok(OpenIdMessage::AuthRequest(request)) => request,
            other => panic!("not an authentication request: {other:?}"),
        }
    }

    /// The url the user agent comes back to and its openid parameters
    fn redirect_back(response: &AuthResponse) -> (Url, ParameterList) {
        let url = response.destination_url().unwrap();
        let params = ParameterList::from_url_encoded(url.query().unwrap_or_default()).unwrap();
        (url, params)
    }

    #[tokio::test]
    async fn associated_flow() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId2Signon);

        let association = consumer
            .associate_async(&endpoint, &http_client)
            .await
            .expect("association");
        assert_eq!(Some(AssociationType::HmacSha256), association.assoc_type());

        let request = consumer
            .authenticate(&endpoint, &return_to(), Some(REALM), Some(&association))
            .unwrap();
        assert_eq!(Some(association.handle()), request.assoc_handle());

        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let AuthResponse::Success(success) = &response else {
            panic!("expected a positive assertion");
        };
        assert_eq!(Some(association.handle()), success.assoc_handle());
        assert_eq!(None, success.invalidate_handle());

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params.clone(), Some(&endpoint), &http_client)
            .await;

        assert!(result.is_success(), "{result:?}");
        assert_eq!(Some(CLAIMED), result.verified_id());

        let replay = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;
        assert_eq!(Some(codes::INVALID_NONCE), replay.failure().map(|e| e.code()));

        assert_eq!(vec!["associate"], http_client.modes());

        let again = consumer.associate_async(&endpoint, &http_client).await;
        assert_eq!(Some(association.handle()), again.as_ref().map(|a| a.handle()));
        assert_eq!(1, http_client.modes().len());
    }

    #[tokio::test]
    async fn stateless_flow() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId2Signon);

        let request = consumer
            .authenticate(&endpoint, &return_to(), None, None)
            .unwrap();
        assert_eq!(Some(RETURN_TO), request.realm());

        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;

        assert!(result.is_success(), "{result:?}");
        assert_eq!(vec!["check_authentication"], http_client.modes());
    }

    #[tokio::test]
    async fn stateless_mode_can_be_disabled() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions {
            allow_stateless: false,
            ..ConsumerOptions::default()
        });
        let endpoint = signon(ServiceType::OpenId2Signon);

        let request = consumer
            .authenticate(&endpoint, &return_to(), None, None)
            .unwrap();
        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;

        assert_eq!(Some(codes::INVALID_SIGNATURE), result.failure().map(|e| e.code()));
        assert!(http_client.modes().is_empty());
    }

    #[tokio::test]
    async fn stale_handle_is_invalidated() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);

        let store = Arc::new(InMemoryConsumerAssociationStore::new());
        let stale =
            Association::from_key(AssociationType::HmacSha256, "stale", vec![7; 32], now() + 600)
                .unwrap();
        store.save(OP, stale.clone());

        let consumer = consumer(ConsumerOptions::default()).with_association_store(store.clone());
        let endpoint = signon(ServiceType::OpenId2Signon);

        let association = consumer.associate_async(&endpoint, &http_client).await;
        assert_eq!(Some("stale"), association.as_ref().map(|a| a.handle()));

        let request = consumer
            .authenticate(&endpoint, &return_to(), Some(REALM), Some(&stale))
            .unwrap();
        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let AuthResponse::Success(success) = &response else {
            panic!("expected a positive assertion");
        };
        assert_eq!(Some("stale"), success.invalidate_handle());
        assert_ne!(Some("stale"), success.assoc_handle());

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;

        assert!(result.is_success(), "{result:?}");
        assert_eq!(vec!["check_authentication"], http_client.modes());
        assert!(store.load(OP, "stale").is_none());
    }

    #[tokio::test]
    async fn negative_assertions() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let endpoint = signon(ServiceType::OpenId2Signon);

        for immediate in [false, true] {
            let consumer = consumer(ConsumerOptions {
                immediate,
                ..ConsumerOptions::default()
            });

            let request = consumer
                .authenticate(&endpoint, &return_to(), Some(REALM), None)
                .unwrap();
            assert_eq!(immediate, request.is_immediate());

            let response = server
                .auth_response_async(
                    &received_by_provider(&request, &server),
                    None,
                    None,
                    false,
                    &http_client,
                )
                .await
                .unwrap();

            let (url, params) = redirect_back(&response);
            let result = consumer
                .verify_async(&url, params, Some(&endpoint), &http_client)
                .await;

            if immediate {
                assert!(matches!(result, VerificationResult::SetupNeeded { .. }));
            } else {
                assert!(matches!(result, VerificationResult::Cancelled));
            }
        }

        assert!(http_client.modes().is_empty());
    }

    #[tokio::test]
    async fn return_to_must_match_the_receiving_url() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId2Signon);

        let request = consumer
            .authenticate(&endpoint, &return_to(), Some(REALM), None)
            .unwrap();
        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (_, params) = redirect_back(&response);

        for receiving in [
            "https://rp.example.com/elsewhere?session=abc",
            "https://rp.example.com/return?session=xyz",
            "http://rp.example.com/return?session=abc",
        ] {
            let result = consumer
                .verify_async(
                    &Url::parse(receiving).unwrap(),
                    params.clone(),
                    Some(&endpoint),
                    &http_client,
                )
                .await;

            assert_eq!(
                Some(codes::RETURN_TO_MISMATCH),
                result.failure().map(|e| e.code()),
                "{receiving}"
            );
        }

        assert!(http_client.modes().is_empty());
    }

    #[tokio::test]
    async fn tampered_assertion_is_rejected() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId2Signon);

        let association = consumer.associate_async(&endpoint, &http_client).await;
        let request = consumer
            .authenticate(&endpoint, &return_to(), Some(REALM), association.as_ref())
            .unwrap();
        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (url, mut params) = redirect_back(&response);
        params.set("sig", "AAAA");

        let result = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;
        assert_eq!(Some(codes::INVALID_SIGNATURE), result.failure().map(|e| e.code()));
    }

    #[tokio::test]
    async fn op_selected_identifier_is_rediscovered() {
        let server = server();
        let provider = ServerHttpClient::new(&server);
        let op_select = ServiceEndpoint::new(Url::parse(OP).unwrap(), ServiceType::OpenId2OpSelect);

        let parser = StubXrdsParser::new(vec![endpoint(OP, ServiceType::OpenId2Signon)]);
        let consumer = ConsumerManager::new(
            Discovery::new(Arc::new(parser)),
            ConsumerOptions::default(),
        );

        let association = consumer.associate_async(&op_select, &provider).await;
        assert!(association.is_some());

        let request = consumer
            .authenticate(&op_select, &return_to(), Some(REALM), association.as_ref())
            .unwrap();
        assert!(request.is_identifier_select());

        let received = received_by_provider(&request, &server);

        let err = server
            .auth_response_async(&received, None, None, true, &provider)
            .await
            .unwrap_err();
        assert_eq!(codes::MISSING_FIELD, err.code());

        let response = server
            .auth_response_async(&received, Some(CLAIMED), None, true, &provider)
            .await
            .unwrap();

        let discovery_client = TestHttpClient::new()
            .add(
                TestHttpReqRes::new(CLAIMED)
                    .assert_request_method(HttpMethod::HEAD)
                    .set_response_header("X-XRDS-Location", "https://alice.example.com/xrds"),
            )
            .add(
                TestHttpReqRes::new("https://alice.example.com/xrds")
                    .set_response_content_type_header("application/xrds+xml")
                    .set_response_body("<xrds/>"),
            );

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params, Some(&op_select), &discovery_client)
            .await;

        discovery_client.assert();
        assert!(result.is_success(), "{result:?}");
        assert_eq!(Some(CLAIMED), result.verified_id());
    }

    #[tokio::test]
    async fn mismatch_without_rediscovery() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions {
            rediscover_on_mismatch: false,
            ..ConsumerOptions::default()
        });

        let endpoint = signon(ServiceType::OpenId2Signon);
        let request = consumer
            .authenticate(&endpoint, &return_to(), Some(REALM), None)
            .unwrap();
        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                Some("https://mallory.example.com/"),
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;

        assert_eq!(
            Some(codes::DISCOVERY_MISMATCH),
            result.failure().map(|e| e.code())
        );
    }

    #[tokio::test]
    async fn openid1_flow() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId11).with_delegate("https://alice.op.example.com/");

        let association = consumer
            .associate_async(&endpoint, &http_client)
            .await
            .expect("association");
        assert_eq!(Some(AssociationType::HmacSha1), association.assoc_type());

        let request = consumer
            .authenticate(&endpoint, &return_to(), Some(REALM), Some(&association))
            .unwrap();
        assert!(!request.message().has("ns"));
        assert_eq!(Some("https://alice.op.example.com/"), request.identity());
        assert!(request
            .return_to()
            .unwrap()
            .query_pairs()
            .any(|(k, _)| k == RP_NONCE_PARAMETER));

        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (url, params) = redirect_back(&response);
        assert!(!params.has("response_nonce"));

        let without_endpoint = consumer
            .verify_async(&url, params.clone(), None, &http_client)
            .await;
        assert_eq!(
            Some(codes::DISCOVERY_MISMATCH),
            without_endpoint.failure().map(|e| e.code())
        );

        let result = consumer
            .verify_async(&url, params.clone(), Some(&endpoint), &http_client)
            .await;
        assert!(result.is_success(), "{result:?}");
        assert_eq!(Some(CLAIMED), result.verified_id());

        let replayed = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;
        assert_eq!(
            Some(codes::INVALID_NONCE),
            replayed.failure().map(|e| e.code())
        );
    }

    #[tokio::test]
    async fn openid1_assertion_needs_the_consumer_nonce() {
        let server = server();
        let http_client = ServerHttpClient::new(&server);
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId11);

        let request = AuthRequest::create(AuthRequestParams {
            version: ProtocolVersion::OpenId1,
            identity: Some(CLAIMED.to_string()),
            return_to: Some(return_to()),
            realm: Some(REALM.to_string()),
            ..Default::default()
        })
        .unwrap();

        let response = server
            .auth_response_async(
                &received_by_provider(&request, &server),
                None,
                None,
                true,
                &http_client,
            )
            .await
            .unwrap();

        let (url, params) = redirect_back(&response);
        let result = consumer
            .verify_async(&url, params, Some(&endpoint), &http_client)
            .await;
        assert_eq!(
            Some(codes::INVALID_NONCE),
            result.failure().map(|e| e.code())
        );
    }

    #[tokio::test]
    async fn follows_the_association_suggestion_once() {
        let consumer = consumer(ConsumerOptions::default());
        let endpoint = signon(ServiceType::OpenId2Signon);

        let mut error = Message::new(ProtocolVersion::OpenId2);
        error.set("error", "HMAC-SHA256 is not supported");
        error.set("error_code", "unsupported-type");
        error.set("assoc_type", "HMAC-SHA1");
        error.set("session_type", "DH-SHA1");
        assert_eq!(Some(OPENID2_NS), error.get("ns"));

        let http_client = TestHttpClient::new()
            .add(
                TestHttpReqRes::new(OP)
                    .assert_request_method(HttpMethod::POST)
                    .assert_max_redirects(0)
                    .assert_request_form_param("openid.assoc_type", "HMAC-SHA256")
                    .assert_request_form_param("openid.session_type", "DH-SHA256")
                    .set_response_status_code(400)
                    .set_response_body(error.key_value_form()),
            )
            .add(
                TestHttpReqRes::new(OP)
                    .assert_request_method(HttpMethod::POST)
                    .assert_request_form_param("openid.assoc_type", "HMAC-SHA1")
                    .assert_request_form_param("openid.session_type", "DH-SHA1")
                    .set_response_status_code(500),
            );

        assert!(consumer.associate_async(&endpoint, &http_client).await.is_none());
        http_client.assert();

        let unused = TestHttpClient::new();
        assert!(consumer.associate_async(&endpoint, &unused).await.is_none());
    }
}
