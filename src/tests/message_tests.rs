#[cfg(test)]
mod message_tests {
    use url::Url;

    use crate::association::{Association, AssociationSessionType, AssociationType};
    use crate::helpers::now;
    use crate::message::extensions::ExtensionRegistry;
    use crate::message::{
        AssociationError, AuthFailure, AuthFailureKind, AuthRequest, AuthRequestParams,
        AuthSuccess, AuthSuccessParams, DirectError, Message, OpenIdMessage, ParameterList,
        ProtocolMessage, ProtocolVersion, VerifyRequest, VerifyResponse,
    };
    use crate::nonce::generate_nonce;
    use crate::types::codes;

    const OP: &str = "https://op.example.com/server";
    const ALICE: &str = "https://alice.example.com/";
    const RETURN_TO: &str = "https://rp.example.com/return?session=1";

    fn url(value: &str) -> Url {
        Url::parse(value).unwrap()
    }

    fn association() -> Association {
        Association::generate(AssociationType::HmacSha256, "assoc-1", 600)
    }

    fn params(version: ProtocolVersion, identity: Option<&str>) -> AuthSuccessParams {
        AuthSuccessParams {
            version,
            op_endpoint: url(OP),
            claimed_id: identity.map(str::to_string),
            identity: identity.map(str::to_string),
            return_to: url(RETURN_TO),
            response_nonce: version.is_version2().then(|| generate_nonce(now())),
            invalidate_handle: None,
            assoc_handle: "assoc-1".to_string(),
        }
    }

    fn signed_assertion(association: &Association) -> AuthSuccess {
        let mut success = AuthSuccess::create(params(ProtocolVersion::OpenId2, Some(ALICE))).unwrap();
        success.sign(association).unwrap();
        success
    }

    /// Replaces `key` in a signed assertion, keeping the signature
    fn tampered(success: &AuthSuccess, key: &str, value: Option<&str>) -> Message {
        let mut message = success.message().clone();
        match value {
            Some(value) => message.set(key, value),
            None => {
                message.remove(key);
            }
        }
        message
    }

    #[test]
    fn parses_key_value_form() {
        let list = ParameterList::from_key_value_form("mode:error\nerror:bad: thing\n").unwrap();

        assert_eq!(Some("error"), list.get("mode"));
        assert_eq!(Some("bad: thing"), list.get("error"));
        assert_eq!("mode:error\nerror:bad: thing\n", list.to_key_value_form());
    }

    #[test]
    fn rejects_malformed_key_value_form() {
        let err = ParameterList::from_key_value_form("mode:error\nnocolon\n").unwrap_err();
        assert_eq!(codes::MALFORMED_MESSAGE, err.code());

        let err = ParameterList::from_key_value_form("a:1\na:2\n").unwrap_err();
        assert_eq!(codes::MALFORMED_MESSAGE, err.code());
    }

    #[test]
    fn url_encoded_parameters_lose_their_prefix() {
        let list = ParameterList::from_url_encoded(
            "session=1&openid.mode=id_res&openid.return_to=https%3A%2F%2Frp.example.com%2F",
        )
        .unwrap();

        assert_eq!(2, list.len());
        assert_eq!(Some("https://rp.example.com/"), list.get("return_to"));
        assert!(!list.has("session"));
        assert!(list.to_url_encoded().starts_with("openid.mode=id_res"));
    }

    #[test]
    fn newlines_can_not_be_encoded() {
        let list = ParameterList::from_pairs([("error", "line\nbreak")]);
        assert_eq!(codes::INVALID_PARAMETER, list.validate().unwrap_err().code());

        let list = ParameterList::from_pairs([("bad:key", "value")]);
        assert_eq!(codes::INVALID_PARAMETER, list.validate().unwrap_err().code());
    }

    #[test]
    fn reads_the_version_from_the_namespace() {
        let v2 = Message::from_parameters(ParameterList::from_pairs([
            ("ns", "http://specs.openid.net/auth/2.0"),
            ("mode", "cancel"),
        ]))
        .unwrap();
        assert!(v2.is_version2());

        let v1 = Message::from_parameters(ParameterList::from_pairs([("mode", "cancel")])).unwrap();
        assert_eq!(ProtocolVersion::OpenId1, v1.version());

        let err = Message::from_parameters(ParameterList::from_pairs([("ns", "urn:unknown")]))
            .unwrap_err();
        assert_eq!(codes::VERSION_MISMATCH, err.code());
    }

    #[test]
    fn rejects_bad_extension_declarations() {
        let err = Message::from_parameters(ParameterList::from_pairs([("ns.ext1", "urn:x")]))
            .unwrap_err();
        assert_eq!(codes::VERSION_MISMATCH, err.code());

        let err = Message::from_parameters(ParameterList::from_pairs([
            ("ns", "http://specs.openid.net/auth/2.0"),
            ("ns.a", "urn:x"),
            ("ns.b", "urn:x"),
        ]))
        .unwrap_err();
        assert_eq!(codes::EXTENSION_ERROR, err.code());
    }

    #[test]
    fn builds_the_signed_list_per_version() {
        let with_identity = AuthSuccess::create(params(ProtocolVersion::OpenId2, Some(ALICE))).unwrap();
        assert_eq!(
            vec![
                "op_endpoint",
                "claimed_id",
                "identity",
                "return_to",
                "response_nonce",
                "assoc_handle"
            ],
            with_identity.signed_fields()
        );

        let without_identity = AuthSuccess::create(params(ProtocolVersion::OpenId2, None)).unwrap();
        assert_eq!(
            vec!["op_endpoint", "return_to", "response_nonce", "assoc_handle"],
            without_identity.signed_fields()
        );

        let v1 = AuthSuccess::create(params(ProtocolVersion::OpenId1, Some(ALICE))).unwrap();
        assert_eq!(vec!["return_to", "identity"], v1.signed_fields());
        assert!(v1.op_endpoint().is_none());
        assert!(v1.claimed_id().is_none());
    }

    #[test]
    fn signature_text_lists_the_signed_fields_in_order() {
        let success = AuthSuccess::create(params(ProtocolVersion::OpenId1, Some(ALICE))).unwrap();

        assert_eq!(
            format!("return_to:{RETURN_TO}\nidentity:{ALICE}\n"),
            success.signature_text().unwrap()
        );
    }

    #[test]
    fn signed_assertion_verifies_after_parsing() {
        let association = association();
        let success = signed_assertion(&association);

        let received =
            AuthSuccess::from_message(success.message().clone(), &ExtensionRegistry::with_defaults())
                .unwrap();

        assert!(received.verify_signature(&association));
        assert_eq!(Some(ALICE), received.claimed_id());
    }

    #[test]
    fn modified_signed_field_breaks_the_signature() {
        let association = association();
        let success = signed_assertion(&association);

        let message = tampered(&success, "identity", Some("https://mallory.example.com/"));
        let message = {
            let mut m = message;
            m.set("claimed_id", "https://mallory.example.com/");
            m
        };

        let received = AuthSuccess::from_message(message, &ExtensionRegistry::new()).unwrap();
        assert!(!received.verify_signature(&association));
    }

    #[test]
    fn signing_with_another_association_is_refused() {
        let mut success = AuthSuccess::create(params(ProtocolVersion::OpenId2, Some(ALICE))).unwrap();
        let other = Association::generate(AssociationType::HmacSha1, "other", 60);

        assert_eq!(codes::INVALID_PARAMETER, success.sign(&other).unwrap_err().code());
    }

    #[test]
    fn return_to_must_be_signed() {
        let success = signed_assertion(&association());
        let message = tampered(
            &success,
            "signed",
            Some("op_endpoint,claimed_id,identity,response_nonce,assoc_handle"),
        );

        let err = AuthSuccess::from_message(message, &ExtensionRegistry::new()).unwrap_err();
        assert_eq!(codes::UNSIGNED_FIELD, err.code());
    }

    #[test]
    fn claimed_id_and_identity_come_together() {
        let success = signed_assertion(&association());
        let message = tampered(&success, "identity", None);
        let message = {
            let mut m = message;
            m.set(
                "signed",
                "op_endpoint,claimed_id,return_to,response_nonce,assoc_handle",
            );
            m
        };

        let err = AuthSuccess::from_message(message, &ExtensionRegistry::new()).unwrap_err();
        assert_eq!(codes::INVALID_IDENTITY, err.code());
    }

    #[test]
    fn identifierless_assertions_are_valid() {
        let association = association();
        let mut success = AuthSuccess::create(params(ProtocolVersion::OpenId2, None)).unwrap();
        success.sign(&association).unwrap();

        let received =
            AuthSuccess::from_message(success.message().clone(), &ExtensionRegistry::new()).unwrap();

        assert!(received.identity().is_none());
        assert!(received.verify_signature(&association));
    }

    #[test]
    fn rejects_malformed_nonces() {
        let success = signed_assertion(&association());
        let message = tampered(&success, "response_nonce", Some("yesterday"));

        let err = AuthSuccess::from_message(message, &ExtensionRegistry::new()).unwrap_err();
        assert_eq!(codes::INVALID_NONCE, err.code());
    }

    #[test]
    fn openid1_assertions_can_not_carry_openid2_fields() {
        let association = Association::generate(AssociationType::HmacSha1, "assoc-1", 600);
        let mut success = AuthSuccess::create(params(ProtocolVersion::OpenId1, Some(ALICE))).unwrap();
        success.sign(&association).unwrap();

        let message = tampered(&success, "op_endpoint", Some(OP));
        let err = AuthSuccess::from_message(message, &ExtensionRegistry::new()).unwrap_err();
        assert_eq!(codes::VERSION_MISMATCH, err.code());
    }

    #[test]
    fn check_authentication_reads_mode_as_id_res() {
        let association = association();
        let mut success = AuthSuccess::create(params(ProtocolVersion::OpenId2, Some(ALICE))).unwrap();
        success.sign_fields(&["mode"]);
        success.build_signed_list();
        success.sign(&association).unwrap();

        assert!(success.signed_fields().iter().any(|f| f == "mode"));

        let request = VerifyRequest::from_auth_success(&success);
        assert_eq!(Some("check_authentication"), request.message().mode());
        assert!(request.verify_signature(&association));

        let received = VerifyRequest::from_message(request.message().clone()).unwrap();
        assert!(received.verify_signature(&association));
        assert!(!received.verify_signature(&Association::generate(
            AssociationType::HmacSha256,
            "assoc-1",
            600
        )));
    }

    #[test]
    fn verify_response_round_trips() {
        let response = VerifyResponse::create(ProtocolVersion::OpenId2, true, Some("stale"));
        let kv = response.key_value_form();

        assert_eq!(
            "ns:http://specs.openid.net/auth/2.0\nis_valid:true\ninvalidate_handle:stale\n",
            kv
        );

        let received = VerifyResponse::from_message(Message::from_key_value_form(&kv).unwrap()).unwrap();
        assert!(received.is_valid());
        assert_eq!(Some("stale"), received.invalidate_handle());
    }

    #[test]
    fn destination_url_keeps_the_return_to_query() {
        let success = signed_assertion(&association());
        let destination = success.destination_url().unwrap();

        assert_eq!("rp.example.com", destination.host_str().unwrap());
        assert!(destination
            .query_pairs()
            .any(|(k, v)| k == "session" && v == "1"));
        assert!(destination
            .query_pairs()
            .any(|(k, v)| k == "openid.mode" && v == "id_res"));
    }

    #[test]
    fn auth_request_rules_per_version() {
        let err = AuthRequest::create(AuthRequestParams {
            claimed_id: Some(ALICE.to_string()),
            return_to: Some(url(RETURN_TO)),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(codes::INVALID_IDENTITY, err.code());

        let err = AuthRequest::create(AuthRequestParams::default()).unwrap_err();
        assert_eq!(codes::MISSING_FIELD, err.code());

        let v1 = AuthRequest::create(AuthRequestParams {
            version: ProtocolVersion::OpenId1,
            claimed_id: Some(ALICE.to_string()),
            identity: Some(ALICE.to_string()),
            return_to: Some(url(RETURN_TO)),
            realm: Some("https://rp.example.com/".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(Some("https://rp.example.com/"), v1.message().get("trust_root"));
        assert!(!v1.message().has("claimed_id"));
        assert_eq!(Some("https://rp.example.com/"), v1.realm());
    }

    #[test]
    fn realm_defaults_to_return_to() {
        let request = AuthRequest::create(AuthRequestParams {
            return_to: Some(url(RETURN_TO)),
            immediate: true,
            ..Default::default()
        })
        .unwrap();

        assert!(request.is_immediate());
        assert_eq!(Some(RETURN_TO), request.realm());
        assert!(request.claimed_id().is_none());
    }

    #[test]
    fn types_indirect_messages_by_mode() {
        let registry = ExtensionRegistry::with_defaults();

        let setup_needed = AuthFailure::create(
            ProtocolVersion::OpenId1,
            AuthFailureKind::SetupNeeded,
            Some(&url(OP)),
        )
        .unwrap();
        assert_eq!(Some("id_res"), setup_needed.message().mode());

        let typed = OpenIdMessage::from_request_parameters(setup_needed.wire_parameters(), &registry)
            .unwrap();
        let OpenIdMessage::AuthFailure(failure) = typed else {
            panic!("expected a negative assertion");
        };
        assert_eq!(AuthFailureKind::SetupNeeded, failure.kind());
        assert_eq!(Some(OP), failure.user_setup_url());

        let cancel = AuthFailure::create(ProtocolVersion::OpenId2, AuthFailureKind::Cancel, None)
            .unwrap();
        let typed =
            OpenIdMessage::from_request_parameters(cancel.wire_parameters(), &registry).unwrap();
        assert!(matches!(typed, OpenIdMessage::AuthFailure(f) if f.kind() == AuthFailureKind::Cancel));

        let err = OpenIdMessage::from_request_parameters([("openid.mode", "dance")], &registry)
            .unwrap_err();
        assert_eq!(codes::INVALID_MODE, err.code());
    }

    #[test]
    fn openid1_setup_needed_requires_a_setup_url() {
        let err = AuthFailure::create(ProtocolVersion::OpenId1, AuthFailureKind::SetupNeeded, None)
            .unwrap_err();
        assert_eq!(codes::MISSING_FIELD, err.code());
    }

    #[test]
    fn association_error_suggestion_must_be_compatible() {
        let error = AssociationError::create(
            "not supported",
            Some((AssociationType::HmacSha256, AssociationSessionType::DhSha256)),
        );
        assert!(AssociationError::is_association_error(error.message()));
        assert_eq!(
            Some((AssociationType::HmacSha256, AssociationSessionType::DhSha256)),
            error.suggestion()
        );

        let mut message = error.message().clone();
        message.set("session_type", "DH-SHA1");
        let error = AssociationError::from_message(message).unwrap();
        assert_eq!(None, error.suggestion());
    }

    #[test]
    fn direct_error_in_key_value_form() {
        let error = DirectError::create(ProtocolVersion::OpenId2, "bad request")
            .with_contact("admin@op.example.com");

        let received =
            DirectError::from_message(Message::from_key_value_form(&error.key_value_form()).unwrap())
                .unwrap();

        assert_eq!("bad request", received.error());
        assert_eq!(Some("admin@op.example.com"), received.message().get("contact"));
    }
}
