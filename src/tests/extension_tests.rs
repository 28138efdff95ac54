#[cfg(test)]
mod extension_tests {
    use std::any::Any;
    use std::collections::HashMap;
    use std::sync::Arc;

    use url::Url;

    use crate::association::{Association, AssociationType};
    use crate::helpers::now;
    use crate::message::extensions::{
        AxCount, ExtensionFactory, ExtensionRegistry, FetchRequest, FetchResponse,
        MessageExtension, SRegRequest, SRegResponse, AX_URI, SREG10_URI, SREG11_URI,
    };
    use crate::message::{
        AuthRequest, AuthRequestParams, AuthSuccess, AuthSuccessParams, Message, ParameterList,
        ProtocolMessage, ProtocolVersion,
    };
    use crate::nonce::generate_nonce;
    use crate::types::{codes, OpenIdReturnType};

    const EMAIL: &str = "http://axschema.org/contact/email";

    fn auth_request(version: ProtocolVersion) -> AuthRequest {
        AuthRequest::create(AuthRequestParams {
            version,
            claimed_id: version
                .is_version2()
                .then(|| "https://alice.example.com/".to_string()),
            identity: Some("https://alice.example.com/".to_string()),
            return_to: Some(Url::parse("https://rp.example.com/return").unwrap()),
            ..Default::default()
        })
        .unwrap()
    }

    fn assertion(claimed_id: Option<&str>, identity: Option<&str>) -> AuthSuccess {
        AuthSuccess::create(AuthSuccessParams {
            version: ProtocolVersion::OpenId2,
            op_endpoint: Url::parse("https://op.example.com/server").unwrap(),
            claimed_id: claimed_id.map(str::to_string),
            identity: identity.map(str::to_string),
            return_to: Url::parse("https://rp.example.com/return").unwrap(),
            response_nonce: Some(generate_nonce(now())),
            invalidate_handle: None,
            assoc_handle: "assoc-1".to_string(),
        })
        .unwrap()
    }

    fn received(request: &AuthRequest) -> AuthRequest {
        let message = Message::from_parameters(
            ParameterList::from_request_parameters(request.wire_parameters()).unwrap(),
        )
        .unwrap();
        AuthRequest::from_message(message).unwrap()
    }

    #[test]
    fn sreg10_uses_the_fixed_alias_in_openid1() {
        let mut sreg = SRegRequest::new(SREG10_URI);
        sreg.request_field("email", true).unwrap();
        sreg.request_field("nickname", false).unwrap();
        sreg.set_policy_url("https://rp.example.com/policy");

        let mut request = auth_request(ProtocolVersion::OpenId1);
        assert_eq!("sreg", request.add_extension(&sreg).unwrap());
        assert_eq!(Some("email"), request.message().get("sreg.required"));
        assert!(!request.message().has("ns.sreg"));

        let registry = ExtensionRegistry::with_defaults();
        let extension = received(&request)
            .extension(SREG10_URI, &registry)
            .unwrap()
            .unwrap();
        let parsed = extension.as_any().downcast_ref::<SRegRequest>().unwrap();

        assert_eq!(&sreg, parsed);
    }

    #[test]
    fn openid1_only_carries_sreg() {
        let mut request = auth_request(ProtocolVersion::OpenId1);

        let err = request.add_extension(&FetchRequest::new()).unwrap_err();
        assert_eq!(codes::EXTENSION_ERROR, err.code());
    }

    #[test]
    fn openid2_declares_namespaces() {
        let mut request = auth_request(ProtocolVersion::OpenId2);

        let sreg = SRegRequest::new(SREG11_URI);
        let mut ax = FetchRequest::new();
        ax.add_attribute(EMAIL, EMAIL, true).unwrap_err();
        ax.add_attribute("email", EMAIL, true).unwrap();

        assert_eq!("ext1", request.add_extension(&sreg).unwrap());
        assert_eq!("ext2", request.add_extension(&ax).unwrap());
        assert_eq!(Some(SREG11_URI), request.message().get("ns.ext1"));
        assert_eq!(Some(AX_URI), request.message().get("ns.ext2"));
        assert_eq!(Some(EMAIL), request.message().get("ext2.type.email"));

        let err = request.add_extension(&FetchRequest::new()).unwrap_err();
        assert_eq!(codes::EXTENSION_ERROR, err.code());
    }

    #[test]
    fn sreg_rejects_unknown_fields_and_genders() {
        let mut sreg = SRegRequest::new(SREG10_URI);
        assert!(sreg.request_field("shoe_size", false).is_err());

        let params = ParameterList::from_pairs([("gender", "X")]);
        assert!(SRegResponse::from_parameters(SREG10_URI, &params).is_err());

        let params = ParameterList::from_pairs([("gender", "F"), ("email", "a@example.com")]);
        let response = SRegResponse::from_parameters(SREG10_URI, &params).unwrap();
        assert_eq!(Some("F"), response.value("gender"));
    }

    #[test]
    fn sreg_response_releases_only_requested_fields() {
        let mut sreg = SRegRequest::new(SREG11_URI);
        sreg.request_field("email", true).unwrap();
        sreg.request_field("email", false).unwrap();

        assert!(sreg.required().is_empty());
        assert_eq!(vec!["email"], sreg.optional());

        let user_data = HashMap::from([
            ("email".to_string(), "alice@example.com".to_string()),
            ("dob".to_string(), "1990-01-01".to_string()),
        ]);
        let response = SRegResponse::from_request(&sreg, &user_data);

        assert_eq!(Some("alice@example.com"), response.value("email"));
        assert_eq!(None, response.value("dob"));
        assert!(response.signature_required());
    }

    #[test]
    fn must_sign_extensions_join_the_signed_list() {
        let association = Association::generate(AssociationType::HmacSha256, "assoc-1", 600);
        let mut success = assertion(
            Some("https://alice.example.com/"),
            Some("https://alice.example.com/"),
        );

        let mut ax = FetchResponse::new();
        ax.add_attribute("email", EMAIL, vec!["alice@example.com".to_string()])
            .unwrap();
        let alias = success.add_extension(&ax).unwrap();
        success.build_signed_list();
        success.sign(&association).unwrap();

        for key in [
            format!("ns.{alias}"),
            format!("{alias}.mode"),
            format!("{alias}.type.email"),
            format!("{alias}.value.email"),
        ] {
            assert!(success.signed_fields().contains(&key), "{key} unsigned");
        }

        let registry = ExtensionRegistry::with_defaults();
        let parsed = AuthSuccess::from_message(success.message().clone(), &registry).unwrap();
        assert!(parsed.verify_signature(&association));

        let extension = parsed.extension(AX_URI, &registry).unwrap().unwrap();
        let fetch = extension.as_any().downcast_ref::<FetchResponse>().unwrap();
        assert_eq!(Some("alice@example.com"), fetch.value(EMAIL));

        let mut unsigned = success.message().clone();
        let signed = success
            .signed_fields()
            .iter()
            .filter(|f| !f.ends_with(".value.email"))
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        unsigned.set("signed", signed);

        let err = AuthSuccess::from_message(unsigned, &registry).unwrap_err();
        assert_eq!(codes::UNSIGNED_FIELD, err.code());
    }

    #[test]
    fn ax_fetch_request_round_trips() {
        let mut ax = FetchRequest::new();
        ax.add_attribute("email", EMAIL, true).unwrap();
        ax.add_attribute_with_count("photo", "http://axschema.org/media/image/default", false, AxCount::Unlimited)
            .unwrap();
        ax.set_update_url("https://rp.example.com/ax-update");

        let params = ax.parameters();
        assert_eq!(Some("unlimited"), params.get("count.photo"));
        assert!(!params.has("count.email"));
        assert_eq!(Some("email"), params.get("required"));
        assert_eq!(Some("photo"), params.get("if_available"));

        assert_eq!(ax, FetchRequest::from_parameters(&params).unwrap());
    }

    #[test]
    fn ax_fetch_request_aliases_need_types() {
        let params = ParameterList::from_pairs([
            ("mode", "fetch_request"),
            ("type.email", EMAIL),
            ("required", "email,phone"),
        ]);
        assert!(FetchRequest::from_parameters(&params).is_err());

        let params = ParameterList::from_pairs([("mode", "fetch_request"), ("type.email", EMAIL)]);
        assert!(FetchRequest::from_parameters(&params).is_err());

        let params = ParameterList::from_pairs([("mode", "fetch_response")]);
        assert!(FetchRequest::from_parameters(&params).is_err());
    }

    #[test]
    fn ax_response_value_encoding() {
        let mut ax = FetchResponse::new();
        ax.add_attribute("one", "urn:one", vec!["a".to_string()]).unwrap();
        ax.add_attribute("many", "urn:many", vec!["b".to_string(), "c".to_string()])
            .unwrap();
        ax.add_attribute("none", "urn:none", vec![]).unwrap();

        let params = ax.parameters();
        assert_eq!(Some("a"), params.get("value.one"));
        assert!(!params.has("count.one"));
        assert_eq!(Some("2"), params.get("count.many"));
        assert_eq!(Some("c"), params.get("value.many.2"));
        assert_eq!(Some("0"), params.get("count.none"));

        let parsed = FetchResponse::from_parameters(&params).unwrap();
        assert_eq!(ax, parsed);
    }

    #[test]
    fn ax_response_count_rules() {
        let indexed_single = ParameterList::from_pairs([
            ("mode", "fetch_response"),
            ("type.email", EMAIL),
            ("count.email", "1"),
            ("value.email.1", "alice@example.com"),
        ]);
        let parsed = FetchResponse::from_parameters(&indexed_single).unwrap();
        assert_eq!(Some("alice@example.com"), parsed.value(EMAIL));

        let mixed = ParameterList::from_pairs([
            ("mode", "fetch_response"),
            ("type.email", EMAIL),
            ("count.email", "1"),
            ("value.email", "alice@example.com"),
        ]);
        assert!(FetchResponse::from_parameters(&mixed).is_err());

        let short = ParameterList::from_pairs([
            ("mode", "fetch_response"),
            ("type.email", EMAIL),
            ("count.email", "2"),
            ("value.email.1", "alice@example.com"),
        ]);
        assert!(FetchResponse::from_parameters(&short).is_err());
    }

    #[derive(Debug)]
    struct IdentityExtension;

    const IDENTITY_URI: &str = "urn:example:identity";

    impl MessageExtension for IdentityExtension {
        fn type_uri(&self) -> &str {
            IDENTITY_URI
        }

        fn parameters(&self) -> ParameterList {
            ParameterList::from_pairs([("subject", "alice")])
        }

        fn signature_required(&self) -> bool {
            true
        }

        fn provides_identifier(&self) -> bool {
            true
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct IdentityFactory;

    impl ExtensionFactory for IdentityFactory {
        fn type_uri(&self) -> &str {
            IDENTITY_URI
        }

        fn signature_required(&self) -> bool {
            true
        }

        fn provides_identifier(&self) -> bool {
            true
        }

        fn create(
            &self,
            _parameters: &ParameterList,
            _is_request: bool,
        ) -> OpenIdReturnType<Box<dyn MessageExtension>> {
            Ok(Box::new(IdentityExtension))
        }
    }

    #[test]
    fn identifying_extension_relaxes_identity_rules() {
        let association = Association::generate(AssociationType::HmacSha256, "assoc-1", 600);
        let mut success = assertion(Some("https://alice.example.com/"), None);
        success.add_extension(&IdentityExtension).unwrap();
        success.build_signed_list();
        success.sign(&association).unwrap();

        assert!(success.signed_fields().iter().any(|f| f == "claimed_id"));

        let mut registry = ExtensionRegistry::with_defaults();
        registry.register(Arc::new(IdentityFactory));

        let parsed = AuthSuccess::from_message(success.message().clone(), &registry).unwrap();
        assert!(parsed.verify_signature(&association));

        let err = AuthSuccess::from_message(success.message().clone(), &ExtensionRegistry::new())
            .unwrap_err();
        assert_eq!(codes::INVALID_IDENTITY, err.code());
    }
}
