//! Integration tests for the sign-in flows driven through the host entry points.

use farm_mfa_adapter::{
    AdapterConfig, AdapterError, AuthenticationAdapter, Capabilities, Claim, HostContext, HostRequest, MessageKey,
    PreferredMethod, ProofData, Registration, UiMode, UserFeatures,
    constants::{OPTIONS_COOKIE, fields},
    mocks::{MailSent, MockMailProvider, MockProviderHub, MockRegistrationStore, MockReplayGuard, ProviderCall},
};
use farm_mfa_core::environment::Clock;
use farm_mfa_replay::ReplayLevel;
use farm_mfa_testing::{ManualClock, test_clock};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

type TestAdapter = AuthenticationAdapter<MockProviderHub, MockRegistrationStore, MockMailProvider, MockReplayGuard>;

const ALICE: &str = "alice@contoso.com";

struct Farm {
    providers: MockProviderHub,
    store: MockRegistrationStore,
    mailer: MockMailProvider,
    replay: MockReplayGuard,
    clock: Arc<ManualClock>,
}

impl Farm {
    fn new() -> Self {
        Self {
            providers: MockProviderHub::new(),
            store: MockRegistrationStore::new()
                .with_registration(Registration::new(ALICE).with_method(PreferredMethod::Code).with_mail(ALICE)),
            mailer: MockMailProvider::new(),
            replay: MockReplayGuard::new(),
            clock: Arc::new(ManualClock::new(test_clock().now())),
        }
    }

    fn adapter(&self, config: &AdapterConfig) -> TestAdapter {
        let mut adapter = AuthenticationAdapter::new(
            self.providers.clone(),
            self.store.clone(),
            self.mailer.clone(),
            self.replay.clone(),
            Arc::clone(&self.clock) as Arc<dyn Clock>,
        );
        adapter.on_pipeline_load(&serde_json::to_string(config).unwrap()).unwrap();
        adapter
    }
}

fn request() -> HostRequest {
    HostRequest::new(IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1)), "https://sts.contoso.com/adfs/ls/")
}

fn code(value: &str) -> ProofData {
    ProofData::new().with(fields::CODE, value)
}

fn action(name: &str) -> ProofData {
    ProofData::new().with(fields::ACTION, name)
}

async fn start(adapter: &TestAdapter, upn: &str, request: &HostRequest) -> (HostContext, farm_mfa_adapter::Presentation) {
    let mut context = HostContext::new();
    assert!(adapter.is_available_for_user(upn, request, &mut context).await.unwrap());
    let page = adapter.begin_authentication(upn, request, &mut context).await.unwrap();
    (context, page)
}

#[tokio::test]
async fn valid_code_completes_with_otp_claim() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default());

    let (mut context, page) = start(&adapter, ALICE, &request()).await;
    assert_eq!(page.mode, UiMode::Identification);
    assert_eq!(page.remaining_retries, 3);

    let outcome = adapter
        .try_end_authentication(&mut context, &code("123456"), &request())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.claims, vec![Claim::authentication_method(PreferredMethod::Code)]);
    assert_eq!(farm.replay.records().len(), 1);
}

#[tokio::test]
async fn three_wrong_codes_end_on_definitive_error() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default());
    let (mut context, _) = start(&adapter, ALICE, &request()).await;

    for remaining in [2, 1] {
        let outcome = adapter
            .try_end_authentication(&mut context, &code("000000"), &request())
            .await
            .unwrap();
        let page = outcome.presentation.unwrap();
        assert_eq!(page.mode, UiMode::Identification);
        assert_eq!(page.remaining_retries, remaining);
        assert_eq!(page.message.map(|m| m.key), Some(MessageKey::InvalidCode));
    }

    let page = adapter
        .try_end_authentication(&mut context, &code("000000"), &request())
        .await
        .unwrap()
        .presentation
        .unwrap();
    assert_eq!(page.mode, UiMode::Locking);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::TooManyRetries));

    // Even the right code is refused now
    let err = adapter
        .try_end_authentication(&mut context, &code("123456"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::DefinitiveError { ref upn, .. } if upn == ALICE));
}

#[tokio::test]
async fn replayed_code_is_rejected_in_another_session() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default());

    let (mut first, _) = start(&adapter, ALICE, &request()).await;
    let outcome = adapter
        .try_end_authentication(&mut first, &code("123456"), &request())
        .await
        .unwrap();
    assert!(outcome.is_complete());

    let elsewhere = HostRequest::new(IpAddr::V4(Ipv4Addr::new(192, 168, 7, 7)), "https://sts.contoso.com/adfs/ls/");
    let (mut second, _) = start(&adapter, ALICE, &elsewhere).await;
    let page = adapter
        .try_end_authentication(&mut second, &code("123456"), &elsewhere)
        .await
        .unwrap()
        .presentation
        .unwrap();

    assert_eq!(page.mode, UiMode::Locking);
    assert_eq!(page.remaining_retries, 0);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::ReplayDetected));
}

#[tokio::test]
async fn intermediate_replay_uses_the_submitting_address() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default().with_replay_level(ReplayLevel::Intermediate));
    let served = request();
    let posted = HostRequest::new(IpAddr::V4(Ipv4Addr::new(10, 2, 0, 2)), "https://sts.contoso.com/adfs/ls/");

    let (mut first, _) = start(&adapter, ALICE, &served).await;
    let outcome = adapter
        .try_end_authentication(&mut first, &code("123456"), &posted)
        .await
        .unwrap();
    assert!(outcome.is_complete());

    let (mut second, _) = start(&adapter, ALICE, &posted).await;
    let page = adapter
        .try_end_authentication(&mut second, &code("123456"), &posted)
        .await
        .unwrap()
        .presentation
        .unwrap();

    assert_eq!(page.mode, UiMode::Locking);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::ReplayDetected));
}

#[tokio::test]
async fn code_after_delivery_window_is_refused() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default().with_delivery_window(120));
    let (mut context, _) = start(&adapter, ALICE, &request()).await;

    farm.clock.advance(chrono::Duration::seconds(121));
    let page = adapter
        .try_end_authentication(&mut context, &code("123456"), &request())
        .await
        .unwrap()
        .presentation
        .unwrap();

    assert_eq!(page.mode, UiMode::Locking);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::DeliveryWindowElapsed));
    assert!(farm.replay.records().is_empty());
}

#[tokio::test]
async fn remote_channel_announces_sent_code() {
    let mut farm = Farm::new();
    farm.providers = MockProviderHub::new().script(PreferredMethod::Email, |script| {
        script.capabilities = Capabilities {
            is_remote: true,
            is_two_way: false,
        };
    });
    farm.store = MockRegistrationStore::new()
        .with_registration(Registration::new(ALICE).with_method(PreferredMethod::Email).with_mail(ALICE));
    let adapter = farm.adapter(&AdapterConfig::default());

    let (_, page) = start(&adapter, ALICE, &request()).await;

    assert_eq!(page.mode, UiMode::Identification);
    assert_eq!(page.selected_method, PreferredMethod::Email);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::CodeSent));
    assert_eq!(farm.providers.calls(), vec![ProviderCall::Post(PreferredMethod::Email)]);
}

#[tokio::test]
async fn two_way_channel_completes_without_a_code() {
    let mut farm = Farm::new();
    farm.providers = MockProviderHub::new().script(PreferredMethod::Azure, |script| {
        script.capabilities = Capabilities {
            is_remote: true,
            is_two_way: true,
        };
    });
    farm.store = MockRegistrationStore::new().with_registration(Registration::new(ALICE).with_method(PreferredMethod::Azure));
    let adapter = farm.adapter(&AdapterConfig::default());

    let (mut context, page) = start(&adapter, ALICE, &request()).await;
    assert_eq!(page.mode, UiMode::Bypass);

    let outcome = adapter
        .try_end_authentication(&mut context, &ProofData::new(), &request())
        .await
        .unwrap();
    assert_eq!(outcome.claims, vec![Claim::authentication_method(PreferredMethod::Azure)]);
}

#[tokio::test]
async fn unavailable_first_choice_falls_back() {
    let mut farm = Farm::new();
    farm.providers = MockProviderHub::new().script(PreferredMethod::External, |script| script.available = false);
    farm.store = MockRegistrationStore::new()
        .with_registration(Registration::new(ALICE).with_method(PreferredMethod::External).with_mail(ALICE));
    let config = AdapterConfig::default().with_fallback_order([PreferredMethod::Email, PreferredMethod::Code]);
    let adapter = farm.adapter(&config);

    let (_, page) = start(&adapter, ALICE, &request()).await;

    assert_eq!(page.mode, UiMode::Identification);
    assert_eq!(page.selected_method, PreferredMethod::Email);
}

#[tokio::test]
async fn no_usable_method_is_refused() {
    let mut farm = Farm::new();
    farm.providers = MockProviderHub::new().script(PreferredMethod::Code, |script| script.available = false);
    let config = AdapterConfig::default()
        .with_enabled_methods([PreferredMethod::Code])
        .with_fallback_order([PreferredMethod::Code]);
    let adapter = farm.adapter(&config);

    let (mut context, page) = start(&adapter, ALICE, &request()).await;
    assert_eq!(page.mode, UiMode::Locking);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::NoUsableMethod));

    let err = adapter
        .try_end_authentication(&mut context, &ProofData::new(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::DefinitiveError { .. }));
}

#[tokio::test]
async fn unregistered_user_is_bypassed_when_allowed() {
    let farm = Farm::new();
    let features = UserFeatures {
        bypass_unregistered: true,
        ..UserFeatures::default()
    };
    let adapter = farm.adapter(&AdapterConfig::default().with_features(features));

    let (mut context, page) = start(&adapter, "bob@contoso.com", &request()).await;
    assert_eq!(page.mode, UiMode::Bypass);

    let outcome = adapter
        .try_end_authentication(&mut context, &ProofData::new(), &request())
        .await
        .unwrap();
    assert_eq!(outcome.claims, vec![Claim::authentication_method(PreferredMethod::None)]);
}

#[tokio::test]
async fn invitation_mails_administrators() {
    let farm = Farm::new();
    let features = UserFeatures {
        allow_unregistered: true,
        ..UserFeatures::default()
    };
    let config = AdapterConfig::default()
        .with_features(features)
        .with_administrators(vec!["admin@contoso.com".to_string()]);
    let adapter = farm.adapter(&config);

    let (mut context, page) = start(&adapter, "bob@contoso.com", &request()).await;
    assert_eq!(page.mode, UiMode::Invitation);

    let page = adapter
        .try_end_authentication(&mut context, &action("request"), &request())
        .await
        .unwrap()
        .presentation
        .unwrap();

    assert_eq!(page.mode, UiMode::Bypass);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::RequestSent));
    assert_eq!(
        farm.mailer.sent(),
        vec![MailSent::AdministrativeRequest {
            administrators: vec!["admin@contoso.com".to_string()],
            upn: "bob@contoso.com".to_string(),
        }]
    );
}

#[tokio::test]
async fn unreadable_registration_is_an_authentication_error() {
    let mut farm = Farm::new();
    farm.store = MockRegistrationStore::new().failing_reads();
    let adapter = farm.adapter(&AdapterConfig::default());

    let err = adapter
        .is_available_for_user(ALICE, &request(), &mut HostContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Authentication { ref upn, .. } if upn == ALICE));
}

#[tokio::test]
async fn options_link_lands_on_options_after_identification() {
    let farm = Farm::new();
    let features = UserFeatures {
        allow_manage_options: true,
        ..UserFeatures::default()
    };
    let adapter = farm.adapter(&AdapterConfig::default().with_features(features));
    let with_marker = HostRequest::new(IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1)), "https://sts.contoso.com/adfs/ls/?mfaopts");

    let (mut context, page) = start(&adapter, ALICE, &with_marker).await;
    assert!(page.show_options);
    assert!(page.cookies.iter().any(|cookie| cookie.name == OPTIONS_COOKIE));

    let page = adapter
        .try_end_authentication(&mut context, &code("123456"), &request())
        .await
        .unwrap()
        .presentation
        .unwrap();
    assert_eq!(page.mode, UiMode::SelectOptions);

    let page = adapter
        .try_end_authentication(
            &mut context,
            &action("choosedefault").with(fields::METHOD, "email"),
            &request(),
        )
        .await
        .unwrap()
        .presentation
        .unwrap();
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::RegistrationSaved));
    assert_eq!(
        farm.store.registration(ALICE).map(|r| r.preferred_method),
        Some(PreferredMethod::Email)
    );

    let outcome = adapter
        .try_end_authentication(&mut context, &ProofData::new(), &request())
        .await
        .unwrap();
    assert_eq!(outcome.claims, vec![Claim::authentication_method(PreferredMethod::Code)]);
}

#[tokio::test]
async fn user_may_pick_another_method_and_remember_it() {
    let farm = Farm::new();
    let features = UserFeatures {
        allow_manage_options: true,
        ..UserFeatures::default()
    };
    let adapter = farm.adapter(&AdapterConfig::default().with_allow_choose(true).with_features(features));
    let (mut context, _) = start(&adapter, ALICE, &request()).await;

    let page = adapter
        .try_end_authentication(&mut context, &action("choosemethod"), &request())
        .await
        .unwrap()
        .presentation
        .unwrap();
    assert_eq!(page.mode, UiMode::ChooseMethod);
    assert!(page.offered_methods.contains(&PreferredMethod::Email));

    let page = adapter
        .try_end_authentication(
            &mut context,
            &ProofData::new()
                .with(fields::METHOD, "email")
                .with(fields::REMEMBER, "true"),
            &request(),
        )
        .await
        .unwrap()
        .presentation
        .unwrap();
    assert_eq!(page.mode, UiMode::Identification);
    assert_eq!(page.selected_method, PreferredMethod::Email);
    assert_eq!(
        farm.store.registration(ALICE).map(|r| r.preferred_method),
        Some(PreferredMethod::Email)
    );

    let outcome = adapter
        .try_end_authentication(&mut context, &code("123456"), &request())
        .await
        .unwrap();
    assert_eq!(outcome.claims, vec![Claim::authentication_method(PreferredMethod::Email)]);
}

#[tokio::test]
async fn key_request_issues_and_mails_a_new_key() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default());
    let (mut context, _) = start(&adapter, ALICE, &request()).await;

    let page = adapter
        .try_end_authentication(&mut context, &action("requestkey"), &request())
        .await
        .unwrap()
        .presentation
        .unwrap();

    assert_eq!(page.mode, UiMode::Identification);
    assert_eq!(page.message.map(|m| m.key), Some(MessageKey::KeySent));
    assert!(farm.store.key(ALICE).is_some());
    assert_eq!(farm.mailer.sent(), vec![MailSent::Key { to: ALICE.to_string() }]);
}

#[tokio::test]
async fn session_of_another_user_is_rejected() {
    let farm = Farm::new();
    let adapter = farm.adapter(&AdapterConfig::default());
    let mut context = HostContext::new();
    adapter.is_available_for_user(ALICE, &request(), &mut context).await.unwrap();

    let err = adapter
        .begin_authentication("mallory@contoso.com", &request(), &mut context)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Authentication { .. }));
}
