use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use client::{
    patient::{MSG_CHANNEL_UNAVAILABLE, MSG_NOT_ACKNOWLEDGED},
    transport::{Connector, MemoryRelay},
    ChannelState, ClientError, MedicationLookup, MemoryTokenStore, PatientClient, PharmacyClient,
    ReconnectPolicy, Session,
};
use domain::{
    messages::{PopupReply, RequestAck},
    patient_popup::{aggregate::MSG_NOT_LOGGED_IN, PatientPopup, PopupViewState},
    relay::{PatientProfile, StaticDirectory},
    Medication, Message,
};
use tokio::time::{sleep, timeout};

struct StaticMedications(Vec<Medication>);

#[async_trait]
impl MedicationLookup for StaticMedications {
    async fn patient_medications(&self) -> Result<Vec<Medication>, ClientError> {
        Ok(self.0.clone())
    }
}

fn token(id: &str, user_type: &str, first_name: &str, last_name: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "id": id,
            "userType": user_type,
            "firstName": first_name,
            "lastName": last_name,
            "exp": 4_102_444_800i64,
        })
        .to_string(),
    );
    format!("{}.{}.signature", header, payload)
}

fn directory() -> StaticDirectory {
    let mut directory = StaticDirectory::default();
    directory.patients.insert(
        "u1".to_string(),
        PatientProfile {
            name: "Ada Lovelace".to_string(),
            phone: "555-0100".to_string(),
        },
    );
    directory
        .drugs
        .insert("d1".to_string(), "Advil".to_string());
    directory
}

fn fast_policy(attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        attempts,
        delay: Duration::from_millis(10),
    }
}

fn session(relay: &Arc<MemoryRelay<StaticDirectory>>, token: Option<String>) -> Session {
    let connector: Arc<dyn Connector> = relay.clone();
    Session::new(
        Arc::new(MemoryTokenStore::new(token)),
        connector,
        fast_policy(5),
    )
}

fn patient_session(relay: &Arc<MemoryRelay<StaticDirectory>>) -> Session {
    session(relay, Some(token("u1", "patient", "Ada", "Lovelace")))
}

fn pharmacy_session(relay: &Arc<MemoryRelay<StaticDirectory>>) -> Session {
    session(relay, Some(token("p1", "pharmacy", "Main", "Street")))
}

fn patient_client(session: &Session, ack_timeout: Duration) -> PatientClient {
    let medications = StaticMedications(vec![
        Medication::new("d1", "Advil"),
        Medication::new("d9", "Unlisted"),
    ]);
    PatientClient::new(session, Arc::new(medications), ack_timeout)
}

async fn within<F: Future>(future: F) -> F::Output {
    timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

async fn connected(session: &Session) {
    let channel = session.acquire().expect("session has a credential");
    assert!(within(channel.wait_for(ChannelState::Connected)).await);
}

/// Patient and pharmacy both connected, with the request on the pharmacy's screen
async fn request_in_flight(
    relay: &Arc<MemoryRelay<StaticDirectory>>,
) -> (Session, PatientClient, Session, PharmacyClient) {
    let pharmacy_session = pharmacy_session(relay);
    let pharmacy = PharmacyClient::new(&pharmacy_session);
    let patient_session = patient_session(relay);
    let mut patient = patient_client(&patient_session, Duration::from_secs(10));
    connected(&pharmacy_session).await;
    connected(&patient_session).await;

    patient.open().await.unwrap();
    patient.submit("pain", Some("d1")).await.unwrap();

    (patient_session, patient, pharmacy_session, pharmacy)
}

#[tokio::test]
async fn test_patient_request_answered_by_pharmacy() {
    let relay = MemoryRelay::new(directory());
    let (_patient_session, mut patient, _pharmacy_session, mut pharmacy) =
        request_in_flight(&relay).await;

    assert_eq!(patient.popup().state, PopupViewState::AwaitingResponse);
    assert_eq!(
        patient.view().banner.as_deref(),
        Some("Request sent! A pharmacist will be notified.")
    );

    assert!(within(pharmacy.next_update()).await.unwrap());
    let card = pharmacy.card().unwrap();
    assert_eq!(card.patient_name, "Ada Lovelace");
    assert_eq!(card.patient_phone, "555-0100");
    assert_eq!(card.drug_name, "Advil");
    assert_eq!(card.note, "pain");

    assert!(within(patient.next_update()).await.unwrap());
    assert!(patient.popup().acknowledged);

    pharmacy.respond("ready in 1 hr", "12.5").await.unwrap();
    assert!(pharmacy.card().is_none());

    assert!(within(patient.next_update()).await.unwrap());
    assert_eq!(patient.popup().state, PopupViewState::ResponseReceived);
    assert_eq!(patient.popup().response.as_deref(), Some("ready in 1 hr"));
    assert_eq!(patient.popup().price, Some(12.5));
    assert_eq!(
        patient.view().banner.as_deref(),
        Some("Pharmacist Response: ready in 1 hr (price: 12.50)")
    );
}

#[tokio::test]
async fn test_invalid_price_sends_nothing() {
    let relay = MemoryRelay::new(directory());
    let (_patient_session, mut patient, _pharmacy_session, mut pharmacy) =
        request_in_flight(&relay).await;
    assert!(within(pharmacy.next_update()).await.unwrap());
    assert!(within(patient.next_update()).await.unwrap());

    let result = pharmacy.respond("ready", "abc").await;
    assert!(matches!(
        result,
        Err(ClientError::Rejected { ref reason }) if reason == "Price must be a number."
    ));

    let card = pharmacy.card().unwrap();
    assert_eq!(card.message, "ready");
    assert_eq!(card.price, "abc");
    assert!(timeout(Duration::from_millis(200), patient.next_update())
        .await
        .is_err());
    assert_eq!(patient.popup().state, PopupViewState::AwaitingResponse);
}

#[tokio::test]
async fn test_without_token_nothing_is_sent() {
    let relay = MemoryRelay::new(directory());
    let session = session(&relay, None);
    assert!(session.acquire().is_none());

    let mut patient = patient_client(&session, Duration::from_secs(10));
    assert!(!patient.is_listening());
    patient.open().await.unwrap();

    let result = patient.submit("pain", Some("d1")).await;
    assert!(matches!(
        result,
        Err(ClientError::Rejected { ref reason }) if reason == MSG_NOT_LOGGED_IN
    ));
    assert_eq!(patient.popup().state, PopupViewState::Composing);
    assert!(!within(patient.next_update()).await.unwrap());

    let mut pharmacy = PharmacyClient::new(&session);
    assert!(!pharmacy.is_listening());
    assert!(!within(pharmacy.next_update()).await.unwrap());
    assert_eq!(relay.connect_attempts(), 0);
}

#[tokio::test]
async fn test_close_resets_popup() {
    let relay = MemoryRelay::new(directory());
    let (_patient_session, mut patient, _pharmacy_session, _pharmacy) =
        request_in_flight(&relay).await;

    patient.close().await.unwrap();
    assert_eq!(patient.popup(), &PatientPopup::default());
    assert!(!patient.view().open);
}

#[tokio::test]
async fn test_withdraw_closes_pharmacy_view() {
    let relay = MemoryRelay::new(directory());
    let (_patient_session, mut patient, _pharmacy_session, mut pharmacy) =
        request_in_flight(&relay).await;
    assert!(within(pharmacy.next_update()).await.unwrap());
    assert!(pharmacy.card().is_some());

    assert!(patient.withdraw().await.unwrap());
    assert_eq!(patient.popup().state, PopupViewState::Closed);

    assert!(within(pharmacy.next_update()).await.unwrap());
    assert!(pharmacy.card().is_none());
}

#[tokio::test]
async fn test_stale_reply_is_ignored() {
    let relay = MemoryRelay::new(directory());
    let (_patient_session, mut patient, _pharmacy_session, _pharmacy) =
        request_in_flight(&relay).await;
    assert!(within(patient.next_update()).await.unwrap());
    let request_id = patient.popup().outstanding_request_id().unwrap().to_string();

    assert!(relay.push(
        "u1",
        Message::PopupResponse(PopupReply {
            response: "for an older request".to_string(),
            price: Some(1.0),
            request_id: Some("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string()),
        }),
    ));
    assert!(relay.push(
        "u1",
        Message::PopupResponse(PopupReply {
            response: "ready in 1 hr".to_string(),
            price: Some(12.5),
            request_id: Some(request_id),
        }),
    ));

    assert!(within(patient.next_update()).await.unwrap());
    assert_eq!(patient.popup().response.as_deref(), Some("ready in 1 hr"));
}

#[tokio::test]
async fn test_unacknowledged_request_fails_then_recovers_on_late_ack() {
    let relay = MemoryRelay::new(directory());
    let session = patient_session(&relay);
    let mut patient = patient_client(&session, Duration::from_millis(100));
    connected(&session).await;

    // The relay has no drug d9, so it never acknowledges.
    patient.open().await.unwrap();
    patient.submit("pain", Some("d9")).await.unwrap();

    assert!(within(patient.next_update()).await.unwrap());
    assert_eq!(patient.popup().state, PopupViewState::DeliveryFailed);
    assert_eq!(patient.view().error.as_deref(), Some(MSG_NOT_ACKNOWLEDGED));
    assert!(patient.view().show_form);

    let request_id = patient.popup().outstanding_request_id().unwrap().to_string();
    assert!(relay.push("u1", Message::PopupRequestAck(RequestAck { request_id })));

    assert!(within(patient.next_update()).await.unwrap());
    assert_eq!(patient.popup().state, PopupViewState::AwaitingResponse);
    assert!(patient.popup().error.is_none());
}

#[tokio::test]
async fn test_reconnection_gives_up_after_policy_attempts() {
    let relay = MemoryRelay::new(directory());
    relay.set_reachable(false);
    let connector: Arc<dyn Connector> = relay.clone();
    let session = Session::new(
        Arc::new(MemoryTokenStore::new(Some(token("u1", "patient", "Ada", "Lovelace")))),
        connector,
        fast_policy(2),
    );
    let mut patient = patient_client(&session, Duration::from_secs(10));

    let channel = session.acquire().unwrap();
    assert!(!within(channel.wait_for(ChannelState::Connected)).await);
    assert!(channel.is_closed());
    assert_eq!(relay.connect_attempts(), 3);

    patient.open().await.unwrap();
    let result = patient.submit("pain", Some("d1")).await;
    assert!(matches!(result, Err(ClientError::ChannelUnavailable)));
    assert_eq!(patient.popup().state, PopupViewState::DeliveryFailed);
    assert_eq!(patient.view().error.as_deref(), Some(MSG_CHANNEL_UNAVAILABLE));
}

#[tokio::test]
async fn test_channel_reconnects_after_drop() {
    let relay = MemoryRelay::new(directory());
    let (patient_session, mut patient, _pharmacy_session, mut pharmacy) =
        request_in_flight(&relay).await;
    assert!(within(pharmacy.next_update()).await.unwrap());
    assert!(within(patient.next_update()).await.unwrap());
    let attempts = relay.connect_attempts();

    assert!(relay.drop_connection("u1"));
    within(async {
        while !(relay.connect_attempts() > attempts && relay.is_connected("u1")) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    connected(&patient_session).await;

    pharmacy.respond("ready in 1 hr", "12.5").await.unwrap();
    assert!(within(patient.next_update()).await.unwrap());
    assert_eq!(patient.popup().state, PopupViewState::ResponseReceived);
}

#[tokio::test]
async fn test_release_then_acquire_opens_fresh_channel() {
    let relay = MemoryRelay::new(directory());
    let session = patient_session(&relay);
    connected(&session).await;

    let first = session.acquire().unwrap();
    session.release();
    within(async {
        while !first.is_closed() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(!first.emit(Message::PatientPopupCancel(Default::default())));

    connected(&session).await;
    assert_eq!(relay.connect_attempts(), 2);

    session.logout();
    assert!(session.acquire().is_none());
}

#[tokio::test]
async fn test_listeners_stop_after_release() {
    let relay = MemoryRelay::new(directory());
    let pharmacy_session = pharmacy_session(&relay);
    let mut pharmacy = PharmacyClient::new(&pharmacy_session);
    let patient_session = patient_session(&relay);
    let mut patient = patient_client(&patient_session, Duration::from_secs(10));
    connected(&pharmacy_session).await;
    connected(&patient_session).await;

    pharmacy_session.release();
    patient_session.release();

    assert!(!within(pharmacy.next_update()).await.unwrap());
    assert!(!pharmacy.is_listening());
    assert!(!within(patient.next_update()).await.unwrap());
    assert!(!patient.is_listening());

    patient.open().await.unwrap();
    let result = patient.submit("pain", Some("d1")).await;
    assert!(matches!(result, Err(ClientError::ChannelUnavailable)));
}

#[tokio::test]
async fn test_listeners_stop_after_reconnection_gives_up() {
    let relay = MemoryRelay::new(directory());
    relay.set_reachable(false);
    let connector: Arc<dyn Connector> = relay.clone();
    let session = Session::new(
        Arc::new(MemoryTokenStore::new(Some(token("p1", "pharmacy", "Main", "Street")))),
        connector,
        fast_policy(1),
    );
    let mut pharmacy = PharmacyClient::new(&session);

    assert!(!within(pharmacy.next_update()).await.unwrap());
    assert_eq!(relay.connect_attempts(), 2);
    assert!(!pharmacy.is_listening());
}

#[tokio::test]
async fn test_request_sent_while_offline_is_delivered_on_connect() {
    let relay = MemoryRelay::new(directory());
    let pharmacy_session = pharmacy_session(&relay);
    let mut pharmacy = PharmacyClient::new(&pharmacy_session);
    connected(&pharmacy_session).await;

    relay.set_reachable(false);
    let connector: Arc<dyn Connector> = relay.clone();
    let patient_session = Session::new(
        Arc::new(MemoryTokenStore::new(Some(token("u1", "patient", "Ada", "Lovelace")))),
        connector,
        fast_policy(50),
    );
    let mut patient = patient_client(&patient_session, Duration::from_secs(10));

    patient.open().await.unwrap();
    patient.submit("pain", Some("d1")).await.unwrap();
    assert_eq!(patient.popup().state, PopupViewState::AwaitingResponse);
    within(async {
        while relay.connect_attempts() < 3 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(!relay.is_connected("u1"));

    relay.set_reachable(true);

    assert!(within(pharmacy.next_update()).await.unwrap());
    let card = pharmacy.card().unwrap();
    assert_eq!(card.drug_name, "Advil");
    assert_eq!(card.note, "pain");

    assert!(within(patient.next_update()).await.unwrap());
    assert!(patient.popup().acknowledged);
    assert_eq!(patient.popup().state, PopupViewState::AwaitingResponse);
}
