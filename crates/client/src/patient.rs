//! Patient side of the attention popup.

use std::{sync::Arc, time::Duration};

use cqrs_es::Aggregate;
use domain::{
    messages::{AttentionRequest, CancelRequest},
    patient_popup::{Command, Event, PatientPopup, RequestView, Services},
    Message,
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{sleep_until, Instant},
};
use tracing::{info, warn};
use ulid::Ulid;

use crate::channel::Channel;
use crate::errors::ClientError;
use crate::medications::MedicationLookup;
use crate::session::Session;

pub const MSG_CHANNEL_UNAVAILABLE: &str = "Unable to reach the pharmacy service. Please try again.";
pub const MSG_NOT_ACKNOWLEDGED: &str =
    "The pharmacy service did not confirm your request. Please try again.";

enum Wake {
    Received(Result<Message, RecvError>),
    Deadline,
    Closed,
}

pub struct PatientClient {
    popup: PatientPopup,
    services: Services,
    channel: Option<Channel>,
    listener: Option<broadcast::Receiver<Message>>,
    medications: Arc<dyn MedicationLookup>,
    user_id: Option<String>,
    ack_timeout: Duration,
    ack_deadline: Option<(String, Instant)>,
}

impl PatientClient {
    /// Starts listening for replies right away; without a valid credential
    /// the client has no channel and `is_listening` is `false`.
    pub fn new(
        session: &Session,
        medications: Arc<dyn MedicationLookup>,
        ack_timeout: Duration,
    ) -> Self {
        let channel = session.acquire();
        let listener = channel.as_ref().map(Channel::subscribe);

        Self {
            popup: PatientPopup::default(),
            services: Services::default(),
            channel,
            listener,
            medications,
            user_id: session.credential().map(|credential| credential.claims.id),
            ack_timeout,
            ack_deadline: None,
        }
    }

    pub fn popup(&self) -> &PatientPopup {
        &self.popup
    }

    pub fn view(&self) -> RequestView {
        RequestView::from(&self.popup)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Opens the popup and fills the drug selection
    pub async fn open(&mut self) -> Result<(), ClientError> {
        if self.execute(Command::OpenRequest).await?.is_empty() {
            return Ok(());
        }

        match self.medications.patient_medications().await {
            Ok(medications) => {
                self.execute(Command::LoadMedications { medications })
                    .await?;
            }
            Err(e) => warn!("Medication lookup failed: {}", e),
        }
        Ok(())
    }

    pub async fn submit(&mut self, note: &str, drug_id: Option<&str>) -> Result<(), ClientError> {
        let events = self
            .execute(Command::SubmitRequest {
                request_id: Ulid::new().to_string(),
                user_id: self.user_id.clone(),
                note: note.to_string(),
                drug_id: drug_id.map(str::to_string),
            })
            .await?;

        for event in events {
            match event {
                Event::SubmissionRejected { reason, .. } => {
                    return Err(ClientError::Rejected { reason })
                }
                Event::RequestSent { request } => return self.deliver(request).await,
                _ => {}
            }
        }
        Ok(())
    }

    /// Closes the popup without telling the relay
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.ack_deadline = None;
        self.execute(Command::Close).await?;
        Ok(())
    }

    /// Tells the relay the outstanding request is abandoned, then closes.
    /// Returns whether a cancel frame was emitted.
    pub async fn withdraw(&mut self) -> Result<bool, ClientError> {
        let emitted = match (&self.popup.outstanding, &self.channel) {
            (Some(request), Some(channel)) => channel.emit(Message::PatientPopupCancel(
                CancelRequest {
                    request_id: request.request_id.clone(),
                },
            )),
            _ => false,
        };
        self.close().await?;
        Ok(emitted)
    }

    /// Waits for the next channel event or acknowledgement deadline that
    /// changes the popup. `false` once nothing more can arrive.
    pub async fn next_update(&mut self) -> Result<bool, ClientError> {
        loop {
            let deadline = self.ack_deadline.as_ref().map(|(_, at)| *at);

            let wake = match (self.listener.as_mut(), self.channel.as_ref()) {
                (Some(listener), Some(channel)) => tokio::select! {
                    biased;
                    received = listener.recv() => Wake::Received(received),
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        Wake::Deadline
                    }
                    _ = channel.closed() => Wake::Closed,
                },
                _ => match deadline {
                    Some(at) => {
                        sleep_until(at).await;
                        Wake::Deadline
                    }
                    None => return Ok(false),
                },
            };

            let changed = match wake {
                Wake::Received(Ok(message)) => self.handle(message).await?,
                Wake::Received(Err(RecvError::Lagged(skipped))) => {
                    warn!("Popup listener skipped {} frames", skipped);
                    false
                }
                Wake::Received(Err(RecvError::Closed)) | Wake::Closed => {
                    info!("Channel closed; no more replies will arrive");
                    self.listener = None;
                    self.channel = None;
                    false
                }
                Wake::Deadline => self.expire_delivery().await?,
            };
            if changed {
                return Ok(true);
            }
        }
    }

    async fn deliver(&mut self, request: AttentionRequest) -> Result<(), ClientError> {
        let request_id = request.request_id.clone().unwrap_or_default();
        let emitted = self
            .channel
            .as_ref()
            .map(|channel| channel.emit(Message::PatientPopupRequest(request)))
            .unwrap_or(false);

        if !emitted {
            warn!("Attention request {} could not be emitted", request_id);
            self.execute(Command::FailDelivery {
                request_id,
                reason: MSG_CHANNEL_UNAVAILABLE.to_string(),
            })
            .await?;
            return Err(ClientError::ChannelUnavailable);
        }

        info!("Attention request {} sent", request_id);
        self.ack_deadline = Some((request_id, Instant::now() + self.ack_timeout));
        Ok(())
    }

    async fn handle(&mut self, message: Message) -> Result<bool, ClientError> {
        let command = match message {
            Message::PopupResponse(reply) => Command::ReceiveResponse { reply },
            Message::PopupRequestAck(ack) => Command::AcknowledgeDelivery {
                request_id: ack.request_id,
            },
            _ => return Ok(false),
        };

        match self.execute(command).await {
            Ok(events) => {
                if events
                    .iter()
                    .any(|event| !matches!(event, Event::DeliveryFailed { .. }))
                {
                    self.ack_deadline = None;
                }
                Ok(!events.is_empty())
            }
            Err(domain::Error::StaleResponse { request_id }) => {
                warn!("Ignoring frame for stale request {}", request_id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn expire_delivery(&mut self) -> Result<bool, ClientError> {
        let Some((request_id, _)) = self.ack_deadline.take() else {
            return Ok(false);
        };

        match self
            .execute(Command::FailDelivery {
                request_id: request_id.clone(),
                reason: MSG_NOT_ACKNOWLEDGED.to_string(),
            })
            .await
        {
            Ok(events) if !events.is_empty() => {
                warn!("Attention request {} was never acknowledged", request_id);
                Ok(true)
            }
            Ok(_) | Err(domain::Error::StaleResponse { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn execute(&mut self, command: Command) -> Result<Vec<Event>, domain::Error> {
        let events = self.popup.handle(command, &self.services).await?;
        for event in events.iter().cloned() {
            self.popup.apply(event);
        }
        Ok(events)
    }
}
