//! Pharmacy side of the attention popup.

use cqrs_es::Aggregate;
use domain::{
    pharmacy_popup::{Command, Event, PharmacyPopup, RequestCard, Services},
    Message,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::channel::Channel;
use crate::errors::ClientError;
use crate::session::Session;

pub const MSG_CHANNEL_UNAVAILABLE: &str = "Unable to reach the patient. Please try again.";

pub struct PharmacyClient {
    popup: PharmacyPopup,
    services: Services,
    channel: Option<Channel>,
    listener: Option<broadcast::Receiver<Message>>,
}

impl PharmacyClient {
    pub fn new(session: &Session) -> Self {
        let channel = session.acquire();
        let listener = channel.as_ref().map(Channel::subscribe);

        Self {
            popup: PharmacyPopup::default(),
            services: Services::default(),
            channel,
            listener,
        }
    }

    pub fn popup(&self) -> &PharmacyPopup {
        &self.popup
    }

    pub fn card(&self) -> Option<RequestCard> {
        RequestCard::from_popup(&self.popup)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Sends the priced answer. A rejected draft, or a channel that cannot
    /// carry it, leaves the modal open with the reason shown.
    pub async fn respond(&mut self, message: &str, price: &str) -> Result<(), ClientError> {
        let events = self
            .popup
            .handle(
                Command::SubmitResponse {
                    message: message.to_string(),
                    price: price.to_string(),
                },
                &self.services,
            )
            .await?;

        for event in events {
            match event {
                Event::ResponseRejected { ref reason, .. } => {
                    let reason = reason.clone();
                    self.popup.apply(event);
                    return Err(ClientError::Rejected { reason });
                }
                Event::ResponseSent { response } => {
                    let emitted = self
                        .channel
                        .as_ref()
                        .map(|channel| {
                            channel.emit(Message::PharmacistPopupResponse(response.clone()))
                        })
                        .unwrap_or(false);

                    if !emitted {
                        warn!("Response for patient {} could not be emitted", response.patient_id);
                        self.popup.apply(Event::ResponseRejected {
                            message: message.to_string(),
                            price: price.to_string(),
                            reason: MSG_CHANNEL_UNAVAILABLE.to_string(),
                        });
                        return Err(ClientError::ChannelUnavailable);
                    }

                    info!("Response sent to patient {}", response.patient_id);
                    self.popup.apply(Event::ResponseSent { response });
                }
                other => self.popup.apply(other),
            }
        }
        Ok(())
    }

    pub async fn dismiss(&mut self) -> Result<(), ClientError> {
        self.execute(Command::Dismiss).await?;
        Ok(())
    }

    /// Waits for the next relay frame that changes the modal. `false` once
    /// the channel is gone.
    pub async fn next_update(&mut self) -> Result<bool, ClientError> {
        loop {
            let (Some(listener), Some(channel)) = (self.listener.as_mut(), self.channel.as_ref())
            else {
                return Ok(false);
            };

            let received = tokio::select! {
                biased;
                received = listener.recv() => Some(received),
                _ = channel.closed() => None,
            };

            let command = match received {
                Some(Ok(Message::ShowPopup(request))) => Command::ShowRequest { request },
                Some(Ok(Message::ClosePopup(closed))) => Command::WithdrawRequest { closed },
                Some(Ok(_)) => continue,
                Some(Err(RecvError::Lagged(skipped))) => {
                    warn!("Popup listener skipped {} frames", skipped);
                    continue;
                }
                Some(Err(RecvError::Closed)) | None => {
                    info!("Channel closed; no more requests will arrive");
                    self.listener = None;
                    self.channel = None;
                    return Ok(false);
                }
            };

            if !self.execute(command).await?.is_empty() {
                return Ok(true);
            }
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
