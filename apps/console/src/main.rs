//! Terminal front end for the attention popup, one role per process.

use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use client::{
    transport::{Connector, WebSocketConnector},
    ClientError, Config, HttpMedicationLookup, MemoryTokenStore, PatientClient, PharmacyClient,
    Session, TokenStore,
};
use domain::{patient_popup::RequestView, pharmacy_popup::RequestCard};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

const PATIENT_HELP: &str = "commands: open | send <drug_id> <note> | close | withdraw | show | help";
const PHARMACY_HELP: &str = "commands: respond <price> <message> | dismiss | show | help";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Patient,
    Pharmacy,
}

#[derive(Parser)]
#[command(name = "medtrack-console")]
#[command(about = "Request or answer pharmacist attention from a terminal")]
struct Cli {
    /// Which side of the popup to drive
    #[arg(value_enum)]
    role: RoleArg,

    /// Bearer token for the relay and the REST API
    #[arg(long, env = "MEDTRACK_TOKEN")]
    token: String,
}

#[derive(Debug, PartialEq)]
enum Action {
    Open,
    Send { drug_id: String, note: String },
    Close,
    Withdraw,
    Respond { price: String, message: String },
    Dismiss,
    Show,
    Help,
}

enum Wake {
    Line(Option<String>),
    Update(bool),
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new(Some(cli.token)));
    let connector: Arc<dyn Connector> = Arc::new(WebSocketConnector::new(config.relay_url.clone()));
    let session = Session::new(store, connector, config.reconnect);
    if !session.is_authenticated() {
        bail!("MEDTRACK_TOKEN is malformed or expired");
    }

    info!("Connecting to {}", config.relay_url);
    let input = BufReader::new(tokio::io::stdin()).lines();
    let result = match cli.role {
        RoleArg::Patient => run_patient(&session, &config, input).await,
        RoleArg::Pharmacy => run_pharmacy(&session, input).await,
    };

    session.release();
    result
}

async fn run_patient(session: &Session, config: &Config, mut input: Input) -> anyhow::Result<()> {
    let lookup = Arc::new(HttpMedicationLookup::new(
        config.api_url.clone(),
        session.store().clone(),
    ));
    let mut patient = PatientClient::new(session, lookup, config.ack_timeout);
    let mut listening = patient.is_listening();
    println!("{}", PATIENT_HELP);

    loop {
        let wake = tokio::select! {
            line = input.next_line() => Wake::Line(line?),
            update = patient.next_update(), if listening => Wake::Update(update?),
        };

        match wake {
            Wake::Line(None) => return Ok(()),
            Wake::Line(Some(line)) => {
                let Some(action) = parse(&line) else {
                    println!("{}", PATIENT_HELP);
                    continue;
                };
                match apply_patient(&mut patient, action).await {
                    Ok(true) => {}
                    Ok(false) => {
                        println!("{}", PATIENT_HELP);
                        continue;
                    }
                    Err(e) => println!("! {}", e),
                }
            }
            Wake::Update(changed) => {
                if !changed {
                    warn!("Channel closed; no more replies will arrive");
                    listening = false;
                    continue;
                }
            }
        }
        print_view(&patient.view());
    }
}

async fn apply_patient(patient: &mut PatientClient, action: Action) -> Result<bool, ClientError> {
    match action {
        Action::Open => patient.open().await?,
        Action::Send { drug_id, note } => patient.submit(&note, Some(&drug_id)).await?,
        Action::Close => patient.close().await?,
        Action::Withdraw => {
            patient.withdraw().await?;
        }
        Action::Show => {}
        _ => return Ok(false),
    }
    Ok(true)
}

async fn run_pharmacy(session: &Session, mut input: Input) -> anyhow::Result<()> {
    let mut pharmacy = PharmacyClient::new(session);
    let mut listening = pharmacy.is_listening();
    println!("{}", PHARMACY_HELP);

    loop {
        let wake = tokio::select! {
            line = input.next_line() => Wake::Line(line?),
            update = pharmacy.next_update(), if listening => Wake::Update(update?),
        };

        match wake {
            Wake::Line(None) => return Ok(()),
            Wake::Line(Some(line)) => {
                let Some(action) = parse(&line) else {
                    println!("{}", PHARMACY_HELP);
                    continue;
                };
                match apply_pharmacy(&mut pharmacy, action).await {
                    Ok(true) => {}
                    Ok(false) => {
                        println!("{}", PHARMACY_HELP);
                        continue;
                    }
                    Err(e) => println!("! {}", e),
                }
            }
            Wake::Update(changed) => {
                if !changed {
                    warn!("Channel closed; no more requests will arrive");
                    listening = false;
                    continue;
                }
            }
        }
        print_card(pharmacy.card().as_ref());
    }
}

async fn apply_pharmacy(pharmacy: &mut PharmacyClient, action: Action) -> Result<bool, ClientError> {
    match action {
        Action::Respond { price, message } => pharmacy.respond(&message, &price).await?,
        Action::Dismiss => pharmacy.dismiss().await?,
        Action::Show => {}
        _ => return Ok(false),
    }
    Ok(true)
}

/// `None` for blank or unrecognised input
fn parse(line: &str) -> Option<Action> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match verb {
        "open" => Some(Action::Open),
        "send" => {
            let (drug_id, note) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Some(Action::Send {
                drug_id: drug_id.to_string(),
                note: note.trim().to_string(),
            })
        }
        "close" => Some(Action::Close),
        "withdraw" => Some(Action::Withdraw),
        "respond" => {
            let (price, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Some(Action::Respond {
                price: price.to_string(),
                message: message.trim().to_string(),
            })
        }
        "dismiss" => Some(Action::Dismiss),
        "show" => Some(Action::Show),
        "help" => Some(Action::Help),
        _ => None,
    }
}

fn print_view(view: &RequestView) {
    if !view.open {
        println!("[closed]");
        return;
    }

    println!("[{}]", view.state.as_str());
    if let Some(banner) = &view.banner {
        println!("  {}", banner);
    }
    if let Some(error) = &view.error {
        println!("  ! {}", error);
    }
    if view.show_form {
        for option in &view.options {
            let marker = if option.selected { "*" } else { " " };
            println!("  {} {} {}", marker, option.drug_id, option.label);
        }
    }
}

fn print_card(card: Option<&RequestCard>) {
    let Some(card) = card else {
        println!("[no request]");
        return;
    };

    println!("[request] {} ({})", card.patient_name, card.patient_phone);
    println!("  drug: {}", card.drug_name);
    println!("  note: {}", card.note);
    if let Some(error) = &card.error {
        println!("  ! {}", error);
    }
}
