//! Dry-run tooling: scrape a confirmation email, or play a whole run against
//! a reservation file with a simulated clock. Nothing talks to the airline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use autocheckin::{
    telemetry, Address, BoardingPass, CheckInResult, Clock, ConfirmationEmailExtractor,
    GatewayError, Handlers, Identity, InboundMessage, InboundTrigger, LocalOrchestrator,
    Reservation, ReservationGateway, Settings,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "autocheckin")]
#[command(about = "Dry-run the automatic check-in pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the start input a confirmation email would produce
    Extract {
        /// Envelope sender of the email
        #[arg(long)]
        source: String,
        /// Raw email (headers, blank line, body)
        email: PathBuf,
    },
    /// Run every check-in for a reservation file with a simulated clock
    Simulate {
        /// Reservation JSON as the gateway would return it
        #[arg(long)]
        reservation: PathBuf,
        /// Envelope sender of the email
        #[arg(long)]
        source: String,
        /// Raw email (headers, blank line, body)
        email: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init_tracing(settings.log_format)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract { source, email } => {
            let pipeline = Pipeline::new(None, &settings);
            let message = read_message(&email, source)?;
            match pipeline.trigger.start_input(&message).await {
                Some(start) => println!("{}", serde_json::to_string_pretty(&start)?),
                None => bail!("no reservation found in {}", email.display()),
            }
        }
        Commands::Simulate {
            reservation,
            source,
            email,
        } => {
            let raw = fs::read_to_string(&reservation)
                .with_context(|| format!("reading {}", reservation.display()))?;
            let reservation: Reservation = serde_json::from_str(&raw)?;
            let pipeline = Pipeline::new(Some(reservation), &settings);
            let message = read_message(&email, source)?;

            let Some(started) = pipeline.trigger.on_inbound_message(&message).await? else {
                bail!("no reservation found in {}", email.display());
            };
            println!("{}", serde_json::to_string_pretty(&started)?);

            while let Some(due) = pipeline.orchestrator.next_due() {
                pipeline.clock.advance_to(due);
                let report = pipeline.orchestrator.tick().await;
                info!(now = %due, ?report, "Tick");
            }

            let status = pipeline.orchestrator.status(&started.execution_id)?;
            println!("{status:?}");
        }
    }
    Ok(())
}

struct Pipeline {
    clock: Arc<SimulatedClock>,
    orchestrator: Arc<LocalOrchestrator>,
    trigger: InboundTrigger,
}

impl Pipeline {
    fn new(reservation: Option<Reservation>, settings: &Settings) -> Self {
        let clock = Arc::new(SimulatedClock(Mutex::new(Utc::now())));
        let gateway = Arc::new(DryRunGateway { reservation });
        let handlers = Arc::new(Handlers::new(gateway, clock.clone(), settings));
        let orchestrator = Arc::new(LocalOrchestrator::new(handlers, clock.clone(), settings));
        let trigger = InboundTrigger::new(
            Arc::new(ConfirmationEmailExtractor),
            orchestrator.clone(),
            settings.airline_domain.clone(),
        );
        Self {
            clock,
            orchestrator,
            trigger,
        }
    }
}

fn read_message(path: &Path, source: String) -> Result<InboundMessage> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let raw = raw.replace("\r\n", "\n");
    let (headers, body) = raw.split_once("\n\n").unwrap_or((raw.as_str(), ""));

    let header = |name: &str| {
        headers.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };

    Ok(InboundMessage {
        message_id: header("Message-ID").unwrap_or_else(|| path.display().to_string()),
        source,
        subject: header("Subject").unwrap_or_default(),
        body: body.to_string(),
    })
}

/// Clock that only moves when told to.
struct SimulatedClock(Mutex<DateTime<Utc>>);

impl SimulatedClock {
    fn advance_to(&self, at: DateTime<Utc>) {
        let mut now = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if at > *now {
            *now = at;
        }
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Serves one reservation from a file and pretends every check-in succeeds.
struct DryRunGateway {
    reservation: Option<Reservation>,
}

#[async_trait]
impl ReservationGateway for DryRunGateway {
    async fn lookup_reservation(&self, identity: &Identity) -> Result<Reservation, GatewayError> {
        self.reservation
            .clone()
            .ok_or_else(|| GatewayError::NotFound(identity.confirmation_number().to_string()))
    }

    async fn check_in(&self, identity: &Identity) -> Result<CheckInResult, GatewayError> {
        let reservation = self.lookup_reservation(identity).await?;
        let boarding_passes = reservation
            .passengers
            .iter()
            .enumerate()
            .map(|(i, passenger)| BoardingPass {
                passenger: format!("{} {}", passenger.first_name, passenger.last_name),
                flight: "DRY-RUN".to_string(),
                group: "A".to_string(),
                position: (i + 1) as u16,
            })
            .collect();
        info!(identity = %identity, "Dry run: would check in");
        Ok(CheckInResult { boarding_passes })
    }

    async fn send_boarding_pass(
        &self,
        identity: &Identity,
        recipient: &Address,
    ) -> Result<(), GatewayError> {
        info!(identity = %identity, recipient = %recipient, "Dry run: would email boarding pass");
        Ok(())
    }
}
