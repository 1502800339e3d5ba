use clap::Parser;
use disputekit::application::coordinator::RefundWorkflow;
use disputekit::domain::booking::BookingContext;
use disputekit::domain::ids::{ActorId, BookingId, TicketId};
use disputekit::domain::money::{Currency, Money};
use disputekit::domain::ports::TicketStoreRef;
use disputekit::domain::transition::{AdminDecision, CoachDecision};
use disputekit::error::EngineError;
use disputekit::infrastructure::in_memory::{InMemoryBookingDirectory, InMemoryTicketStore};
use disputekit::infrastructure::settlement::{InProcessSettlementGateway, TracingNotificationEmitter};
use disputekit::interfaces::csv::command_reader::{CommandAction, CommandReader, DisputeCommand};
use disputekit::interfaces::csv::ticket_writer::TicketWriter;
use miette::{IntoDiagnostic, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Booking directory seed (JSON array of booking contexts)
    bookings: PathBuf,

    /// Dispute commands CSV to replay
    commands: PathBuf,

    /// Path to a persistent ticket database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,
}

impl Cli {
    fn ticket_store(&self) -> Result<TicketStoreRef> {
        #[cfg(feature = "storage-rocksdb")]
        if let Some(db_path) = &self.db_path {
            let store = disputekit::infrastructure::rocksdb::RocksTicketStore::open(db_path)
                .into_diagnostic()?;
            return Ok(Arc::new(store));
        }
        Ok(Arc::new(InMemoryTicketStore::new()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let bookings_file = File::open(&cli.bookings).into_diagnostic()?;
    let bookings: Vec<BookingContext> =
        serde_json::from_reader(bookings_file).into_diagnostic()?;

    let gateway = InProcessSettlementGateway::new();
    for booking in &bookings {
        let open_charge = booking
            .payment
            .amount_paid
            .checked_sub(&booking.payment.already_refunded)
            .into_diagnostic()?;
        gateway
            .register_charge(booking.payment.payment_id.clone(), open_charge)
            .await;
    }

    let workflow = RefundWorkflow::new(
        cli.ticket_store()?,
        Arc::new(InMemoryBookingDirectory::new(bookings)),
        gateway,
        Arc::new(TracingNotificationEmitter),
    );

    // Replay commands; a rejected command is reported and does not stop the run.
    let commands_file = File::open(&cli.commands).into_diagnostic()?;
    let reader = CommandReader::new(commands_file);
    let mut last_ticket: HashMap<String, TicketId> = HashMap::new();
    for result in reader.commands() {
        match result {
            Ok(command) => {
                if let Err(e) = apply_command(&workflow, &mut last_ticket, command).await {
                    eprintln!("Error applying command: {e}");
                }
            }
            Err(e) => eprintln!("Error reading command: {e}"),
        }
    }

    let tickets = workflow.all_tickets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = TicketWriter::new(stdout.lock());
    writer.write_tickets(tickets).into_diagnostic()?;

    Ok(())
}

fn command_money(command: &DisputeCommand) -> Result<Money, EngineError> {
    let amount = command.amount.ok_or_else(|| {
        EngineError::Validation("this command requires an amount".to_owned())
    })?;
    let currency = command.currency.clone().ok_or_else(|| {
        EngineError::Validation("this command requires a currency".to_owned())
    })?;
    Money::new(amount, Currency::new(currency)?)
}

async fn apply_command(
    workflow: &RefundWorkflow,
    last_ticket: &mut HashMap<String, TicketId>,
    command: DisputeCommand,
) -> Result<(), EngineError> {
    let booking_id = BookingId::from(command.booking.as_str());
    let actor = ActorId::from(command.actor.as_str());

    let known_ticket = |map: &HashMap<String, TicketId>| {
        map.get(&command.booking).copied().ok_or_else(|| {
            EngineError::Validation(format!(
                "no dispute ticket known for booking {}",
                command.booking
            ))
        })
    };

    let ticket = match command.action {
        CommandAction::Request | CommandAction::RequestAdmin => {
            let reason = command.message.clone().unwrap_or_default();
            workflow
                .create_refund_request(
                    actor,
                    booking_id,
                    &reason,
                    command_money(&command)?,
                    command.action == CommandAction::RequestAdmin,
                )
                .await?
        }
        CommandAction::CoachApprove => {
            workflow
                .respond_as_coach(
                    actor,
                    known_ticket(last_ticket)?,
                    CoachDecision::Approve,
                    Some(command_money(&command)?),
                    command.message.clone(),
                )
                .await?
        }
        CommandAction::CoachDecline => {
            workflow
                .respond_as_coach(
                    actor,
                    known_ticket(last_ticket)?,
                    CoachDecision::Decline,
                    None,
                    command.message.clone(),
                )
                .await?
        }
        CommandAction::Escalate => {
            let reason = command.message.clone().unwrap_or_default();
            workflow
                .escalate_as_client(actor, known_ticket(last_ticket)?, &reason)
                .await?
        }
        CommandAction::AdminApprove => {
            workflow
                .resolve_as_admin(
                    actor,
                    known_ticket(last_ticket)?,
                    AdminDecision::Approve,
                    command_money(&command)?,
                    None,
                    command.message.clone(),
                )
                .await?
        }
        CommandAction::AdminDeny => {
            let ticket_id = known_ticket(last_ticket)?;
            let current = workflow.ticket(&ticket_id).await?;
            let none = Money::zero(current.requested_refund.currency().clone());
            workflow
                .resolve_as_admin(
                    actor,
                    ticket_id,
                    AdminDecision::Deny,
                    none,
                    None,
                    command.message.clone(),
                )
                .await?
        }
    };

    last_ticket.insert(command.booking.clone(), ticket.id);
    Ok(())
}
