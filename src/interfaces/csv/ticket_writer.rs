use crate::domain::money::{MINOR_UNIT_SCALE, Money};
use crate::domain::ticket::{DisputeTicket, ResolutionAction};
use crate::error::Result;
use std::io::Write;

/// Writes the final state of dispute tickets as CSV.
pub struct TicketWriter<W: Write> {
    writer: csv::Writer<W>,
}

fn amount_field(money: &Money) -> String {
    let mut amount = money.amount();
    if amount.scale() < MINOR_UNIT_SCALE {
        amount.rescale(MINOR_UNIT_SCALE);
    }
    amount.to_string()
}

fn resolution_field(ticket: &DisputeTicket) -> &'static str {
    match ticket.resolution.as_ref().map(|r| r.action) {
        Some(ResolutionAction::RefundApproved) => "refund_approved",
        Some(ResolutionAction::RefundDenied) => "refund_denied",
        Some(ResolutionAction::NoAction) => "no_action",
        None => "",
    }
}

impl<W: Write> TicketWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    pub fn write_tickets(&mut self, tickets: Vec<DisputeTicket>) -> Result<()> {
        self.writer.write_record([
            "booking",
            "status",
            "requested",
            "refunded",
            "currency",
            "resolution",
            "ticket",
        ])?;
        for ticket in tickets {
            let status = ticket.status.to_string();
            let requested = amount_field(&ticket.requested_refund);
            let refunded = amount_field(&ticket.refunded_total);
            let id = ticket.id.to_string();
            self.writer.write_record([
                ticket.booking_id.as_str(),
                status.as_str(),
                requested.as_str(),
                refunded.as_str(),
                ticket.requested_refund.currency().code(),
                resolution_field(&ticket),
                id.as_str(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
