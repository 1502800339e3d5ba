use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// The replay actions understood by the binary, addressed by booking id.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Client opens a dispute with the coach.
    Request,
    /// Client opens a dispute straight at the admin.
    RequestAdmin,
    CoachApprove,
    CoachDecline,
    Escalate,
    AdminApprove,
    AdminDeny,
}

/// One row of the dispute command stream.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct DisputeCommand {
    pub action: CommandAction,
    pub actor: String,
    pub booking: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub message: Option<String>,
}

/// Reads dispute commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding an iterator of `Result<DisputeCommand>` for streaming replay.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<DisputeCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EngineError::from))
    }
}
