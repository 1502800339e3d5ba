pub mod command_reader;
pub mod ticket_writer;
