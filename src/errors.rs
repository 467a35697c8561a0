// Error types for gallop

use crate::model::{RaceOutcome, RaceStatus, SessionStatus};
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum GallopError {
    // Horse pool and program generation errors
    #[snafu(display("No horses available. Generate a horse pool first."))]
    NoHorsesAvailable,
    #[snafu(display("Not enough horses for a race: {available} available, {required} required"))]
    InsufficientHorses { available: usize, required: usize },
    #[snafu(display("Invalid horse pool size {requested}, expected 1 to {max}"))]
    InvalidPoolSize { requested: usize, max: usize },
    #[snafu(display("Cannot regenerate horses or program after races have started"))]
    RegenerationNotAllowed,

    // Data model validation errors
    #[snafu(display("Invalid horse: {field} - {reason}"))]
    InvalidHorse { field: String, reason: String },
    #[snafu(display("Invalid race program: {reason}"))]
    InvalidProgram { reason: String },
    #[snafu(display("Invalid race result: {reason}"))]
    InvalidOutcome { reason: String },
    #[snafu(display("Invalid session snapshot {id}: {reason}"))]
    InvalidSnapshot { id: String, reason: String },

    // State machine errors
    #[snafu(display("Race {round} cannot move from {from} to {to}"))]
    InvalidRaceTransition {
        round: u32,
        from: RaceStatus,
        to: RaceStatus,
    },
    #[snafu(display("Session {id} cannot move from {from} to {to}"))]
    InvalidSessionTransition {
        id: String,
        from: SessionStatus,
        to: SessionStatus,
    },
    #[snafu(display("Session {id} still has races left to run"))]
    ProgramIncomplete { id: String },
    #[snafu(display("Session {id} is completed and can no longer change"))]
    SessionClosed { id: String },
    #[snafu(display("Session {id} never started a race and cannot be interrupted"))]
    NoRaceStarted { id: String },

    // Session lookup errors
    #[snafu(display("Session not found: {id}"))]
    SessionNotFound { id: String },
    #[snafu(display("No current session, create or load one first"))]
    NoCurrentSession,

    // Persistence errors
    #[snafu(display("Could not find application data directory to store sessions"))]
    NoDataDir,
    #[snafu(display("Error accessing session storage"))]
    StorageIOError { source: io::Error },
    #[snafu(display("Error serializing session collection"))]
    StorageSerializeError { source: serde_json::Error },
    #[snafu(display("Session storage operation failed: {operation} - {reason}"))]
    FileOperationError { operation: String, reason: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid configuration: {field} - {reason}"))]
    InvalidConfig { field: String, reason: String },

    // Errors for the results feed
    #[snafu(display("Error writing results file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error loading results file"))]
    ResultsLoaderError { source: io::Error },
    #[snafu(display("Error broadcasting race result"))]
    ResultBroadcastError {
        source: Box<SendError<RaceOutcome>>,
    },
}

impl From<SendError<RaceOutcome>> for GallopError {
    fn from(value: SendError<RaceOutcome>) -> Self {
        GallopError::ResultBroadcastError {
            source: Box::new(value),
        }
    }
}
